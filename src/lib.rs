//! CIFAR image classification with a single fully-connected baseline.
//!
//! The crate mirrors a small experiment harness: a JSON experiment
//! configuration selects the dataset, optimizer and model settings, the
//! training driver fits the model and exports artifacts (history CSV, best
//! checkpoint, final model), and the inference entry point reloads those
//! artifacts to classify single images.

pub mod augment;
pub mod config;
pub mod data;
pub mod dataset;
pub mod history;
pub mod inference;
pub mod model;
pub mod optimizer;
pub mod training;
