//! Training history.
//!
//! The learner logs every metric update under
//! `{artifact_dir}/{split}/epoch-{n}/{Metric}.log`. After a run, these
//! files are reduced to one record per epoch and written out as the
//! `loss,acc,val_acc` CSV artifact.

use std::fs::File;
use std::path::Path;

use burn::train::logger::{FileMetricLogger, MetricLogger};
use burn::train::metric::NumericEntry;
use thiserror::Error;

/// Metric names as `LossMetric` and `AccuracyMetric` register them.
const LOSS: &str = "Loss";
const ACCURACY: &str = "Accuracy";

const TRAIN_DIR: &str = "train";
const VALID_DIR: &str = "valid";

/// Scalars tracked for one epoch, the columns of the history artifact.
/// Accuracies are fractions in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochRecord {
    pub loss: f64,
    pub acc: f64,
    pub val_acc: f64,
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("metric {metric} has no entries for epoch {epoch}")]
    MissingMetric { metric: String, epoch: usize },
    #[error("metric {metric} log for epoch {epoch} is malformed: {message}")]
    Malformed {
        metric: String,
        epoch: usize,
        message: String,
    },
}

/// Reduces the metric logs of a finished run to one record per epoch.
pub fn collect(artifact_dir: &str, num_epochs: usize) -> Result<Vec<EpochRecord>, HistoryError> {
    let mut train = FileMetricLogger::new(&format!("{artifact_dir}/{TRAIN_DIR}"));
    let mut valid = FileMetricLogger::new(&format!("{artifact_dir}/{VALID_DIR}"));

    let mut records = Vec::with_capacity(num_epochs);
    for epoch in 1..=num_epochs {
        let loss = epoch_mean(&mut train, LOSS, epoch)?;
        // Accuracy metrics log percentages; the history keeps fractions.
        let acc = epoch_mean(&mut train, ACCURACY, epoch)? / 100.0;
        let val_acc = epoch_mean(&mut valid, ACCURACY, epoch)? / 100.0;

        records.push(EpochRecord { loss, acc, val_acc });
    }

    Ok(records)
}

/// Mean over every entry a metric logged during one epoch. Aggregated
/// entries weigh in with their element count.
fn epoch_mean(
    logger: &mut FileMetricLogger,
    metric: &str,
    epoch: usize,
) -> Result<f64, HistoryError> {
    let entries =
        logger
            .read_numeric(metric, epoch)
            .map_err(|message| HistoryError::Malformed {
                metric: metric.to_string(),
                epoch,
                message,
            })?;

    let mut sum = 0.0;
    let mut count = 0usize;
    for entry in entries {
        match entry {
            NumericEntry::Value(value) => {
                sum += value;
                count += 1;
            }
            NumericEntry::Aggregated(value, num) => {
                sum += value * num as f64;
                count += num;
            }
        }
    }

    if count == 0 {
        return Err(HistoryError::MissingMetric {
            metric: metric.to_string(),
            epoch,
        });
    }

    Ok(sum / count as f64)
}

/// Writes the history CSV, one row per epoch with four decimal places.
pub fn write_csv(path: impl AsRef<Path>, records: &[EpochRecord]) -> Result<(), HistoryError> {
    let mut writer = csv::Writer::from_writer(File::create(path)?);

    writer.write_record(["loss", "acc", "val_acc"])?;
    for record in records {
        writer.write_record([
            format!("{:.4}", record.loss),
            format!("{:.4}", record.acc),
            format!("{:.4}", record.val_acc),
        ])?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_log(root: &Path, split: &str, epoch: usize, metric: &str, lines: &str) {
        let dir = root.join(split).join(format!("epoch-{epoch}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{metric}.log")), lines).unwrap();
    }

    #[test]
    fn collects_epoch_means_from_metric_logs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        write_log(root, TRAIN_DIR, 1, LOSS, "2.0\n1.0\n");
        write_log(root, TRAIN_DIR, 1, ACCURACY, "10\n30\n");
        write_log(root, VALID_DIR, 1, ACCURACY, "25\n");
        write_log(root, TRAIN_DIR, 2, LOSS, "0.5\n");
        write_log(root, TRAIN_DIR, 2, ACCURACY, "50\n");
        write_log(root, VALID_DIR, 2, ACCURACY, "40\n60\n");

        let records = collect(root.to_str().unwrap(), 2).unwrap();

        assert_eq!(records.len(), 2);
        assert!((records[0].loss - 1.5).abs() < 1e-9);
        assert!((records[0].acc - 0.2).abs() < 1e-9);
        assert!((records[0].val_acc - 0.25).abs() < 1e-9);
        assert!((records[1].loss - 0.5).abs() < 1e-9);
        assert!((records[1].acc - 0.5).abs() < 1e-9);
        assert!((records[1].val_acc - 0.5).abs() < 1e-9);
    }

    #[test]
    fn aggregated_entries_are_weighted_by_count() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        // One aggregated entry over 3 elements and one plain value.
        write_log(root, TRAIN_DIR, 1, LOSS, "2.0,3\n6.0\n");
        write_log(root, TRAIN_DIR, 1, ACCURACY, "100\n");
        write_log(root, VALID_DIR, 1, ACCURACY, "100\n");

        let records = collect(root.to_str().unwrap(), 1).unwrap();

        // (2.0 * 3 + 6.0) / 4
        assert!((records[0].loss - 3.0).abs() < 1e-9);
    }

    #[test]
    fn missing_logs_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        write_log(root, TRAIN_DIR, 1, LOSS, "1.0\n");
        write_log(root, TRAIN_DIR, 1, ACCURACY, "50\n");

        let err = collect(root.to_str().unwrap(), 1).unwrap_err();

        assert!(matches!(
            err,
            HistoryError::MissingMetric { epoch: 1, .. }
        ));
    }

    #[test]
    fn writes_fixed_precision_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");

        let records = vec![
            EpochRecord {
                loss: 2.302585,
                acc: 0.10101,
                val_acc: 0.099,
            },
            EpochRecord {
                loss: 1.5,
                acc: 0.25,
                val_acc: 0.3,
            },
        ];
        write_csv(&path, &records).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "loss,acc,val_acc\n2.3026,0.1010,0.0990\n1.5000,0.2500,0.3000\n"
        );
    }

    #[test]
    fn writes_header_only_for_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");

        write_csv(&path, &[]).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "loss,acc,val_acc\n");
    }
}
