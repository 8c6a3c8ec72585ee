//! CIFAR dataset modules.
//!
//! Both datasets ship as gzipped tar archives of fixed-stride binary
//! records. The loaders download the archive into the user cache directory
//! on first use, unpack it, and parse every record into memory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use burn::data::dataset::InMemDataset;
use burn::data::network::downloader;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tar::Archive;
use thiserror::Error;

const CIFAR10_URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz";
const CIFAR100_URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-100-binary.tar.gz";

/// Image payload of one binary record: 32 x 32 pixels, channel-major
/// (all red rows, then green, then blue).
const IMAGE_BYTES: usize = 3 * 32 * 32;

/// Serializes downloads when loaders run from multiple threads.
static DOWNLOAD_LOCK: Mutex<()> = Mutex::new(());

/// Per-channel pixel statistics of the training split, in the `[0, 1]`
/// range.
const CIFAR10_MEAN: [f32; 3] = [0.4914, 0.48216, 0.44653];
const CIFAR10_STD: [f32; 3] = [0.24703, 0.24349, 0.26159];
const CIFAR100_MEAN: [f32; 3] = [0.5071, 0.4865, 0.4409];
const CIFAR100_STD: [f32; 3] = [0.2673, 0.2564, 0.2762];

/// One loaded image: channel-major pixel bytes and the class index.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ImageItem {
    pub image: Vec<u8>,
    pub label: u8,
}

/// Image geometry as `(rows, cols, channels)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageShape {
    pub rows: usize,
    pub cols: usize,
    pub channels: usize,
}

impl ImageShape {
    /// Flattened element count, the input width of a dense layer.
    pub fn num_elements(&self) -> usize {
        self.rows * self.cols * self.channels
    }
}

/// Per-channel statistics used to standardize image batches.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalization {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

/// Train and test splits of one dataset, loaded into memory.
pub struct DataSplits {
    pub train: InMemDataset<ImageItem>,
    pub test: InMemDataset<ImageItem>,
    pub class_names: Vec<String>,
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("{len} bytes is not a whole number of {stride}-byte records")]
    Corrupted { len: usize, stride: usize },
}

/// A dataset the training driver can plug in: class count and image
/// geometry used as defaults, normalization statistics, and the loader
/// itself.
pub trait DataModule {
    fn n_classes(&self) -> usize;
    fn image_shape(&self) -> ImageShape;
    fn normalization(&self) -> Normalization;
    fn load(&self) -> Result<DataSplits, DataError>;
}

/// Dataset selector as it appears in experiment files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetSource {
    Cifar10,
    Cifar100,
}

impl DatasetSource {
    pub fn module(&self) -> Box<dyn DataModule> {
        match self {
            Self::Cifar10 => Box::new(Cifar10),
            Self::Cifar100 => Box::new(Cifar100),
        }
    }
}

/// The 10-class dataset: five training batch files plus one test batch,
/// each record a label byte followed by the image.
pub struct Cifar10;

impl DataModule for Cifar10 {
    fn n_classes(&self) -> usize {
        10
    }

    fn image_shape(&self) -> ImageShape {
        ImageShape {
            rows: 32,
            cols: 32,
            channels: 3,
        }
    }

    fn normalization(&self) -> Normalization {
        Normalization {
            mean: CIFAR10_MEAN.to_vec(),
            std: CIFAR10_STD.to_vec(),
        }
    }

    fn load(&self) -> Result<DataSplits, DataError> {
        let root = fetch(CIFAR10_URL, "cifar-10-binary.tar.gz", "cifar-10-batches-bin")?;

        let mut train = Vec::new();
        for batch in 1..=5 {
            let path = root.join(format!("data_batch_{batch}.bin"));
            train.append(&mut read_records(&path, RecordLayout::SingleLabel)?);
        }
        let test = read_records(&root.join("test_batch.bin"), RecordLayout::SingleLabel)?;
        let class_names = read_class_names(&root.join("batches.meta.txt"), self.n_classes());

        Ok(DataSplits {
            train: InMemDataset::new(train),
            test: InMemDataset::new(test),
            class_names,
        })
    }
}

/// The 100-class dataset: one train and one test file, each record a
/// coarse label byte, the fine label byte, then the image. Only the fine
/// label is kept.
pub struct Cifar100;

impl DataModule for Cifar100 {
    fn n_classes(&self) -> usize {
        100
    }

    fn image_shape(&self) -> ImageShape {
        ImageShape {
            rows: 32,
            cols: 32,
            channels: 3,
        }
    }

    fn normalization(&self) -> Normalization {
        Normalization {
            mean: CIFAR100_MEAN.to_vec(),
            std: CIFAR100_STD.to_vec(),
        }
    }

    fn load(&self) -> Result<DataSplits, DataError> {
        let root = fetch(CIFAR100_URL, "cifar-100-binary.tar.gz", "cifar-100-binary")?;

        let train = read_records(&root.join("train.bin"), RecordLayout::CoarseFine)?;
        let test = read_records(&root.join("test.bin"), RecordLayout::CoarseFine)?;
        let class_names = read_class_names(&root.join("fine_label_names.txt"), self.n_classes());

        Ok(DataSplits {
            train: InMemDataset::new(train),
            test: InMemDataset::new(test),
            class_names,
        })
    }
}

/// Binary record flavours: one label byte per record, or a coarse byte
/// followed by the fine label byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordLayout {
    SingleLabel,
    CoarseFine,
}

impl RecordLayout {
    fn label_bytes(self) -> usize {
        match self {
            Self::SingleLabel => 1,
            Self::CoarseFine => 2,
        }
    }

    fn stride(self) -> usize {
        self.label_bytes() + IMAGE_BYTES
    }
}

/// Downloads and unpacks an archive into the cache directory on first use.
/// Later runs reuse the extracted files.
fn fetch(url: &str, archive_name: &str, extracted_dir: &str) -> Result<PathBuf, DataError> {
    // Point to a specific location in the cache directory.
    let cache_dir = dirs::cache_dir()
        .expect("Could not get cache directory")
        .join("cifar-classification");
    let dataset_dir = cache_dir.join(extracted_dir);

    let _lock = DOWNLOAD_LOCK.lock().unwrap();
    if !dataset_dir.exists() {
        fs::create_dir_all(&cache_dir)?;
        let bytes = downloader::download_file_as_bytes(url, archive_name);

        log::info!("Extracting {archive_name} into {:?}", cache_dir);
        let gz_buffer = GzDecoder::new(&bytes[..]);
        let mut archive = Archive::new(gz_buffer);
        archive.unpack(&cache_dir)?;
    }

    Ok(dataset_dir)
}

fn read_records(path: &Path, layout: RecordLayout) -> Result<Vec<ImageItem>, DataError> {
    let bytes = fs::read(path)?;
    parse_records(&bytes, layout)
}

/// Splits a batch file into items. The file must be an exact multiple of
/// the record stride.
fn parse_records(bytes: &[u8], layout: RecordLayout) -> Result<Vec<ImageItem>, DataError> {
    let stride = layout.stride();
    if bytes.len() % stride != 0 {
        return Err(DataError::Corrupted {
            len: bytes.len(),
            stride,
        });
    }

    let items = bytes
        .chunks_exact(stride)
        .map(|record| ImageItem {
            image: record[layout.label_bytes()..].to_vec(),
            label: record[layout.label_bytes() - 1],
        })
        .collect();

    Ok(items)
}

/// Class names from the archive's meta file, one per line. Falls back to
/// numbered placeholders when the file is absent.
fn read_class_names(path: &Path, n_classes: usize) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(contents) => contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect(),
        Err(err) => {
            log::warn!("Could not read class names from {:?}: {err}", path);
            (0..n_classes).map(|index| format!("class_{index}")).collect()
        }
    }
}
