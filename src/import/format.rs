use std::path::Path;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::error::ImportError;
use super::record::Record;

pub type RecordStream = BoxStream<'static, Result<Record, ImportError>>;

/// How the field converter should read record values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionMode {
    /// Every value is plain text.
    String,
    /// Values are already structured (booleans, numbers, arrays).
    Form,
}

/// What a format hands the engine once a file is opened. A format implements
/// exactly one of these shapes.
pub enum Producer {
    /// Records are pulled incrementally from the file.
    Stream(RecordStream),
    /// The whole file was parsed up front.
    Batch(Vec<Record>),
}

/// One importable file format. New formats are added by registering another
/// implementation with the [`FormatRegistry`](super::registry::FormatRegistry).
#[async_trait::async_trait]
pub trait FormatPlugin: Send + Sync {
    /// Whether this format handles the upload. `claimed_name` is the client's
    /// file name; `actual_path` may be peeked at, but only the first few KB.
    fn sniff(&self, claimed_name: &str, actual_path: &Path) -> bool;

    fn conversion_mode(&self) -> ConversionMode {
        ConversionMode::String
    }

    /// Approximate record count, used only for progress.
    async fn count(&self, path: &Path) -> Result<u64, ImportError>;

    async fn open(&self, path: &Path) -> Result<Producer, ImportError>;
}

/// Case-insensitive check of the claimed file name's extension.
pub fn has_extension(claimed_name: &str, extensions: &[&str]) -> bool {
    let name = claimed_name.to_ascii_lowercase();
    extensions
        .iter()
        .any(|ext| name.len() > ext.len() + 1 && name.ends_with(&format!(".{ext}")))
}
