use std::path::Path;

use async_compression::tokio::bufread::GzipDecoder;
use csv_async::AsyncReaderBuilder;
use futures::StreamExt;
use itertools::Itertools;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

use crate::import::error::ImportError;
use crate::import::format::{has_extension, FormatPlugin, Producer};
use crate::import::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

/// Character-delimited text with a header row, read as a stream.
#[derive(Debug, Clone)]
pub struct Delimited {
    delimiter: u8,
    extensions: &'static [&'static str],
    compression: Compression,
}

impl Delimited {
    pub fn csv() -> Self {
        Self {
            delimiter: b',',
            extensions: &["csv"],
            compression: Compression::None,
        }
    }

    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            extensions: &["tsv"],
            compression: Compression::None,
        }
    }

    pub fn csv_gz() -> Self {
        Self {
            delimiter: b',',
            extensions: &["csv.gz"],
            compression: Compression::Gzip,
        }
    }

    pub fn tsv_gz() -> Self {
        Self {
            delimiter: b'\t',
            extensions: &["tsv.gz"],
            compression: Compression::Gzip,
        }
    }

    async fn reader(&self, path: &Path) -> std::io::Result<Box<dyn AsyncRead + Unpin + Send>> {
        let file = tokio::fs::File::open(path).await?;
        Ok(match self.compression {
            Compression::None => Box::new(file),
            Compression::Gzip => Box::new(GzipDecoder::new(BufReader::new(file))),
        })
    }
}

#[async_trait::async_trait]
impl FormatPlugin for Delimited {
    fn sniff(&self, claimed_name: &str, _actual_path: &Path) -> bool {
        has_extension(claimed_name, self.extensions)
    }

    /// Non-blank lines minus the header. Quoted fields spanning lines make
    /// this an overestimate.
    async fn count(&self, path: &Path) -> Result<u64, ImportError> {
        let mut lines = BufReader::new(self.reader(path).await?).lines();
        let mut count = 0u64;
        while let Some(line) = lines.next_line().await? {
            if !line.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count.saturating_sub(1))
    }

    async fn open(&self, path: &Path) -> Result<Producer, ImportError> {
        let mut reader = AsyncReaderBuilder::new()
            .delimiter(self.delimiter)
            .create_reader(self.reader(path).await?);

        let headers = reader.headers().await?.clone();
        debug!(columns = %headers.iter().join(","), "opened delimited file");

        let records = reader.into_records().map(move |row| {
            let row = row?;
            Ok(headers
                .iter()
                .zip(row.iter())
                .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
                .collect::<Record>())
        });

        Ok(Producer::Stream(records.boxed()))
    }
}
