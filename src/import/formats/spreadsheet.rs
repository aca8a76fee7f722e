use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use calamine::{open_workbook_auto, Data, Reader};
use itertools::Itertools;
use serde_json::Value;

use crate::import::error::ImportError;
use crate::import::format::{has_extension, FormatPlugin, Producer};
use crate::import::record::Record;

/// First worksheet of an Excel or OpenDocument workbook. There is no
/// streaming reader for these, so the sheet is parsed whole.
#[derive(Default)]
pub struct Spreadsheet {
    // rows parsed while counting, handed over to the following open()
    parsed: Mutex<HashMap<PathBuf, Vec<Record>>>,
}

impl Spreadsheet {
    pub fn new() -> Self {
        Self::default()
    }

    async fn parse(path: &Path) -> Result<Vec<Record>, ImportError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_first_sheet(&path)).await?
    }

    fn take_parsed(&self, path: &Path) -> Option<Vec<Record>> {
        self.parsed
            .lock()
            .ok()
            .and_then(|mut parsed| parsed.remove(path))
    }
}

#[async_trait::async_trait]
impl FormatPlugin for Spreadsheet {
    fn sniff(&self, claimed_name: &str, _actual_path: &Path) -> bool {
        has_extension(claimed_name, &["xls", "xlsx", "xlsb", "ods"])
    }

    async fn count(&self, path: &Path) -> Result<u64, ImportError> {
        let rows = Self::parse(path).await?;
        let count = rows.len() as u64;
        if let Ok(mut parsed) = self.parsed.lock() {
            parsed.insert(path.to_path_buf(), rows);
        }
        Ok(count)
    }

    async fn open(&self, path: &Path) -> Result<Producer, ImportError> {
        let rows = match self.take_parsed(path) {
            Some(rows) => rows,
            None => Self::parse(path).await?,
        };
        Ok(Producer::Batch(rows))
    }
}

fn read_first_sheet(path: &Path) -> Result<Vec<Record>, ImportError> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(ImportError::EmptyWorkbook)?;
    let range = workbook.worksheet_range(&sheet)?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let headers = header.iter().map(|cell| cell.to_string()).collect_vec();

    Ok(rows
        .map(|row| {
            headers
                .iter()
                .zip(row)
                .filter(|(name, cell)| !name.is_empty() && !matches!(cell, Data::Empty))
                .map(|(name, cell)| (name.clone(), Value::String(cell.to_string())))
                .collect::<Record>()
        })
        .filter(|record| !record.is_empty())
        .collect())
}
