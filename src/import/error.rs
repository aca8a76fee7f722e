use thiserror::Error;

/// Failures that end a whole job.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unsupported format: {file_name}")]
    UnsupportedFormat { file_name: String },

    #[error("format {0} is not registered")]
    UnknownFormat(String),

    #[error("failed to parse input: {0}")]
    Parse(#[from] csv_async::Error),

    #[error("failed to read spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("no worksheets in spreadsheet")]
    EmptyWorkbook,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("import job {0} not found")]
    JobNotFound(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failures that reject a single record. These are counted against the job
/// and never abort it.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("{field}: {message}")]
    Convert { field: String, message: String },

    #[error("update-notfound {field}={value}")]
    UpdateTargetNotFound { field: String, value: String },

    #[error("unknown key field {0}")]
    UnknownKeyField(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("hook failed: {0}")]
    Hook(String),
}

/// A failed piece write: either the record was refused, or the store itself
/// failed and the job cannot go on.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Rejected(#[from] RecordError),

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

impl RecordError {
    pub fn convert(field: impl Into<String>, message: impl Into<String>) -> Self {
        RecordError::Convert {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn hook(err: anyhow::Error) -> Self {
        RecordError::Hook(format!("{err:#}"))
    }
}
