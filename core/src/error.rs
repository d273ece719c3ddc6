use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// The header line of a statement file was consumed. Not a real failure.
    #[error("header line read")]
    HeaderRead,

    #[error("missing fields: expected at least {expected}, got {found}")]
    MissingFields { expected: usize, found: usize },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid date: {0:?}")]
    InvalidDate(String),

    #[error("invalid number: {0:?}")]
    InvalidNumber(String),

    #[error("malformed line: expected {expected} characters, got {found}")]
    MalformedLine { expected: usize, found: usize },

    #[error("duplicate account {code} in statement {statement_id}")]
    DuplicateAccount { statement_id: i64, code: String },

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("invalid statement for {cnpj} ({year})")]
    InvalidStatement { cnpj: String, year: i32 },

    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("import cancelled")]
    Cancelled,

    #[error("import deadline exceeded")]
    DeadlineExceeded,

    #[error("import worker panicked")]
    WorkerPanicked,
}

impl IngestError {
    /// Errors that only affect a single input line. The line is skipped and
    /// the file keeps going.
    pub fn is_line_level(&self) -> bool {
        matches!(
            self,
            IngestError::HeaderRead
                | IngestError::MissingFields { .. }
                | IngestError::InvalidValue(_)
                | IngestError::InvalidDate(_)
                | IngestError::InvalidNumber(_)
                | IngestError::MalformedLine { .. }
        )
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
