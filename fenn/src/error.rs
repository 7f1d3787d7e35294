/// Errors that may occur in the storage engine
#[derive(Debug)]
pub enum Error {
    /// Key is empty
    EmptyKey,

    /// Key does not exist
    KeyNotFound,

    /// Database has been closed
    Closed,

    /// The auto-merge cron expression could not be parsed
    InvalidMergeSchedule(cron::error::Error),

    /// The merge-finish marker file does not hold a segment id
    InvalidMergeMarker,

    /// Error inside the write-ahead log
    Wal(block_wal::Error),

    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FennError: {self:?}")
    }
}

impl std::error::Error for Error {}

impl From<block_wal::Error> for Error {
    fn from(value: block_wal::Error) -> Self {
        Self::Wal(value)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Engine result
pub type Result<T> = std::result::Result<T, Error>;
