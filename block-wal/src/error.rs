/// Represents errors that can occur in the write-ahead log
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Chunk checksum verification failed, the data is damaged
    InvalidChecksum,

    /// The segment file has been closed
    SegmentClosed,

    /// The requested segment id is not resident in the log
    SegmentNotFound(u32),

    /// The framed payload would exceed the configured segment size
    RecordTooLarge,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WalError: {self:?}")
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Log result
pub type Result<T> = std::result::Result<T, Error>;
