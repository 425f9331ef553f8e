use thiserror::Error;

/// Error taxonomy for the NTFS decoding pipeline.
///
/// `NotFound` is intentionally absent here: per the design, an absent security
/// descriptor id or a name mismatch on `$Secure` is a negative *result*, not an
/// error, so those call sites return `Option<T>` instead of this type.
#[derive(Debug, Error)]
pub enum NtfsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    #[error("corrupt data run: {0}")]
    CorruptRun(String),

    #[error("corrupt $SDS entry: {0}")]
    CorruptSds(String),

    #[error("invalid UTF-16 encoding: {0}")]
    InvalidEncoding(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, NtfsError>;
