use thiserror::Error;

/// The error taxonomy shared by every decoder, the scanner, the reconstructor,
/// and the materializer.
#[derive(Error, Debug)]
pub enum YaffsError {
    #[error("short read: wanted {wanted} bytes, {available} available")]
    ShortRead { wanted: usize, available: usize },

    #[error("malformed spare record: {0}")]
    MalformedSpare(String),

    #[error("malformed object header: {0}")]
    MalformedHeader(String),

    #[error("geometry auto-detection failed: {0}")]
    DetectFailed(String),

    #[error("object {0} is unreachable from a well-known root")]
    Unreachable(u32),

    #[error("hostile path component in {0:?}")]
    HostilePath(String),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fatal: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, YaffsError>;
