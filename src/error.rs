use thiserror::Error;

/// Error contract of the CHM backend. Everything the front end sees from the
/// archive side is one of these.
#[derive(Error, Debug)]
pub enum ChmError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error at '{0}': {1}")]
    IoContext(String, #[source] std::io::Error),

    #[error("Not a CHM file: bad magic 0x{0:08x}")]
    InvalidMagic(u32),

    #[error("Unsupported CHM version: {0}")]
    UnsupportedVersion(u32),

    #[error("Malformed CHM directory: {0}")]
    Malformed(String),

    #[error("Content section {0} is compressed and not supported")]
    UnsupportedCompression(u64),

    #[error("Document conversion failed: {0}")]
    Converter(String),
}

pub type Result<T> = std::result::Result<T, ChmError>;
