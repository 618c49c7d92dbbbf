use thiserror::Error;

#[derive(Error, Debug)]
pub enum SulcusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid volume data: {0}")]
    Format(String),

    #[error("Unsupported datatype code: {0}")]
    UnsupportedDataType(i16),

    #[error("Voxel count mismatch: {left} vs {right}")]
    SizeMismatch { left: usize, right: usize },

    #[error("Chunk store would overrun undecoded pages: write end {write_end} past strip boundary {next_strip}")]
    BufferOverflow { write_end: usize, next_strip: usize },

    #[error("Preference error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SulcusError>;
