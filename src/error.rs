use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode raw file '{path}': {message}")]
    Decode { path: PathBuf, message: String },

    #[error("Failed to read metadata: {0}")]
    Metadata(#[from] exif::Error),

    #[error("{0}")]
    Processing(String),
}

/// Outcome of the last `configure()` or `process_image()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    /// The output file exists and overwriting was not requested.
    FileExists,
    InputFileNotFound,
    EmptyInputFilename,
    FilesystemError,
    /// The output directory is missing and creating it was not requested.
    OutputDirectoryError,
    InvalidPath,
    /// No white balance or colour transform could be computed.
    ConfigurationError,
    ReadError,
    MatrixApplicationError,
    ScaleApplicationError,
    CropApplicationError,
    WriteError,
}

impl Status {
    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl Default for Status {
    fn default() -> Status {
        Status::Success
    }
}
