#[derive(Debug)]
#[non_exhaustive]
pub enum WriteError {
    IO(std::io::Error),
    InvalidDimensions,
    UnsupportedFeature,
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WriteError::IO(ref e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteError::IO(e) => e.fmt(f),
            WriteError::InvalidDimensions => write!(f, "InvalidDimensions: the image dimensions don't match its pixel data, or are too large for the file format."),
            WriteError::UnsupportedFeature => write!(f, "UnsupportedFeature: the image can't be represented in the requested file format."),
        }
    }
}

//-------------------------------------------------------------
// From impls.

impl From<std::io::Error> for WriteError {
    fn from(other: std::io::Error) -> Self {
        WriteError::IO(other)
    }
}

impl From<tiff::TiffError> for WriteError {
    fn from(other: tiff::TiffError) -> Self {
        use tiff::TiffError::*;
        match other {
            IoError(e) => Self::IO(e),
            LimitsExceeded | IntSizeError => Self::InvalidDimensions,
            _ => Self::UnsupportedFeature,
        }
    }
}
