use std::fmt;
use std::path::PathBuf;

/// How far an error reaches when a batch is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorScope {
    /// Broken configuration: nothing can be generated.
    Run,
    /// One student's report cannot be produced.
    Student,
    /// One picture slot is skipped; the rest of the report goes on.
    Slot,
}

#[derive(Debug)]
pub enum Error {
    Config(String),
    AnchorNotFound(String),
    AssetMissing(String),
    SourceNotFound(PathBuf),
    Structure(String),
    Image(image::ImageError),
    Sheet(String),
    Zip(zip::result::ZipError),
    Xml(roxmltree::Error),
    Io(std::io::Error),
}

impl Error {
    pub fn scope(&self) -> ErrorScope {
        match self {
            Error::Config(_) => ErrorScope::Run,
            Error::AnchorNotFound(_)
            | Error::AssetMissing(_)
            | Error::Structure(_)
            | Error::Image(_) => ErrorScope::Slot,
            Error::SourceNotFound(_)
            | Error::Sheet(_)
            | Error::Zip(_)
            | Error::Xml(_)
            | Error::Io(_) => ErrorScope::Student,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(reason) => write!(f, "configuration error: {reason}"),
            Error::AnchorNotFound(text) => write!(f, "anchor text not found: {text:?}"),
            Error::AssetMissing(stem) => write!(f, "no picture found for slot {stem:?}"),
            Error::SourceNotFound(path) => write!(f, "file not found: {}", path.display()),
            Error::Structure(reason) => write!(f, "malformed document structure: {reason}"),
            Error::Image(e) => write!(f, "image error: {e}"),
            Error::Sheet(e) => write!(f, "spreadsheet error: {e}"),
            Error::Zip(e) => write!(f, "ZIP error: {e}"),
            Error::Xml(e) => write!(f, "XML error: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        Error::Zip(e)
    }
}

impl From<roxmltree::Error> for Error {
    fn from(e: roxmltree::Error) -> Self {
        Error::Xml(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e)
    }
}

impl From<calamine::XlsxError> for Error {
    fn from(e: calamine::XlsxError) -> Self {
        Error::Sheet(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
