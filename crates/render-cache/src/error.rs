//! Error types for the render cache

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum RenderCacheError {
    SourceNotFound(PathBuf),
    Io(Box<std::io::Error>),
    BadPattern(Box<regex::Error>),
    Serialize(Box<serde_json::Error>),
}

impl fmt::Display for RenderCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderCacheError::SourceNotFound(path) => {
                write!(f, "Source file not found: {}", path.display())
            }
            RenderCacheError::Io(err) => write!(f, "IO error: {}", err),
            RenderCacheError::BadPattern(err) => write!(f, "Invalid expire pattern: {}", err),
            RenderCacheError::Serialize(err) => write!(f, "Serialization error: {}", err),
        }
    }
}

impl std::error::Error for RenderCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderCacheError::Io(err) => Some(err.as_ref()),
            RenderCacheError::BadPattern(err) => Some(err.as_ref()),
            RenderCacheError::Serialize(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RenderCacheError {
    fn from(err: std::io::Error) -> Self {
        RenderCacheError::Io(Box::new(err))
    }
}

impl From<regex::Error> for RenderCacheError {
    fn from(err: regex::Error) -> Self {
        RenderCacheError::BadPattern(Box::new(err))
    }
}

impl From<serde_json::Error> for RenderCacheError {
    fn from(err: serde_json::Error) -> Self {
        RenderCacheError::Serialize(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, RenderCacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_not_found_display() {
        let err = RenderCacheError::SourceNotFound(PathBuf::from("/tmp/render.png"));
        assert_eq!(format!("{}", err), "Source file not found: /tmp/render.png");
    }

    #[test]
    fn test_io_error_display() {
        let err = RenderCacheError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(format!("{}", err).starts_with("IO error:"));
    }

    #[test]
    fn test_bad_pattern_display() {
        let err = RenderCacheError::from(regex::Regex::new("(unclosed").unwrap_err());
        assert!(format!("{}", err).starts_with("Invalid expire pattern:"));
    }

    #[test]
    fn test_error_is_debug() {
        let err = RenderCacheError::SourceNotFound(PathBuf::from("x"));
        assert!(format!("{:?}", err).contains("SourceNotFound"));
    }
}
