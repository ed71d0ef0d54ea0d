use std::error::Error as StdError;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::result::Result as StdResult;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    IoError,
    MalformedData,
    InconsistentState,
    UnsupportedFeature,
    ImageError,
    OracleError,
    InvalidConfig,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub description: String,
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new<S: Into<String>>(kind: ErrorKind, description: S) -> Self {
        Self {
            kind,
            description: description.into(),
            source: None,
        }
    }

    pub fn with_source<S, E>(kind: ErrorKind, description: S, source: E) -> Self
    where
        S: Into<String>,
        E: StdError + Send + Sync + 'static,
    {
        Self {
            kind,
            description: description.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{:?}: {}", self.kind, self.description)?;
        if let Some(source) = &self.source {
            write!(f, " ({})", source)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::with_source(ErrorKind::IoError, "i/o failure", err)
    }
}

pub type Result<T> = StdResult<T, Error>;

pub trait IntoResult<T> {
    fn res<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T>;
}

impl<T> IntoResult<T> for StdResult<T, std::io::Error> {
    fn res<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T> {
        self.map_err(|e| Error::with_source(ErrorKind::IoError, desc_fn(), e))
    }
}

impl<T> IntoResult<T> for StdResult<T, image::ImageError> {
    fn res<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T> {
        self.map_err(|e| {
            Error::with_source(ErrorKind::ImageError, desc_fn(), e)
        })
    }
}

impl<T> IntoResult<T> for StdResult<T, serde_json::Error> {
    fn res<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T> {
        self.map_err(|e| {
            Error::with_source(ErrorKind::MalformedData, desc_fn(), e)
        })
    }
}

impl<T> IntoResult<T> for Option<T> {
    fn res<F: FnOnce() -> String>(self, desc_fn: F) -> Result<T> {
        self.ok_or_else(|| Error::new(ErrorKind::InconsistentState, desc_fn()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let res: StdResult<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        ));
        let err = res.res(|| "failed to open 'a.ply'".to_string()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IoError);
        assert_eq!(err.description, "failed to open 'a.ply'");
        assert!(err.source.is_some());
        assert!(format!("{}", err).contains("gone"));
    }

    #[test]
    fn test_option_into_result() {
        assert_eq!(Some(3).res(|| String::new()).unwrap(), 3);
        let err = None::<u8>.res(|| "missing".to_string()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InconsistentState);
    }
}
