use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum IoError {
    /// Opening, reading or writing a file failed.
    File { path: PathBuf, source: std::io::Error },
    /// Malformed CSV input.
    Csv(String),
    /// Malformed JSON. `line` is set for JSON-lines files.
    Json {
        path: PathBuf,
        line: Option<usize>,
        message: String,
    },
}

impl IoError {
    pub(crate) fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Csv(msg) => write!(f, "CSV error: {msg}"),
            Self::Json {
                path,
                line: Some(line),
                message,
            } => write!(f, "{}:{line}: {message}", path.display()),
            Self::Json {
                path,
                line: None,
                message,
            } => write!(f, "{}: {message}", path.display()),
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::File { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<csv::Error> for IoError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}
