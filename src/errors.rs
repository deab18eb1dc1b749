use std::path::PathBuf;

use thiserror::Error;

/// Why a system definition was rejected.
///
/// The same messages are used by the edit form and by a prober that refuses
/// to start. The prober prefixes them with `configuration: `.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid system name '{0}': use letters, digits, spaces and - _ . , : /")]
    Name(String),
    #[error("invalid check interval '{0}': {1}")]
    Interval(String, String),
    #[error("check interval '{0}' is shorter than 1s")]
    IntervalTooShort(String),
    #[error("invalid URL '{0}': {1}")]
    Url(String, String),
    #[error("unsupported URL scheme '{0}': expected http or https")]
    UnsupportedScheme(String),
    #[error("no probe configured")]
    MissingProbe,
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    InvalidInput(#[from] ValidationError),
    #[error("no system at index {0}")]
    NotFound(usize),
    #[error("monitor has been shut down")]
    Shutdown,
}

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("Failed to open file '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to write file '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to encode systems: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Failed to fetch remote spec '{url}': {source}")]
    RemoteFetch { url: String, source: reqwest::Error },
    #[error("Remote spec fetch failed ({status}): {url}")]
    RemoteStatus { url: String, status: u16 },
    #[error("Failed to parse remote spec '{url}': {source}")]
    RemoteParse {
        url: String,
        source: serde_json::Error,
    },
    #[error("{var} must be an https URL, got: {url}")]
    InsecureRemote { var: &'static str, url: String },
}
