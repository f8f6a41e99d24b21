use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("failed to launch server: {0}")]
    ServerLaunch(String),

    #[error("server at {url} not ready after {waited:?}")]
    ServerTimeout { url: String, waited: Duration },

    #[error("route discovery failed: {0}")]
    RouteDiscovery(String),

    #[error("fetch of {url} failed with status {status}")]
    FetchFailed { url: String, status: u16 },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AnalyzeError>;
