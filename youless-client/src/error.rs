use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid device url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to build http client")]
    Build(#[source] reqwest::Error),
    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("device responded to {url} with status {status}")]
    Status { url: String, status: StatusCode },
    #[error("failed to decode response from {url}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("device returned an empty reading")]
    EmptyResponse,
}
