// src/response.rs

//! Response abstraction consumed by the wrapper, plus typed body decoding.

// dependencies
use crate::errors::Error;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

/// What the retry loop needs to see of a response: a numeric status and a
/// case-insensitive header lookup.
pub trait HttpResponse {
    fn status(&self) -> u16;
    fn headers(&self) -> &HeaderMap;
}

impl HttpResponse for reqwest::Response {
    fn status(&self) -> u16 {
        reqwest::Response::status(self).as_u16()
    }

    fn headers(&self) -> &HeaderMap {
        reqwest::Response::headers(self)
    }
}

/// Parse a JSON response body into `T`.
pub async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, Error> {
    let status = response.status();
    let bytes = response.bytes().await?;

    serde_json::from_slice(&bytes).map_err(|e| Error::Parse {
        status: status.as_u16(),
        body: String::from_utf8_lossy(&bytes).to_string(),
        source: e,
    })
}
