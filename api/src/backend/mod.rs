//! Client for the hosted backend: a PostgREST-style table API under
//! `/rest/v1` and a GoTrue-style auth API under `/auth/v1`.

use reqwest::{
    RequestBuilder, Response,
    header::{HeaderMap, HeaderValue},
};
use url::Url;

use crate::config::BackendConfig;

pub mod auth;
mod error;
pub mod rest;

#[cfg(test)]
pub(crate) mod memory;

pub use error::BackendError;
pub use rest::{Filter, Query, TableSource};

#[derive(Clone)]
pub struct Backend {
    http: reqwest::Client,
    base: Url,
    anon_key: String,
}

impl Backend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&config.anon_key).map_err(|_| BackendError::Api {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                code: None,
                message: "Backend anon key is not a valid header value".into(),
            })?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("comments-api/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        // A trailing slash keeps `Url::join` from dropping the last path segment
        let mut base = Url::parse(&config.url)?;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        Ok(Self {
            http,
            base,
            anon_key: config.anon_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.base.join(path)?)
    }

    /// Requests without a user session are made on behalf of the anonymous role.
    fn authorize(&self, request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        request.bearer_auth(token.unwrap_or(&self.anon_key))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(BackendError::from_body(status, &body))
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    fn config(url: &str) -> BackendConfig {
        BackendConfig {
            url: url.into(),
            anon_key: "anon".into(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let backend = Backend::new(&config("https://example.test/project")).unwrap();
        assert_eq!(
            backend.endpoint("rest/v1/comments").unwrap().as_str(),
            "https://example.test/project/rest/v1/comments"
        );

        let backend = Backend::new(&config("https://example.test")).unwrap();
        assert_eq!(
            backend.endpoint("auth/v1/user").unwrap().as_str(),
            "https://example.test/auth/v1/user"
        );
    }

    #[test]
    fn rejects_invalid_url() {
        assert!(matches!(
            Backend::new(&config("not a url")),
            Err(BackendError::Url(_))
        ));
    }
}
