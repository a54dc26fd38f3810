//! HTTP adapter for a JSON search gateway
//!
//! The gateway exposes three endpoints relative to `base-url`:
//! - `POST auth/login` with `{identifier, secondary_identifier, secret}`
//! - `POST auth/guest`
//! - `GET search?q=..&product=..&count=..` with the session cookies attached
//!
//! Both auth endpoints answer with a session object
//! (`{"account": .., "guest": .., "cookies": {..}}`); search answers with
//! `{"posts": [..]}`. Errors carry `{"error": "message"}` when the gateway
//! has anything to say.

use crate::api::{ApiError, ApiSession, Credentials, RawPost, SearchApi};
use crate::config::{ApiConfig, Ranking};
use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The gateway configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`SearchApi`] over a JSON gateway
#[derive(Debug, Clone)]
pub struct HttpSearchApi {
    client: Client,
    base: Url,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    identifier: &'a str,
    secondary_identifier: &'a str,
    secret: &'a str,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    posts: Vec<RawPost>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpSearchApi {
    /// Creates an adapter for the gateway at `config.base_url`
    pub fn new(config: &ApiConfig) -> Result<Self, crate::TrawlError> {
        let mut base = Url::parse(&config.base_url).map_err(|e| {
            crate::ConfigError::InvalidUrl(format!("Invalid base-url: {}", e))
        })?;
        // Url::join drops the last segment unless the path ends in '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: build_http_client(config)?,
            base,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|e| ApiError::Other(format!("cannot build endpoint '{}': {}", path, e)))
    }

    async fn read_session(response: Response) -> Result<ApiSession, ApiError> {
        let response = check_status(response).await?;
        response
            .json::<ApiSession>()
            .await
            .map_err(|e| ApiError::Api(format!("malformed session response: {}", e)))
    }
}

#[async_trait]
impl SearchApi for HttpSearchApi {
    async fn login(&self, credentials: &Credentials) -> Result<ApiSession, ApiError> {
        let body = LoginRequest {
            identifier: &credentials.identifier,
            secondary_identifier: credentials.secondary(),
            secret: credentials.secret.as_deref().unwrap_or_default(),
        };
        let response = self
            .client
            .post(self.endpoint("auth/login")?)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_session(response).await
    }

    async fn guest(&self) -> Result<ApiSession, ApiError> {
        let response = self
            .client
            .post(self.endpoint("auth/guest")?)
            .send()
            .await
            .map_err(transport_error)?;
        let mut session = Self::read_session(response).await?;
        session.guest = true;
        Ok(session)
    }

    async fn search(
        &self,
        session: &ApiSession,
        query: &str,
        ranking: Ranking,
        count: u32,
    ) -> Result<Vec<RawPost>, ApiError> {
        let count = count.to_string();
        let mut request = self.client.get(self.endpoint("search")?).query(&[
            ("q", query),
            ("product", ranking.as_str()),
            ("count", count.as_str()),
        ]);
        if !session.cookies.is_empty() {
            request = request.header(header::COOKIE, cookie_header(session));
        }

        let response = request.send().await.map_err(transport_error)?;
        let response = check_status(response).await?;
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Api(format!("malformed search response: {}", e)))?;
        Ok(body.posts)
    }
}

fn cookie_header(session: &ApiSession) -> String {
    session
        .cookies
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Maps non-success statuses onto [`ApiError`]
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or_else(|_| {
            if text.is_empty() {
                status.to_string()
            } else {
                text
            }
        });

    Err(status_error(status, message))
}

fn status_error(status: StatusCode, message: String) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
        StatusCode::LOCKED => ApiError::AccountLocked(message),
        StatusCode::FORBIDDEN if message.to_lowercase().contains("locked") => {
            ApiError::AccountLocked(message)
        }
        StatusCode::FORBIDDEN => ApiError::Forbidden(message),
        StatusCode::TOO_MANY_REQUESTS => ApiError::TooManyRequests(message),
        StatusCode::BAD_REQUEST => ApiError::BadRequest(message),
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        _ => ApiError::Api(format!("HTTP {}: {}", status.as_u16(), message)),
    }
}

/// Classifies transport failures the same way page fetches always have:
/// timeouts, refused connections, everything else
fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout(e.to_string())
    } else if e.is_connect() {
        ApiError::Connect(e.to_string())
    } else {
        ApiError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn create_test_config(base_url: &str) -> ApiConfig {
        ApiConfig {
            base_url: base_url.to_string(),
            timeout_secs: 5,
            user_agent: "search-trawl-test/1.0".to_string(),
        }
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&create_test_config("https://gw.example.com")).is_ok());
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let api = HttpSearchApi::new(&create_test_config("https://gw.example.com/v1")).unwrap();
        assert_eq!(
            api.endpoint("search").unwrap().as_str(),
            "https://gw.example.com/v1/search"
        );

        let api = HttpSearchApi::new(&create_test_config("https://gw.example.com/v1/")).unwrap();
        assert_eq!(
            api.endpoint("auth/login").unwrap().as_str(),
            "https://gw.example.com/v1/auth/login"
        );
    }

    #[test]
    fn test_status_mapping() {
        let m = || "boom".to_string();
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, m()),
            ApiError::Unauthorized(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, m()),
            ApiError::Forbidden(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "Account is LOCKED".to_string()),
            ApiError::AccountLocked(_)
        ));
        assert!(matches!(
            status_error(StatusCode::LOCKED, m()),
            ApiError::AccountLocked(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, m()),
            ApiError::TooManyRequests(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, m()),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, m()),
            ApiError::NotFound(_)
        ));
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY, m()),
            ApiError::Api("HTTP 502: boom".to_string())
        );
    }

    #[test]
    fn test_cookie_header() {
        let mut cookies = BTreeMap::new();
        cookies.insert("ct0".to_string(), "x".to_string());
        cookies.insert("auth_token".to_string(), "y".to_string());
        let session = ApiSession {
            account: "alice".to_string(),
            guest: false,
            cookies,
        };
        assert_eq!(cookie_header(&session), "auth_token=y; ct0=x");
    }
}
