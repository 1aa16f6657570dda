use crate::utils::error::AppError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin JSON-over-HTTP POST client bound to one base URL.
#[derive(Clone)]
pub struct JsonHttpClient {
    base_url: String,
    client: Client,
}

impl JsonHttpClient {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        Self::with_headers(base_url, &[])
    }

    pub fn with_headers(base_url: &str, headers: &[(&str, &str)]) -> Result<Self, AppError> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| AppError::ParseError(format!("Invalid header name: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| AppError::ParseError(format!("Invalid header value: {}", e)))?;
            default_headers.insert(name, value);
        }
        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::NetworkError(e.to_string()))?;

        Ok(JsonHttpClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// POSTs `body` (or nothing) to `base_url + path` and decodes the reply as JSON.
    /// Any non-2xx status is an error carrying the raw body.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, AppError> {
        let url = if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        };

        let mut request = self.client.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| AppError::NetworkError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            return Err(AppError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| AppError::JsonParseError(e.to_string()))
    }
}
