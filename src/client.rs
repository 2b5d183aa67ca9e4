use crate::error::{LoadError, TransportError};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// One request a virtual user wants sent
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn headers(mut self, headers: &BTreeMap<String, String>) -> Self {
        self.headers
            .extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

/// Status and raw body of a completed exchange
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_str(&self.body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// HTTP capability handed to every action.
///
/// Any status code is a successful exchange here; only failures below the
/// status line are errors.
#[async_trait]
pub trait HttpApi: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// reqwest-backed client bound to one target host
pub struct ReqwestApi {
    base_url: String,
    client: Client,
}

impl ReqwestApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LoadError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl HttpApi for ReqwestApi {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method, url.as_str());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;

        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builder_merges_headers() {
        let headers = BTreeMap::from([("Authorization".to_string(), "Bearer t".to_string())]);
        let req = ApiRequest::post("/api/auth/login")
            .headers(&headers)
            .json(json!({"email": "a@example.com"}));

        assert_eq!(req.method, Method::POST);
        assert_eq!(req.path, "/api/auth/login");
        assert_eq!(req.headers.get("Authorization").unwrap(), "Bearer t");
        assert_eq!(req.body.unwrap()["email"], "a@example.com");
    }

    #[test]
    fn test_response_helpers() {
        let ok = ApiResponse::new(201, r#"{"message":"created"}"#);
        assert!(ok.is_success());
        let body: Value = ok.json().unwrap();
        assert_eq!(body["message"], "created");

        let denied = ApiResponse::new(403, "Forbidden");
        assert!(!denied.is_success());
        assert!(matches!(
            denied.json::<Value>(),
            Err(TransportError::Decode(_))
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let api = ReqwestApi::new("http://localhost:8089/", Duration::from_secs(1)).unwrap();
        assert_eq!(api.base_url(), "http://localhost:8089");
    }
}
