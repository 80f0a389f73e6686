//! Allowlisted fetch for isolated sessions.
//!
//! Security model:
//! - Only URLs matching allowed origins can be fetched (empty = disabled)
//! - Redirects only followed if they stay within the same origin
//! - Response bodies are capped
//! - Runs under the session's own execution limit

use anyhow::anyhow;
use deno_core::{op2, OpState};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use url::Url;

/// Largest response body handed back to the session
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Maximum number of same-origin redirects followed per request
const MAX_REDIRECTS: usize = 5;

/// Network policy for an isolated session
#[derive(Debug, Clone)]
pub struct NetworkPolicy {
    /// Allowed origins (e.g., "https://api.example.com")
    /// An origin is scheme + host + port
    pub allowed_origins: Vec<String>,
    pub max_body_bytes: usize,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl NetworkPolicy {
    pub fn new(allowed_origins: Vec<String>) -> Self {
        Self {
            allowed_origins: allowed_origins
                .into_iter()
                .map(|origin| origin.trim_end_matches('/').to_string())
                .collect(),
            ..Default::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.allowed_origins.is_empty()
    }

    pub fn is_origin_allowed(&self, url: &Url) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let origin = url.origin().ascii_serialization();
        self.allowed_origins.iter().any(|allowed| origin == *allowed)
    }
}

/// Request info passed from JS
#[derive(Debug, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
}

/// Response info returned to JS
#[derive(Debug, Serialize)]
pub struct FetchResponse {
    pub ok: bool,
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub url: String,
    pub body: String,
}

/// The fetch operation - validates origin and makes the request
#[op2(async)]
#[serde]
pub async fn op_fetch(
    state: Rc<RefCell<OpState>>,
    #[serde] request: FetchRequest,
) -> Result<FetchResponse, deno_core::error::AnyError> {
    let policy = {
        let state_ref = state.borrow();
        state_ref
            .try_borrow::<NetworkPolicy>()
            .cloned()
            .unwrap_or_default()
    };

    do_fetch(request, &policy, 0).await
}

fn parse_method(method: Option<&str>) -> Result<Method, deno_core::error::AnyError> {
    let method = match method.unwrap_or("GET").to_uppercase().as_str() {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        "DELETE" => Method::DELETE,
        "PATCH" => Method::PATCH,
        "HEAD" => Method::HEAD,
        "OPTIONS" => Method::OPTIONS,
        other => return Err(anyhow!("Unsupported HTTP method: {}", other)),
    };
    Ok(method)
}

/// Internal fetch implementation (called recursively for redirects)
async fn do_fetch(
    request: FetchRequest,
    policy: &NetworkPolicy,
    redirects: usize,
) -> Result<FetchResponse, deno_core::error::AnyError> {
    let url = Url::parse(&request.url)
        .map_err(|e| anyhow!("Invalid URL '{}': {}", request.url, e))?;

    if !policy.is_origin_allowed(&url) {
        return Err(anyhow!(
            "Fetch blocked: origin '{}' is not in the allowlist. Allowed: {:?}",
            url.origin().ascii_serialization(),
            policy.allowed_origins
        ));
    }

    let client = Client::builder()
        // Redirects are handled manually below
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

    let method = parse_method(request.method.as_deref())?;
    let mut req_builder = client.request(method, url.clone());

    if let Some(ref headers) = request.headers {
        for (key, value) in headers {
            req_builder = req_builder.header(key, value);
        }
    }

    if let Some(body) = request.body {
        req_builder = req_builder.body(body);
    }

    let mut response = req_builder
        .send()
        .await
        .map_err(|e| anyhow!("Fetch failed: {}", e))?;

    let status = response.status();
    let final_url = response.url().clone();

    if status.is_redirection() {
        if let Some(location) = response.headers().get("location") {
            if redirects >= MAX_REDIRECTS {
                return Err(anyhow!("Fetch blocked: more than {} redirects", MAX_REDIRECTS));
            }

            let location_str = location
                .to_str()
                .map_err(|_| anyhow!("Invalid redirect location"))?;
            let redirect_url = final_url
                .join(location_str)
                .map_err(|e| anyhow!("Invalid redirect URL: {}", e))?;

            if redirect_url.origin() != url.origin() {
                return Err(anyhow!(
                    "Fetch blocked: redirect to different origin '{}' (original: '{}')",
                    redirect_url.origin().ascii_serialization(),
                    url.origin().ascii_serialization()
                ));
            }

            let redirect_request = FetchRequest {
                url: redirect_url.to_string(),
                method: Some("GET".to_string()), // Redirects become GET
                headers: request.headers.clone(),
                body: None,
            };

            return Box::pin(do_fetch(redirect_request, policy, redirects + 1)).await;
        }
    }

    let mut resp_headers = HashMap::new();
    for (key, value) in response.headers() {
        if let Ok(v) = value.to_str() {
            resp_headers.insert(key.to_string(), v.to_string());
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| anyhow!("Failed to read response body: {}", e))?
    {
        if body.len() + chunk.len() > policy.max_body_bytes {
            return Err(anyhow!(
                "Fetch blocked: response body exceeds {} bytes",
                policy.max_body_bytes
            ));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(FetchResponse {
        ok: status.is_success(),
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
        headers: resp_headers,
        url: final_url.to_string(),
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_matching() {
        let policy = NetworkPolicy::new(vec![
            "https://api.example.com/".to_string(),
            "http://localhost:3000".to_string(),
        ]);

        assert!(policy.is_origin_allowed(&Url::parse("https://api.example.com/users").unwrap()));
        assert!(policy.is_origin_allowed(&Url::parse("http://localhost:3000/api").unwrap()));

        assert!(!policy.is_origin_allowed(&Url::parse("https://evil.com/api").unwrap()));
        assert!(!policy.is_origin_allowed(&Url::parse("http://api.example.com/users").unwrap())); // http vs https
        assert!(!policy.is_origin_allowed(&Url::parse("https://api.example.com:8080/").unwrap())); // different port
    }

    #[test]
    fn test_empty_allowlist() {
        let policy = NetworkPolicy::default();
        assert!(!policy.is_enabled());
        assert!(!policy.is_origin_allowed(&Url::parse("https://anything.com").unwrap()));
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(parse_method(None).unwrap(), Method::GET);
        assert_eq!(parse_method(Some("post")).unwrap(), Method::POST);
        assert!(parse_method(Some("TRACE")).is_err());
    }

    #[tokio::test]
    async fn test_blocked_before_any_request() {
        let request = FetchRequest {
            url: "https://evil.com/data".into(),
            method: None,
            headers: None,
            body: None,
        };
        let err = do_fetch(request, &NetworkPolicy::default(), 0).await.unwrap_err();
        assert!(err.to_string().contains("not in the allowlist"));
    }
}
