//! HTTP client adapter: request building, body unwrapping, error normalization.
//!
//! # Design
//! `HttpClient` holds only an API origin and a shared `Transport`. Each verb
//! is split into a `build_*` step that produces an `HttpRequest` and a common
//! `parse_response` step that turns an `HttpResponse` into plain data or an
//! `ApiError`. The async verbs (`get`, `post`, ...) glue the two together
//! around one `Transport::execute` call, so callers never see a raw response.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};

const JSON_CONTENT_TYPE: (&str, &str) = ("content-type", "application/json");

/// Asynchronous JSON client for the hospital REST API.
#[derive(Clone)]
pub struct HttpClient {
    base_url: String,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    pub fn new(base_url: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join a resource URL onto the API origin. Absolute URLs pass through.
    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{url}", self.base_url)
        } else {
            format!("{}/{url}", self.base_url)
        }
    }

    pub fn build_get(&self, url: &str) -> HttpRequest {
        self.build_bodyless(HttpMethod::Get, url)
    }

    /// GET with `params` appended as a form-encoded query string.
    pub fn build_get_with_params(&self, url: &str, params: &[(&str, &str)]) -> Result<HttpRequest, ApiError> {
        let mut request = self.build_get(url);
        if params.is_empty() {
            return Ok(request);
        }
        let mut resolved = reqwest::Url::parse(&request.path)
            .map_err(|err| ApiError::new(format!("invalid URL {}: {err}", request.path)))?;
        resolved.query_pairs_mut().extend_pairs(params);
        request.path = resolved.into();
        Ok(request)
    }

    pub fn build_delete(&self, url: &str) -> HttpRequest {
        self.build_bodyless(HttpMethod::Delete, url)
    }

    /// Build a POST, PUT or PATCH carrying `body` as JSON.
    pub fn build_with_body<B>(&self, method: HttpMethod, url: &str, body: &B) -> Result<HttpRequest, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_string(body).map_err(ApiError::serialization)?;
        Ok(HttpRequest {
            method,
            path: self.resolve(url),
            headers: vec![(JSON_CONTENT_TYPE.0.to_string(), JSON_CONTENT_TYPE.1.to_string())],
            body: Some(body),
        })
    }

    fn build_bodyless(&self, method: HttpMethod, url: &str) -> HttpRequest {
        HttpRequest {
            method,
            path: self.resolve(url),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Unwrap a response into data, or normalize it into an `ApiError`.
    ///
    /// An empty 2xx body reads as `[]` for GET and `{}` for everything else.
    pub fn parse_response<T>(&self, method: HttpMethod, response: HttpResponse) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        if !response.is_success() {
            return Err(ApiError::from_response(response.status, &response.body));
        }
        let body = response.body.trim();
        if body.is_empty() {
            let empty = match method {
                HttpMethod::Get => Value::Array(Vec::new()),
                _ => Value::Object(Map::new()),
            };
            return serde_json::from_value(empty).map_err(ApiError::invalid_body);
        }
        serde_json::from_str(body).map_err(ApiError::invalid_body)
    }

    pub async fn send<T>(&self, request: HttpRequest) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let method = request.method;
        debug!(%method, path = %request.path, "sending request");
        let response = self.transport.execute(request).await?;
        debug!(%method, status = response.status, "received response");
        self.parse_response(method, response)
    }

    pub async fn get<T>(&self, url: &str) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        self.send(self.build_get(url)).await
    }

    pub async fn get_with_params<T>(&self, url: &str, params: &[(&str, &str)]) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let request = self.build_get_with_params(url, params)?;
        self.send(request).await
    }

    pub async fn post<B, T>(&self, url: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.build_with_body(HttpMethod::Post, url, body)?;
        self.send(request).await
    }

    pub async fn put<B, T>(&self, url: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.build_with_body(HttpMethod::Put, url, body)?;
        self.send(request).await
    }

    pub async fn patch<B, T>(&self, url: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.build_with_body(HttpMethod::Patch, url, body)?;
        self.send(request).await
    }

    pub async fn delete<T>(&self, url: &str) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        self.send(self.build_delete(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    fn client() -> HttpClient {
        HttpClient::new("http://localhost:8000", Arc::new(ScriptedTransport::new()))
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn build_get_joins_relative_path() {
        let req = client().build_get("/doctors/");
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "http://localhost:8000/doctors/");
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn build_get_accepts_path_without_leading_slash() {
        let req = client().build_get("patients/");
        assert_eq!(req.path, "http://localhost:8000/patients/");
    }

    #[test]
    fn query_params_are_encoded() {
        let req = client()
            .build_get_with_params("/patients/", &[("search", "ada l"), ("limit", "10")])
            .unwrap();
        assert_eq!(req.path, "http://localhost:8000/patients/?search=ada+l&limit=10");

        let bare = client().build_get_with_params("/patients/", &[]).unwrap();
        assert_eq!(bare.path, "http://localhost:8000/patients/");
    }

    #[tokio::test]
    async fn get_with_params_sends_query() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(HttpMethod::Get, "?date=2026-10-20", 200, "[]");
        let client = HttpClient::new("http://api", transport.clone());

        let rows: Vec<Value> = client
            .get_with_params("/appointments/", &[("date", "2026-10-20")])
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(transport.requests()[0].path, "http://api/appointments/?date=2026-10-20");
    }

    #[test]
    fn absolute_urls_pass_through() {
        let req = client().build_delete("https://other.example/x/1/");
        assert_eq!(req.path, "https://other.example/x/1/");
    }

    #[test]
    fn trailing_slash_on_origin_is_stripped() {
        let client = HttpClient::new("http://localhost:8000/", Arc::new(ScriptedTransport::new()));
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.build_get("/lab/tests/").path, "http://localhost:8000/lab/tests/");
    }

    #[test]
    fn build_with_body_sets_json_header() {
        let body = serde_json::json!({ "name": "Dr. B", "specialization": "ENT" });
        let req = client().build_with_body(HttpMethod::Post, "/doctors/", &body).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(
            req.headers,
            vec![("content-type".to_string(), "application/json".to_string())]
        );
        let sent: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, body);
    }

    #[test]
    fn empty_get_body_reads_as_empty_list() {
        let rows: Vec<Value> = client().parse_response(HttpMethod::Get, response(200, "")).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn empty_delete_body_reads_as_empty_object() {
        let body: Value = client().parse_response(HttpMethod::Delete, response(204, "")).unwrap();
        assert_eq!(body, serde_json::json!({}));
    }

    #[test]
    fn non_success_is_normalized() {
        let err = client()
            .parse_response::<Value>(HttpMethod::Put, response(404, r#"{"detail":"Patient not found"}"#))
            .unwrap_err();
        assert_eq!(err.message, "Patient not found");
        assert_eq!(err.status, Some(404));
    }

    #[test]
    fn bad_json_is_normalized() {
        let err = client()
            .parse_response::<Vec<Value>>(HttpMethod::Get, response(200, "not json"))
            .unwrap_err();
        assert!(err.message.starts_with("invalid response body"));
        assert!(err.status.is_none());
    }

    #[tokio::test]
    async fn verbs_round_trip_through_transport() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(HttpMethod::Patch, "/billing/b1/", 200, r#"{"id":"b1","status":"paid"}"#);
        let client = HttpClient::new("http://api", transport.clone());

        let bill: Value = client
            .patch("/billing/b1/", &serde_json::json!({ "status": "paid" }))
            .await
            .unwrap();
        assert_eq!(bill["status"], "paid");

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, HttpMethod::Patch);
        assert_eq!(sent[0].path, "http://api/billing/b1/");
    }

    #[tokio::test]
    async fn transport_failure_surfaces_as_api_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail(HttpMethod::Get, "/doctors/", "connection refused");
        let client = HttpClient::new("http://api", transport);

        let err = client.get::<Vec<Value>>("/doctors/").await.unwrap_err();
        assert_eq!(err.message, "connection refused");
        assert!(err.status.is_none());
    }
}
