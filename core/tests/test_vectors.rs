//! Verify URL and error normalization against JSON test vectors stored in
//! `test-vectors/`.
//!
//! Comparing parsed JSON (not raw strings) avoids false negatives from
//! field-ordering differences.

use std::sync::Arc;
use std::time::Duration;

use hms_sync_core::{normalized_url, ApiError, HttpClient, HttpMethod, HttpResponse, ReqwestTransport};
use serde_json::Value;

fn client() -> HttpClient {
    // Nothing here reaches the network; the transport only fills the slot.
    let transport = ReqwestTransport::new(Duration::from_secs(1)).unwrap();
    HttpClient::new("http://localhost:8000", Arc::new(transport))
}

// ---------------------------------------------------------------------------
// Record URLs
// ---------------------------------------------------------------------------

#[test]
fn url_test_vectors() {
    let raw = include_str!("../../test-vectors/urls.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let base = case["base"].as_str().unwrap();
        let id = case["id"].as_str().unwrap();
        let expected = case["expected"].as_str().unwrap();

        let url = normalized_url(base, id);
        assert_eq!(url, expected, "{name}");

        // Normalizing a base that already went through once changes nothing.
        let again = normalized_url(url.trim_end_matches(&format!("{id}/")), id);
        assert_eq!(again, expected, "{name}: idempotent");
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn error_test_vectors() {
    let raw = include_str!("../../test-vectors/errors.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    let c = client();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let response = HttpResponse {
            status: case["status"].as_u64().unwrap() as u16,
            headers: Vec::new(),
            body: case["body"].as_str().unwrap().to_string(),
        };

        let err = c.parse_response::<Value>(HttpMethod::Get, response).unwrap_err();
        assert_eq!(serde_json::to_value(&err).unwrap(), case["expected"], "{name}");

        let back: ApiError = serde_json::from_value(case["expected"].clone()).unwrap();
        assert_eq!(back, err, "{name}: deserializes to the same error");
    }
}
