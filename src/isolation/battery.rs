//! Test battery execution
//!
//! Each request/assert pair yields one [`AssertionResult`]. Failures are
//! recorded, never thrown, so a failing assertion does not stop the battery.

use std::time::Duration;

use crate::domain::{AssertionResult, HttpMethod, TestCase};
use crate::error::{Result, process, unit};

/// Status and body of one API response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// Sends test requests to a running API process
pub trait ApiClient {
    fn send(&self, base_url: &str, test: &TestCase) -> Result<ApiResponse>;
}

/// Blocking HTTP client
pub struct HttpApiClient {
    client: reqwest::blocking::Client,
}

impl HttpApiClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self { client })
    }
}

impl ApiClient for HttpApiClient {
    fn send(&self, base_url: &str, test: &TestCase) -> Result<ApiResponse> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), test.path);
        let request = match test.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Put => self.client.put(&url),
            HttpMethod::Delete => self.client.delete(&url),
        };
        let request = match test.body {
            Some(ref body) => request.json(body),
            None => request,
        };

        let response = request
            .send()
            .map_err(|e| process::http_failed(&url, e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| process::http_failed(&url, e.to_string()))?;
        Ok(ApiResponse { status, body })
    }
}

/// Run every test in order against `base_url`
pub fn execute_battery(
    client: &dyn ApiClient,
    base_url: &str,
    tests: &[TestCase],
) -> Vec<AssertionResult> {
    tests
        .iter()
        .map(|test| match client.send(base_url, test) {
            Ok(response) => evaluate(test, &response),
            Err(e) => failed(test, format!("request failed: {e}")),
        })
        .collect()
}

/// Every failing part of the expectation is reported, not just the first
pub fn evaluate(test: &TestCase, response: &ApiResponse) -> AssertionResult {
    let expect = &test.expect;
    let mut mismatches = Vec::new();

    if let Some(status) = expect.status {
        if response.status != status {
            mismatches.push(format!("got status {}", response.status));
        }
    }
    if let Some(ref needle) = expect.contains {
        if !response.body.contains(needle.as_str()) {
            mismatches.push(format!("body lacks {needle:?}"));
        }
    }
    if let Some(ref json) = expect.json {
        match serde_json::from_str::<serde_json::Value>(&response.body) {
            Ok(value) => match value.pointer(&json.pointer) {
                Some(actual) if *actual == json.equals => {}
                Some(actual) => mismatches.push(format!("{} is {actual}", json.pointer)),
                None => mismatches.push(format!("{} is missing", json.pointer)),
            },
            Err(_) => mismatches.push("body is not JSON".to_string()),
        }
    }

    if mismatches.is_empty() {
        AssertionResult::pass(&test.name, expect.describe())
    } else {
        failed(test, mismatches.join(", "))
    }
}

fn failed(test: &TestCase, detail: String) -> AssertionResult {
    let condition = test.expect.describe();
    let err = unit::assertion_failed(&test.name, &condition, &detail);
    tracing::warn!(error = %err, "assertion failed");
    AssertionResult::fail(&test.name, condition, detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use crate::test_fixtures::ScriptedClient;

    fn ok(status: u16, body: &str) -> ApiResponse {
        ApiResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_all_parts_pass() {
        let test = TestCase::post("create patient", "/api/patients")
            .expect_status(201)
            .expect_contains("P001")
            .expect_json("/data/id", json!("P001"));
        let result = evaluate(&test, &ok(201, r#"{"data":{"id":"P001"}}"#));
        assert!(result.passed);
        assert_eq!(
            result.condition,
            r#"status == 201 and body contains "P001" and json /data/id == "P001""#
        );
    }

    #[test]
    fn test_mismatches_are_all_reported() {
        let test = TestCase::get("read patient", "/api/patients/P001")
            .expect_status(200)
            .expect_json("/data/name", json!("Ada Lovelace"));
        let result = evaluate(&test, &ok(404, r#"{"error":"not found"}"#));
        assert!(!result.passed);
        assert_eq!(
            result.detail.as_deref(),
            Some("got status 404, /data/name is missing")
        );
    }

    #[test]
    fn test_non_json_body() {
        let test = TestCase::get("read", "/x").expect_json("/a", json!(1));
        let result = evaluate(&test, &ok(200, "<html>"));
        assert_eq!(result.detail.as_deref(), Some("body is not JSON"));
    }

    #[test]
    fn test_failure_does_not_stop_battery() {
        let tests = vec![
            TestCase::get("one", "/one").expect_status(200),
            TestCase::get("two", "/two").expect_status(200),
            TestCase::get("three", "/three").expect_status(200),
        ];
        let client = ScriptedClient::new().fail_path("/two");
        let results = execute_battery(&client, "http://127.0.0.1:3000", &tests);
        let passed: Vec<bool> = results.iter().map(|r| r.passed).collect();
        assert_eq!(passed, [true, false, true]);
    }

    #[test]
    fn test_http_client_sends_method_and_body() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();

            let mut content_length = 0;
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).unwrap();
                if header == "\r\n" {
                    break;
                }
                if let Some(v) = header.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
            }
            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).unwrap();

            let reply = r#"{"data":{"patientId":"P001"}}"#;
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 201 Created\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                reply.len(),
                reply
            )
            .unwrap();
            (request_line, String::from_utf8(body).unwrap())
        });

        let client = HttpApiClient::new(Duration::from_secs(5)).unwrap();
        let test = TestCase::post("create patient", "/api/patients")
            .with_body(json!({"patientId": "P001"}))
            .expect_status(201);
        let response = client.send(&base_url, &test).unwrap();

        let (request_line, body) = server.join().unwrap();
        assert!(request_line.starts_with("POST /api/patients HTTP/1.1"));
        assert_eq!(body, r#"{"patientId":"P001"}"#);
        assert_eq!(response.status, 201);
        assert!(evaluate(&test, &response).passed);
    }

    #[test]
    fn test_connection_refused_is_failed_assertion() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = HttpApiClient::new(Duration::from_secs(2)).unwrap();
        let tests = vec![TestCase::get("read", "/api/patients").expect_status(200)];
        let results = execute_battery(&client, &format!("http://127.0.0.1:{port}"), &tests);
        assert!(!results[0].passed);
        assert!(results[0].detail.as_ref().unwrap().starts_with("request failed"));
    }
}
