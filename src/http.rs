use std::time::Duration;

use thiserror::Error;

const MAX_ERROR_BODY_CHARS: usize = 240;

#[derive(Debug, Error)]
pub(crate) enum HttpError {
    #[error("{}", describe_status(.status, .body))]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("response decode failed: {0}")]
    Decode(String),
}

fn describe_status(status: &u16, body: &str) -> String {
    if body.is_empty() {
        format!("HTTP status {status}")
    } else {
        let truncated = body.chars().take(MAX_ERROR_BODY_CHARS).collect::<String>();
        format!("HTTP status {status} ({truncated})")
    }
}

pub(crate) enum Payload<'a> {
    Empty,
    Json(&'a serde_json::Value),
    Bytes(&'a [u8]),
}

pub(crate) fn build_agent(connect_timeout: Duration, read_timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(connect_timeout)
        .timeout_read(read_timeout)
        .timeout_write(read_timeout)
        .build()
}

/// Sends one request and returns the response body. There is no retry; the
/// caller decides how a failure degrades.
pub(crate) fn send_text(request: ureq::Request, payload: Payload<'_>) -> Result<String, HttpError> {
    let result = match payload {
        Payload::Empty => request.call(),
        Payload::Json(value) => request
            .set("Content-Type", "application/json")
            .send_string(&value.to_string()),
        Payload::Bytes(bytes) => request.send_bytes(bytes),
    };

    match result {
        Ok(response) => response
            .into_string()
            .map_err(|err| HttpError::Decode(err.to_string())),
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().ok().unwrap_or_default();
            Err(HttpError::Status {
                status,
                body: body.trim().to_string(),
            })
        }
        Err(ureq::Error::Transport(err)) => Err(HttpError::Transport(err.to_string())),
    }
}


#[cfg(test)]
mod tests {
    use super::test_server::{Behavior, TestServer};
    use super::*;

    fn agent() -> ureq::Agent {
        build_agent(Duration::from_millis(200), Duration::from_millis(200))
    }

    #[test]
    fn returns_body_on_success() {
        let server = TestServer::spawn(vec![Behavior::Respond(200, "ok".to_string())]);
        let request = agent().get(&server.base_url).query("q", "x");

        let body = send_text(request, Payload::Empty).expect("request should succeed");
        assert_eq!(body, "ok");
        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].request_line().starts_with("GET /?q=x"));
    }

    #[test]
    fn does_not_retry_server_errors() {
        let server = TestServer::spawn(vec![
            Behavior::Respond(503, "down".to_string()),
            Behavior::Respond(200, "ok".to_string()),
        ]);

        let err = send_text(agent().get(&server.base_url), Payload::Empty)
            .expect_err("503 should surface immediately");
        match &err {
            HttpError::Status { status, body } => {
                assert_eq!(*status, 503);
                assert_eq!(body, "down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "HTTP status 503 (down)");
        assert_eq!(server.requests().len(), 1);
    }

    #[test]
    fn read_timeout_is_a_transport_error() {
        let server = TestServer::spawn(vec![Behavior::DelayRespond(
            Duration::from_millis(150),
            200,
            "slow".to_string(),
        )]);
        let agent = build_agent(Duration::from_millis(200), Duration::from_millis(20));

        let err = send_text(agent.get(&server.base_url), Payload::Empty)
            .expect_err("slow response should time out");
        assert!(matches!(err, HttpError::Transport(_)), "unexpected: {err:?}");
    }

    #[test]
    fn sends_json_payload() {
        let server = TestServer::spawn(vec![Behavior::Respond(201, String::new())]);
        let value = serde_json::json!({ "content_id": "custom-1" });

        let body = send_text(agent().post(&server.base_url), Payload::Json(&value))
            .expect("post should succeed");
        assert_eq!(body, "");
        let requests = server.requests();
        assert_eq!(requests[0].body_json(), value);
        assert!(
            requests[0]
                .header("content-type")
                .is_some_and(|value| value.starts_with("application/json"))
        );
    }

    #[test]
    fn status_without_body_has_short_message() {
        let err = HttpError::Status {
            status: 404,
            body: String::new(),
        };
        assert_eq!(err.to_string(), "HTTP status 404");
    }
}
