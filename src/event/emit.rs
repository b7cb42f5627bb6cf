//! Hook-side emitter
//!
//! Claude Code runs `cli-rts emit <slug>` for every hook with the hook's JSON
//! on stdin. The emitter forwards it to the local daemon and never fails:
//! a missing daemon or a slow network must not disturb the agent session.

use super::EventEnvelope;
use crate::errors::Result;
use serde_json::{json, Value};
use std::io::IsTerminal;
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// Interpret raw hook input; empty is `{}`, non-JSON is kept under `raw`
pub fn build_payload(input: &str) -> Value {
    if input.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(input).unwrap_or_else(|_| json!({ "raw": input }))
}

/// Read stdin until EOF or `limit`, whichever comes first
async fn read_stdin(limit: Duration) -> String {
    if std::io::stdin().is_terminal() {
        return String::new();
    }

    let mut stdin = tokio::io::stdin();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let deadline = tokio::time::sleep(limit);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => {
                tracing::debug!(bytes = buf.len(), "Timed out reading hook input");
                break;
            }
            read = stdin.read(&mut chunk) => match read {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    tracing::debug!(error = %e, "Failed to read hook input");
                    break;
                }
            }
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

async fn post(url: &str, envelope: &EventEnvelope, timeout: Duration) -> Result<()> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    client
        .post(url)
        .json(envelope)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

/// Events endpoint for a daemon bound to `host:port`
///
/// A wildcard bind address is reached over loopback.
pub fn events_url(host: &str, port: u16) -> String {
    let host = match host {
        "" | "0.0.0.0" => "127.0.0.1",
        "::" | "[::]" => "[::1]",
        h if h.contains(':') && !h.starts_with('[') => return format!("http://[{h}]:{port}/events"),
        h => h,
    };
    format!("http://{host}:{port}/events")
}

/// Forward one hook invocation to the daemon at `host:port`
pub async fn run(event_type: &str, host: &str, port: u16, timeout_ms: u64) {
    let timeout = Duration::from_millis(timeout_ms);
    let input = read_stdin(timeout).await;
    let envelope = EventEnvelope {
        event_type: event_type.to_string(),
        payload: Some(build_payload(&input)),
    };

    let url = events_url(host, port);
    match post(&url, &envelope, timeout).await {
        Ok(()) => tracing::debug!(event_type, "Event delivered"),
        Err(e) => tracing::debug!(event_type, error = %e, "Daemon unreachable, event dropped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_payload() {
        assert_eq!(build_payload(""), json!({}));
        assert_eq!(build_payload("  \n"), json!({}));
        assert_eq!(
            build_payload(r#"{"session_id":"s1","tool_name":"Read"}"#),
            json!({"session_id": "s1", "tool_name": "Read"})
        );
        assert_eq!(build_payload("oops {"), json!({"raw": "oops {"}));
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = EventEnvelope {
            event_type: "pre-tool".to_string(),
            payload: Some(build_payload(r#"{"a":1}"#)),
        };
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"eventType": "pre-tool", "payload": {"a": 1}})
        );
    }

    #[test]
    fn test_events_url_follows_host() {
        assert_eq!(events_url("127.0.0.1", 4175), "http://127.0.0.1:4175/events");
        assert_eq!(events_url("10.0.0.5", 5000), "http://10.0.0.5:5000/events");
        assert_eq!(events_url("localhost", 80), "http://localhost:80/events");
        assert_eq!(events_url("0.0.0.0", 4175), "http://127.0.0.1:4175/events");
        assert_eq!(events_url("::", 4175), "http://[::1]:4175/events");
        assert_eq!(events_url("::1", 4175), "http://[::1]:4175/events");
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_swallowed() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let envelope = EventEnvelope {
            event_type: "stop".to_string(),
            payload: None,
        };
        let url = format!("http://127.0.0.1:{port}/events");
        assert!(post(&url, &envelope, Duration::from_millis(500)).await.is_err());
    }
}
