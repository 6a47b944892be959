//! Metrics sink (§6, "Metrics interface", consumed): an optional event
//! collector the server lifecycle writes to. Connection failures must not
//! abort the server (§6), so [`TcpMetricsSink`] connects lazily and logs
//! rather than propagates on failure.
use std::io::Write;
use std::net::TcpStream;
use std::sync::Mutex;

use log::warn;

/// One observable pipeline event, emitted by the server lifecycle (§4.F)
/// after each request is written.
#[derive(Debug, Clone)]
pub struct RequestMetric {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u128,
}

/// The metrics interface (§6): "an event sink exposing a write/emit
/// operation".
pub trait MetricsSink: Send + Sync {
    fn record(&self, metric: &RequestMetric);
}

/// Default sink when no `metrics` option and no `METRICS` env var are set.
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn record(&self, _metric: &RequestMetric) {}
}

/// Streams metric events, one JSON object per line, over a TCP connection.
/// Connects lazily on first use and reconnects on write failure; failures
/// are logged and otherwise ignored, matching §6's "connection failures
/// MUST NOT abort the server".
pub struct TcpMetricsSink {
    addr: String,
    conn: Mutex<Option<TcpStream>>,
}

impl TcpMetricsSink {
    /// `addr` may be a bare `host:port` or a `tcp://host:port` URL, as
    /// documented for the `METRICS` environment variable; any `scheme://`
    /// prefix is stripped before use, since `TcpStream::connect` only
    /// understands a bare socket address.
    pub fn new(addr: &str) -> Self {
        let addr = match addr.split_once("://") {
            Some((_scheme, rest)) => rest,
            None => addr,
        };
        Self {
            addr: addr.to_string(),
            conn: Mutex::new(None),
        }
    }

    fn send(&self, line: &str) {
        let mut guard = self.conn.lock().unwrap();
        if guard.is_none() {
            match TcpStream::connect(&self.addr) {
                Ok(stream) => *guard = Some(stream),
                Err(e) => {
                    warn!("metrics: failed to connect to {}: {}", self.addr, e);
                    return;
                }
            }
        }
        if let Some(stream) = guard.as_mut() {
            if let Err(e) = writeln!(stream, "{}", line) {
                warn!("metrics: write failed, dropping connection: {}", e);
                *guard = None;
            }
        }
    }
}

impl MetricsSink for TcpMetricsSink {
    fn record(&self, metric: &RequestMetric) {
        let line = serde_json::json!({
            "method": metric.method,
            "path": metric.path,
            "status": metric.status,
            "duration_ms": metric.duration_ms,
        })
        .to_string();
        self.send(&line);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_null_sink_ignores_metrics() {
        let sink = NullMetricsSink;
        sink.record(&RequestMetric {
            method: "GET".to_string(),
            path: "/".to_string(),
            status: 200,
            duration_ms: 3,
        });
    }

    #[test]
    fn test_tcp_sink_connect_failure_is_swallowed() {
        let sink = TcpMetricsSink::new("127.0.0.1:1");
        sink.record(&RequestMetric {
            method: "GET".to_string(),
            path: "/".to_string(),
            status: 200,
            duration_ms: 1,
        });
    }

    #[test]
    fn test_tcp_sink_strips_scheme() {
        let sink = TcpMetricsSink::new("tcp://127.0.0.1:9000");
        assert_eq!(sink.addr, "127.0.0.1:9000");
    }
}
