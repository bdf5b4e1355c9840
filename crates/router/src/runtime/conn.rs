//! Conn: one inbound connection, framed, decoded, routed and delivered.

use std::net::SocketAddr;

use chrono::Utc;
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio_util::codec::FramedRead;
use tracing::{debug, trace, warn};

use crate::record::{Frame, JsonLinesCodec, LogRecord};
use crate::route::TimeSource;
use crate::state::{RouterState, SharedState};

/// Read newline-delimited JSON from `stream` until EOF, a read error, or
/// shutdown. Bad lines are dropped and counted; nothing is written back.
pub async fn handle_connection<S>(
    stream: S,
    peer: SocketAddr,
    state: SharedState,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + Unpin,
{
    state.metrics.connection_opened();
    debug!(%peer, "Connection opened");

    let codec = JsonLinesCodec::with_max_length(state.config.max_line_bytes);
    let mut frames = FramedRead::new(stream, codec);

    loop {
        let frame = tokio::select! {
            frame = frames.next() => frame,
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                debug!(%peer, "Closing connection for shutdown");
                break;
            }
        };

        match frame {
            Some(Ok(Frame::Line(line))) => process_line(&state, peer, &line).await,
            Some(Ok(Frame::Oversized(len))) => {
                state.metrics.record_oversized();
                warn!(
                    %peer,
                    bytes = len,
                    max = state.config.max_line_bytes,
                    "Dropped oversized line"
                );
            }
            Some(Err(e)) => {
                warn!(%peer, error = %e, "Connection read error");
                break;
            }
            None => break,
        }
    }

    state.metrics.connection_closed();
    debug!(%peer, "Connection closed");
}

/// Decode, route and deliver one line. Failures are logged and counted,
/// never surfaced to the sender.
pub async fn process_line(state: &RouterState, peer: SocketAddr, line: &[u8]) {
    let record = match LogRecord::from_slice(line) {
        Ok(record) => record,
        Err(e) => {
            state.metrics.record_invalid();
            debug!(%peer, error = %e, "Dropped undecodable record");
            return;
        }
    };

    let routed = state.router.route(record, Utc::now());
    state.metrics.record_routed(&routed);
    if routed.time_source == Some(TimeSource::Unparsable) {
        debug!(
            %peer,
            field = %state.router.config().timestamp_field,
            "Unparsable timestamp, using receipt time"
        );
    }

    match state.sink.write(&routed).await {
        Ok(delivery) => {
            state.metrics.record_delivered(delivery.retries);
            trace!(index = %delivery.index, retries = delivery.retries, "Record delivered");
        }
        Err(e) => {
            state.metrics.record_delivery_failed(e.retries());
            warn!(
                %peer,
                index = routed.index.as_deref().unwrap_or("<default>"),
                retries = e.retries(),
                error = %e,
                "Dropping record after failed delivery"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;
    use tokio::io::AsyncWriteExt;

    use crate::conf::RouterConfig;
    use crate::route::RoutedRecord;
    use crate::sink::{Delivery, MemorySink, RecordSink, SinkError, SinkFuture};

    /// Backend that always fails after retrying three times.
    struct GiveUpSink;

    impl RecordSink for GiveUpSink {
        fn write<'a>(&'a self, _routed: &'a RoutedRecord) -> SinkFuture<'a> {
            Box::pin(async {
                Err::<Delivery, _>(SinkError::Exhausted {
                    retries: 3,
                    source: Box::new(SinkError::Unavailable("down".to_string())),
                })
            })
        }

        fn name(&self) -> &'static str {
            "give-up"
        }

        fn destination(&self) -> String {
            "nowhere".to_string()
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn state_with(config: RouterConfig) -> (SharedState, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        let state = Arc::new(RouterState::new(config, sink.clone()));
        (state, sink)
    }

    async fn feed(state: SharedState, input: &[u8]) {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let (_tx, rx) = watch::channel(false);
        let handler = tokio::spawn(handle_connection(server, peer(), state, rx));
        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();
        drop(client);
        handler.await.unwrap();
    }

    #[tokio::test]
    async fn test_routes_and_delivers_each_line() {
        let (state, sink) = state_with(RouterConfig::default());
        let input = concat!(
            r#"{"type":"travel_agent","timestamp":"2024-03-15T10:00:00Z","msg":"hello"}"#, "\n",
            r#"{"type":"other","timestamp":"2024-03-15T10:00:00Z"}"#, "\n",
        );
        feed(state.clone(), input.as_bytes()).await;

        let routed = sink.in_index("travel_agent-2024.03.15");
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].get_str("msg"), Some("hello"));
        assert_eq!(routed[0].get_str("@timestamp"), Some("2024-03-15T10:00:00.000Z"));

        let passthrough = sink.in_index("logstash");
        assert_eq!(passthrough.len(), 1);
        assert_eq!(
            serde_json::to_value(&passthrough[0]).unwrap(),
            json!({"type":"other","timestamp":"2024-03-15T10:00:00Z"})
        );

        let snap = state.metrics.snapshot();
        assert_eq!(snap.records.received, 2);
        assert_eq!(snap.delivery.delivered, 2);
        assert_eq!(snap.connections.active, 0);
    }

    #[tokio::test]
    async fn test_bad_lines_do_not_stop_the_stream() {
        let (state, sink) = state_with(RouterConfig::default());
        let input = concat!(
            "{not json}\n",
            "[1,2,3]\n",
            "\n",
            r#"{"type":"travel_agent","timestamp":"not-a-date"}"#, "\n",
        );
        feed(state.clone(), input.as_bytes()).await;

        assert_eq!(sink.len(), 1);
        let stored = &sink.stored()[0];
        assert!(stored.index.starts_with("travel_agent-"), "{}", stored.index);
        assert_eq!(stored.record.get("tags"), Some(&json!(["_dateparsefailure"])));

        let snap = state.metrics.snapshot();
        assert_eq!(snap.decode.invalid, 2);
        assert_eq!(snap.records.date_parse_failures, 1);
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped() {
        let config = RouterConfig {
            max_line_bytes: 32,
            ..Default::default()
        };
        let (state, sink) = state_with(config);
        let long = format!(r#"{{"type":"other","pad":"{}"}}"#, "x".repeat(100));
        let input = format!("{}\n{{\"type\":\"other\"}}\n", long);
        feed(state.clone(), input.as_bytes()).await;

        assert_eq!(sink.len(), 1);
        assert_eq!(state.metrics.snapshot().decode.oversized, 1);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_counted_and_dropped() {
        let (state, sink) = state_with(RouterConfig::default());
        sink.set_failing(true);
        feed(state.clone(), b"{\"type\":\"other\"}\n{\"type\":\"other\"}\n").await;

        assert!(sink.is_empty());
        let snap = state.metrics.snapshot();
        assert_eq!(snap.delivery.failed, 2);
        assert_eq!(snap.delivery.delivered, 0);
    }

    #[tokio::test]
    async fn test_retries_counted_when_delivery_fails() {
        let state = Arc::new(RouterState::new(RouterConfig::default(), Arc::new(GiveUpSink)));
        feed(state.clone(), b"{\"type\":\"other\"}\n").await;

        let snap = state.metrics.snapshot();
        assert_eq!(snap.delivery.failed, 1);
        assert_eq!(snap.delivery.retries, 3);
    }

    #[tokio::test]
    async fn test_shutdown_closes_idle_connection() {
        let (state, _sink) = state_with(RouterConfig::default());
        let (_client, server) = tokio::io::duplex(1024);
        let (tx, rx) = watch::channel(false);
        let handler = tokio::spawn(handle_connection(server, peer(), state.clone(), rx));

        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), handler)
            .await
            .expect("handler should stop on shutdown")
            .unwrap();
        assert_eq!(state.metrics.active_connections(), 0);
    }
}
