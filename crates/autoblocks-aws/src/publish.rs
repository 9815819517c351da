//! Turning operation outputs into exactly one emitted event.
//!
//! An output is fully materialized before anything is emitted: streaming
//! members are drained into memory first, so a broken stream fails the
//! invocation instead of producing a partial event.

use crate::error::{AwsError, AwsResult, BlockError, BlockResult};
use crate::transport::ByteStream;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// A streaming output member still on the wire.
#[derive(Debug)]
pub struct StreamingOutput {
    /// Output member the drained body is stored under (`Body`, `Payload`).
    pub member: String,
    /// Non-streaming output members (response headers, status).
    pub metadata: Map<String, Value>,
    pub body: ByteStream,
}

/// What an operation produced.
#[derive(Debug)]
pub enum OperationOutput {
    /// No result payload.
    Empty,
    /// A plain structured result.
    Materialized(Value),
    /// A result with one streaming member.
    StreamBearing(StreamingOutput),
}

impl OperationOutput {
    /// Produce the JSON document to emit.
    ///
    /// `Empty` and `null` become `{}`. A streaming member is read to the end
    /// and stored as a UTF-8 string, or base64 when the bytes are not valid
    /// UTF-8.
    pub async fn materialize(self) -> AwsResult<Value> {
        match self {
            Self::Empty | Self::Materialized(Value::Null) => Ok(Value::Object(Map::new())),
            Self::Materialized(value) => Ok(value),
            Self::StreamBearing(StreamingOutput {
                member,
                mut metadata,
                body,
            }) => {
                let bytes = body.collect().await?;
                let text = match std::str::from_utf8(&bytes) {
                    Ok(s) => s.to_string(),
                    Err(_) => STANDARD.encode(&bytes),
                };
                metadata.insert(member, Value::String(text));
                Ok(Value::Object(metadata))
            }
        }
    }
}

// ── Sinks ───────────────────────────────────────────────────────────────

/// Receiver of block results.
pub trait EventSink: Send + Sync {
    fn emit(&self, payload: Value);
}

/// Sink that forwards every payload into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Value>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Value>) -> Self {
        Self { tx }
    }

    /// A sink together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, payload: Value) {
        if self.tx.send(payload).is_err() {
            log::warn!("event sink receiver dropped; payload discarded");
        }
    }
}

// ── Publisher ───────────────────────────────────────────────────────────

/// Emits one operation result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponsePublisher;

impl ResponsePublisher {
    pub fn new() -> Self {
        Self
    }

    /// Materialize `output` and emit it to `sink` exactly once.
    ///
    /// If materialization fails nothing is emitted and a
    /// [`BlockError::Serialization`] naming `service` and `operation` is
    /// returned.
    pub async fn publish(
        &self,
        service: &str,
        operation: &str,
        output: OperationOutput,
        sink: &dyn EventSink,
    ) -> BlockResult<()> {
        let payload = output.materialize().await.map_err(|e: AwsError| {
            log::warn!("{}:{} result could not be read: {}", service, operation, e);
            BlockError::serialization(service, operation, e.message)
        })?;
        log::debug!("emitting {}:{} result", service, operation);
        sink.emit(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use bytes::Bytes;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct VecSink(Mutex<Vec<Value>>);

    impl EventSink for VecSink {
        fn emit(&self, payload: Value) {
            self.0.lock().unwrap().push(payload);
        }
    }

    fn streaming(chunks: Vec<AwsResult<Bytes>>) -> OperationOutput {
        let mut metadata = Map::new();
        metadata.insert("ContentType".to_string(), json!("text/plain"));
        OperationOutput::StreamBearing(StreamingOutput {
            member: "Body".to_string(),
            metadata,
            body: ByteStream::from_chunks(chunks),
        })
    }

    #[tokio::test]
    async fn empty_results_emit_empty_object() {
        let sink = VecSink::default();
        let publisher = ResponsePublisher::new();
        publisher.publish("s3", "DeleteObject", OperationOutput::Empty, &sink).await.unwrap();
        publisher
            .publish("s3", "DeleteObject", OperationOutput::Materialized(Value::Null), &sink)
            .await
            .unwrap();
        assert_eq!(*sink.0.lock().unwrap(), vec![json!({}), json!({})]);
    }

    #[tokio::test]
    async fn materialized_value_passes_through() {
        let sink = VecSink::default();
        let value = json!({"Buckets": [{"Name": "a"}]});
        ResponsePublisher::new()
            .publish("s3", "ListBuckets", OperationOutput::Materialized(value.clone()), &sink)
            .await
            .unwrap();
        assert_eq!(*sink.0.lock().unwrap(), vec![value]);
    }

    #[tokio::test]
    async fn stream_is_drained_to_text() {
        let sink = VecSink::default();
        let output = streaming(vec![Ok(Bytes::from_static(b"hello ")), Ok(Bytes::from_static(b"there"))]);
        ResponsePublisher::new().publish("s3", "GetObject", output, &sink).await.unwrap();
        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![json!({"ContentType": "text/plain", "Body": "hello there"})]
        );
    }

    #[tokio::test]
    async fn binary_stream_is_base64() {
        let output = streaming(vec![Ok(Bytes::from_static(&[0xff, 0x00, 0x10]))]);
        let value = output.materialize().await.unwrap();
        assert_eq!(value["Body"], json!("/wAQ"));
    }

    #[tokio::test]
    async fn broken_stream_emits_nothing() {
        let sink = VecSink::default();
        let output = streaming(vec![
            Ok(Bytes::from_static(b"part")),
            Err(AwsError::transport("s3", "connection reset by peer", false)),
        ]);
        let err = ResponsePublisher::new()
            .publish("s3", "GetObject", output, &sink)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Serialization);
        assert!(err.to_string().contains("GetObject"));
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.emit(json!({"ok": true}));
        assert_eq!(rx.recv().await, Some(json!({"ok": true})));
        drop(rx);
        sink.emit(json!({"ignored": true}));
    }
}
