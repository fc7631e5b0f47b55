//! Server-Sent Events framing and sinks.
//!
//! Wire format of one event:
//!
//! ```text
//! event: <type>        (optional)
//! id: <event id>       (optional)
//! retry: <ms>          (optional)
//! data: <line 1>
//! data: <line 2>
//!
//! ```
//!
//! Every physical line of the payload gets its own `data:` prefix so
//! multi-line payloads survive. A blank line terminates the event.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Failure reported by an [`EventSink`].
#[derive(Debug, Error)]
pub enum SinkError {
    /// The peer went away. Expected; ends a stream quietly.
    #[error("client disconnected")]
    Disconnected,

    /// Anything else the sink could not do.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The outbound half of a streaming connection.
#[async_trait]
pub trait EventSink: Send {
    /// Write one framed chunk.
    async fn write(&mut self, chunk: &str) -> Result<(), SinkError>;

    /// Release the underlying connection.
    fn close(&mut self) -> Result<(), SinkError>;
}

/// Sink that feeds an HTTP response body through a bounded channel.
///
/// When the client hangs up, the body stream and its receiver are dropped
/// and the next write reports [`SinkError::Disconnected`].
#[derive(Debug)]
pub struct ChannelSink {
    sender: Option<mpsc::Sender<Bytes>>,
}

impl ChannelSink {
    /// A sink and the receiver that yields its chunks.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn write(&mut self, chunk: &str) -> Result<(), SinkError> {
        let sender = self.sender.as_ref().ok_or(SinkError::Disconnected)?;
        sender
            .send(Bytes::copy_from_slice(chunk.as_bytes()))
            .await
            .map_err(|_| SinkError::Disconnected)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        // Dropping the sender ends the body stream.
        self.sender.take();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// One server-push event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub id: Option<String>,
    pub retry_ms: Option<u64>,
    pub data: String,
}

impl SseEvent {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn retry_ms(mut self, retry_ms: u64) -> Self {
        self.retry_ms = Some(retry_ms);
        self
    }

    /// Render the event in wire format, including the terminating blank line.
    ///
    /// An empty payload still produces one (empty) `data:` line.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 32);
        if let Some(event) = &self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        if let Some(id) = &self.id {
            out.push_str("id: ");
            out.push_str(id);
            out.push('\n');
        }
        if let Some(retry) = self.retry_ms {
            out.push_str(&format!("retry: {}\n", retry));
        }
        if self.data.is_empty() {
            out.push_str("data: \n");
        } else {
            for line in self.data.lines() {
                out.push_str("data: ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push('\n');
        out
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Writes framed events to a sink and closes it exactly once.
///
/// Dropping the writer closes the sink if nobody did.
pub struct SseWriter<S: EventSink> {
    sink: S,
    closed: bool,
}

impl<S: EventSink> SseWriter<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            closed: false,
        }
    }

    /// Send one event.
    pub async fn send(&mut self, event: &SseEvent) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Disconnected);
        }
        self.sink.write(&event.encode()).await
    }

    /// Send `data` with the optional framing fields.
    pub async fn write(
        &mut self,
        data: &str,
        event: Option<&str>,
        id: Option<&str>,
        retry_ms: Option<u64>,
    ) -> Result<(), SinkError> {
        let frame = SseEvent {
            event: event.map(str::to_string),
            id: id.map(str::to_string),
            retry_ms,
            data: data.to_string(),
        };
        self.send(&frame).await
    }

    /// Close the sink. Later calls, and a sink that is already gone, are
    /// not errors.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.sink.close() {
            log::debug!("SSE sink already closed: {}", e);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<S: EventSink> Drop for SseWriter<S> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_encode_full_event() {
        let e = SseEvent::new("hello").event("message").id("7").retry_ms(3000);
        assert_eq!(
            e.encode(),
            "event: message\nid: 7\nretry: 3000\ndata: hello\n\n"
        );
    }

    #[test]
    fn test_encode_multiline_data() {
        let e = SseEvent::new("a\nb\r\nc");
        assert_eq!(e.encode(), "data: a\ndata: b\ndata: c\n\n");
    }

    #[test]
    fn test_encode_empty_data() {
        assert_eq!(SseEvent::new("").event("ping").encode(), "event: ping\ndata: \n\n");
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_and_closes() {
        let (sink, mut rx) = ChannelSink::new(4);
        let mut writer = SseWriter::new(sink);
        writer
            .write("123", Some("ping"), None, None)
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from("event: ping\ndata: 123\n\n"));

        writer.close();
        assert!(rx.recv().await.is_none());
        assert!(writer.send(&SseEvent::new("late")).await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_disconnect() {
        let (sink, rx) = ChannelSink::new(1);
        drop(rx);
        let mut writer = SseWriter::new(sink);
        let err = writer.send(&SseEvent::new("x")).await.unwrap_err();
        assert!(matches!(err, SinkError::Disconnected));
    }

    struct CountingSink {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventSink for CountingSink {
        async fn write(&mut self, _chunk: &str) -> Result<(), SinkError> {
            Ok(())
        }

        fn close(&mut self) -> Result<(), SinkError> {
            let n = self.closes.fetch_add(1, Ordering::SeqCst);
            if n > 0 {
                return Err(anyhow::anyhow!("stream already closed").into());
            }
            Ok(())
        }
    }

    #[test]
    fn test_close_is_idempotent_and_runs_on_drop() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut writer = SseWriter::new(CountingSink {
            closes: closes.clone(),
        });
        writer.close();
        writer.close();
        drop(writer);
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let closes = Arc::new(AtomicUsize::new(0));
        drop(SseWriter::new(CountingSink {
            closes: closes.clone(),
        }));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
