//! Server-push streaming: SSE framing and the heartbeat session.

pub mod heartbeat;
pub mod sse;

pub use heartbeat::{HeartbeatSession, StreamEnd};
pub use sse::{ChannelSink, EventSink, SinkError, SseEvent, SseWriter};
