//! The heartbeat loop that keeps a push stream alive.
//!
//! A session emits `event: ping` with the current unix timestamp, waits one
//! interval, and repeats until the deadline passes or the sink fails. The
//! sink close and the connection-slot release happen exactly once on every
//! exit path: deadline, disconnect, sink error, panic inside the loop, or
//! the session future being dropped.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;

use super::sse::{EventSink, SinkError, SseEvent, SseWriter};
use crate::admission::ConnectionSlot;
use crate::config::McpSettings;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The session timeout elapsed.
    Deadline,
    /// The client went away.
    Disconnected,
    /// The sink or the loop failed unexpectedly.
    Failed(String),
}

/// Timing for one push stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSession {
    interval: Duration,
    timeout: Duration,
}

impl HeartbeatSession {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Interval and timeout from settings, floors applied.
    pub fn from_settings(settings: &McpSettings) -> Self {
        Self::new(settings.heartbeat_interval(), settings.sse_timeout())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Drive the stream to completion, then clean up.
    ///
    /// Ownership of `writer` and `slot` moves in here, so their `Drop`
    /// impls cover cancellation; the explicit calls below cover the rest.
    pub async fn run<S: EventSink>(&self, mut writer: SseWriter<S>, slot: ConnectionSlot) -> StreamEnd {
        let identity_id = slot.identity_id();
        log::info!("SSE stream opened for identity {}", identity_id);

        let end = match AssertUnwindSafe(self.pump(&mut writer)).catch_unwind().await {
            Ok(end) => end,
            Err(panic) => StreamEnd::Failed(panic_message(panic.as_ref())),
        };

        writer.close();
        slot.release();

        match &end {
            StreamEnd::Deadline => log::info!("SSE stream timed out for identity {}", identity_id),
            StreamEnd::Disconnected => {
                log::info!("SSE client disconnected: identity {}", identity_id)
            }
            StreamEnd::Failed(reason) => {
                log::error!("SSE stream failed for identity {}: {}", identity_id, reason)
            }
        }
        end
    }

    async fn pump<S: EventSink>(&self, writer: &mut SseWriter<S>) -> StreamEnd {
        let deadline = Instant::now() + self.timeout;
        loop {
            if Instant::now() >= deadline {
                return StreamEnd::Deadline;
            }

            let ping = SseEvent::new(chrono::Utc::now().timestamp().to_string()).event("ping");
            // A stalled reader must not hold the stream past its deadline.
            match tokio::time::timeout_at(deadline, writer.send(&ping)).await {
                Err(_) => return StreamEnd::Deadline,
                Ok(Ok(())) => {}
                Ok(Err(SinkError::Disconnected)) => return StreamEnd::Disconnected,
                Ok(Err(SinkError::Other(e))) => return StreamEnd::Failed(format!("{:#}", e)),
            }

            tokio::time::sleep_until((Instant::now() + self.interval).min(deadline)).await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}
