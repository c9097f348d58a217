//! # FDS Telemetry Channel
//!
//! Fixed-capacity telemetry hand-off between the servo loop (producer) and
//! the display/statistics consumer. A single binary semaphore protects the
//! shared ring; the producer only ever *tries* to acquire it, so the
//! real-time loop never blocks on a busy consumer. A contended publish is
//! deferred to the next tick — bounded added latency, zero data loss.
//!
//! ```text
//! ┌────────────┐  try_lock   ┌──────────────────┐   lock    ┌────────────┐
//! │ servo loop ├────────────►│ TelemetryBuffer  │◄──────────┤  consumer  │
//! │ (writer)   │  batch copy │ ch1 | ch2 | ctrl │  drain,   │  (reader)  │
//! └────────────┘             │ cursor           │  cursor=0 └────────────┘
//! └─ pending batch (local)   └──────────────────┘            └─ HistoryRing
//! ```
//!
//! The write cursor is producer-owned between hand-offs; the consumer's
//! drain always leaves it at 0. The buffer is allocated once per session at
//! fixed capacity and never resized.

pub mod buffer;
pub mod history;
pub mod reader;
pub mod writer;

pub use buffer::{RingSample, TelemetryBuffer, channel};
pub use history::HistoryRing;
pub use reader::TelemetryReader;
pub use writer::{PublishOutcome, TelemetryWriter, WriterStats};

/// Default shared ring capacity [samples].
pub const RING_LEN: usize = 1024;
