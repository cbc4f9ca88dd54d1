//! tally-core — the frame-to-event attendance pipeline.
//!
//! Matches inbound face encodings against an in-memory identity
//! repository under a Euclidean tolerance, deduplicates repeats with a
//! per-identity cooldown window, and emits exactly one attendance event
//! and one result per accepted match. Transport, storage and encoding
//! extraction live outside this crate.

pub mod cooldown;
pub mod error;
pub mod matcher;
pub mod pipeline;
pub mod repository;
pub mod ring;
pub mod types;

pub use cooldown::CooldownTracker;
pub use error::{MatchError, PipelineError, SinkError};
pub use matcher::{EuclideanMatcher, Matcher};
pub use pipeline::{AttendancePipeline, EventSink, PipelineConfig};
pub use repository::{EncodingRepository, Snapshot};
pub use ring::RecentEvents;
pub use types::{
    AttendanceEvent, Encoding, FramePayload, Identity, InboundFrame, MatchResult,
    OutboundResult, ResultStatus,
};
