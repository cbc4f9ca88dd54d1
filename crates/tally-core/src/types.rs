use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Face feature vector (typically 128-dimensional), produced by the
/// camera-side encoder. Immutable once loaded; an enrollment update
/// replaces the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    pub values: Vec<f32>,
}

impl Encoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance to another encoding.
    ///
    /// Lower = more similar. Both vectors must have the same length;
    /// excess components on either side are ignored.
    pub fn euclidean_distance(&self, other: &Encoding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// An enrolled person: stable id, human-readable name, one encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    pub encoding: Encoding,
}

/// Result of matching a probe encoding against the repository.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Euclidean distance of the best candidate. `f32::INFINITY` when the
    /// repository held no candidates at all.
    pub distance: f32,
    pub identity_id: Option<String>,
    pub display_name: Option<String>,
}

impl MatchResult {
    pub fn hit(identity: &Identity, distance: f32) -> Self {
        Self {
            matched: true,
            distance,
            identity_id: Some(identity.id.clone()),
            display_name: Some(identity.display_name.clone()),
        }
    }

    pub fn miss(distance: f32) -> Self {
        Self {
            matched: false,
            distance,
            identity_id: None,
            display_name: None,
        }
    }
}

/// One recorded attendance. Created exactly once per accepted match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub identity_id: String,
    pub display_name: String,
    pub recorded_at: DateTime<Utc>,
    pub confidence: f32,
}

impl AttendanceEvent {
    /// Confidence derived from match distance: `(1 - distance) * 100`,
    /// clamped to `[0, 100]` and rounded to two decimals.
    pub fn confidence_from_distance(distance: f32) -> f32 {
        let pct = ((1.0 - distance) * 100.0).clamp(0.0, 100.0);
        (pct * 100.0).round() / 100.0
    }
}

/// One frame delivery from the transport. Consumed exactly once by the
/// pipeline.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// Raw payload bytes as received from the frame topic.
    pub payload: Bytes,
    pub received_at: DateTime<Utc>,
    pub source: Option<String>,
}

/// Wire format of a frame payload: a tagged encoding vector. Anything
/// that does not parse into this shape is rejected as an invalid frame,
/// never guessed at.
#[derive(Debug, Deserialize)]
pub struct FramePayload {
    pub encoding: Vec<f32>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Outcome of processing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Matched,
    Unmatched,
    Suppressed,
    Error,
}

/// Result payload published after every processed frame — exactly one per
/// inbound frame, including errors and suppressions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundResult {
    pub status: ResultStatus,
    pub identity_id: Option<String>,
    pub display_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OutboundResult {
    pub fn matched(event: &AttendanceEvent, distance: f32) -> Self {
        Self {
            status: ResultStatus::Matched,
            identity_id: Some(event.identity_id.clone()),
            display_name: Some(event.display_name.clone()),
            timestamp: event.recorded_at,
            distance: Some(distance),
            message: None,
        }
    }

    pub fn unmatched(timestamp: DateTime<Utc>) -> Self {
        Self {
            status: ResultStatus::Unmatched,
            identity_id: None,
            display_name: None,
            timestamp,
            distance: None,
            message: None,
        }
    }

    pub fn suppressed(
        identity_id: String,
        display_name: String,
        distance: f32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            status: ResultStatus::Suppressed,
            identity_id: Some(identity_id),
            display_name: Some(display_name),
            timestamp,
            distance: Some(distance),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            status: ResultStatus::Error,
            identity_id: None,
            display_name: None,
            timestamp,
            distance: None,
            message: Some(message.into()),
        }
    }

    /// Error result for a sink failure after acceptance: the identity is
    /// known and the cooldown already committed, so the fields are carried.
    pub fn sink_error(event: &AttendanceEvent, message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Error,
            identity_id: Some(event.identity_id.clone()),
            display_name: Some(event.display_name.clone()),
            timestamp: event.recorded_at,
            distance: None,
            message: Some(message.into()),
        }
    }
}
