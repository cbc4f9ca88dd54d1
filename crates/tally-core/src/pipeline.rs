//! Frame-to-event processing pipeline.
//!
//! Orchestrates matcher and cooldown per inbound frame, appends accepted
//! events to the durable sink and the recent-events ring, and yields
//! exactly one outbound result per frame.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;

use crate::cooldown::CooldownTracker;
use crate::error::{PipelineError, SinkError};
use crate::matcher::{EuclideanMatcher, Matcher};
use crate::repository::EncodingRepository;
use crate::ring::RecentEvents;
use crate::types::{AttendanceEvent, Encoding, FramePayload, InboundFrame, OutboundResult};

/// Durable append-only record store for accepted events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Durably append one accepted event.
    async fn append(&self, event: &AttendanceEvent) -> Result<(), SinkError>;

    /// The `n` most recent durable events, oldest first.
    async fn read_recent(&self, n: usize) -> Result<Vec<AttendanceEvent>, SinkError>;
}

#[async_trait]
impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    async fn append(&self, event: &AttendanceEvent) -> Result<(), SinkError> {
        (**self).append(event).await
    }

    async fn read_recent(&self, n: usize) -> Result<Vec<AttendanceEvent>, SinkError> {
        (**self).read_recent(n).await
    }
}

/// Match and dedup parameters, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Maximum Euclidean distance for a positive match (smaller = stricter).
    pub tolerance: f32,
    /// Minimum elapsed time before the same identity produces another event.
    pub cooldown: Duration,
}

pub struct AttendancePipeline<S> {
    repository: Arc<EncodingRepository>,
    matcher: Box<dyn Matcher>,
    cooldown: CooldownTracker,
    recent: RecentEvents,
    sink: S,
    config: PipelineConfig,
}

impl<S: EventSink> AttendancePipeline<S> {
    pub fn new(repository: Arc<EncodingRepository>, sink: S, config: PipelineConfig) -> Self {
        Self {
            repository,
            matcher: Box::new(EuclideanMatcher),
            cooldown: CooldownTracker::new(),
            recent: RecentEvents::new(RecentEvents::DEFAULT_CAPACITY),
            sink,
            config,
        }
    }

    /// Process one inbound frame end to end.
    ///
    /// Always returns exactly one result; every failure is carried in the
    /// result, never propagated. Validation and matching happen before any
    /// state mutation; the cooldown and ring commit before the durable
    /// write, and a sink failure does not roll them back.
    pub async fn process(&self, frame: InboundFrame) -> OutboundResult {
        let now = frame.received_at;
        let source = frame.source.clone();

        let payload = match extract_payload(&frame) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(
                    source = source.as_deref().unwrap_or("unknown"),
                    error = %err,
                    "rejected frame"
                );
                return OutboundResult::error(err.to_string(), now);
            }
        };

        let probe = Encoding::new(payload.encoding);
        let snapshot = self.repository.snapshot();
        let result = match self
            .matcher
            .match_encoding(&probe, &snapshot, self.config.tolerance)
        {
            Ok(result) => result,
            Err(err) => {
                let err = PipelineError::Match(err);
                tracing::warn!(error = %err, "match failed");
                return OutboundResult::error(err.to_string(), now);
            }
        };

        let (Some(identity_id), Some(display_name)) =
            (result.identity_id, result.display_name)
        else {
            tracing::debug!(distance = result.distance, "no identity within tolerance");
            return OutboundResult::unmatched(now);
        };

        if !self
            .cooldown
            .should_accept(&identity_id, now, self.config.cooldown)
        {
            tracing::debug!(id = %identity_id, "match suppressed inside cooldown window");
            return OutboundResult::suppressed(identity_id, display_name, result.distance, now);
        }

        let event = AttendanceEvent {
            identity_id,
            display_name,
            recorded_at: now,
            confidence: AttendanceEvent::confidence_from_distance(result.distance),
        };
        self.recent.push(event.clone());

        match self.sink.append(&event).await {
            Ok(()) => {
                tracing::info!(
                    id = %event.identity_id,
                    name = %event.display_name,
                    confidence = event.confidence,
                    "attendance recorded"
                );
                OutboundResult::matched(&event, result.distance)
            }
            Err(err) => {
                // Acceptance already committed: the cooldown window holds,
                // so the outage cannot double-log once it clears.
                let err = PipelineError::Sink(err);
                tracing::error!(id = %event.identity_id, error = %err, "durable append failed");
                OutboundResult::sink_error(&event, err.to_string())
            }
        }
    }

    /// Buffered recent events, oldest first.
    pub fn recent_events(&self) -> Vec<AttendanceEvent> {
        self.recent.to_vec()
    }

    /// Timestamp of the most recently accepted event.
    pub fn last_detection(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.recent.last().map(|e| e.recorded_at)
    }

    /// Prune per-identity state when an identity is removed.
    pub fn forget_identity(&self, id: &str) {
        self.cooldown.remove(id);
    }
}

fn extract_payload(frame: &InboundFrame) -> Result<FramePayload, PipelineError> {
    serde_json::from_slice(&frame.payload)
        .map_err(|err| PipelineError::InvalidFrame(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Identity, ResultStatus};
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory sink that records appends and can be switched to fail.
    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<AttendanceEvent>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn append(&self, event: &AttendanceEvent) -> Result<(), SinkError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SinkError::new("disk full"));
            }
            self.events.lock().push(event.clone());
            Ok(())
        }

        async fn read_recent(&self, n: usize) -> Result<Vec<AttendanceEvent>, SinkError> {
            let events = self.events.lock();
            let skip = events.len().saturating_sub(n);
            Ok(events[skip..].to_vec())
        }
    }

    fn repo_with_e1() -> Arc<EncodingRepository> {
        let repo = Arc::new(EncodingRepository::new(3));
        repo.load(vec![Identity {
            id: "E1".into(),
            display_name: "Erin One".into(),
            encoding: Encoding::new(vec![1.0, 0.0, 0.0]),
        }]);
        repo
    }

    fn pipeline_with(
        repo: Arc<EncodingRepository>,
        sink: Arc<RecordingSink>,
        cooldown_secs: i64,
    ) -> AttendancePipeline<Arc<RecordingSink>> {
        AttendancePipeline::new(
            repo,
            sink,
            PipelineConfig {
                tolerance: 0.1,
                cooldown: Duration::seconds(cooldown_secs),
            },
        )
    }

    fn frame_at(encoding: &[f32], at: DateTime<Utc>) -> InboundFrame {
        let payload = serde_json::json!({ "encoding": encoding });
        InboundFrame {
            payload: serde_json::to_vec(&payload).unwrap().into(),
            received_at: at,
            source: None,
        }
    }

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_match_then_suppress_then_match_again() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(repo_with_e1(), sink.clone(), 30);

        // Exact match produces an event
        let first = pipeline.process(frame_at(&[1.0, 0.0, 0.0], t(0))).await;
        assert_eq!(first.status, ResultStatus::Matched);
        assert_eq!(first.identity_id.as_deref(), Some("E1"));
        assert_eq!(sink.events.lock().len(), 1);

        // Same face 5 seconds later is suppressed, no new event
        let second = pipeline.process(frame_at(&[1.0, 0.0, 0.0], t(5))).await;
        assert_eq!(second.status, ResultStatus::Suppressed);
        assert_eq!(second.identity_id.as_deref(), Some("E1"));
        assert_eq!(sink.events.lock().len(), 1);

        // 31 seconds after the first acceptance the window has elapsed
        let third = pipeline.process(frame_at(&[1.0, 0.0, 0.0], t(31))).await;
        assert_eq!(third.status, ResultStatus::Matched);
        assert_eq!(sink.events.lock().len(), 2);
        assert_eq!(pipeline.recent_events().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_repository_yields_unmatched() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(Arc::new(EncodingRepository::new(3)), sink.clone(), 30);

        let result = pipeline.process(frame_at(&[1.0, 0.0, 0.0], t(0))).await;
        assert_eq!(result.status, ResultStatus::Unmatched);
        assert!(result.identity_id.is_none());
        assert!(sink.events.lock().is_empty());
        assert!(pipeline.recent_events().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_face_yields_unmatched() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(repo_with_e1(), sink.clone(), 30);

        let result = pipeline.process(frame_at(&[0.0, 1.0, 0.0], t(0))).await;
        assert_eq!(result.status, ResultStatus::Unmatched);
        assert!(sink.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_mutates_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(repo_with_e1(), sink.clone(), 30);

        let frame = InboundFrame {
            payload: b"not json at all".as_ref().into(),
            received_at: t(0),
            source: Some("cam-1".into()),
        };
        let result = pipeline.process(frame).await;
        assert_eq!(result.status, ResultStatus::Error);
        assert!(result.message.is_some());
        assert!(sink.events.lock().is_empty());
        assert!(pipeline.recent_events().is_empty());

        // The failed frame must not have started a cooldown window
        let next = pipeline.process(frame_at(&[1.0, 0.0, 0.0], t(1))).await;
        assert_eq!(next.status, ResultStatus::Matched);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_an_error_result() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(repo_with_e1(), sink.clone(), 30);

        let result = pipeline.process(frame_at(&[1.0, 0.0], t(0))).await;
        assert_eq!(result.status, ResultStatus::Error);
        assert!(result
            .message
            .as_deref()
            .is_some_and(|m| m.contains("dimension mismatch")));
        assert!(sink.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_reports_error_but_keeps_acceptance() {
        let sink = Arc::new(RecordingSink::default());
        sink.fail.store(true, Ordering::SeqCst);
        let pipeline = pipeline_with(repo_with_e1(), sink.clone(), 30);

        let result = pipeline.process(frame_at(&[1.0, 0.0, 0.0], t(0))).await;
        assert_eq!(result.status, ResultStatus::Error);
        // Identity is known even though the durable write failed
        assert_eq!(result.identity_id.as_deref(), Some("E1"));
        // Ring buffer committed; durable sink did not
        assert_eq!(pipeline.recent_events().len(), 1);
        assert!(sink.events.lock().is_empty());

        // The cooldown committed too: the outage clearing must not double-log
        sink.fail.store(false, Ordering::SeqCst);
        let retry = pipeline.process(frame_at(&[1.0, 0.0, 0.0], t(5))).await;
        assert_eq!(retry.status, ResultStatus::Suppressed);
        assert!(sink.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_zero_window_accepts_every_match() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(repo_with_e1(), sink.clone(), 0);

        for i in 0..3 {
            let result = pipeline.process(frame_at(&[1.0, 0.0, 0.0], t(i))).await;
            assert_eq!(result.status, ResultStatus::Matched);
        }
        assert_eq!(sink.events.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_forget_identity_reopens_window() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(repo_with_e1(), sink.clone(), 30);

        assert_eq!(
            pipeline.process(frame_at(&[1.0, 0.0, 0.0], t(0))).await.status,
            ResultStatus::Matched
        );
        pipeline.forget_identity("E1");
        assert_eq!(
            pipeline.process(frame_at(&[1.0, 0.0, 0.0], t(1))).await.status,
            ResultStatus::Matched
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fifty_concurrent_frames_one_acceptance() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = Arc::new(pipeline_with(repo_with_e1(), sink.clone(), 30));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let pipeline = pipeline.clone();
            let frame = frame_at(&[1.0, 0.0, 0.0], t(0));
            handles.push(tokio::spawn(async move { pipeline.process(frame).await }));
        }

        let mut matched = 0;
        let mut suppressed = 0;
        for handle in handles {
            match handle.await.unwrap().status {
                ResultStatus::Matched => matched += 1,
                ResultStatus::Suppressed => suppressed += 1,
                other => panic!("unexpected status: {other:?}"),
            }
        }
        assert_eq!(matched, 1);
        assert_eq!(suppressed, 49);
        assert_eq!(sink.events.lock().len(), 1);
        assert_eq!(pipeline.recent_events().len(), 1);
    }

    #[tokio::test]
    async fn test_one_result_per_frame_all_paths() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(repo_with_e1(), sink, 30);

        let frames = [
            frame_at(&[1.0, 0.0, 0.0], t(0)),  // matched
            frame_at(&[1.0, 0.0, 0.0], t(1)),  // suppressed
            frame_at(&[0.0, 1.0, 0.0], t(2)),  // unmatched
            InboundFrame {
                payload: b"{}".as_ref().into(), // invalid
                received_at: t(3),
                source: None,
            },
        ];
        for frame in frames {
            // Each submission yields exactly one result, never a panic
            let result = pipeline.process(frame).await;
            assert!(matches!(
                result.status,
                ResultStatus::Matched
                    | ResultStatus::Suppressed
                    | ResultStatus::Unmatched
                    | ResultStatus::Error
            ));
        }
    }
}
