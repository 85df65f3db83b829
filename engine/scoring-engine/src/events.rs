//! Score events for live reveal
//!
//! Delivery is best effort: a dropped event is recovered by reading the store,
//! so publishing never fails a run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::engine::RunReport;
use crate::models::{EntityScore, TeamScore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringEvent {
    pub run_id: Uuid,
    /// Position within the run, starting at 1
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum EventPayload {
    EntityScored(EntityScore),
    TeamScored(TeamScore),
    RunComplete(RunReport),
}

impl ScoringEvent {
    pub fn kind(&self) -> &'static str {
        match self.payload {
            EventPayload::EntityScored(_) => "entity_scored",
            EventPayload::TeamScored(_) => "team_scored",
            EventPayload::RunComplete(_) => "run_complete",
        }
    }
}

/// Fire-and-forget event channel
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: ScoringEvent);
}

/// Sink that discards everything
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn publish(&self, _event: ScoringEvent) {}
}

/// Fans events out to every live subscriber
pub struct ScoreBroadcaster {
    subscribers: Arc<RwLock<Vec<mpsc::UnboundedSender<ScoringEvent>>>>,
}

impl ScoreBroadcaster {
    pub fn new() -> Self {
        Self { subscribers: Arc::new(RwLock::new(Vec::new())) }
    }

    /// Register a subscriber; it receives events published from now on
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<ScoringEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.write().await.push(sender);
        receiver
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl Default for ScoreBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for ScoreBroadcaster {
    async fn publish(&self, event: ScoringEvent) {
        let mut subscribers = self.subscribers.write().await;
        let before = subscribers.len();
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());

        let dropped = before - subscribers.len();
        if dropped > 0 {
            debug!("Dropped {} closed score subscribers", dropped);
        }
    }
}

/// Publisher bound to one run; stamps run id and sequence numbers
pub struct RunEvents {
    run_id: Uuid,
    sequence: AtomicU64,
    sink: Arc<dyn EventSink>,
}

impl RunEvents {
    pub fn new(run_id: Uuid, sink: Arc<dyn EventSink>) -> Self {
        Self { run_id, sequence: AtomicU64::new(0), sink }
    }

    pub async fn entity_scored(&self, score: &EntityScore) {
        self.emit(EventPayload::EntityScored(score.clone())).await;
    }

    pub async fn team_scored(&self, score: &TeamScore) {
        self.emit(EventPayload::TeamScored(score.clone())).await;
    }

    pub async fn run_complete(&self, report: &RunReport) {
        self.emit(EventPayload::RunComplete(report.clone())).await;
    }

    /// Events published so far
    pub fn published(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    async fn emit(&self, payload: EventPayload) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let event = ScoringEvent { run_id: self.run_id, sequence, timestamp: Utc::now(), payload };
        debug!("Publishing {} #{} for run {}", event.kind(), sequence, self.run_id);
        self.sink.publish(event).await;
    }
}
