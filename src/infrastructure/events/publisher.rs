//! Event Publisher Implementation
//!
//! 进度事件广播：全局通道收到所有事件，按 Job 注册的通道只收到该 Job 的事件。
//! 没有订阅者时事件直接丢弃。

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{JobStatus, SegmentStatus};

/// 进度事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum JobEvent {
    JobStatusChanged {
        job_id: Uuid,
        status: JobStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
    },
    SegmentStatusChanged {
        job_id: Uuid,
        segment_id: Uuid,
        status: SegmentStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    /// 可重试错误后进入退避
    SegmentRetryScheduled {
        job_id: Uuid,
        segment_id: Uuid,
        attempt: u32,
        delay_secs: u64,
        error: String,
    },
    JobAssembled {
        job_id: Uuid,
        track_count: u32,
        total_duration_ms: u64,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            JobEvent::JobStatusChanged { job_id, .. }
            | JobEvent::SegmentStatusChanged { job_id, .. }
            | JobEvent::SegmentRetryScheduled { job_id, .. }
            | JobEvent::JobAssembled { job_id, .. } => *job_id,
        }
    }
}

/// 事件发布器
pub struct EventPublisher {
    /// job_id -> broadcast sender
    job_channels: DashMap<Uuid, broadcast::Sender<JobEvent>>,
    global_channel: broadcast::Sender<JobEvent>,
}

impl EventPublisher {
    pub fn new() -> Self {
        let (global_tx, _) = broadcast::channel(256);
        Self {
            job_channels: DashMap::new(),
            global_channel: global_tx,
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 订阅全部事件
    pub fn subscribe_global(&self) -> broadcast::Receiver<JobEvent> {
        self.global_channel.subscribe()
    }

    /// 订阅单个 Job 的事件
    pub fn subscribe_job(&self, job_id: Uuid) -> broadcast::Receiver<JobEvent> {
        self.job_channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(100).0)
            .subscribe()
    }

    pub fn unsubscribe_job(&self, job_id: Uuid) {
        self.job_channels.remove(&job_id);
    }

    pub fn publish_job_status(&self, job_id: Uuid, status: JobStatus, reference: Option<&str>) {
        self.publish(JobEvent::JobStatusChanged {
            job_id,
            status,
            reference: reference.map(str::to_string),
        });
    }

    pub fn publish_segment_status(
        &self,
        job_id: Uuid,
        segment_id: Uuid,
        status: SegmentStatus,
        duration_ms: Option<u64>,
    ) {
        self.publish(JobEvent::SegmentStatusChanged {
            job_id,
            segment_id,
            status,
            duration_ms,
        });
    }

    pub fn publish_retry_scheduled(
        &self,
        job_id: Uuid,
        segment_id: Uuid,
        attempt: u32,
        delay_secs: u64,
        error: &str,
    ) {
        self.publish(JobEvent::SegmentRetryScheduled {
            job_id,
            segment_id,
            attempt,
            delay_secs,
            error: error.to_string(),
        });
    }

    pub fn publish_job_assembled(&self, job_id: Uuid, track_count: u32, total_duration_ms: u64) {
        self.publish(JobEvent::JobAssembled {
            job_id,
            track_count,
            total_duration_ms,
        });
    }

    fn publish(&self, event: JobEvent) {
        let job_id = event.job_id();

        if let Some(sender) = self.job_channels.get(&job_id) {
            if let Err(e) = sender.send(event.clone()) {
                tracing::debug!(
                    job_id = %job_id,
                    error = %e,
                    "Failed to publish job event (no receivers)"
                );
            }
        }

        if let Err(e) = self.global_channel.send(event) {
            tracing::trace!(job_id = %job_id, error = %e, "No global event receivers");
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
