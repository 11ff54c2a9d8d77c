//! Sled-based Durable Job Queue
//!
//! 两棵树：`queue` 以单调递增序号（大端）为键保证 FIFO，`in_flight` 以工作项 ID 为键。
//! 领取是一个跨两棵树的事务，进程崩溃后 in-flight 中的工作项由 `recover_in_flight` 放回。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::application::ports::{JobQueuePort, QueueError, WorkItem};

/// 队列条目，保留原始序号以便恢复后仍按入队顺序处理
#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueueEntry {
    seq: u64,
    item: WorkItem,
}

/// Sled 任务队列
pub struct SledJobQueue {
    db: Db,
    queue: Tree,
    in_flight: Tree,
    notify: Notify,
}

fn storage_err(e: impl std::fmt::Display) -> QueueError {
    QueueError::Storage(e.to_string())
}

fn encode(entry: &QueueEntry) -> Result<Vec<u8>, QueueError> {
    bincode::serialize(entry).map_err(|e| QueueError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<QueueEntry, QueueError> {
    bincode::deserialize(bytes).map_err(|e| QueueError::Serialization(e.to_string()))
}

impl SledJobQueue {
    /// 打开（或创建）队列数据库
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, QueueError> {
        let db = sled::open(path.as_ref()).map_err(storage_err)?;
        let queue = Self::from_db(db)?;

        tracing::info!(
            path = %path.as_ref().display(),
            queued = queue.queue.len(),
            in_flight = queue.in_flight.len(),
            "SledJobQueue opened"
        );
        Ok(queue)
    }

    pub fn from_db(db: Db) -> Result<Self, QueueError> {
        let queue = db.open_tree("queue").map_err(storage_err)?;
        let in_flight = db.open_tree("in_flight").map_err(storage_err)?;
        Ok(Self {
            db,
            queue,
            in_flight,
            notify: Notify::new(),
        })
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 已领取未确认的数量
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// 刷新数据库
    pub fn flush(&self) -> Result<(), QueueError> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl JobQueuePort for SledJobQueue {
    async fn enqueue(&self, item: WorkItem) -> Result<(), QueueError> {
        let seq = self.db.generate_id().map_err(storage_err)?;
        let entry = QueueEntry { seq, item };

        self.queue
            .insert(seq.to_be_bytes(), encode(&entry)?)
            .map_err(storage_err)?;
        self.queue.flush_async().await.map_err(storage_err)?;

        tracing::debug!(
            item_id = %entry.item.id,
            job_id = %entry.item.job_id,
            stage = entry.item.stage.as_str(),
            seq = seq,
            "Work item enqueued"
        );
        self.notify.notify_one();
        Ok(())
    }

    async fn claim(&self) -> Result<Option<WorkItem>, QueueError> {
        loop {
            let Some((key, value)) = self.queue.first().map_err(storage_err)? else {
                return Ok(None);
            };
            let entry = decode(&value)?;
            let item_key = entry.item.id.as_bytes().to_vec();

            let claimed = (&self.queue, &self.in_flight).transaction(|(queue, in_flight)| {
                if queue.remove(key.clone())?.is_none() {
                    // 已被其他消费者领取
                    return Ok(false);
                }
                in_flight.insert(item_key.clone(), value.clone())?;
                Ok::<_, ConflictableTransactionError<QueueError>>(true)
            });

            match claimed {
                Ok(true) => {
                    self.in_flight.flush_async().await.map_err(storage_err)?;
                    tracing::debug!(
                        item_id = %entry.item.id,
                        job_id = %entry.item.job_id,
                        "Work item claimed"
                    );
                    return Ok(Some(entry.item));
                }
                Ok(false) => continue,
                Err(TransactionError::Abort(e)) => return Err(e),
                Err(TransactionError::Storage(e)) => return Err(storage_err(e)),
            }
        }
    }

    async fn ack(&self, item_id: Uuid) -> Result<(), QueueError> {
        let removed = self
            .in_flight
            .remove(item_id.as_bytes())
            .map_err(storage_err)?;
        if removed.is_none() {
            return Err(QueueError::NotInFlight(item_id));
        }
        self.in_flight.flush_async().await.map_err(storage_err)?;
        Ok(())
    }

    async fn recover_in_flight(&self) -> Result<usize, QueueError> {
        let mut recovered = 0;

        for pair in self.in_flight.iter() {
            let (key, value) = pair.map_err(storage_err)?;
            let entry = decode(&value)?;

            let result = (&self.queue, &self.in_flight).transaction(|(queue, in_flight)| {
                in_flight.remove(key.clone())?;
                queue.insert(entry.seq.to_be_bytes().to_vec(), value.clone())?;
                Ok::<_, ConflictableTransactionError<QueueError>>(())
            });
            match result {
                Ok(()) => recovered += 1,
                Err(TransactionError::Abort(e)) => return Err(e),
                Err(TransactionError::Storage(e)) => return Err(storage_err(e)),
            }
        }

        if recovered > 0 {
            self.db.flush_async().await.map_err(storage_err)?;
            tracing::warn!(recovered = recovered, "Recovered in-flight work items");
            self.notify.notify_one();
        }
        Ok(recovered)
    }

    async fn wait_for_work(&self) {
        if !self.queue.is_empty() {
            return;
        }
        self.notify.notified().await;
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}
