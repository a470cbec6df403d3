use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ingest::PingPayload;

use super::transport::Transport;

/// Samples kept when no capacity is configured.
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Queue file is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was queued.
    Empty,
    /// The gateway answered; `retained` items are kept for a later flush.
    Delivered { processed: usize, retained: usize },
    /// The batch never reached the gateway; the queue is unchanged.
    Failed,
}

/// Read the pending samples stored at `path`. A missing file is an empty queue.
pub fn load_pending(path: &Path) -> Result<Vec<PingPayload>, ClientError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}

/// Bounded, on-disk buffer of samples awaiting delivery.
///
/// Oldest samples are evicted first once the capacity is exceeded. Only a
/// gateway response removes samples; transport failures leave the queue as
/// it was.
pub struct ClientQueue<T> {
    path: PathBuf,
    capacity: usize,
    pending: Vec<PingPayload>,
    transport: T,
}

impl<T: Transport> ClientQueue<T> {
    pub fn open(path: impl Into<PathBuf>, capacity: usize, transport: T) -> Result<Self, ClientError> {
        let path = path.into();
        let mut queue = Self {
            pending: load_pending(&path)?,
            path,
            capacity: capacity.max(1),
            transport,
        };
        if queue.evict_overflow() > 0 {
            queue.persist()?;
        }
        Ok(queue)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> &[PingPayload] {
        &self.pending
    }

    /// Most recently captured sample still queued.
    pub fn last(&self) -> Option<&PingPayload> {
        self.pending.last()
    }

    /// Queue a sample and try to deliver everything queued.
    ///
    /// Only local disk errors are returned; delivery failures keep the
    /// sample queued.
    pub async fn enqueue(&mut self, sample: PingPayload) -> Result<FlushOutcome, ClientError> {
        self.pending.push(sample);
        let evicted = self.evict_overflow();
        if evicted > 0 {
            log::warn!("Queue over capacity, dropped {} oldest samples", evicted);
        }
        self.persist()?;

        self.flush().await
    }

    /// Send all queued samples as one batch.
    ///
    /// Samples the gateway processed or rejected permanently are removed;
    /// samples rejected for a transient reason stay queued.
    pub async fn flush(&mut self) -> Result<FlushOutcome, ClientError> {
        if self.pending.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        let response = match self.transport.deliver(&self.pending).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!(
                    "Could not deliver {} queued samples: {}",
                    self.pending.len(),
                    e
                );
                return Ok(FlushOutcome::Failed);
            }
        };

        let retry: HashSet<usize> = response
            .rejections
            .iter()
            .filter(|r| r.retryable)
            .map(|r| r.index)
            .collect();
        for rejection in response.rejections.iter().filter(|r| !r.retryable) {
            log::warn!(
                "Dropping sample {} rejected as {}: {}",
                rejection.index,
                rejection.reason,
                rejection.message
            );
        }

        let sent = std::mem::take(&mut self.pending);
        self.pending = sent
            .into_iter()
            .enumerate()
            .filter(|(index, _)| retry.contains(index))
            .map(|(_, sample)| sample)
            .collect();
        self.persist()?;

        log::info!(
            "Delivered batch: {} of {} processed, {} kept for retry",
            response.processed,
            response.total,
            self.pending.len()
        );

        Ok(FlushOutcome::Delivered {
            processed: response.processed,
            retained: self.pending.len(),
        })
    }

    fn evict_overflow(&mut self) -> usize {
        let overflow = self.pending.len().saturating_sub(self.capacity);
        self.pending.drain(..overflow);
        overflow
    }

    /// Rewrite the queue file through a temporary file so a crash never
    /// leaves it half written.
    fn persist(&self) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec(&self.pending)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::TransportError;
    use crate::ingest::{BatchResponse, Rejection, RejectionReason};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Accepts everything except items carrying the configured labels.
    #[derive(Default)]
    struct FakeGateway {
        offline: AtomicBool,
        transient: Vec<String>,
        permanent: Vec<String>,
        calls: AtomicUsize,
        last_batch: Mutex<Vec<PingPayload>>,
    }

    #[async_trait]
    impl Transport for FakeGateway {
        async fn deliver(&self, pings: &[PingPayload]) -> Result<BatchResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_batch.lock().unwrap() = pings.to_vec();
            if self.offline.load(Ordering::SeqCst) {
                return Err(TransportError::Status {
                    status: 503,
                    body: "offline".into(),
                });
            }

            let rejections = pings
                .iter()
                .enumerate()
                .filter_map(|(index, p)| {
                    let reason = if self.transient.contains(&p.vehicle_label) {
                        RejectionReason::Persistence
                    } else if self.permanent.contains(&p.vehicle_label) {
                        RejectionReason::Admission
                    } else {
                        return None;
                    };
                    Some(Rejection {
                        index,
                        reason,
                        retryable: reason.is_retryable(),
                        message: reason.to_string(),
                    })
                })
                .collect();
            Ok(BatchResponse::new(pings.len(), rejections))
        }
    }

    fn sample(label: &str, n: u32) -> PingPayload {
        PingPayload {
            vehicle_label: label.into(),
            lat: Some(40.0),
            lng: Some(-88.0),
            timestamp: Some(format!("2026-03-02T08:{:02}:{:02}Z", n / 60, n % 60)),
            speed: None,
            heading: None,
            accuracy: None,
            battery: None,
        }
    }

    fn offline() -> FakeGateway {
        let gateway = FakeGateway::default();
        gateway.offline.store(true, Ordering::SeqCst);
        gateway
    }

    #[tokio::test]
    async fn test_enqueue_delivers_when_online() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        let mut queue = ClientQueue::open(&path, 100, FakeGateway::default()).unwrap();

        let outcome = queue.enqueue(sample("Shuttle 1", 1)).await.unwrap();

        assert_eq!(
            outcome,
            FlushOutcome::Delivered {
                processed: 1,
                retained: 0
            }
        );
        assert!(queue.is_empty());
        assert!(load_pending(&path).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_keeps_queue_and_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");

        {
            let mut queue = ClientQueue::open(&path, 100, offline()).unwrap();
            for n in 0..3 {
                let outcome = queue.enqueue(sample("Shuttle 1", n)).await.unwrap();
                assert_eq!(outcome, FlushOutcome::Failed);
            }
            assert_eq!(queue.len(), 3);
        }

        let mut queue = ClientQueue::open(&path, 100, FakeGateway::default()).unwrap();
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.last(), Some(&sample("Shuttle 1", 2)));

        let outcome = queue.flush().await.unwrap();
        assert_eq!(
            outcome,
            FlushOutcome::Delivered {
                processed: 3,
                retained: 0
            }
        );
        assert_eq!(queue.transport.last_batch.lock().unwrap().len(), 3);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_first() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        let mut queue = ClientQueue::open(&path, 3, offline()).unwrap();

        for n in 0..5 {
            queue.enqueue(sample("Shuttle 1", n)).await.unwrap();
        }

        let expected: Vec<PingPayload> = (2..5).map(|n| sample("Shuttle 1", n)).collect();
        assert_eq!(queue.pending(), expected.as_slice());
        assert_eq!(load_pending(&path).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_only_transient_rejections_are_retried() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        let gateway = FakeGateway {
            transient: vec!["flaky".into()],
            permanent: vec!["wrong".into()],
            ..FakeGateway::default()
        };
        gateway.offline.store(true, Ordering::SeqCst);
        let mut queue = ClientQueue::open(&path, 100, gateway).unwrap();

        queue.enqueue(sample("Shuttle 1", 1)).await.unwrap();
        queue.enqueue(sample("flaky", 2)).await.unwrap();
        queue.enqueue(sample("wrong", 3)).await.unwrap();
        assert_eq!(queue.len(), 3);

        queue.transport.offline.store(false, Ordering::SeqCst);
        let outcome = queue.flush().await.unwrap();

        assert_eq!(
            outcome,
            FlushOutcome::Delivered {
                processed: 1,
                retained: 1
            }
        );
        assert_eq!(queue.pending(), &[sample("flaky", 2)]);
    }

    #[tokio::test]
    async fn test_flush_empty_queue_skips_transport() {
        let temp_dir = TempDir::new().unwrap();
        let mut queue =
            ClientQueue::open(temp_dir.path().join("q.json"), 100, FakeGateway::default())
                .unwrap();

        assert_eq!(queue.flush().await.unwrap(), FlushOutcome::Empty);
        assert_eq!(queue.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_open_trims_oversized_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        let samples: Vec<PingPayload> = (0..10).map(|n| sample("Shuttle 1", n)).collect();
        fs::write(&path, serde_json::to_vec(&samples).unwrap()).unwrap();

        let queue = ClientQueue::open(&path, 4, FakeGateway::default()).unwrap();

        assert_eq!(queue.pending(), &samples[6..]);
        assert_eq!(load_pending(&path).unwrap().len(), 4);
    }
}
