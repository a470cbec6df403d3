use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinError;
use uuid::Uuid;

use crate::matching::{MapMatcher, Snapped};
use crate::network::{Assignment, Network};
use crate::realtime::Distributor;
use crate::store::{
    LatestPositions, PingHistory, RawPing, SnappedPosition, StoreError, UpdateOutcome,
};

use super::error::{ItemError, ValidationError};
use super::types::{BatchResponse, PingPayload, Rejection};

pub const DEFAULT_PERSIST_TIMEOUT: Duration = Duration::from_secs(2);

/// Coordinates and capture time of a ping that passed validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidPing {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
}

pub fn validate(payload: &PingPayload) -> Result<ValidPing, ValidationError> {
    let (Some(lat), Some(lng)) = (payload.lat, payload.lng) else {
        return Err(ValidationError::MissingFields);
    };
    let timestamp = payload
        .timestamp
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ValidationError::MissingFields)?;

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(ValidationError::Coordinates);
    }

    let timestamp = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|_| ValidationError::Timestamp)?
        .with_timezone(&Utc);

    Ok(ValidPing {
        lat,
        lng,
        timestamp,
    })
}

/// Ingestion path from an authorized batch to the position store.
///
/// Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Pipeline {
    network: Arc<Network>,
    history: Arc<dyn PingHistory>,
    latest: Arc<LatestPositions>,
    matcher: MapMatcher,
    distributor: Distributor,
    persist_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        network: Arc<Network>,
        history: Arc<dyn PingHistory>,
        matcher: MapMatcher,
        distributor: Distributor,
        persist_timeout: Duration,
    ) -> Self {
        Self {
            network,
            history,
            latest: Arc::new(LatestPositions::new()),
            matcher,
            distributor,
            persist_timeout,
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn latest(&self) -> &LatestPositions {
        &self.latest
    }

    /// History for a vehicle, newest first, read on the blocking pool.
    pub async fn recent(&self, vehicle_id: &str, limit: usize) -> Result<Vec<RawPing>, StoreError> {
        let history = Arc::clone(&self.history);
        let vehicle_id = vehicle_id.to_string();
        tokio::task::spawn_blocking(move || history.recent(&vehicle_id, limit))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Seed the latest positions from the newest recorded ping of every
    /// known vehicle. Nothing is published. Returns how many were restored.
    pub fn restore(&self) -> Result<usize, StoreError> {
        let mut restored = 0;
        for ping in self.history.latest_per_vehicle()? {
            let Some(vehicle) = self.network.vehicle(&ping.vehicle_id) else {
                log::warn!("Not restoring history for unknown vehicle {}", ping.vehicle_id);
                continue;
            };
            let position = self.position_for(vehicle.route_id.as_deref(), &ping);
            if self.latest.offer(position) == UpdateOutcome::Applied {
                restored += 1;
            }
        }
        Ok(restored)
    }

    pub fn distributor(&self) -> &Distributor {
        &self.distributor
    }

    /// Process a batch on behalf of `assignment`.
    ///
    /// Every item is handled independently; rejected items are reported in
    /// the response and never stop the rest of the batch.
    pub async fn ingest(&self, assignment: &Assignment, pings: Vec<PingPayload>) -> BatchResponse {
        let total = pings.len();
        let mut rejections = Vec::new();

        for (index, payload) in pings.into_iter().enumerate() {
            if let Err(err) = self.accept(assignment, payload).await {
                log::warn!(
                    "Rejected ping {} from driver {}: {}",
                    index,
                    assignment.driver_id,
                    err
                );
                let reason = err.reason();
                rejections.push(Rejection {
                    index,
                    reason,
                    retryable: reason.is_retryable(),
                    message: err.to_string(),
                });
            }
        }

        let response = BatchResponse::new(total, rejections);
        log::info!(
            "Driver {} ({}): processed {} of {} pings",
            assignment.driver_id,
            assignment.vehicle_label,
            response.processed,
            response.total
        );
        response
    }

    async fn accept(
        &self,
        assignment: &Assignment,
        payload: PingPayload,
    ) -> Result<UpdateOutcome, ItemError> {
        if payload.vehicle_label != assignment.vehicle_label {
            return Err(ItemError::Admission(payload.vehicle_label));
        }
        let valid = validate(&payload)?;

        let ping = RawPing {
            id: Uuid::new_v4(),
            vehicle_id: assignment.vehicle_id.clone(),
            lat: valid.lat,
            lng: valid.lng,
            timestamp: valid.timestamp,
            speed: payload.speed,
            heading: payload.heading,
            accuracy: payload.accuracy,
            battery: payload.battery,
            received_at: Utc::now(),
        };

        self.persist(&ping, assignment.route_id.as_deref()).await?;
        Ok(self.apply(assignment.route_id.as_deref(), &ping))
    }

    /// Append to history on the blocking pool, bounded by the persist timeout.
    ///
    /// A write that outlives the timeout is still reported as failed. If it
    /// commits later, the ping is applied then.
    async fn persist(&self, ping: &RawPing, route_id: Option<&str>) -> Result<(), StoreError> {
        let history = Arc::clone(&self.history);
        let record = ping.clone();
        let mut write = tokio::task::spawn_blocking(move || history.append(&record));

        match tokio::time::timeout(self.persist_timeout, &mut write).await {
            Ok(joined) => flatten(joined),
            Err(_) => {
                let pipeline = self.clone();
                let ping = ping.clone();
                let route_id = route_id.map(str::to_string);
                tokio::spawn(async move {
                    match flatten(write.await) {
                        Ok(()) => {
                            log::warn!(
                                "Late history write for {} at {} committed; applying it",
                                ping.vehicle_id,
                                ping.timestamp
                            );
                            pipeline.apply(route_id.as_deref(), &ping);
                        }
                        Err(e) => log::error!(
                            "Timed out history write for {} at {} failed: {}",
                            ping.vehicle_id,
                            ping.timestamp,
                            e
                        ),
                    }
                });
                Err(StoreError::Timeout(self.persist_timeout))
            }
        }
    }

    /// Offer a recorded ping as the vehicle's latest position and publish it
    /// if it took.
    fn apply(&self, route_id: Option<&str>, ping: &RawPing) -> UpdateOutcome {
        let outcome = self.latest.offer(self.position_for(route_id, ping));
        match outcome {
            UpdateOutcome::Applied => self.distributor.publish(&ping.vehicle_id, ping.timestamp),
            UpdateOutcome::Stale { current } => log::debug!(
                "Ignoring stale position for {} at {} (latest {})",
                ping.vehicle_id,
                ping.timestamp,
                current
            ),
        }
        outcome
    }

    fn position_for(&self, route_id: Option<&str>, ping: &RawPing) -> SnappedPosition {
        let raw = (ping.lat, ping.lng);
        let route = route_id.and_then(|id| self.network.route(id));

        let snapped = self
            .matcher
            .snap(raw, route.map(|r| &r.geometry))
            .unwrap_or_else(|e| {
                log::debug!("Vehicle {} left unmatched: {}", ping.vehicle_id, e);
                Snapped::unmatched(raw)
            });

        SnappedPosition {
            vehicle_id: ping.vehicle_id.clone(),
            lat: ping.lat,
            lng: ping.lng,
            snapped_lat: snapped.point.0,
            snapped_lng: snapped.point.1,
            route_id: route
                .filter(|_| snapped.progress.is_some())
                .map(|r| r.id.clone()),
            route_progress: snapped.progress,
            distance_from_route_m: snapped.distance_m,
            low_confidence: snapped.low_confidence,
            timestamp: ping.timestamp,
            speed: ping.speed,
            heading: ping.heading,
            accuracy: ping.accuracy,
            battery: ping.battery,
            updated_at: Utc::now(),
        }
    }
}

fn flatten(joined: Result<Result<(), StoreError>, JoinError>) -> Result<(), StoreError> {
    joined.map_err(|e| StoreError::Task(e.to_string()))?
}
