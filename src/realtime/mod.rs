//! Change signals for latest-position updates.
//!
//! A signal only says that something changed; subscribers re-read the
//! position store. Slow subscribers lose intermediate signals and receive a
//! single [`Signal::Resync`] instead.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use utoipa::ToSchema;

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    PositionChanged {
        vehicle_id: String,
        timestamp: DateTime<Utc>,
    },
    /// Signals were dropped; re-fetch everything of interest.
    Resync,
}

impl Signal {
    pub fn event_name(&self) -> &'static str {
        match self {
            Signal::PositionChanged { .. } => "position_changed",
            Signal::Resync => "resync",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum VehicleFilter {
    #[default]
    All,
    Only(HashSet<String>),
}

impl VehicleFilter {
    /// Parse a comma-separated list of vehicle ids; empty means all.
    pub fn from_list(list: Option<&str>) -> Self {
        let ids: HashSet<String> = list
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        if ids.is_empty() {
            VehicleFilter::All
        } else {
            VehicleFilter::Only(ids)
        }
    }

    fn matches(&self, signal: &Signal) -> bool {
        match (self, signal) {
            (VehicleFilter::All, _) | (_, Signal::Resync) => true,
            (VehicleFilter::Only(ids), Signal::PositionChanged { vehicle_id, .. }) => {
                ids.contains(vehicle_id)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Distributor {
    tx: broadcast::Sender<Signal>,
}

impl Default for Distributor {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Distributor {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Announce a new latest position. A no-op when nobody listens.
    pub fn publish(&self, vehicle_id: &str, timestamp: DateTime<Utc>) {
        let signal = Signal::PositionChanged {
            vehicle_id: vehicle_id.to_string(),
            timestamp,
        };
        if self.tx.send(signal).is_err() {
            log::trace!("No realtime subscribers for {}", vehicle_id);
        }
    }

    pub fn subscribe(&self, filter: VehicleFilter) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<Signal>,
    filter: VehicleFilter,
}

impl Subscription {
    /// Next signal matching the filter, or `None` once the distributor is gone.
    pub async fn recv(&mut self) -> Option<Signal> {
        loop {
            match self.rx.recv().await {
                Ok(signal) if self.filter.matches(&signal) => return Some(signal),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("Realtime subscriber lagged by {} signals", skipped);
                    return Some(Signal::Resync);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
