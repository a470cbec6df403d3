use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use super::types::SnappedPosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// The stored position is at least as new; nothing changed.
    Stale { current: DateTime<Utc> },
}

/// One current position per vehicle, last-writer-wins by source timestamp.
#[derive(Debug, Default)]
pub struct LatestPositions {
    slots: Mutex<HashMap<String, SnappedPosition>>,
}

impl LatestPositions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `position` if its timestamp is strictly newer than the current
    /// one for the same vehicle. Compare and write happen under one lock.
    pub fn offer(&self, position: SnappedPosition) -> UpdateOutcome {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(current) = slots.get(&position.vehicle_id) {
            if position.timestamp <= current.timestamp {
                return UpdateOutcome::Stale {
                    current: current.timestamp,
                };
            }
        }

        slots.insert(position.vehicle_id.clone(), position);
        UpdateOutcome::Applied
    }

    pub fn get(&self, vehicle_id: &str) -> Option<SnappedPosition> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(vehicle_id).cloned()
    }

    /// All positions, ordered by vehicle id.
    pub fn all(&self) -> Vec<SnappedPosition> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut positions: Vec<SnappedPosition> = slots.values().cloned().collect();
        positions.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
        positions
    }
}
