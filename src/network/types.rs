use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::matching::RouteGeometry;

/// A stop with its precomputed position along the route.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Stop {
    pub id: String,
    pub name: String,
    pub sequence: u32,
    pub lat: f64,
    pub lng: f64,
    /// Route progress fraction of the stop's projection onto the polyline.
    pub progress: f64,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub id: String,
    pub short_name: String,
    pub long_name: String,
    /// Vehicles run the route repeatedly; stops behind a vehicle are served
    /// on the next lap.
    pub is_loop: bool,
    /// For loops this always ends back at its first point.
    pub geometry: RouteGeometry,
    /// Ordered by sequence, with strictly increasing progress.
    pub stops: Vec<Stop>,
}

impl Route {
    pub fn length_m(&self) -> f64 {
        self.geometry.total_length_m()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct Vehicle {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct Driver {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub assigned_vehicle: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Route as it appears in the reference file, before validation.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct RouteRecord {
    pub id: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub long_name: Option<String>,
    #[serde(default, rename = "loop")]
    pub is_loop: bool,
    /// Polyline as `[lat, lng]` pairs.
    pub path: Vec<(f64, f64)>,
    #[serde(default)]
    pub stops: Vec<StopRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct StopRecord {
    pub id: String,
    pub name: String,
    pub sequence: u32,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct NetworkFile {
    #[serde(default)]
    pub routes: Vec<RouteRecord>,
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
    #[serde(default)]
    pub drivers: Vec<Driver>,
}
