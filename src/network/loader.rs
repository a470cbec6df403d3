use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::matching::RouteGeometry;

use super::error::ReferenceError;
use super::types::{Driver, NetworkFile, Route, RouteRecord, Stop, Vehicle};

/// The vehicle a driver is currently allowed to report for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub driver_id: String,
    pub vehicle_id: String,
    pub vehicle_label: String,
    pub route_id: Option<String>,
}

/// Validated, read-only reference data: routes, stops, vehicles and drivers.
#[derive(Debug, Clone, Default)]
pub struct Network {
    routes: HashMap<String, Route>,
    vehicles: HashMap<String, Vehicle>,
    drivers: HashMap<String, Driver>,
}

impl Network {
    /// Load and validate a reference file.
    pub fn load(path: &Path) -> Result<Self, ReferenceError> {
        let content = fs::read_to_string(path)?;
        let network = Self::from_yaml(&content)?;
        log::info!(
            "Loaded reference data from {}: {} routes, {} vehicles, {} drivers",
            path.display(),
            network.routes.len(),
            network.vehicles.len(),
            network.drivers.len()
        );
        Ok(network)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ReferenceError> {
        let file: NetworkFile = serde_yaml::from_str(yaml)?;

        let mut routes = HashMap::new();
        for record in file.routes {
            let route = build_route(record)?;
            if routes.contains_key(&route.id) {
                return Err(ReferenceError::InvalidRoute {
                    route: route.id,
                    message: "duplicate route id".into(),
                });
            }
            routes.insert(route.id.clone(), route);
        }

        let mut vehicles = HashMap::new();
        let mut labels = HashSet::new();
        for vehicle in file.vehicles {
            let invalid = |message: &str| ReferenceError::InvalidVehicle {
                vehicle: vehicle.id.clone(),
                message: message.into(),
            };
            if let Some(route_id) = &vehicle.route_id {
                if !routes.contains_key(route_id) {
                    return Err(invalid(&format!("unknown route {}", route_id)));
                }
            }
            if !labels.insert(vehicle.label.clone()) {
                return Err(invalid("duplicate label"));
            }
            if vehicles.contains_key(&vehicle.id) {
                return Err(invalid("duplicate vehicle id"));
            }
            vehicles.insert(vehicle.id.clone(), vehicle);
        }

        let mut drivers = HashMap::new();
        let mut staffed = HashSet::new();
        for driver in file.drivers {
            let invalid = |message: String| ReferenceError::InvalidDriver {
                driver: driver.user_id.clone(),
                message,
            };
            if let Some(vehicle_id) = &driver.assigned_vehicle {
                if !vehicles.contains_key(vehicle_id) {
                    return Err(invalid(format!("unknown vehicle {}", vehicle_id)));
                }
                if driver.active && !staffed.insert(vehicle_id.clone()) {
                    return Err(invalid(format!(
                        "vehicle {} already has an active driver",
                        vehicle_id
                    )));
                }
            }
            if drivers.contains_key(&driver.user_id) {
                return Err(invalid("duplicate driver".into()));
            }
            drivers.insert(driver.user_id.clone(), driver);
        }

        Ok(Self {
            routes,
            vehicles,
            drivers,
        })
    }

    pub fn route(&self, id: &str) -> Option<&Route> {
        self.routes.get(id)
    }

    pub fn vehicle(&self, id: &str) -> Option<&Vehicle> {
        self.vehicles.get(id)
    }

    /// Routes sorted by id.
    pub fn routes(&self) -> Vec<&Route> {
        let mut routes: Vec<&Route> = self.routes.values().collect();
        routes.sort_by(|a, b| a.id.cmp(&b.id));
        routes
    }

    /// Vehicles sorted by label.
    pub fn vehicles(&self) -> Vec<&Vehicle> {
        let mut vehicles: Vec<&Vehicle> = self.vehicles.values().collect();
        vehicles.sort_by(|a, b| a.label.cmp(&b.label));
        vehicles
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    /// Whether the user appears in the driver roster, active or not.
    pub fn is_driver(&self, user_id: &str) -> bool {
        self.drivers.contains_key(user_id)
    }

    /// Resolve the active assignment for a user.
    ///
    /// Returns `None` unless the user is an active driver assigned to an
    /// active vehicle.
    pub fn assignment_for(&self, user_id: &str) -> Option<Assignment> {
        let driver = self.drivers.get(user_id).filter(|d| d.active)?;
        let vehicle_id = driver.assigned_vehicle.as_ref()?;
        let vehicle = self.vehicles.get(vehicle_id).filter(|v| v.active)?;

        Some(Assignment {
            driver_id: driver.user_id.clone(),
            vehicle_id: vehicle.id.clone(),
            vehicle_label: vehicle.label.clone(),
            route_id: vehicle.route_id.clone(),
        })
    }
}

fn build_route(record: RouteRecord) -> Result<Route, ReferenceError> {
    let invalid = |message: String| ReferenceError::InvalidRoute {
        route: record.id.clone(),
        message,
    };

    if record.path.len() < 2 {
        return Err(invalid("path needs at least 2 points".into()));
    }
    if let Some((lat, lng)) = record
        .path
        .iter()
        .find(|(lat, lng)| !(-90.0..=90.0).contains(lat) || !(-180.0..=180.0).contains(lng))
    {
        return Err(invalid(format!("invalid path point ({}, {})", lat, lng)));
    }
    let mut path = record.path.clone();
    if record.is_loop && path.first() != path.last() {
        // A loop runs back to its first point before the next lap starts.
        path.push(path[0]);
    }
    let geometry =
        RouteGeometry::new(path).ok_or_else(|| invalid("path has zero length".into()))?;

    let mut records = record.stops.clone();
    records.sort_by_key(|s| s.sequence);

    let mut stops: Vec<Stop> = Vec::with_capacity(records.len());
    let mut min_arc_m = 0.0;
    for stop in records {
        let projection = geometry.project_from((stop.lat, stop.lng), min_arc_m);
        let progress = projection.progress;
        min_arc_m = projection.arc_m;
        if let Some(previous) = stops.last() {
            if previous.sequence == stop.sequence {
                return Err(invalid(format!("duplicate stop sequence {}", stop.sequence)));
            }
            if progress <= previous.progress {
                return Err(invalid(format!(
                    "stop {} (sequence {}) is not after stop {} along the path",
                    stop.id, stop.sequence, previous.id
                )));
            }
        }
        stops.push(Stop {
            id: stop.id,
            name: stop.name,
            sequence: stop.sequence,
            lat: stop.lat,
            lng: stop.lng,
            progress,
        });
    }

    Ok(Route {
        short_name: record.short_name.clone().unwrap_or_else(|| record.id.clone()),
        long_name: record.long_name.clone().unwrap_or_default(),
        id: record.id,
        is_loop: record.is_loop,
        geometry,
        stops,
    })
}
