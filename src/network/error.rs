use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("Reference file read error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Route {route}: {message}")]
    InvalidRoute { route: String, message: String },
    #[error("Vehicle {vehicle}: {message}")]
    InvalidVehicle { vehicle: String, message: String },
    #[error("Driver {driver}: {message}")]
    InvalidDriver { driver: String, message: String },
}
