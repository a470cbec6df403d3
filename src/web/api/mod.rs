pub mod error;
pub mod ingest;
pub mod realtime;
pub mod vehicles;
