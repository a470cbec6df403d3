pub mod client;
pub mod eta;
pub mod ingest;
pub mod matching;
pub mod network;
pub mod realtime;
pub mod store;
pub mod web;
