mod error;
mod history;
mod latest;
mod types;

pub use error::StoreError;
pub use history::{JsonlHistory, MemoryHistory, PingHistory};
pub use latest::{LatestPositions, UpdateOutcome};
pub use types::{RawPing, SnappedPosition};
