//! Device-side durable queue feeding the ingestion endpoint.

mod queue;
mod transport;

pub use queue::{load_pending, ClientError, ClientQueue, FlushOutcome, DEFAULT_CAPACITY};
pub use transport::{HttpTransport, Transport, TransportError};
