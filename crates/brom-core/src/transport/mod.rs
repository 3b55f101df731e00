//! Transport layer module.

pub mod mock;
pub mod serial;
pub mod traits;

pub use mock::MockTransport;
pub use serial::{SerialSettings, SerialTransport, discover_ports};
pub use traits::{Transport, TransportError};
