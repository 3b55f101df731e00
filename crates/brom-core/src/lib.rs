//! BROM-Core: MediaTek boot ROM download protocol in Rust.
//!
//! This crate drives the serial boot ROM handshake of MediaTek SoCs and
//! uploads a download agent (DA) so the device ends up running a
//! second-stage loader.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Command bytes, fixed literals, hex framing
//! - **Transport**: Byte stream abstraction (serial port, mock)
//! - **Payload**: Auth certificate and DA image loading
//! - **State**: Session states and per-step handlers
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use brom_core::session::{BromSession, SessionConfig};
//!
//! let config = SessionConfig {
//!     auth_path: "auth_sv5.auth".to_string(),
//!     da_path: "MTK_AllInOne_DA_mt6765_mt6785.bin".to_string(),
//!     ..Default::default()
//! };
//!
//! let mut session = BromSession::new(config);
//! let report = session.run().expect("BROM session failed");
//! assert!(report.is_complete());
//! ```

pub mod events;
pub mod payload;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use events::{BromEvent, BromObserver, LogLevel, NullObserver, PacketDirection, TracingObserver};
pub use payload::{AuthBlob, DaBlob, ImageError};
pub use protocol::{Command, HexError, decode_hex, encode_hex};
pub use session::{BromSession, SessionConfig, SessionReport};
pub use state::{HandleResult, ProtocolError, SessionState};
pub use transport::{MockTransport, SerialTransport, Transport, TransportError};
