//! Event system for UI decoupling.
//!
//! Allows the CLI (or any other front end) to subscribe to protocol events
//! without tight coupling to the core logic.

use std::fmt;

use crate::protocol::hex::trace;
use crate::state::machine::SessionState;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Events emitted by the BROM session.
#[derive(Debug, Clone)]
pub enum BromEvent {
    /// Candidate ports found during discovery.
    PortsFound { ports: Vec<String> },
    /// Transport opened on a port.
    DeviceConnected { port: String },
    /// Session state advanced.
    StateChanged { from: SessionState, to: SessionState },
    /// Progress update for a bulk upload.
    Progress {
        operation: String,
        current: u64,
        total: u64,
    },
    /// Human-readable log line.
    Log { level: LogLevel, message: String },
    /// Bytes sent or received.
    Packet {
        direction: PacketDirection,
        data: Vec<u8>,
    },
    /// Session failed in the given state.
    Error { state: SessionState, message: String },
    /// DA transmitted.
    Complete,
}

/// Byte stream direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Host -> Device
    Rx, // Device -> Host
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX ->"),
            PacketDirection::Rx => write!(f, "RX <-"),
        }
    }
}

/// Render a packet as a trace line: `TX -> [ a0 ]`.
pub fn packet_line(direction: PacketDirection, data: &[u8]) -> String {
    format!("{} {}", direction, trace(data))
}

/// Observer trait for receiving BROM events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait BromObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &BromEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl BromObserver for NullObserver {
    fn on_event(&self, _event: &BromEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl BromObserver for TracingObserver {
    fn on_event(&self, event: &BromEvent) {
        match event {
            BromEvent::PortsFound { ports } => {
                tracing::info!(ports = ?ports, "Got ports");
            }
            BromEvent::DeviceConnected { port } => {
                tracing::info!(port = %port, "Initializing port");
            }
            BromEvent::StateChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "State changed");
            }
            BromEvent::Progress {
                operation,
                current,
                total,
            } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    0
                };
                tracing::debug!(operation = %operation, progress = %format!("{}%", pct), "Progress");
            }
            BromEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            BromEvent::Packet { direction, data } => {
                tracing::debug!("{}", packet_line(*direction, data));
            }
            BromEvent::Error { state, message } => {
                tracing::error!(state = %state, "{}", message);
            }
            BromEvent::Complete => {
                tracing::info!("DA sent");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_line() {
        assert_eq!(packet_line(PacketDirection::Tx, &[0xa0]), "TX -> [ a0 ]");
        assert_eq!(packet_line(PacketDirection::Rx, &[0x5f, 0xf5]), "RX <- [ 5f f5 ]");
    }
}
