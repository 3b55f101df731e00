//! BROM Session - High-level orchestrator for the upload process.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::events::{BromEvent, BromObserver, PacketDirection, TracingObserver};
use crate::payload::{AuthBlob, DaBlob};
use crate::protocol::constants::*;
use crate::state::handlers::{HandleResult, HandlerContext, ProtocolError, handle_state};
use crate::state::machine::{SessionState, StateMachineContext};
use crate::transport::{SerialSettings, SerialTransport, Transport, TransportError, discover_ports};

/// Configuration for a BROM session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial port to use. Discovered automatically when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Path to the auth certificate.
    pub auth_path: String,
    /// Path to the file containing the DA image.
    pub da_path: String,
    /// Byte offset of the DA image inside `da_path`.
    pub da_offset: u64,
    /// DA image length in bytes.
    pub da_length: usize,
    /// Bypass the SLA challenge.
    pub skip_host_qualification: bool,
    /// Per-read deadline in milliseconds. 0 blocks forever.
    pub read_timeout_ms: u64,
    /// Delay before each DA chunk.
    pub chunk_delay_ms: u64,
    /// Also send the trailing DA bytes that do not fill a whole chunk.
    pub send_partial_chunk: bool,
    /// Delay between port scans.
    pub poll_interval_ms: u64,
    /// Give up discovery after this many seconds. 0 waits forever.
    pub discovery_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            auth_path: DEFAULT_AUTH_FILE.to_string(),
            da_path: DEFAULT_DA_FILE.to_string(),
            da_offset: DA_FILE_OFFSET,
            da_length: DA_IMAGE_LEN,
            skip_host_qualification: true,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            chunk_delay_ms: DA_CHUNK_DELAY.as_millis() as u64,
            send_partial_chunk: false,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            discovery_timeout_secs: 0,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Serial line settings derived from this configuration.
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            baud_rate: self.baud_rate,
            read_timeout: (self.read_timeout_ms > 0)
                .then(|| Duration::from_millis(self.read_timeout_ms)),
        }
    }
}

/// Outcome of a session that did not fail fatally.
#[derive(Debug)]
pub struct SessionReport {
    /// Port the session ran on, if it was opened by the session.
    pub port: Option<String>,
    pub final_state: SessionState,
    /// Device echoed the handshake probe.
    pub handshake_echoed: bool,
    pub bl_version: Option<u8>,
    pub soc_id: Option<Vec<u8>>,
    pub da_chunks_sent: usize,
    /// Set when the DA upload short-circuited.
    pub stopped: Option<ProtocolError>,
}

impl SessionReport {
    fn from_state(state: StateMachineContext, stopped: Option<ProtocolError>) -> Self {
        Self {
            port: None,
            final_state: state.state,
            handshake_echoed: state.handshake_echoed,
            bl_version: state.bl_version,
            soc_id: state.soc_id,
            da_chunks_sent: state.da_chunks_sent,
            stopped,
        }
    }

    /// DA fully transmitted.
    pub fn is_complete(&self) -> bool {
        self.final_state.is_terminal() && self.stopped.is_none()
    }
}

/// Blobs loaded once per session.
struct LoadedImages {
    auth: AuthBlob,
    da: DaBlob,
}

/// BROM Session - drives one device from handshake to DA upload.
pub struct BromSession<O: BromObserver> {
    config: SessionConfig,
    observer: Arc<O>,
    images: Option<LoadedImages>,
}

impl BromSession<TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }
}

impl<O: BromObserver> BromSession<O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(config: SessionConfig, observer: Arc<O>) -> Self {
        Self {
            config,
            observer,
            images: None,
        }
    }

    /// Use already loaded blobs instead of reading them from disk.
    pub fn with_images(mut self, auth: AuthBlob, da: DaBlob) -> Self {
        self.images = Some(LoadedImages { auth, da });
        self
    }

    fn load_images(config: &SessionConfig) -> Result<LoadedImages, ProtocolError> {
        info!(path = %config.auth_path, "Loading auth file");
        let auth = AuthBlob::load(&config.auth_path)?;
        info!(path = %config.da_path, "Loading DA");
        let da = DaBlob::load(&config.da_path, config.da_offset, config.da_length)?;
        Ok(LoadedImages { auth, da })
    }

    /// Wait for a serial port, then run the session on it.
    #[instrument(skip(self))]
    pub fn run(&mut self) -> Result<SessionReport, ProtocolError> {
        if self.images.is_none() {
            self.images = Some(Self::load_images(&self.config)?);
        }

        let (port, mut transport) = self.wait_for_device()?;
        let mut report = self.run_on(&mut transport)?;
        report.port = Some(port);
        Ok(report)
    }

    /// Keep scanning until a port opens or the discovery timeout expires.
    fn wait_for_device(&self) -> Result<(String, SerialTransport), ProtocolError> {
        info!("Listening for ports");
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let timeout = Duration::from_secs(self.config.discovery_timeout_secs);
        let start = Instant::now();
        let mut last_error = None;

        loop {
            thread::sleep(poll);

            let candidates = match &self.config.port {
                Some(port) => vec![port.clone()],
                None => discover_ports(),
            };

            if let Some(port) = candidates.first() {
                self.observer.on_event(&BromEvent::PortsFound {
                    ports: candidates.clone(),
                });
                match SerialTransport::open(port, self.config.serial_settings()) {
                    Ok(transport) => {
                        self.observer.on_event(&BromEvent::DeviceConnected {
                            port: port.clone(),
                        });
                        return Ok((port.clone(), transport));
                    }
                    Err(e @ TransportError::Unavailable { .. }) => {
                        debug!(error = %e, "Port not ready");
                        last_error = Some(e);
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            if !timeout.is_zero() && start.elapsed() >= timeout {
                return Err(match last_error {
                    Some(e) => e.into(),
                    None => ProtocolError::DiscoveryTimeout {
                        waited_secs: timeout.as_secs(),
                    },
                });
            }
        }
    }

    /// Run the full step sequence on an open transport.
    pub fn run_on<T: Transport>(
        &mut self,
        transport: &mut T,
    ) -> Result<SessionReport, ProtocolError> {
        let images = match self.images.take() {
            Some(images) => images,
            None => Self::load_images(&self.config)?,
        };
        let images = self.images.insert(images);

        let mut state = StateMachineContext::new();
        let mut observable = ObservableTransport {
            inner: transport,
            observer: self.observer.as_ref(),
        };

        loop {
            let mut ctx = HandlerContext {
                transport: &mut observable,
                observer: self.observer.as_ref(),
                state: &mut state,
                config: &self.config,
                auth: &images.auth,
                da: &images.da,
            };

            match handle_state(&mut ctx) {
                Ok(HandleResult::Continue) => {}
                Ok(HandleResult::Complete) => {
                    self.observer.on_event(&BromEvent::Complete);
                    return Ok(SessionReport::from_state(state, None));
                }
                Ok(HandleResult::Stopped(reason)) => {
                    return Ok(SessionReport::from_state(state, Some(reason)));
                }
                Err(e) => {
                    self.observer.on_event(&BromEvent::Error {
                        state: state.state,
                        message: e.to_string(),
                    });
                    return Err(e);
                }
            }
        }
    }
}

/// Transport wrapper that emits packet events.
struct ObservableTransport<'a, T: Transport, O: BromObserver> {
    inner: &'a mut T,
    observer: &'a O,
}

impl<T: Transport, O: BromObserver> ObservableTransport<'_, T, O> {
    fn packet(&self, direction: PacketDirection, data: &[u8]) {
        self.observer.on_event(&BromEvent::Packet {
            direction,
            data: data.to_vec(),
        });
    }
}

impl<T: Transport, O: BromObserver> Transport for ObservableTransport<'_, T, O> {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.inner.write(data)?;
        self.packet(PacketDirection::Tx, data);
        Ok(())
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let data = self.inner.read_exact(len)?;
        self.packet(PacketDirection::Rx, &data);
        Ok(data)
    }

    fn write_bytewise(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.inner.write_bytewise(data)?;
        self.packet(PacketDirection::Tx, data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BromEvent, NullObserver, packet_line};
    use crate::transport::MockTransport;
    use std::sync::Mutex;

    /// Observer that keeps every event.
    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<BromEvent>>,
    }

    impl BromObserver for RecordingObserver {
        fn on_event(&self, event: &BromEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    impl RecordingObserver {
        fn packet_lines(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    BromEvent::Packet { direction, data } => Some(packet_line(*direction, data)),
                    _ => None,
                })
                .collect()
        }

        fn transitions(&self) -> Vec<SessionState> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    BromEvent::StateChanged { to, .. } => Some(*to),
                    _ => None,
                })
                .collect()
        }
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            chunk_delay_ms: 0,
            ..SessionConfig::default()
        }
    }

    fn images() -> (AuthBlob, DaBlob) {
        (
            AuthBlob::from_bytes(vec![0x11; AUTH_FILE_LENGTH as usize]),
            DaBlob::from_bytes(vec![0x22; DA_IMAGE_LEN]),
        )
    }

    /// Script a well-behaved boot ROM.
    fn script_device(mock: &MockTransport, with_sla: bool) {
        // Handshake
        mock.queue_hex("5ff5affa");
        // GET_BL_VER
        mock.queue_hex("05");
        // GET_SOC_ID
        mock.queue_hex("e7");
        mock.queue_u32(32);
        mock.queue(&[0xc0; 32]);
        mock.queue_hex("0000");
        // SEND_AUTH
        mock.queue_hex("e2");
        mock.queue_hex("000008d0");
        mock.queue_hex("0000");
        mock.queue_hex("0000");
        mock.queue_hex("0000");
        if with_sla {
            mock.queue_hex("e3");
            mock.queue_hex("0000");
            mock.queue_hex("00000010");
            mock.queue(&[0x7f; 16]);
            mock.queue_hex("00000100");
            mock.queue_hex("0000");
            mock.queue_hex("0000");
        }
        // SEND_DA
        mock.queue_hex("d7");
        mock.queue_hex("00200000");
        mock.queue_hex("000361a8");
        mock.queue_hex("00000100");
        mock.queue_hex("0000");
        mock.queue_hex("beef");
        mock.queue_hex("0000");
    }

    #[test]
    fn test_end_to_end_reaches_da_sent() {
        let mock = MockTransport::new();
        script_device(&mock, false);

        let observer = Arc::new(RecordingObserver::default());
        let (auth, da) = images();
        let mut session =
            BromSession::with_observer(test_config(), observer.clone()).with_images(auth, da);

        let report = session.run_on(&mut mock.clone()).unwrap();

        assert!(report.is_complete());
        assert_eq!(report.final_state, SessionState::DaSent);
        assert!(!report.handshake_echoed);
        assert_eq!(report.bl_version, Some(0x05));
        assert_eq!(report.soc_id, Some(vec![0xc0; 32]));
        assert_eq!(report.da_chunks_sent, 114);
        assert_eq!(mock.pending(), 0);

        assert_eq!(
            observer.transitions(),
            vec![
                SessionState::HandshakeDone,
                SessionState::PreloaderVerified,
                SessionState::SocIdRead,
                SessionState::AuthSent,
                SessionState::SlaSkipped,
                SessionState::DaSent,
            ]
        );

        let written = mock.written_bytes();
        let image_bytes = written.iter().filter(|&&b| b == 0x22).count();
        assert_eq!(image_bytes, 114 * DA_CHUNK_SIZE);
    }

    #[test]
    fn test_end_to_end_with_host_qualification() {
        let mock = MockTransport::new();
        script_device(&mock, true);

        let config = SessionConfig {
            skip_host_qualification: false,
            ..test_config()
        };
        let (auth, da) = images();
        let mut session =
            BromSession::with_observer(config, Arc::new(NullObserver)).with_images(auth, da);

        let report = session.run_on(&mut mock.clone()).unwrap();
        assert!(report.is_complete());
        assert_eq!(mock.pending(), 0);
    }

    #[test]
    fn test_trace_lines() {
        let mock = MockTransport::new();
        script_device(&mock, false);

        let observer = Arc::new(RecordingObserver::default());
        let (auth, da) = images();
        let mut session =
            BromSession::with_observer(test_config(), observer.clone()).with_images(auth, da);
        session.run_on(&mut mock.clone()).unwrap();

        let lines = observer.packet_lines();
        assert_eq!(lines[0], "TX -> [ a0 ]");
        assert_eq!(lines[1], "RX <- [ 5f ]");
        assert_eq!(lines[6], "TX -> [ 05 ]");
        assert_eq!(lines[7], "RX <- [ fa ]");
        assert_eq!(lines[8], "TX -> [ fe ]");
    }

    #[test]
    fn test_fatal_error_reports_state() {
        let mock = MockTransport::new();
        mock.queue_hex("5ff5affa");
        mock.queue_hex("fe");

        let observer = Arc::new(RecordingObserver::default());
        let (auth, da) = images();
        let mut session =
            BromSession::with_observer(test_config(), observer.clone()).with_images(auth, da);

        let err = session.run_on(&mut mock.clone()).unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedEcho { .. }));
        assert!(err.is_protocol_failure());

        let events = observer.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            BromEvent::Error {
                state: SessionState::HandshakeDone,
                ..
            }
        )));
        assert!(!events.iter().any(|e| matches!(e, BromEvent::Complete)));
    }

    #[test]
    fn test_da_short_circuit_is_not_an_error() {
        let (auth, da) = images();
        let mut session =
            BromSession::with_observer(test_config(), Arc::new(NullObserver)).with_images(auth, da);

        // Well-behaved up to SEND_DA, which gets a wrong ack
        let mock = MockTransport::new();
        mock.queue_hex("5ff5affa");
        mock.queue_hex("05");
        mock.queue_hex("e7");
        mock.queue(&[0u8; 38]);
        mock.queue_hex("e2000008d0000000000000");
        mock.queue_hex("00");

        let report = session.run_on(&mut mock.clone()).unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.final_state, SessionState::SlaSkipped);
        assert!(matches!(
            report.stopped,
            Some(ProtocolError::DaUploadAborted { .. })
        ));
        assert_eq!(report.da_chunks_sent, 0);
    }

    #[test]
    fn test_missing_images_fail_before_io() {
        let config = SessionConfig {
            auth_path: "/nonexistent/brom/auth_sv5.auth".to_string(),
            ..test_config()
        };
        let mock = MockTransport::new();
        let mut session = BromSession::with_observer(config, Arc::new(NullObserver));

        let err = session.run_on(&mut mock.clone()).unwrap_err();
        assert!(matches!(err, ProtocolError::Image(_)));
        assert!(!err.is_protocol_failure());
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_discovery_gives_up_after_timeout() {
        let config = SessionConfig {
            port: Some("/dev/nonexistent_brom_port".to_string()),
            poll_interval_ms: 50,
            discovery_timeout_secs: 1,
            ..test_config()
        };
        let observer = Arc::new(RecordingObserver::default());
        let session = BromSession::with_observer(config, observer.clone());

        let start = Instant::now();
        let err = session.wait_for_device().unwrap_err();

        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(matches!(
            err,
            ProtocolError::Transport(TransportError::Unavailable { .. })
        ));
        assert!(!err.is_protocol_failure());

        let events = observer.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, BromEvent::PortsFound { .. })));
        assert!(!events.iter().any(|e| matches!(e, BromEvent::DeviceConnected { .. })));
    }

    #[test]
    fn test_config_toml_round_trip() {
        let path = std::env::temp_dir().join(format!("brom-config-{}.toml", std::process::id()));
        let config = SessionConfig {
            port: Some("/dev/ttyACM0".to_string()),
            skip_host_qualification: false,
            ..SessionConfig::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = SessionConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.port.as_deref(), Some("/dev/ttyACM0"));
        assert!(!loaded.skip_host_qualification);
        assert_eq!(loaded.da_offset, 0x39DC);
        assert_eq!(loaded.da_length, 229_376);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SessionConfig = toml::from_str("baud_rate = 921600\n").unwrap();
        assert_eq!(config.baud_rate, 921_600);
        assert!(config.skip_host_qualification);
        assert_eq!(config.chunk_delay_ms, 10);
        assert_eq!(config.auth_path, "auth_sv5.auth");
        assert_eq!(
            config.serial_settings().read_timeout,
            Some(Duration::from_millis(5000))
        );
    }
}
