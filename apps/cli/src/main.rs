use anyhow::Result;
use brom_core::session::{BromSession, SessionConfig};
use clap::Parser;
use clap_num::maybe_hex;
use tracing::{error, info, warn};

const EXIT_OK: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PROTOCOL: i32 = 2;
const EXIT_STOPPED: i32 = 3;

#[derive(Parser, Debug)]
#[command(author, version, about = "MediaTek BROM handshake and DA upload tool", long_about = None)]
struct Args {
    /// TOML configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<String>,

    /// Serial port (discovered automatically when omitted)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Path to the auth certificate (auth_sv5.auth)
    #[arg(long)]
    auth: Option<String>,

    /// Path to the file containing the DA image
    #[arg(long)]
    da: Option<String>,

    /// Offset of the DA image inside the DA file (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = maybe_hex::<u64>)]
    da_offset: Option<u64>,

    /// Length of the DA image in bytes (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = maybe_hex::<u64>)]
    da_length: Option<u64>,

    /// Run the SLA challenge instead of skipping it
    #[arg(long)]
    qualify_host: bool,

    /// Per-read timeout in milliseconds, 0 waits forever
    #[arg(long)]
    read_timeout_ms: Option<u64>,

    /// Also send the trailing DA bytes that do not fill a whole chunk
    #[arg(long)]
    send_partial_chunk: bool,

    /// Stop waiting for a port after this many seconds
    #[arg(long)]
    discovery_timeout: Option<u64>,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    write_config: Option<String>,

    /// Enable verbose logging (TX/RX traces)
    #[arg(short, long)]
    verbose: bool,
}

fn build_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)?,
        None => SessionConfig::default(),
    };

    if let Some(port) = &args.port {
        config.port = Some(port.clone());
    }
    if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }
    if let Some(auth) = &args.auth {
        config.auth_path = auth.clone();
    }
    if let Some(da) = &args.da {
        config.da_path = da.clone();
    }
    if let Some(offset) = args.da_offset {
        config.da_offset = offset;
    }
    if let Some(length) = args.da_length {
        config.da_length = usize::try_from(length)?;
    }
    if args.qualify_host {
        config.skip_host_qualification = false;
    }
    if let Some(timeout) = args.read_timeout_ms {
        config.read_timeout_ms = timeout;
    }
    if args.send_partial_chunk {
        config.send_partial_chunk = true;
    }
    if let Some(timeout) = args.discovery_timeout {
        config.discovery_timeout_secs = timeout;
    }

    Ok(config)
}

fn run(args: &Args) -> Result<i32> {
    let config = build_config(args)?;

    if let Some(path) = &args.write_config {
        config.save_to_file(path)?;
        info!(path = %path, "Configuration written");
        return Ok(EXIT_OK);
    }

    let mut session = BromSession::new(config);
    match session.run() {
        Ok(report) if report.is_complete() => {
            info!(
                port = ?report.port,
                chunks = report.da_chunks_sent,
                echoed_handshake = report.handshake_echoed,
                "DA upload finished"
            );
            Ok(EXIT_OK)
        }
        Ok(report) => {
            warn!(
                state = %report.final_state,
                reason = ?report.stopped.map(|e| e.to_string()),
                "DA upload stopped"
            );
            Ok(EXIT_STOPPED)
        }
        Err(e) if e.is_protocol_failure() => {
            error!("Protocol failure: {}", e);
            Ok(EXIT_PROTOCOL)
        }
        Err(e) => Err(e.into()),
    }
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting BROM tool (serial backend)...");

    let code = match run(&args) {
        Ok(code) => code,
        Err(e) => {
            error!("Error: {:#}", e);
            EXIT_ERROR
        }
    };
    std::process::exit(code);
}
