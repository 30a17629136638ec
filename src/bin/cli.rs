use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use psip_tuner::config::{OverflowPolicy, SessionConfig, SourceConfig, StreamSelection, TunerConfig};
use psip_tuner::player::{init_logging, run_play, run_scan, PlayOptions, ScanOptions};

#[derive(Parser)]
#[command(version, about = "ATSC PSIP channel scanner and playback pipeline")]
struct Opt {
    #[command(subcommand)]
    command: Command,

    /// Debug-level logging (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Find the channel identity carried in the stream's TVCT
    Scan {
        #[command(flatten)]
        source: SourceArgs,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
    /// Play the stream through the decode pipeline
    Play {
        #[command(flatten)]
        source: SourceArgs,

        /// Video PID (default: first video stream in the PMT)
        #[arg(long, value_parser = parse_pid)]
        video_pid: Option<u16>,

        /// Audio PID (default: first audio stream in the PMT)
        #[arg(long, value_parser = parse_pid)]
        audio_pid: Option<u16>,

        /// Refresh interval for the JSON snapshot
        #[arg(long, default_value_t = 2)]
        refresh: u64,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Maximum queued access units
        #[arg(long, default_value_t = 256)]
        queue_capacity: usize,

        /// Block the demux instead of dropping the oldest access unit when the queue is full
        #[arg(long, default_value_t = false)]
        block_producer: bool,

        /// Media blocks that may be outstanding at once
        #[arg(long, default_value_t = 64)]
        block_pool: usize,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Transport stream file to play back
    #[arg(long, required_unless_present = "udp", conflicts_with = "udp")]
    file: Option<PathBuf>,

    /// UDP socket to bind + listen (IPv4, unicast or multicast)
    #[arg(long)]
    udp: Option<SocketAddr>,
}

impl SourceArgs {
    fn into_source(self) -> anyhow::Result<SourceConfig> {
        match (self.file, self.udp) {
            (Some(path), _) => Ok(SourceConfig::File(path)),
            (None, Some(addr)) => Ok(SourceConfig::Udp(addr)),
            (None, None) => anyhow::bail!("one of --file or --udp is required"),
        }
    }
}

fn parse_pid(s: &str) -> Result<u16, String> {
    let pid = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| format!("invalid PID {s:?}: {e}"))?;
    if pid > 0x1FFF {
        return Err(format!("PID {pid:#x} out of range"));
    }
    Ok(pid)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();
    init_logging(opt.verbose)?;

    match opt.command {
        Command::Scan { source, timeout } => {
            let tuner = TunerConfig::new(source.into_source()?);
            if run_scan(ScanOptions { tuner, timeout: Duration::from_secs(timeout) }).await?.is_none() {
                std::process::exit(2);
            }
        }
        Command::Play {
            source,
            video_pid,
            audio_pid,
            refresh,
            duration,
            queue_capacity,
            block_producer,
            block_pool,
        } => {
            let mut tuner = TunerConfig::new(source.into_source()?);
            tuner.selection = StreamSelection { video_pid, audio_pid };
            tuner.block_pool_size = block_pool;

            let mut session = SessionConfig::default();
            session.pipeline.queue_capacity = queue_capacity;
            if block_producer {
                session.pipeline.overflow = OverflowPolicy::BlockProducer;
            }

            run_play(PlayOptions {
                tuner,
                session,
                refresh_secs: refresh,
                duration: duration.map(Duration::from_secs),
            })
            .await?;
        }
    }
    Ok(())
}
