use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use slice_viewer::{
    DicomFolderSource, FrameBuffer2D, Orientation, PatientRecord, Result, SliceConsumer,
    StreamReceiver, StreamSender, ViewerConfig, ViewerSession,
};

#[derive(Parser)]
#[command(name = "slice-viewer", about = "View and stream slices of a DICOM stack")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save one slice of a stack as PNG
    Render {
        folder: PathBuf,
        #[arg(long, value_enum, default_value = "axial")]
        axis: Axis,
        /// Slice index, centre of the axis if omitted
        #[arg(long)]
        index: Option<usize>,
        #[arg(long, default_value = "slice.png")]
        out: PathBuf,
    },
    /// Send one slice and the patient record to a listening viewer
    Send {
        folder: PathBuf,
        #[arg(long, value_enum, default_value = "axial")]
        axis: Axis,
        #[arg(long)]
        index: Option<usize>,
        /// Overrides `stream.peer_address`
        #[arg(long)]
        peer: Option<String>,
        /// Overrides `stream.port`
        #[arg(long)]
        port: Option<u16>,
    },
    /// Receive slices and save them to a directory
    Listen {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long, default_value = "received")]
        out_dir: PathBuf,
        /// Inbox drain interval in milliseconds
        #[arg(long, default_value_t = 50)]
        tick_ms: u64,
        /// Stop after this many seconds; runs until killed if omitted
        #[arg(long)]
        duration_secs: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Axis {
    Axial,
    Coronal,
    Sagittal,
}

impl From<Axis> for Orientation {
    fn from(axis: Axis) -> Self {
        match axis {
            Axis::Axial => Orientation::Axial,
            Axis::Coronal => Orientation::Coronal,
            Axis::Sagittal => Orientation::Sagittal,
        }
    }
}

/// Writes every drained image to disk and logs patient records
struct DiskConsumer {
    out_dir: PathBuf,
    received: usize,
}

impl SliceConsumer for DiskConsumer {
    fn on_image_ready(&mut self, orientation: Orientation, frame: FrameBuffer2D) {
        self.received += 1;
        let path = self
            .out_dir
            .join(format!("{:04}-{}.png", self.received, orientation));
        match frame.to_png().and_then(|png| Ok(fs::write(&path, png)?)) {
            Ok(()) => info!("Saved {} slice to {}", orientation, path.display()),
            Err(e) => error!("Failed to save {}: {}", path.display(), e),
        }
    }

    fn on_patient_info_ready(&mut self, record: PatientRecord) {
        info!("Patient ID: {}, name: {}", record.id, record.name);
    }
}

fn load_session(config: &ViewerConfig, folder: &Path) -> Result<ViewerSession> {
    let source = DicomFolderSource::new(config.volume.sort_by);
    let mut session = ViewerSession::from_config(&config.volume, config.display.filter);
    session.load_stack(&source, folder)?;
    Ok(session)
}

fn current_view(
    session: &mut ViewerSession,
    config: &ViewerConfig,
    orientation: Orientation,
    index: Option<usize>,
) -> Result<FrameBuffer2D> {
    let index = index.unwrap_or(session.slice_count(orientation) / 2);
    session.view(
        orientation,
        index,
        config.display.width,
        config.display.height,
    )
}

fn run(cli: Cli, config: ViewerConfig) -> Result<()> {
    match cli.command {
        Command::Render {
            folder,
            axis,
            index,
            out,
        } => {
            let mut session = load_session(&config, &folder)?;
            let frame = current_view(&mut session, &config, axis.into(), index)?;
            fs::write(&out, frame.to_png()?)?;
            info!("Wrote {}", out.display());
        }
        Command::Send {
            folder,
            axis,
            index,
            peer,
            port,
        } => {
            let mut session = load_session(&config, &folder)?;
            let orientation = axis.into();
            let frame = current_view(&mut session, &config, orientation, index)?;

            let peer = peer.unwrap_or_else(|| config.stream.peer_address.clone());
            let mut sender = StreamSender::new();
            sender.connect(&peer, port.unwrap_or(config.stream.port))?;
            sender.send_image(&frame, orientation)?;
            if let Some(record) = session.patient() {
                sender.send_patient_info(record)?;
            }
            sender.disconnect();
        }
        Command::Listen {
            port,
            out_dir,
            tick_ms,
            duration_secs,
        } => {
            fs::create_dir_all(&out_dir)?;
            let mut receiver = StreamReceiver::new();
            let endpoint = format!(
                "{}:{}",
                config.stream.bind_address,
                port.unwrap_or(config.stream.port)
            );
            receiver.start_listening_on(&endpoint)?;

            let inbox = receiver.inbox();
            let mut consumer = DiskConsumer {
                out_dir,
                received: 0,
            };
            let deadline = duration_secs.map(|s| Instant::now() + Duration::from_secs(s));
            while deadline.is_none_or(|d| Instant::now() < d) {
                inbox.poll(&mut consumer);
                thread::sleep(Duration::from_millis(tick_ms));
            }
            receiver.stop();
            while inbox.poll(&mut consumer) > 0 {}
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ViewerConfig::from_file(path),
        None => Ok(ViewerConfig::default()),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(2);
        }
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    if let Err(e) = run(cli, config) {
        error!("{}", e);
        std::process::exit(1);
    }
}
