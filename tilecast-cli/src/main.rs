use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use glam::DVec3;
use tilecast::{
    Facing, FrameExtractor, Ingest, MediaFetcher, MediaRequest, MemoryWall, Placement,
    PreparedMedia, SessionRegistry, Stage, ThreadScheduler, TilecastConfig, TilecastError,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tilecast", version)]
struct Cli {
    /// JSON config file; missing fields take their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (decoder output included).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the source video into the media directory.
    Fetch(MediaArgs),
    /// Download and decode, writing every frame as a PNG.
    Extract(ExtractArgs),
    /// Play on an in-memory wall for a while and snapshot it.
    Play(PlayArgs),
}

#[derive(Args, Debug)]
struct MediaArgs {
    /// Media name; becomes the file and session id prefix.
    #[arg(long)]
    name: String,

    #[arg(long)]
    url: String,

    /// Grid width in surfaces.
    #[arg(long)]
    width: u32,

    /// Grid height in surfaces.
    #[arg(long)]
    height: u32,

    /// Playback frame rate (default 20).
    #[arg(long)]
    fps: Option<u32>,
}

impl MediaArgs {
    fn request(&self) -> anyhow::Result<MediaRequest> {
        MediaRequest::new(&self.name, &self.url, self.width, self.height, self.fps)
            .map_err(user_facing)
    }
}

#[derive(Args, Debug)]
struct ExtractArgs {
    #[command(flatten)]
    media: MediaArgs,

    /// Output directory for frame PNGs.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct PlayArgs {
    #[command(flatten)]
    media: MediaArgs,

    /// How long to play before snapshotting.
    #[arg(long, default_value_t = 3.0)]
    seconds: f64,

    /// Where to write the composited wall.
    #[arg(long, default_value = "wall.png")]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = match &cli.config {
        Some(path) => TilecastConfig::from_path(path).map_err(user_facing)?,
        None => TilecastConfig::default(),
    };

    match cli.cmd {
        Command::Fetch(args) => cmd_fetch(&cfg, args),
        Command::Extract(args) => cmd_extract(&cfg, args),
        Command::Play(args) => cmd_play(&cfg, args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Lead with the sentence a requester would see; keep the detail as cause.
fn user_facing(e: TilecastError) -> anyhow::Error {
    let msg = e.user_message();
    anyhow::Error::new(e).context(msg)
}

fn cmd_fetch(cfg: &TilecastConfig, args: MediaArgs) -> anyhow::Result<()> {
    let request = args.request()?;
    let local = MediaFetcher::from_config(cfg)
        .and_then(|f| f.fetch(&request))
        .map_err(user_facing)?;
    eprintln!("wrote {} ({} bytes)", local.path.display(), local.bytes);
    Ok(())
}

fn prepare(cfg: &TilecastConfig, request: &MediaRequest) -> anyhow::Result<PreparedMedia> {
    let ingest = Ingest::new(
        MediaFetcher::from_config(cfg).map_err(user_facing)?,
        FrameExtractor::from_config(cfg),
        cfg.keep_sources,
    );
    ingest
        .prepare(request, &mut |stage| match stage {
            Stage::Downloading => eprintln!("downloading {}", request.url()),
            Stage::Extracting => eprintln!("extracting frames"),
            Stage::Ready { frames } => eprintln!("ready: {frames} frames"),
        })
        .map_err(user_facing)
}

fn cmd_extract(cfg: &TilecastConfig, args: ExtractArgs) -> anyhow::Result<()> {
    let request = args.media.request()?;
    let prepared = prepare(cfg, &request)?;

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("create output dir '{}'", args.out.display()))?;
    for (i, frame) in prepared.frames.iter().enumerate() {
        let path = args.out.join(format!("frame_{:05}.png", i + 1));
        frame
            .save_with_format(&path, image::ImageFormat::Png)
            .with_context(|| format!("write png '{}'", path.display()))?;
    }

    eprintln!("{}", prepared.summary());
    eprintln!("wrote {} frames to {}", prepared.frames.len(), args.out.display());
    Ok(())
}

fn cmd_play(cfg: &TilecastConfig, args: PlayArgs) -> anyhow::Result<()> {
    anyhow::ensure!(
        args.seconds.is_finite() && args.seconds >= 0.0,
        "--seconds must be a non-negative number"
    );
    let request = args.media.request()?;
    let prepared = prepare(cfg, &request)?;

    let wall = Arc::new(MemoryWall::new());
    let anchor = DVec3::ZERO;
    wall.add_grid(anchor, Facing::North, request.width(), request.height());
    let scheduler = Arc::new(ThreadScheduler::new(cfg.ticks_per_second).map_err(user_facing)?);
    let registry = SessionRegistry::global();

    let id = tilecast::deploy(
        &prepared,
        Placement {
            anchor,
            facing: Some(Facing::North),
            background: cfg.background_pixel(),
        },
        wall.as_ref(),
        wall.clone(),
        scheduler,
        registry,
    )
    .map_err(user_facing)?;
    let session = registry
        .get(&id)
        .with_context(|| format!("session {id} vanished after deploy"))?;
    eprintln!("playing {id} for {}s", args.seconds);

    std::thread::sleep(Duration::from_secs_f64(args.seconds));
    let status = session.status();
    let snapshot = wall.compose(session.grid(), tilecast::TILE_SIZE, cfg.background_pixel());
    registry.stop_all();

    write_png(&args.out, &snapshot)?;
    eprintln!(
        "{}",
        serde_json::to_string(&status).context("serialize session status")?
    );
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn write_png(path: &Path, img: &image::RgbaImage) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    img.save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", path.display()))
}
