use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use splatgen::encode::ffmpeg::ensure_parent_dir;

#[derive(Parser, Debug)]
#[command(name = "splatgen", version)]
struct Cli {
    /// Service configuration JSON. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides the configuration.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP generation service.
    Serve(ServeArgs),
    /// Render the first orbit frame of a PLY scene as a PNG.
    Frame(FrameArgs),
    /// Render the orbit of a PLY scene as an MP4 (requires `ffmpeg`).
    Render(RenderArgs),
    /// Decode and gate a PLY scene, printing the validation result as JSON.
    Validate(ValidateArgs),
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Bind host. Overrides `server.host`.
    #[arg(long)]
    host: Option<String>,

    /// Bind port. Overrides `server.port`.
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input PLY scene.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input PLY scene.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Input PLY scene.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Prompt scored against the preview.
    #[arg(long, default_value = "")]
    prompt: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => splatgen::ServiceConfig::from_path(path)?,
        None => splatgen::ServiceConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.log.level = level;
    }
    init_tracing(&config)?;

    match cli.cmd {
        Command::Serve(args) => cmd_serve(config, args),
        Command::Frame(args) => cmd_frame(&config, args),
        Command::Render(args) => cmd_render(&config, args),
        Command::Validate(args) => cmd_validate(&config, args),
    }
}

fn init_tracing(config: &splatgen::ServiceConfig) -> anyhow::Result<()> {
    let level = config.log.max_level()?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn cmd_serve(mut config: splatgen::ServiceConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    let rt = tokio::runtime::Runtime::new().context("start tokio runtime")?;
    rt.block_on(splatgen::server::serve(&config))
}

fn read_scene(path: &Path) -> anyhow::Result<splatgen::SplatScene> {
    let raw = std::fs::read(path).with_context(|| format!("read scene '{}'", path.display()))?;
    let scene = splatgen::SplatScene::decode(&raw)
        .with_context(|| format!("decode scene '{}'", path.display()))?;
    tracing::info!(points = scene.len(), "scene decoded");
    Ok(scene)
}

fn make_rasterizer(config: &splatgen::ServiceConfig) -> anyhow::Result<splatgen::CpuRasterizer> {
    Ok(splatgen::CpuRasterizer::new(config.rasterizer.clone())?)
}

fn preview(
    config: &splatgen::ServiceConfig,
    scene: &splatgen::SplatScene,
) -> anyhow::Result<image::RgbImage> {
    let rasterizer = make_rasterizer(config)?;
    splatgen::render_preview(&rasterizer, scene, &config.orbit)?
        .context("orbit yields no frames (check orbit.seconds and orbit.fps)")
}

fn cmd_frame(config: &splatgen::ServiceConfig, args: FrameArgs) -> anyhow::Result<()> {
    let scene = read_scene(&args.in_path)?;
    let image = preview(config, &scene)?;

    ensure_parent_dir(&args.out)?;
    image
        .save_with_format(&args.out, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_render(config: &splatgen::ServiceConfig, args: RenderArgs) -> anyhow::Result<()> {
    let scene = read_scene(&args.in_path)?;
    let rasterizer = make_rasterizer(config)?;

    ensure_parent_dir(&args.out)?;
    let file =
        File::create(&args.out).with_context(|| format!("create '{}'", args.out.display()))?;
    let mut sink =
        splatgen::FfmpegStreamSink::new(config.encoder.clone(), Box::new(BufWriter::new(file)));
    let cfg = splatgen::SinkConfig {
        width: config.orbit.width,
        height: config.orbit.height,
        fps: config.orbit.fps,
    };
    let frames = splatgen::render(&rasterizer, &scene, &config.orbit, false);
    let stats = splatgen::encode(frames, cfg, &mut sink)?;

    eprintln!("wrote {} ({} frames)", args.out.display(), stats.frames);
    Ok(())
}

fn cmd_validate(config: &splatgen::ServiceConfig, args: ValidateArgs) -> anyhow::Result<()> {
    let scene = read_scene(&args.in_path)?;
    let image = preview(config, &scene)?;

    let gate = splatgen::QualityGate::new(config.validation.clone(), config.scorer());
    let result = gate.evaluate(&args.prompt, scene.len() as u64, &image);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
