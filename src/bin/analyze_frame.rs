//! analyze_frame - run the configured detectors on one image file
//!
//! Prints the same result JSON a stream session would send for the frame.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use eagle_eye::{build_orchestrator, build_registry, ImageEncoding, RawFrame, ServiceConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Analyze a single image with the Eagle-Eye detectors")]
struct Args {
    /// JPEG or PNG file to analyze.
    image: PathBuf,

    /// JSON or TOML config file.
    #[arg(long, env = "EAGLE_CONFIG")]
    config: Option<PathBuf>,

    /// Pretty-print the result.
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = ServiceConfig::load_from(args.config.as_deref())?;
    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("failed to read image {}", args.image.display()))?;
    let encoding = match args
        .image
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => ImageEncoding::Jpeg,
        Some("png") => ImageEncoding::Png,
        _ => ImageEncoding::Auto,
    };

    let registry = build_registry(&config)?;
    registry.warm_up()?;
    let orchestrator = build_orchestrator(&config, registry)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build runtime")?;
    let result = runtime.block_on(orchestrator.analyze(RawFrame::new(bytes, encoding)));

    orchestrator.registry().shutdown();

    let json = if args.pretty {
        serde_json::to_string_pretty(&result)
    } else {
        result.to_json()
    }
    .map_err(|e| anyhow!("failed to serialize result: {}", e))?;
    println!("{}", json);
    Ok(())
}
