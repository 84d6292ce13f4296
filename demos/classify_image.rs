//! Classify an image file with the NSFW detector
//!
//! Downloads the model on first run, then prints label scores as JSON.
//! Run with: cargo run --example classify_image -- <image> [config.yaml]

use anyhow::Context;
use cerberus_detector::prelude::*;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cerberus=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let image_path = args
        .next()
        .context("usage: classify_image <image> [config.yaml]")?;

    let config = match args.next() {
        Some(path) => DetectorConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        None => DetectorConfig::default(),
    };
    let options = config.defaults;

    let mut detector = Detector::new(config);

    if !detector.is_downloaded()? {
        println!("Downloading {} (first run only)...", detector.model_id());
        detector.download()?;
    }

    detector.load()?;
    println!(
        "Loaded {} on {}",
        detector.model_id(),
        detector
            .device()
            .map(|d| d.to_string())
            .unwrap_or_default()
    );

    let result = detector.classify_path(&image_path, &options)?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    detector.unload();
    Ok(())
}
