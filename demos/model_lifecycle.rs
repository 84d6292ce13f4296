//! Walk through the detector lifecycle: download, load, classify, unload
//!
//! Uses a synthetic image so no input file is needed.
//! Run with: cargo run --example model_lifecycle --features cuda

use cerberus_detector::prelude::*;
use image::{DynamicImage, Rgb, RgbImage};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Detector Lifecycle ===\n");

    let mut detector = Detector::new(DetectorConfig::new("./models/hf"));
    println!("Model: {}", detector.model_id());
    println!("Cache: {}", detector.cache_location().display());

    match detector.load().map(|_| ()) {
        Err(cerberus_core::Error::ResourceUnavailable(msg)) => {
            println!("Not cached yet ({}), downloading...", msg);
            detector.download()?;
            detector.load()?;
        }
        other => other?,
    }

    println!("Device: {:?}", detector.device());
    println!("Labels: {:?}\n", detector.labels().unwrap_or_default());

    let image = DynamicImage::ImageRgb8(RgbImage::from_fn(448, 448, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }));

    let cases = [
        ("all labels", ClassifyOptions::new()),
        ("top 2", ClassifyOptions::new().with_top_k(2)),
        ("priority order", ClassifyOptions::new().sorted()),
        (
            "top 1, release cache",
            ClassifyOptions::new().with_top_k(1).release_device_cache(true),
        ),
    ];

    let has_risk_tiers = detector
        .labels()
        .unwrap_or_default()
        .iter()
        .any(|label| cerberus_detector::LABEL_PRIORITY.contains(&label.as_str()));

    for (name, options) in cases {
        if options.sort && !has_risk_tiers {
            println!("{}: skipped, model has no high/medium/low/neutral labels", name);
            continue;
        }
        let result = detector.classify(&image, &options)?;
        println!("{} ({}us):", name, result.latency_us);
        for score in &result {
            println!("  {:<8} {:.4}", score.label, score.score);
        }
    }

    detector.unload();
    println!("\nUnloaded: {}", !detector.is_loaded());

    match detector.classify(&image, &ClassifyOptions::new()) {
        Err(e) => println!("Classify after unload: {}", e),
        Ok(_) => println!("Classify after unload unexpectedly succeeded"),
    }

    Ok(())
}
