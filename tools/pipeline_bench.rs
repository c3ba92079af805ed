// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Pipeline throughput driver.
//!
//! Loads `mmprep.toml` (or defaults when none is found), applies command-line
//! overrides, builds `ExternalSource -> ToTensor -> ResizeCrop -> Normalize`
//! and pushes synthetic frames through it.
//!
//! Debug logging per crate: `--debug-mmprep-pipeline`, `--debug-all` or
//! `MMPREP_DEBUG=...`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use mmprep::config::{
    apply_cli_overrides, apply_environment_overrides, load_config, validate_config, ConfigError, MmprepConfig,
};
use mmprep::observability::parse_debug_flags;
use mmprep::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "pipeline_bench", about = "Measure preprocessing pipeline throughput")]
struct Args {
    /// Config file (default: search for mmprep.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    num_threads: Option<usize>,

    #[arg(long)]
    queue_depth: Option<usize>,

    /// Run the operator chain unfused
    #[arg(long)]
    no_fusion: bool,

    /// Extra overrides, e.g. `--set logging.level=debug`
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Timed iterations
    #[arg(long, default_value_t = 100)]
    iterations: usize,

    #[arg(long, default_value_t = 8)]
    warmup: usize,

    #[arg(long, default_value_t = 480)]
    height: usize,

    #[arg(long, default_value_t = 640)]
    width: usize,

    /// Resize target as HEIGHT,WIDTH
    #[arg(long, value_delimiter = ',', num_args = 2, default_values_t = [256i64, 256])]
    resize: Vec<i64>,

    /// Crop size as HEIGHT,WIDTH
    #[arg(long, value_delimiter = ',', num_args = 2, default_values_t = [224i64, 224])]
    crop: Vec<i64>,
}

impl Args {
    fn cli_overrides(&self) -> Result<HashMap<String, String>> {
        let mut cli = HashMap::new();
        if let Some(v) = self.batch_size {
            cli.insert("pipeline.batch_size".to_string(), v.to_string());
        }
        if let Some(v) = self.num_threads {
            cli.insert("pipeline.num_threads".to_string(), v.to_string());
        }
        if let Some(v) = self.queue_depth {
            cli.insert("pipeline.queue_depth".to_string(), v.to_string());
        }
        if self.no_fusion {
            cli.insert("pipeline.enable_fusion".to_string(), "false".to_string());
        }
        for entry in &self.overrides {
            let Some((key, value)) = entry.split_once('=') else {
                bail!("override '{}' is not KEY=VALUE", entry);
            };
            cli.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(cli)
    }
}

fn load(args: &Args) -> Result<MmprepConfig> {
    let cli = args.cli_overrides()?;
    let config = match load_config(args.config.as_deref(), Some(&cli)) {
        Ok(config) => config,
        Err(ConfigError::FileNotFound(_)) if args.config.is_none() => {
            let mut config = MmprepConfig::default();
            apply_environment_overrides(&mut config);
            apply_cli_overrides(&mut config, &cli)?;
            config
        }
        Err(e) => return Err(e).context("Failed to load configuration"),
    };
    validate_config(&config)?;
    Ok(config)
}

fn preprocess_specs(args: &Args) -> Vec<OpSpec> {
    vec![
        OpSpec::new("ExternalSource").with_output("raw", "cpu"),
        OpSpec::new("ToTensor")
            .with_input("raw", "cpu")
            .with_output("t", "cpu")
            .with_arg("layout", 0i64),
        OpSpec::new("ResizeCrop")
            .with_input("t", "cpu")
            .with_output("rc", "cpu")
            .with_arg("resize", args.resize.clone())
            .with_arg("crop", args.crop.clone()),
        OpSpec::new("Normalize")
            .with_input("rc", "cpu")
            .with_output("n", "cpu")
            .with_arg("mean", vec![0.485f32, 0.456, 0.406])
            .with_arg("stddev", vec![0.229f32, 0.224, 0.225]),
    ]
}

fn synthetic_frames(batch: usize, height: usize, width: usize) -> TensorList {
    let data = ndarray::ArrayD::from_shape_fn(ndarray::IxDyn(&[batch, height, width, 3]), |idx| {
        ((idx[0] * 17 + idx[1] + idx[2] * 2 + idx[3] * 85) % 256) as u8
    });
    TensorList::from_tensors(vec![Tensor::new(data, TensorLayout::Nhwc)])
}

fn main() -> Result<()> {
    // Per-crate debug flags are read by the observability crate, not clap.
    let args = Args::parse_from(std::env::args().filter(|a| !a.starts_with("--debug-")));
    let config = load(&args)?;

    let debug_flags = parse_debug_flags();
    #[cfg(feature = "file-logging")]
    let _log_guard = mmprep::observability::init_file_logging(&debug_flags, &config.logging)?;
    #[cfg(not(feature = "file-logging"))]
    mmprep::observability::init_logging(&debug_flags, &config.logging)?;

    let context = Arc::new(PipelineContext::with_builtin_ops()?);
    let mut pipeline = Pipeline::from_config(context, &config.pipeline)?;
    pipeline.build(preprocess_specs(&args), &["n"])?;
    if let Some(summary) = pipeline.graph_summary() {
        println!("{}", summary);
    }

    let frames = synthetic_frames(pipeline.batch_size(), args.height, args.width);
    let feed = || HashMap::from([("raw".to_string(), frames.clone())]);

    for _ in 0..args.warmup {
        pipeline.run_and_fetch(feed(), false)?;
    }

    let start = Instant::now();
    for _ in 0..args.iterations {
        pipeline.run_and_fetch(feed(), false)?;
    }
    let elapsed = start.elapsed();

    let batches_per_sec = args.iterations as f64 / elapsed.as_secs_f64();
    let frames_per_sec = batches_per_sec * pipeline.batch_size() as f64;
    info!(
        iterations = args.iterations,
        elapsed_ms = elapsed.as_millis() as u64,
        batches_per_sec,
        frames_per_sec,
        "benchmark finished"
    );
    println!(
        "{} iterations in {:.2?}: {:.1} batches/s, {:.1} frames/s (batch {}, threads {}, fusion {})",
        args.iterations,
        elapsed,
        batches_per_sec,
        frames_per_sec,
        pipeline.batch_size(),
        pipeline.num_threads(),
        pipeline.fusion_enabled()
    );
    Ok(())
}
