#![deny(warnings, clippy::all)]

use clap::Parser;
use ctf_engine::pipeline::{
    connect_all_outputs, default_registry, DETAILS_SINK_CLASS, MUXER_CLASS, PACKET_SOURCE_CLASS,
    TRIMMER_CLASS,
};
use ctf_engine::prelude::*;
use ctf_engine::tracing::try_init_tracing_subscriber;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// Dump the messages of a CTF trace, one line per message
#[derive(Parser, Debug, Clone)]
#[clap(version)]
pub struct Opts {
    #[clap(flatten)]
    pub engine_opts: EngineOpts,

    /// Add offset-ns nanoseconds to the offset of the clock class that the
    /// packet source creates
    #[clap(long, name = "offset-ns", help_heading = "TRACE CONFIGURATION")]
    pub clock_class_offset_ns: Option<i64>,

    /// Add offset-s seconds to the offset of the clock class that the
    /// packet source creates
    #[clap(long, name = "offset-s", help_heading = "TRACE CONFIGURATION")]
    pub clock_class_offset_s: Option<i64>,

    /// Force the origin of the clock class that the packet source creates
    /// to the Unix epoch
    #[clap(long, name = "unix-epoch", help_heading = "TRACE CONFIGURATION")]
    pub force_clock_class_origin_unix_epoch: Option<bool>,

    /// Discard messages with times before begin-ns
    #[clap(long, name = "begin-ns", help_heading = "TRIMMING", allow_hyphen_values = true)]
    pub begin_ns: Option<i64>,

    /// Discard messages with times after end-ns
    #[clap(long, name = "end-ns", help_heading = "TRIMMING", allow_hyphen_values = true)]
    pub end_ns: Option<i64>,

    /// Path to the TOML trace layout descriptor
    #[clap(name = "layout", help_heading = "TRACE CONFIGURATION")]
    pub layout: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("A trace layout descriptor path is required.")]
    MissingLayout,
}

fn main() {
    match do_main() {
        Ok(()) => (),
        Err(e) => {
            eprintln!("{e}");
            let mut cause = e.source();
            while let Some(err) = cause {
                eprintln!("Caused by: {err}");
                cause = err.source();
            }
            std::process::exit(exitcode::SOFTWARE);
        }
    }
}

fn do_main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::parse();

    try_init_tracing_subscriber()?;

    let intr = Interruptor::new();
    let interruptor = intr.clone();
    ctrlc::set_handler(move || {
        if intr.is_set() {
            // 128 (fatal error signal "n") + 2 (control-c is fatal error signal 2)
            std::process::exit(130);
        } else {
            intr.set();
        }
    })?;

    let mut cfg = EngineConfig::load_merge_with_opts(&opts.engine_opts)?;
    if let Some(p) = opts.layout {
        cfg.read.layout = Some(p);
    }
    if let Some(ns) = opts.clock_class_offset_ns {
        cfg.read.clock_class_offset_ns = Some(ns);
    }
    if let Some(s) = opts.clock_class_offset_s {
        cfg.read.clock_class_offset_s = Some(s);
    }
    if let Some(ue) = opts.force_clock_class_origin_unix_epoch {
        cfg.read.force_clock_class_origin_unix_epoch = Some(ue);
    }
    if let Some(ns) = opts.begin_ns {
        cfg.trim.begin_ns = Some(ns);
    }
    if let Some(ns) = opts.end_ns {
        cfg.trim.end_ns = Some(ns);
    }

    let layout_path = cfg.read.layout.clone().ok_or(Error::MissingLayout)?;
    let layout = TraceLayout::load(&layout_path)?;
    if layout.stream_files.is_empty() {
        warn!(
            "Layout '{}' doesn't name any stream files",
            layout_path.display()
        );
    }
    for f in layout.stream_files.iter() {
        if !f.exists() {
            warn!("Stream file '{}' does not exist", f.display());
        }
    }

    let registry = default_registry()?;
    let mut graph = Graph::new();
    let source = graph.add_source_component(
        &registry,
        PACKET_SOURCE_CLASS,
        "source",
        &serde_json::json!({
            "layout": layout_path.display().to_string(),
            "clock-class-offset-s": cfg.read.clock_class_offset_s,
            "clock-class-offset-ns": cfg.read.clock_class_offset_ns,
            "force-clock-class-origin-unix-epoch":
                cfg.read.force_clock_class_origin_unix_epoch.unwrap_or(false),
        }),
    )?;
    let muxer =
        graph.add_filter_component(&registry, MUXER_CLASS, "muxer", &serde_json::json!({}))?;
    connect_all_outputs(&mut graph, source, muxer)?;

    let mut tail = muxer;
    if let Some((begin_ns, end_ns)) = cfg.trim_range() {
        let trimmer = graph.add_filter_component(
            &registry,
            TRIMMER_CLASS,
            "trimmer",
            &serde_json::json!({ "begin-ns": begin_ns, "end-ns": end_ns }),
        )?;
        connect_all_outputs(&mut graph, tail, trimmer)?;
        tail = trimmer;
    }

    let details =
        graph.add_sink_component(&registry, DETAILS_SINK_CLASS, "details", &serde_json::json!({}))?;
    connect_all_outputs(&mut graph, tail, details)?;

    match graph.run(&interruptor, cfg.retry_duration()) {
        // An interrupt is a clean early exit
        Err(ctf_engine::error::Error::Canceled) => Ok(()),
        res => Ok(res?),
    }
}
