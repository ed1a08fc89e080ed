use annotrack::analysis::report::{collect_samples, generate_variance_report};
use annotrack::cli::Args;
use annotrack::config::{self, EditorSettings, PathConfig};
use annotrack::core::model_events::AnimationStoppedEvent;
use annotrack::session::Session;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

fn init_logging(args: &Args, paths: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| paths.data_file(config::LOG_FILE));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("failed to create log file {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// Drive the session on a simulated clock until `seconds` pass or playback ends.
/// Returns the number of plot frames produced.
fn simulate_playback(session: &mut Session, seconds: f64) -> usize {
    let stopped = Arc::new(AtomicBool::new(false));
    let flag = stopped.clone();
    session.bus().subscribe::<AnimationStoppedEvent, _>(move |_| {
        flag.store(true, Ordering::SeqCst);
    });

    let step = session.settings().animation_interval().max(Duration::from_millis(1));
    let total = Duration::from_secs_f64(seconds.max(0.0));
    let t0 = Instant::now();
    let mut elapsed = Duration::ZERO;
    let mut frames = 0;

    session.model_mut().start_animation_at(t0);
    while elapsed <= total && !stopped.load(Ordering::SeqCst) {
        if session.pump(t0 + elapsed).is_some() {
            frames += 1;
        }
        elapsed += step;
    }
    if session.model().is_in_animation() {
        session.model_mut().stop_animation(false);
    }
    // Flush the stop notification and the final redraw
    session.pump(t0 + elapsed + session.settings().redraw_interval());
    frames
}

fn main() -> Result<()> {
    // Parse command-line arguments first (needed for log setup)
    let args = Args::parse();

    // Create path configuration from CLI args and environment
    let paths = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = paths.ensure_dirs() {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }

    init_logging(&args, &paths)?;

    info!("annotrack starting...");
    debug!("Command-line args: {:?}", args);
    info!("Config path: {}", paths.config_file(config::SETTINGS_FILE).display());

    let settings = EditorSettings::load(&paths);
    let mut session = Session::new(settings);

    session
        .open_recording(&args.recording)
        .with_context(|| format!("failed to open recording {}", args.recording.display()))?;
    session.model_mut().set_label_mode(args.mode);

    for dir in &args.images {
        match session.add_image_dir(dir) {
            Ok(n) => info!("{}: {} frames", dir.display(), n),
            Err(e) => warn!("image directory {}: {}", dir.display(), e),
        }
    }

    if let Some((start, end)) = args.crop_range() {
        info!("cropping to [{}, {})", start, end);
        session.model_mut().load_into_memory(start, end);
    }
    session.pump(Instant::now());

    if let Some(path) = &args.import_labels {
        let n = session
            .import_labels(path)
            .with_context(|| format!("failed to import labels from {}", path.display()))?;
        info!("imported {} segments from {}", n, path.display());
    }

    let mut played_frames = 0;
    if let Some(seconds) = args.play {
        played_frames = simulate_playback(&mut session, seconds);
        info!("playback: {} plot frames, cursor at {}", played_frames, session.model().animation_step());
    }

    if args.store && !session.model_mut().store_labels() {
        anyhow::bail!("storing labels into {} failed", args.recording.display());
    }

    if let Some(path) = &args.export_labels {
        let n = session
            .export_labels(path)
            .with_context(|| format!("failed to export labels to {}", path.display()))?;
        info!("exported {} segments to {}", n, path.display());
    }

    let mut report = None;
    if let Some(dir) = &args.report {
        let input = collect_samples(dir).with_context(|| format!("failed to scan {}", dir.display()))?;
        let out = args.report_out.as_deref().unwrap_or(dir);
        report = Some(
            generate_variance_report(&input, out, |path| info!("variance report done: {}", path.display()))
                .context("variance report failed")?,
        );
    }

    // Summary
    let model = session.model();
    let mode = model.label_mode();
    let (xmin, xmax) = session.timeline().view_range();
    println!("recording: {}", args.recording.display());
    println!("samples:   {}", model.len());
    println!("mode:      {}", mode);
    println!("segments:  {}", model.labels(mode).count());
    for (start, end, name) in model.label_triples(mode) {
        println!("  [{start}, {end}) {name}");
    }
    println!("view:      [{xmin}, {xmax})");
    if args.play.is_some() {
        println!("playback:  {} frames, cursor {}", played_frames, model.animation_step());
    }
    for (i, frame) in session.shown_frames().iter().enumerate() {
        match frame {
            Some(p) => println!("camera {i}:  {}", p.display()),
            None => println!("camera {i}:  -"),
        }
    }
    if let Some((path, rows)) = report {
        println!("report:    {} ({} rows)", path.display(), rows);
    }
    Ok(())
}
