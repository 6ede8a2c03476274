use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use arrow::util::pretty::pretty_format_batches;
use mt_core::events::events::{DataImportFailed, Notice, VideoClipChanged};
use mt_core::{
    handler_from_fn, CancelFlag, TrackerContext, TrackerSettings, VideoClip, VideoClipHandle, VideoPlayer,
};
use mt_data::{ColumnPairingResolver, CsvSource, ExternalSource, ImportConfig, ImportWorker};
use mt_track::{Track, TrackSet};
use tracing::{info, warn};

/// Options for `mtrack load`
#[derive(Debug, Default)]
pub struct LoadOptions {
    pub frames: Option<usize>,
    pub frame_ms: Option<f64>,
    pub start_frame: usize,
    pub stride: Option<usize>,
    pub start_index: Option<usize>,
    pub use_data_time: bool,
    pub settings: Option<PathBuf>,
    pub save: Option<PathBuf>,
    pub rows: usize,
    pub import: ImportConfig,
}

/// Describe a data file's columns and the points the resolver finds in it
pub async fn inspect(path: &Path, config: &ImportConfig) -> Result<String> {
    let source = CsvSource::new(path);
    let table = source
        .load(config, &CancelFlag::new())
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut out = String::new();
    writeln!(out, "{}: {} datasets", table.name, table.datasets.len())?;
    for dataset in &table.datasets {
        writeln!(
            out,
            "  dataset {} vs {} ({} rows)",
            dataset.y_column_name(),
            dataset.x_column_name(),
            dataset.y.row_count()
        )?;
    }

    match ColumnPairingResolver::new().probe(&table) {
        Some(resolved) => {
            for (pair, name) in resolved.pairs.iter().zip(resolved.display_names()) {
                writeln!(out, "  point {:<17} x={} y={}", name, pair.x.name, pair.y.name)?;
            }
            match &resolved.time {
                Some(time) => writeln!(out, "  time column {}", time.name)?,
                None => writeln!(out, "  no time column")?,
            }
        }
        None => writeln!(out, "  no x/y column pairs found")?,
    }
    Ok(out)
}

fn load_settings(path: Option<&Path>) -> Result<TrackerSettings> {
    match path {
        Some(path) => TrackerSettings::from_json_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => Ok(TrackerSettings::default()),
    }
}

fn log_events(context: &TrackerContext) {
    let bus = &context.event_bus;
    bus.subscribe::<Notice>(handler_from_fn(|event| {
        if let Some(notice) = event.downcast_ref::<Notice>() {
            info!("{}: {}", notice.title, notice.message);
        }
    }));
    bus.subscribe::<VideoClipChanged>(handler_from_fn(|event| {
        if let Some(change) = event.downcast_ref::<VideoClipChanged>() {
            info!(
                "video clip now ends at frame {} ({} padding frames)",
                change.end_frame, change.extra_frames
            );
        }
    }));
    bus.subscribe::<DataImportFailed>(handler_from_fn(|event| {
        if let Some(failure) = event.downcast_ref::<DataImportFailed>() {
            warn!("could not import {}: {}", failure.source_name, failure.error);
        }
    }));
}

fn apply_options(track: &mut Track, options: &LoadOptions) -> Result<()> {
    if let Some(stride) = options.stride {
        track.set_stride(stride)?;
    }
    if let Some(index) = options.start_index {
        track.set_start_index(index)?;
    }
    track.set_start_frame(options.start_frame)?;
    if options.use_data_time && !track.set_use_data_time(true)? {
        warn!("{} has no usable time column; keeping video time", track.name());
    }
    Ok(())
}

/// Import a data file into a new data track and describe the result
pub async fn load(path: &Path, options: &LoadOptions) -> Result<String> {
    let settings = load_settings(options.settings.as_deref())?;
    let frame_ms = options.frame_ms.unwrap_or(settings.default_frame_duration_ms);
    let context = TrackerContext::new(settings);
    log_events(&context);

    let clip = match options.frames {
        Some(frames) => VideoClip::new(frames),
        None => VideoClip::without_video(),
    };
    context.attach_player(VideoPlayer::new(clip, frame_ms));

    let source: Arc<dyn ExternalSource> = Arc::new(CsvSource::new(path));
    let worker = ImportWorker::spawn(source, options.import.clone(), CancelFlag::new());
    let outcome = worker.finish().await;

    let mut tracks = TrackSet::new(context.clone());
    let id = tracks
        .commit_import(outcome, None)
        .with_context(|| format!("Failed to import {}", path.display()))?
        .ok_or_else(|| anyhow!("Import of {} was cancelled", path.display()))?;

    let track = tracks
        .get_mut(id)
        .ok_or_else(|| anyhow!("Imported track {} is missing", id))?;
    apply_options(track, options)?;

    let mut out = String::new();
    describe_track(&mut out, track)?;
    if let Some(player) = context.player.read().as_ref() {
        let clip = player.clip();
        writeln!(
            out,
            "video: frames {}..={} ({} padding), {:.3} ms per step",
            clip.start_frame_number(),
            clip.end_frame_number(),
            clip.extra_frames(),
            player.mean_step_duration()
        )?;
    }

    if options.rows > 0 {
        let data = track.data()?;
        let rows = options.rows.min(data.row_count());
        let table = pretty_format_batches(&[data.batch().slice(0, rows)])?;
        writeln!(out, "{}", table)?;
    }

    if let Some(save) = &options.save {
        tracks
            .to_document()
            .save(save)
            .with_context(|| format!("Failed to save session to {}", save.display()))?;
        info!("saved session to {}", save.display());
    }
    Ok(out)
}

fn describe_track(out: &mut String, track: &Track) -> Result<()> {
    writeln!(
        out,
        "track {} ({}) with {} rows, start frame {}",
        track.name(),
        track.kind().type_name(),
        track.data_length(),
        track.start_frame()
    )?;
    let points: Vec<String> = track.all_points().iter().map(|p| p.full_name()).collect();
    writeln!(out, "points: {}", points.join(", "))?;
    if let Some(clip) = track.data_clip() {
        writeln!(
            out,
            "data clip: start index {}, stride {}, {} of {} rows shown",
            clip.start_index(),
            clip.stride(),
            clip.available_clip_length(),
            clip.data_length()
        )?;
    }
    if track.use_data_time() {
        writeln!(out, "clock: data time from {:.3} s", track.initial_time().unwrap_or(f64::NAN))?;
    }
    Ok(())
}
