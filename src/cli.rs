// ============================================================================
// MedLayers CLI: headless segmentation and overlay rendering
// ============================================================================
//
// Usage examples:
//   MedLayers -i scan.png --output-dir out/
//   MedLayers -i "fundus/*.jpg" --output-dir out/ --threshold 90 --save-masks
//   MedLayers -i a.png b.png --output-dir out/ --mask-opacity 0.3 --scale 0.5
//
// Every input becomes one journal record. Segmentation runs on worker threads;
// the layer model, the viewer and all file output stay on the main thread.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use kurbo::Size;

use crate::error::{Result, VisionError};
use crate::inference::{InferenceQueue, ThresholdSegmenter};
use crate::io::{ImageFileLoader, LoadOptions, Loader, save_layer_image, save_rgba};
use crate::journal::{IllustratedJournal, Journal, Record};
use crate::layer::Visibility;
use crate::settings::ViewerSettings;
use crate::{log_err, log_info};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// MedLayers headless overlay renderer.
///
/// Segment images and write the composited image + mask view, no GUI required.
#[derive(Parser, Debug)]
#[command(
    name = "MedLayers",
    about = "MedLayers headless segmentation and overlay renderer",
    long_about = "Load images into a journal, segment each one in the background and\n\
                  write the composited layer view (image + mask overlay) as PNG.\n\n\
                  Example:\n  \
                  MedLayers -i scan.png --output-dir out/\n  \
                  MedLayers -i \"fundus/*.jpg\" --output-dir out/ --threshold 90 --save-masks"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "scans/*.tif").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Directory for rendered views (and masks with --save-masks).
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Intensity threshold of the segmenter (0-255 for 8-bit input).
    #[arg(short, long, default_value_t = 128.0, value_name = "T")]
    pub threshold: f32,

    /// Opacity of the mask overlay. Defaults to the `mask_opacity` setting.
    #[arg(long, value_name = "0-1")]
    pub mask_opacity: Option<f32>,

    /// Output scale relative to the image resolution.
    #[arg(long, default_value_t = 1.0, value_name = "S")]
    pub scale: f64,

    /// Also write the raw mask labels as `<stem>_mask.png`.
    #[arg(long)]
    pub save_masks: bool,

    /// Settings file to use instead of the per-user one.
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Print per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }
    if !(args.scale > 0.0) {
        eprintln!("error: --scale must be positive, got {}.", args.scale);
        return ExitCode::FAILURE;
    }

    let settings = match &args.settings {
        Some(path) => match ViewerSettings::load_from(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: could not read settings '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => ViewerSettings::load(),
    };

    if let Err(e) = std::fs::create_dir_all(&args.output_dir) {
        eprintln!(
            "error: could not create output directory '{}': {}",
            args.output_dir.display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let started = Instant::now();
    let mut any_failure = false;

    // -- Step 1: Load ----------------------------------------------------
    let journal = Journal::new();
    let loader = ImageFileLoader;
    let visibility = Visibility::new(true, settings.default_layer_opacity);
    let total = inputs.len();
    for (idx, path) in inputs.iter().enumerate() {
        if args.verbose {
            println!("[{}/{}] loading {}", idx + 1, total, path.display());
        }
        let loaded = loader
            .load(path, &LoadOptions::default())
            .and_then(|image| Record::from_image_with(image, visibility))
            .and_then(|record| journal.add_record(record));
        if let Err(e) = loaded {
            eprintln!("  error: {}", e);
            log_err!("CLI: {}", e);
            any_failure = true;
        }
    }
    if journal.is_empty() {
        return ExitCode::FAILURE;
    }

    // -- Step 2: Segment off-thread --------------------------------------
    let mut queue = InferenceQueue::new(
        Arc::new(ThresholdSegmenter::new(args.threshold)),
        settings.mask_palette(),
    );
    for record in journal.records() {
        if let Err(e) = queue.submit(&journal, record.id(), &settings.mask_layer_name) {
            eprintln!("  error: {}: {}", record.name(), e);
            any_failure = true;
        }
    }
    let report = queue.wait_all(&journal);
    if report.failed > 0 {
        any_failure = true;
    }
    log_info!(
        "CLI: segmentation installed {}, dropped {}, failed {}",
        report.installed,
        report.dropped,
        report.failed
    );

    // -- Step 3: Render each record --------------------------------------
    let mask_opacity = args.mask_opacity.unwrap_or(settings.mask_opacity);
    let illustrated = IllustratedJournal::new(journal.clone(), &settings, Size::ZERO);
    let records = journal.records();
    let stems = unique_stems(&records);
    for (record, stem) in records.iter().zip(&stems) {
        let file_start = Instant::now();
        match render_record(&illustrated, record, stem, &settings, mask_opacity, &args) {
            Ok(output) => {
                if args.verbose {
                    println!(
                        "  → {} ({:.0}ms)",
                        output.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}: {}", record.name(), e);
                log_err!("CLI: {}: {}", record.name(), e);
                any_failure = true;
            }
        }
    }

    if args.verbose {
        println!(
            "{} record(s) in {:.0}ms",
            journal.len(),
            started.elapsed().as_secs_f64() * 1000.0
        );
    }
    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-record rendering
// ============================================================================

fn render_record(
    illustrated:  &IllustratedJournal,
    record:       &Record,
    stem:         &str,
    settings:     &ViewerSettings,
    mask_opacity: f32,
    args:         &CliArgs,
) -> Result<PathBuf> {
    illustrated.select_record(Some(record))?;
    let viewer = illustrated.viewer();

    let (rows, cols) = viewer
        .footprint()
        .ok_or_else(|| VisionError::NotFound(format!("record {} has no image", record.name())))?;
    illustrated.set_viewport(Size::new(cols as f64 * args.scale, rows as f64 * args.scale));

    if let Some(view) = viewer.layer_view_by_name(&settings.mask_layer_name) {
        view.set_opacity(mask_opacity);
    }

    let bitmap = viewer
        .render_scaled()?
        .ok_or_else(|| VisionError::NotFound(format!("record {} has nothing to show", record.name())))?;
    let output = args.output_dir.join(format!("{}.png", stem));
    save_rgba(&bitmap, &output)?;

    if args.save_masks {
        let mask_path = args.output_dir.join(format!("{}_mask.png", stem));
        save_layer_image(record.layered_image(), &settings.mask_layer_name, &mask_path)?;
    }
    Ok(output)
}

/// Output stem per record: the input file stem, with `_2`, `_3`, ... added
/// to repeats so inputs from different directories never overwrite each other.
fn unique_stems(records: &[Record]) -> Vec<String> {
    let mut used: Vec<String> = Vec::with_capacity(records.len());
    for record in records {
        let stem = output_stem(record);
        let mut candidate = stem.clone();
        let mut n = 1;
        while used.contains(&candidate) {
            n += 1;
            candidate = format!("{}_{}", stem, n);
        }
        used.push(candidate);
    }
    used
}

/// Input file stem, or the record id for records without a path.
fn output_stem(record: &Record) -> String {
    record
        .layered_image()
        .base_layer()
        .and_then(|l| l.image())
        .and_then(|i| i.path())
        .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| record.id().to_string())
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}
