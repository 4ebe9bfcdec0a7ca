use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::time::Instant;

use roi_crop::cli::Args;
use roi_crop::image_processing::{ProcessingConfig, ProcessingEngine, ProcessingResult};
use roi_crop::json_output::JsonMessage;
use roi_crop::utils::{
    create_progress_bar, error_println, format_duration, init_logging, validate_inputs,
    warn_println,
};

fn main() -> Result<()> {
    let start_time = Instant::now();
    let mut args = Args::parse();

    init_logging(args.verbose);
    args.load_and_merge_config()?;
    validate_inputs(&args)?;

    let json = args.json_progress;
    let config = ProcessingConfig {
        target: args.parse_size().map_err(|e| anyhow::anyhow!(e))?,
        roi: args.roi.into(),
        mode: args.mode.into(),
        roi_options: args.roi_options(),
        face_model: args.face_model.clone(),
        extensions: args.parse_extensions(),
        parallel_jobs: args.parallel_jobs(),
        force: args.force,
    };

    if !json {
        println!("{}", style("ROI Crop").bold().blue());
        println!("{}", style("Saliency and face guided cropping").dim());
        println!();

        if args.verbose {
            println!("{}", style("Configuration:").bold());
            println!("  Target size: {}", config.target);
            println!("  ROI strategy: {}", config.roi);
            println!("  Crop mode: {}", config.mode);
            println!("  Parallel jobs: {}", config.parallel_jobs);
            println!("  Extensions: {:?}", config.extensions);
            if config.roi.uses_faces() {
                match &config.face_model {
                    Some(path) => println!("  Face model: {}", path.display()),
                    None => println!("  Face model: none (saliency and defaults only)"),
                }
                println!(
                    "  Faces: {} (confidence >= {:.2})",
                    if config.roi_options.faces_union_all {
                        "all"
                    } else {
                        "best only"
                    },
                    config.roi_options.face_confidence
                );
            }
            println!();
        }
    }

    std::fs::create_dir_all(&args.output_dir).context("Failed to create output directory")?;

    let engine = ProcessingEngine::new(config)?;

    if engine.config().roi.uses_faces() && engine.config().face_model.is_some() && !engine.warm_up()
    {
        let message = "Face model could not be loaded, continuing without face detection";
        if json {
            tracing::warn!("{}", message);
        } else {
            warn_println(message);
        }
    }

    let image_files = engine.discover_images(&args.input_paths)?;

    if image_files.is_empty() {
        if json {
            JsonMessage::summary(0, 0, 0, 0, start_time.elapsed().as_secs_f64());
        } else {
            println!("{}", style("No images found with specified extensions").red());
        }
        return Ok(());
    }

    let total = image_files.len();
    let results = if json {
        JsonMessage::progress(0, total, "Starting");
        engine.process_batch(&image_files, &args.output_dir, |count, path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            JsonMessage::progress(count, total, name);
        })
    } else {
        let progress = create_progress_bar(total as u64);
        progress.set_message("Cropping images");
        let results = engine.process_batch(&image_files, &args.output_dir, |_, path| {
            if let Some(name) = path.file_name() {
                progress.set_message(name.to_string_lossy().into_owned());
            }
            progress.inc(1);
        });
        progress.finish_with_message("Processing complete");
        println!();
        results
    };

    engine.shutdown();

    let mut processed = 0;
    let mut skipped = 0;
    let mut failed = 0;

    for (path, result) in image_files.iter().zip(&results) {
        match result {
            Ok(result) if result.skipped => {
                skipped += 1;
                if json {
                    JsonMessage::file_skipped(&result.input_path, &result.output_path);
                }
            }
            Ok(result) => {
                processed += 1;
                if json {
                    JsonMessage::file_completed(
                        &result.input_path,
                        &result.output_path,
                        result.roi,
                        result.duration.as_millis(),
                    );
                } else if args.verbose {
                    print_result(result);
                }
            }
            Err(e) => {
                failed += 1;
                if json {
                    JsonMessage::file_failed(path, format!("{:#}", e));
                } else {
                    error_println(&format!("{:#}", e));
                }
            }
        }
    }

    let total_time = start_time.elapsed();

    if json {
        JsonMessage::summary(total, processed, skipped, failed, total_time.as_secs_f64());
        return Ok(());
    }

    println!("{}", style("Results Summary:").bold().green());
    println!(
        "  Successfully processed: {}",
        style(processed).bold().green()
    );
    if failed > 0 {
        println!("  Failed: {}", style(failed).bold().red());
    }
    if skipped > 0 {
        println!(
            "  Skipped (already exist): {}",
            style(skipped).bold().yellow()
        );
    }

    println!();
    println!("{}", style("Performance:").bold().blue());
    println!(
        "  Total processing time: {}",
        style(format_duration(total_time)).bold()
    );
    if processed > 0 {
        println!(
            "  Average time per image: {}",
            style(format_duration(total_time / processed as u32)).dim()
        );
    }
    println!("  Output directory: {}", args.output_dir.display());

    Ok(())
}

fn print_result(result: &ProcessingResult) {
    let name = result
        .input_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");
    let sizes = match (result.source_size, result.output_size) {
        (Some(source), Some(output)) => format!("{} -> {}", source, output),
        _ => String::new(),
    };
    println!(
        "  {} [{}] roi {} in {}",
        style(name).bold(),
        sizes,
        style(result.roi).cyan(),
        style(format_duration(result.duration)).dim()
    );
}
