use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use log::{info, warn, error, debug, trace};

use schelling_common::{SimulationConfig, Snapshot};
use schelling_engine::{LinearAnnealing, SchellingSimulation, ThresholdVector};

/// Batch driver: runs the model for a fixed number of iterations and saves the results.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the number of iterations from the config
    #[arg(short, long)]
    iterations: Option<u32>,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    info!("Starting Schelling Segregation Engine...");

    // --- Load Configuration ---
    let config = SimulationConfig::load(&args.config)?;
    let total_iterations = args.iterations.unwrap_or(config.timing.iterations);
    if total_iterations == 0 {
        anyhow::bail!("iterations must be greater than 0.");
    }
    let record_interval = config.timing.record_interval;
    let save_grid = config.output.save_grid_in_snapshot;

    // --- Initialize Simulation ---
    let params = config.get_model_params();
    debug!("Model Parameters: {:#?}", params);
    let mut sim = SchellingSimulation::new(params).context("Invalid model parameters")?;
    info!(
        "Grid of {}x{} homes with {} groups.",
        sim.side(),
        sim.side(),
        sim.group_count()
    );

    // --- Threshold Annealing (Optional) ---
    let annealing = match &config.annealing {
        Some(annealing_config) => {
            let end = ThresholdVector::resolve(&annealing_config.end_thresholds, sim.group_count())
                .context("Invalid annealing end thresholds")?;
            info!(
                "Annealing thresholds linearly from {:?} to {:?} over {} iterations.",
                sim.thresholds().group_values(),
                end.group_values(),
                total_iterations
            );
            Some(LinearAnnealing::new(sim.thresholds(), &end, total_iterations)?)
        }
        None => None,
    };

    // --- Initial Snapshot (iteration = 0) ---
    let initial = sim.record_snapshot(0, save_grid);
    match initial.mean_similarity {
        Some(score) => info!("Initial mean similarity: {:.4}", score),
        None => warn!("Initial mean similarity is undefined."),
    }

    info!("Starting simulation loop for {} iterations...", total_iterations);
    let start_time = Instant::now();
    let mut previous_print_time = start_time;

    for iteration in 0..total_iterations {
        if let Some(schedule) = &annealing {
            schedule.apply(iteration, sim.thresholds_mut())?;
        }

        let step_start_time = Instant::now();
        let report = match sim.step() {
            Ok(report) => report,
            Err(e) => {
                error!("Error during iteration {}: {}", iteration + 1, e);
                anyhow::bail!("Simulation step failed.");
            }
        };
        let step_duration = step_start_time.elapsed();

        let current_time = Instant::now();
        let print_interval_secs = 5.0;
        let should_print_status = current_time.duration_since(previous_print_time).as_secs_f64() >= print_interval_secs;
        let is_record_step = (iteration + 1) % record_interval == 0;
        let is_last_step = iteration == total_iterations - 1;

        if is_record_step || is_last_step {
            let snapshot = sim.record_snapshot(report.moved, save_grid);
            if should_print_status || is_last_step {
                info!(
                    "Iteration [{}/{}] | Moved: {} | Similarity: {} | Step Time: {:6.2} ms | Elapsed: {:.2} s",
                    iteration + 1,
                    total_iterations,
                    report.moved,
                    format_score(snapshot.mean_similarity),
                    step_duration.as_secs_f64() * 1000.0,
                    start_time.elapsed().as_secs_f64()
                );
                previous_print_time = current_time;
            }
        } else {
            trace!(
                "Iteration [{}/{}] completed in {:.2} ms",
                iteration + 1,
                total_iterations,
                step_duration.as_secs_f64() * 1000.0
            );
        }
    }

    let total_duration = start_time.elapsed();
    info!("Simulation finished in {:.3} seconds.", total_duration.as_secs_f64());

    // --- Save Recorded Data ---
    let base = &config.output.base_filename;
    let snapshots = sim.recorded_snapshots();
    if config.output.save_stats {
        let format = config.output.format.as_deref().unwrap_or("json");
        save_snapshots(snapshots, base, format)?;
    } else {
        info!("Skipping saving snapshots as per config (save_stats is false).");
    }

    if config.output.save_similarity_csv {
        let filename = format!("{}_similarity.csv", base);
        save_similarity_csv(snapshots, sim.group_count(), &filename)
            .with_context(|| format!("Failed to write similarity CSV '{}'", filename))?;
        info!("Similarity series saved to {}", filename);
    } else {
        info!("Skipping saving similarity series as per config.");
    }

    info!("Simulation Complete.");
    Ok(())
}

fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| String::from("undefined"), |s| format!("{:.4}", s))
}

/// Writes every recorded snapshot in the requested format.
fn save_snapshots(snapshots: &[Snapshot], base: &str, format: &str) -> Result<()> {
    match format {
        "bincode" => {
            // Binary format (much more compact), read by the visualizer
            let filename = format!("{}_snapshots.bin", base);
            let file = File::create(&filename)
                .with_context(|| format!("Error creating snapshot file '{}'", filename))?;
            let mut writer = BufWriter::new(file);
            bincode::serialize_into(&mut writer, snapshots)
                .context("Error serializing snapshots to bincode")?;
            writer.flush()?;
            info!("All snapshots saved to {} (binary format)", filename);
        }
        "messagepack" => {
            let filename = format!("{}_snapshots.msgpack", base);
            let file = File::create(&filename)
                .with_context(|| format!("Error creating snapshot file '{}'", filename))?;
            let mut writer = BufWriter::new(file);
            rmp_serde::encode::write(&mut writer, &snapshots)
                .context("Error serializing snapshots to MessagePack")?;
            writer.flush()?;
            info!("All snapshots saved to {} (MessagePack format)", filename);
        }
        other => {
            if other != "json" {
                error!("Unknown output format: {}. Using JSON instead.", other);
            }
            let filename = format!("{}_snapshots.json", base);
            let json_string = serde_json::to_string(snapshots)
                .context("Error serializing snapshots to JSON")?;
            let mut file = File::create(&filename)
                .with_context(|| format!("Error creating snapshot file '{}'", filename))?;
            file.write_all(json_string.as_bytes())
                .with_context(|| format!("Error writing snapshot JSON to file '{}'", filename))?;
            info!("All snapshots saved to {}", filename);
        }
    }
    Ok(())
}

/// One row per snapshot: iteration, score, moves and the thresholds in force.
fn save_similarity_csv(snapshots: &[Snapshot], group_count: usize, filename: &str) -> Result<()> {
    let mut writer = csv::Writer::from_path(filename)?;

    let mut header = vec![
        String::from("iteration"),
        String::from("mean_similarity"),
        String::from("moves"),
    ];
    header.extend((1..=group_count).map(|g| format!("threshold_{}", g)));
    writer.write_record(&header)?;

    for snapshot in snapshots {
        let mut record = vec![
            snapshot.iteration.to_string(),
            snapshot.mean_similarity.map(|s| format!("{:.6}", s)).unwrap_or_default(),
            snapshot.moves.to_string(),
        ];
        record.extend(snapshot.thresholds.iter().map(|t| format!("{:.4}", t)));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
