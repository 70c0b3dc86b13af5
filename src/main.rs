use anyhow::Result;
use clap::Parser;
use log::{debug, error, info, trace, warn};
use rayon::prelude::*;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use potts_common::{OutputConfig, SimulationConfig, Snapshot};
use potts_engine::{Simulation, StepStats};

/// Cellular Potts Model simulation driver.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration.
    #[arg(default_value = "config.toml")]
    config: PathBuf,

    /// Independent runs with consecutive seeds, executed in parallel.
    #[arg(short, long, default_value_t = 1)]
    replicates: u32,

    /// Overrides `timing.total_steps`.
    #[arg(short, long)]
    steps: Option<u32>,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    info!("Starting Potts engine...");

    // --- Load Configuration ---
    let mut config = SimulationConfig::load(&args.config)?;
    if let Some(steps) = args.steps {
        config.timing.total_steps = steps;
    }
    info!("Loaded configuration from {}", args.config.display());

    if args.replicates <= 1 {
        return run(config, None);
    }

    info!("Running {} replicates on {} Rayon threads.", args.replicates, rayon::current_num_threads());
    (0..args.replicates)
        .into_par_iter()
        .map(|replicate| {
            let mut config = config.clone();
            config.potts.seed = config.potts.seed.wrapping_add(replicate as u64);
            run(config, Some(replicate))
        })
        .collect::<Result<Vec<()>>>()?;
    info!("All replicates complete.");
    Ok(())
}

/// Runs one simulation to completion and writes its outputs.
fn run(config: SimulationConfig, replicate: Option<u32>) -> Result<()> {
    let label = replicate.map_or_else(String::new, |r| format!("[replicate {}] ", r));
    let base_filename = match replicate {
        Some(r) => format!("{}_r{}", config.output.base_filename, r),
        None => config.output.base_filename.clone(),
    };

    // --- Initialize Simulation ---
    let mut sim = Simulation::new(config)?;
    info!("{}Initialized with {} cells (seed {}).", label, sim.cell_count(), sim.params().seed);
    debug!("Simulation Parameters: {:#?}", sim.params());

    let total_steps = sim.config().timing.total_steps;
    let mut record_interval_steps = sim.config().timing.record_interval_steps;
    if record_interval_steps == 0 {
        warn!("{}Record interval is zero. Recording every step.", label);
        record_interval_steps = 1;
    }
    let keep_lattice = sim.config().output.save_lattice_in_snapshot;
    info!("{}Recording snapshot every {} steps.", label, record_interval_steps);

    // --- Initial Snapshot (step = 0) ---
    let mut snapshots = vec![recorded(&sim, keep_lattice)];
    let mut step_stats: Vec<StepStats> = Vec::with_capacity(total_steps as usize);

    info!("{}Starting simulation loop for {} steps...", label, total_steps);
    let start_time = Instant::now();
    let mut previous_print_time = start_time;

    for step in 0..total_steps {
        let step_start_time = Instant::now();
        let stats = match sim.advance(1) {
            Ok(mut history) => history.pop().unwrap_or_default(),
            Err(e) => {
                error!("{}Error during simulation step {}: {}", label, step + 1, e);
                anyhow::bail!("Simulation step failed: {}", e);
            }
        };
        let step_duration = step_start_time.elapsed();
        step_stats.push(stats);

        let current_time = Instant::now();
        let should_print_status = current_time.duration_since(previous_print_time).as_secs_f64() >= 5.0;
        let is_record_step = (step + 1) % record_interval_steps == 0;
        let is_last_step = step + 1 == total_steps;

        if should_print_status || is_record_step || is_last_step {
            info!(
                "{}Step [{}/{}] | Cells: {} | Accepted: {} | Divisions: {} | Removals: {} | Step Time: {:6.2} ms | Elapsed: {:.2} s",
                label,
                step + 1,
                total_steps,
                sim.cell_count(),
                stats.sweep.accepted,
                stats.divisions,
                stats.removals,
                step_duration.as_secs_f64() * 1000.0,
                start_time.elapsed().as_secs_f64()
            );
            previous_print_time = current_time;
            if is_record_step || is_last_step {
                snapshots.push(recorded(&sim, keep_lattice));
            }
        } else {
            trace!(
                "{}Step [{}/{}] completed in {:.2} ms",
                label,
                step + 1,
                total_steps,
                step_duration.as_secs_f64() * 1000.0
            );
        }
    }

    let total_duration = start_time.elapsed();
    info!(
        "{}Simulation finished in {:.3} seconds ({} accepted flips).",
        label,
        total_duration.as_secs_f64(),
        sim.accepted_flips()
    );

    // --- Save Recorded Data ---
    let output = sim.config().output.clone();
    if output.save_stats {
        write_snapshots(&snapshots, &output, &base_filename)?;
        write_step_stats(&step_stats, &base_filename)?;
    } else {
        info!("{}Skipping saving snapshots as per config (save_stats is false).", label);
    }
    if output.save_final_cells {
        write_final_cells(&sim.snapshot(), &base_filename)?;
    } else {
        info!("{}Skipping saving final cells as per config.", label);
    }

    info!("{}Simulation Complete.", label);
    Ok(())
}

fn recorded(sim: &Simulation, keep_lattice: bool) -> Snapshot {
    let mut snapshot = sim.snapshot();
    if !keep_lattice {
        snapshot.lattice = None;
    }
    snapshot
}

fn write_json(snapshots: &[Snapshot], filename: &str) -> Result<()> {
    let json_string = serde_json::to_string(snapshots)?;
    let mut file = File::create(filename)
        .map_err(|e| anyhow::anyhow!("Error creating snapshot file '{}': {}", filename, e))?;
    file.write_all(json_string.as_bytes())?;
    info!("All snapshots saved to {} ({}MB)", filename, json_string.len() / 1_048_576);
    Ok(())
}

fn write_snapshots(snapshots: &[Snapshot], output: &OutputConfig, base_filename: &str) -> Result<()> {
    let output_format = output.format.as_deref().unwrap_or("json");
    match output_format {
        "json" => write_json(snapshots, &format!("{}_snapshots.json", base_filename))?,
        "bincode" => {
            // Binary format (much more compact)
            let filename = format!("{}_snapshots.bin", base_filename);
            let file = File::create(&filename)
                .map_err(|e| anyhow::anyhow!("Error creating snapshot file '{}': {}", filename, e))?;
            bincode::serialize_into(file, snapshots)?;
            info!("All snapshots saved to {} (binary format)", filename);
        }
        "messagepack" => {
            // MessagePack format (compact and cross-platform)
            let filename = format!("{}_snapshots.msgpack", base_filename);
            let mut file = File::create(&filename)
                .map_err(|e| anyhow::anyhow!("Error creating snapshot file '{}': {}", filename, e))?;
            rmp_serde::encode::write(&mut file, snapshots)?;
            info!("All snapshots saved to {} (MessagePack format)", filename);
        }
        _ => {
            error!("Unknown output format: {}. Using JSON instead.", output_format);
            write_json(snapshots, &format!("{}_snapshots.json", base_filename))?;
        }
    }
    Ok(())
}

fn write_step_stats(step_stats: &[StepStats], base_filename: &str) -> Result<()> {
    let filename = format!("{}_step_stats.json", base_filename);
    let file = File::create(&filename)
        .map_err(|e| anyhow::anyhow!("Error creating step stats file '{}': {}", filename, e))?;
    serde_json::to_writer(std::io::BufWriter::new(file), step_stats)?;
    info!("Step statistics saved to {}", filename);
    Ok(())
}

fn write_final_cells(snapshot: &Snapshot, base_filename: &str) -> Result<()> {
    let filename = format!("{}_final_cells.csv", base_filename);
    let mut writer = csv::Writer::from_path(&filename)
        .map_err(|e| anyhow::anyhow!("Error saving CSV file '{}': {}", filename, e))?;
    writer.write_record([
        "id", "parent", "population", "state", "phase", "volume", "surface", "centroid_x", "centroid_y", "centroid_z",
        "age", "divisions",
    ])?;
    for cell in &snapshot.cells {
        writer.write_record(&[
            cell.id.to_string(),
            cell.parent.to_string(),
            cell.population.clone(),
            cell.state.name().to_string(),
            format!("{:?}", cell.phase),
            cell.volume.to_string(),
            cell.surface.to_string(),
            format!("{:.4}", cell.centroid[0]),
            format!("{:.4}", cell.centroid[1]),
            format!("{:.4}", cell.centroid[2]),
            cell.age.to_string(),
            cell.divisions.to_string(),
        ])?;
    }
    writer.flush()?;
    info!("Final cells saved to {}", filename);
    Ok(())
}
