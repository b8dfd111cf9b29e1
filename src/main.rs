// src/main.rs

//! Thin driver: open the matrix, run every round, close the matrix.

use anyhow::Context;
use log::{debug, error, info};

use sense_sched::config::CONFIG;
use sense_sched::sched::priority::NicePriority;
use sense_sched::sched::work::BusyLoop;
use sense_sched::{Demonstrator, LedMatrix};

fn main() -> anyhow::Result<()> {
    // Default filter is "info" if RUST_LOG is not set.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    info!("Starting sense-sched...");
    debug!(
        "Configuration: {}",
        serde_json::to_string(&*CONFIG).unwrap_or_default()
    );

    let mut matrix = LedMatrix::open(&CONFIG.device)
        .map_err(|e| {
            error!("Failed to initialize LED matrix: {}", e);
            e
        })
        .context("Failed to initialize LED matrix")?;

    let experiment = &CONFIG.experiment;
    let outcome = {
        let demo = Demonstrator::new(
            &matrix,
            BusyLoop::new(experiment.work_iterations),
            NicePriority::new(experiment.nice_step),
            experiment.worker_color.to_rgb565(),
        );
        matrix
            .clear()
            .map_err(anyhow::Error::from)
            .and_then(|()| demo.run_all(experiment).map_err(anyhow::Error::from))
    };

    if outcome.is_err() {
        // A failed round may have left LEDs on.
        if let Err(e) = matrix.clear() {
            error!("Could not clear LED matrix: {}", e);
        }
    }

    let closed = matrix.close().map_err(|e| {
        error!("Could not properly close LED matrix: {}", e);
        e
    });

    let reports = outcome.context("Experiment aborted")?;
    closed.context("Could not properly close LED matrix")?;

    info!("Completed {} rounds, sense-sched exiting.", reports.len());
    Ok(())
}
