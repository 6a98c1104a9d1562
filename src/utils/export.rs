//! Session export written at shutdown.
//!
//! Two outputs in the export directory:
//! - `session_history.csv`: every sample of the session (time, setpoint, measurement).
//! - `session_summary.csv`: metric,value,description rows: temperature stats, tracking error,
//!   per-task counters and buffer occupancy.

use std::{
    fs::{File, create_dir_all},
    io::BufWriter,
    path::{Path, PathBuf},
};

use csv::Writer;
use log::info;

use crate::acquisition::sample_buffer::Sample;
use crate::utils::{
    error::Result,
    metrics::{TaskHealth, calculate_stats},
};

pub const HISTORY_FILE: &str = "session_history.csv";
pub const SUMMARY_FILE: &str = "session_summary.csv";

/// Writes the full sample history. Returns the file path.
pub fn export_history(directory: &Path, samples: &[Sample]) -> Result<PathBuf> {
    create_dir_all(directory)?;
    let path = directory.join(HISTORY_FILE);
    let mut wtr = Writer::from_writer(BufWriter::new(File::create(&path)?));
    for sample in samples {
        wtr.serialize(sample)?;
    }
    wtr.flush()?;
    info!("[Export] {} samples written to {}", samples.len(), path.display());
    Ok(path)
}

/// Inputs for the run summary.
pub struct SessionSummary<'a> {
    pub samples: &'a [Sample],
    pub capacity: usize,
    pub controller: &'a str,
    pub acquisition: &'a TaskHealth,
    pub control: &'a TaskHealth,
}

pub fn export_summary(directory: &Path, summary: &SessionSummary<'_>) -> Result<PathBuf> {
    create_dir_all(directory)?;
    let path = directory.join(SUMMARY_FILE);
    let mut wtr = Writer::from_writer(BufWriter::new(File::create(&path)?));
    wtr.write_record(["metric", "value", "description"])?;

    let mut row = |metric: &str, value: String, description: &str| {
        wtr.write_record([metric, value.as_str(), description])
    };

    row("samples", summary.samples.len().to_string(), "Samples recorded")?;
    row("buffer_capacity", summary.capacity.to_string(), "Sample buffer capacity at shutdown")?;
    row("controller", summary.controller.to_string(), "Controller selected at shutdown")?;

    if let Some(s) = calculate_stats(summary.samples.iter().map(|s| s.measurement)) {
        row("temp_min", format!("{:.2}", s.min), "Minimum vessel temperature")?;
        row("temp_max", format!("{:.2}", s.max), "Maximum vessel temperature")?;
        row("temp_avg", format!("{:.2}", s.mean), "Average vessel temperature")?;
    }
    if let Some(s) = calculate_stats(summary.samples.iter().map(|s| (s.setpoint - s.measurement).abs())) {
        row("abs_error_max", format!("{:.2}", s.max), "Largest |setpoint - measurement|")?;
        row("abs_error_avg", format!("{:.2}", s.mean), "Mean |setpoint - measurement|")?;
    }
    if let Some(s) = calculate_stats(summary.control.commands.iter().copied()) {
        row("command_avg", format!("{:.2}", s.mean), "Average actuator command (recent)")?;
    }
    if let Some(s) = calculate_stats(summary.control.step_us.iter().map(|&us| us as f64)) {
        row("step_us_max", format!("{:.0}", s.max), "Slowest controller step (recent)")?;
        row("step_us_avg", format!("{:.1}", s.mean), "Average controller step (recent)")?;
    }

    for (task, h) in [("acquisition", summary.acquisition), ("control", summary.control)] {
        row(&format!("{task}_ticks"), h.ticks.to_string(), "Loop iterations")?;
        row(&format!("{task}_sensor_failures"), h.sensor_failures.to_string(), "Failed sensor reads")?;
        row(&format!("{task}_actuator_failures"), h.actuator_failures.to_string(), "Failed actuator applies")?;
        row(&format!("{task}_io_timeouts"), h.io_timeouts.to_string(), "Device calls over the I/O timeout")?;
        row(&format!("{task}_overruns"), h.overruns.to_string(), "Steps longer than the period")?;
        row(&format!("{task}_skipped_ticks"), h.skipped_ticks.to_string(), "Periods skipped after overruns")?;
        row(&format!("{task}_faulted"), h.faulted.to_string(), "Instance stopped on an invariant fault")?;
    }
    row(
        "dropped_window_updates",
        summary.acquisition.dropped_updates.to_string(),
        "Window updates discarded on a full channel",
    )?;
    row("idle_control_ticks", summary.control.idle_ticks.to_string(), "Control ticks without history")?;

    wtr.flush()?;
    info!("[Export] summary written to {}", path.display());
    Ok(path)
}
