//! Live SVG view of the temperature window.
//!
//! One render per window update: setpoint as a dashed red step curve, measurement as a
//! black line, x from `-horizon` to `0`. The file is written to a temporary path and
//! renamed so a viewer never picks up a half-written chart.

use std::{
    fs,
    path::{Path, PathBuf},
    thread::{self, JoinHandle},
};

use crossbeam::channel::Receiver;
use log::{debug, info, warn};
use plotters::{prelude::*, series::DashedLineSeries};

use crate::acquisition::window::WindowUpdate;
use crate::utils::error::{EngineError, Result};

const CHART_SIZE: (u32, u32) = (960, 540);

pub struct Dashboard {
    target: PathBuf,
    scratch: PathBuf,
    horizon_secs: f64,
}

impl Dashboard {
    pub fn new(directory: &Path, horizon_secs: f64) -> Result<Self> {
        fs::create_dir_all(directory)?;
        Ok(Self {
            target: directory.join("window.svg"),
            scratch: directory.join("window_temp.svg"),
            horizon_secs,
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Renders until every sender of `updates` is gone.
    pub fn spawn(self, updates: Receiver<WindowUpdate>) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new().name("dashboard".into()).spawn(move || {
            info!("[Dashboard] rendering to {}", self.target.display());
            while let Ok(update) = updates.recv() {
                if let Err(e) = self.render(&update) {
                    warn!("[Dashboard] render failed: {}", e);
                }
            }
            debug!("[Dashboard] window channel closed");
        })?;
        Ok(handle)
    }

    pub fn render(&self, update: &WindowUpdate) -> Result<()> {
        let view = &update.view;
        let Some((y_min, y_max)) = view.value_range() else {
            return Ok(());
        };
        let y_max = y_max.max(y_min + 1e-6);

        {
            let root = SVGBackend::new(&self.scratch, CHART_SIZE).into_drawing_area();
            root.fill(&WHITE).map_err(plot_error)?;

            let caption = format!(
                "Vessel {:.2} °C / target {:.2} °C",
                update.measurement, update.setpoint
            );
            let mut chart = ChartBuilder::on(&root)
                .caption(caption, ("sans-serif", 22))
                .margin(10)
                .x_label_area_size(30)
                .y_label_area_size(50)
                .build_cartesian_2d(-self.horizon_secs..0.0, y_min..y_max)
                .map_err(plot_error)?;
            chart
                .configure_mesh()
                .x_desc("Elapsed (s)")
                .y_desc("Temperature (°C)")
                .draw()
                .map_err(plot_error)?;

            // Hold each setpoint until the next sample.
            let mut steps = Vec::with_capacity(view.len() * 2);
            for (i, (&t, &sp)) in view.elapsed.iter().zip(&view.setpoints).enumerate() {
                if i > 0 {
                    steps.push((t, view.setpoints[i - 1]));
                }
                steps.push((t, sp));
            }
            chart
                .draw_series(DashedLineSeries::new(steps, 6, 4, RED.stroke_width(2)))
                .map_err(plot_error)?;
            chart
                .draw_series(LineSeries::new(
                    view.elapsed.iter().copied().zip(view.measurements.iter().copied()),
                    &BLACK,
                ))
                .map_err(plot_error)?;

            root.present().map_err(plot_error)?;
        }

        fs::rename(&self.scratch, &self.target)?;
        Ok(())
    }
}

fn plot_error<E: std::fmt::Display>(e: E) -> EngineError {
    EngineError::Export(format!("plot: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::window::WindowView;

    #[test]
    fn renders_a_window_to_svg() {
        let dir = std::env::temp_dir().join(format!("brewpi-dashboard-{}", std::process::id()));
        let dashboard = Dashboard::new(&dir, 30.0).unwrap();
        let update = WindowUpdate {
            time: 9.0,
            setpoint: 67.0,
            measurement: 61.0,
            view: WindowView {
                elapsed: vec![-9.0, -6.0, -3.0, 0.0],
                setpoints: vec![65.0, 65.0, 67.0, 67.0],
                measurements: vec![55.0, 57.5, 59.0, 61.0],
            },
        };
        dashboard.render(&update).unwrap();
        let svg = fs::read_to_string(dashboard.target()).unwrap();
        assert!(svg.contains("<svg"));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_view_writes_nothing() {
        let dir = std::env::temp_dir().join(format!("brewpi-dashboard-empty-{}", std::process::id()));
        let dashboard = Dashboard::new(&dir, 30.0).unwrap();
        let update = WindowUpdate {
            time: 0.0,
            setpoint: 67.0,
            measurement: 20.0,
            view: WindowView::default(),
        };
        dashboard.render(&update).unwrap();
        assert!(!dashboard.target().exists());
        fs::remove_dir_all(&dir).ok();
    }
}
