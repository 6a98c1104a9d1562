//! Display view over the trailing horizon of the sample history.

use crate::acquisition::sample_buffer::{Sample, SampleBuffer};

/// Index-aligned series for one render of the history plot.
///
/// `elapsed` is relative to the newest sample, so the last entry is `0.0` and every other
/// entry lies in `(-horizon, 0)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowView {
    pub elapsed: Vec<f64>,
    pub setpoints: Vec<f64>,
    pub measurements: Vec<f64>,
}

impl WindowView {
    /// Builds the view for `horizon` seconds ending at the latest sample.
    /// Fewer than two samples in range yields an empty view: there is no line to draw.
    pub fn from_buffer(buffer: &SampleBuffer, horizon: f64) -> Self {
        Self::from_samples(buffer.recent(horizon))
    }

    /// Builds the view from an already windowed, time-ordered slice.
    pub fn from_samples(window: &[Sample]) -> Self {
        let Some(newest) = window.last() else {
            return Self::default();
        };
        if window.len() < 2 {
            return Self::default();
        }

        let mut view = WindowView {
            elapsed: Vec::with_capacity(window.len()),
            setpoints: Vec::with_capacity(window.len()),
            measurements: Vec::with_capacity(window.len()),
        };
        for s in window {
            view.elapsed.push(s.time - newest.time);
            view.setpoints.push(s.setpoint);
            view.measurements.push(s.measurement);
        }
        view
    }

    pub fn is_empty(&self) -> bool {
        self.elapsed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elapsed.len()
    }

    /// Latest `(setpoint, measurement)` pair.
    pub fn latest(&self) -> Option<(f64, f64)> {
        Some((*self.setpoints.last()?, *self.measurements.last()?))
    }

    /// Plot y-range: 10 % below the lowest and 10 % above the highest value of both series.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let values = self.setpoints.iter().chain(self.measurements.iter()).copied();
        let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if min.is_finite() && max.is_finite() {
            Some((0.9 * min, 1.1 * max))
        } else {
            None
        }
    }
}

/// Snapshot pushed to the presentation layer after every acquisition tick.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowUpdate {
    /// Session time of the sample that triggered the update.
    pub time: f64,
    pub setpoint: f64,
    pub measurement: f64,
    pub view: WindowView,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(times: &[f64]) -> SampleBuffer {
        let mut buf = SampleBuffer::new(8).unwrap();
        for &t in times {
            buf.append(Sample::new(t, 60.0, 50.0 + t)).unwrap();
        }
        buf
    }

    #[test]
    fn newest_sample_sits_at_zero() {
        let view = WindowView::from_buffer(&buffer(&[0.0, 3.0, 6.0, 9.0, 12.0]), 6.0);
        assert_eq!(view.elapsed, vec![-3.0, 0.0]);
        assert_eq!(view.measurements, vec![59.0, 62.0]);
        assert_eq!(view.latest(), Some((60.0, 62.0)));
    }

    #[test]
    fn single_sample_renders_nothing() {
        assert!(WindowView::from_buffer(&buffer(&[0.0]), 30.0).is_empty());
        assert!(WindowView::from_buffer(&buffer(&[0.0, 40.0]), 30.0).is_empty());
    }

    #[test]
    fn value_range_pads_both_series() {
        let view = WindowView::from_buffer(&buffer(&[0.0, 10.0]), 30.0);
        let (lo, hi) = view.value_range().unwrap();
        assert!((lo - 45.0).abs() < 1e-9);
        assert!((hi - 66.0).abs() < 1e-9);
    }
}
