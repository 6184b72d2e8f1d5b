//! telemetry.rs
//! Bounded sample history, the capture window and the pendulum estimator.
//!
//! - `SampleHistory`-style ring: every decoded sample, capped at `history_points`
//! - Capture window: columns copied from the history while capturing, capped at `max_points`
//! - Estimator: angular acceleration vs. sin(angle) least-squares fit
//!
//! The window pulls from the history with a cursor. Trimming the history moves
//! the cursor down by the number of evicted samples (saturating at 0) so it
//! never points past data that is gone.

use std::collections::VecDeque;

use average::{Covariance, Variance};
use statrs::statistics::{Data, Median};

use crate::config::TelemetryConfig;
use crate::link::codec::Sample;

/// Local gravity used by the rig (m/s^2).
pub const GRAVITY: f64 = 9.781;

/// Accelerations above this magnitude are treated as spikes.
const ACCEL_CLAMP: f64 = 90.0;
/// Median tick delta above this means ticks are milliseconds.
const MS_TICK_THRESHOLD: f64 = 5.0;
const MIN_FIT_POINTS: usize = 5;
const SLOPE_EPS: f64 = 1e-9;
const DEGENERATE_EPS: f64 = 1e-12;

// ============================================================================
// Numerical helpers
// ============================================================================

/// Shift an angle into the (-180, 180] window around the lower rest position.
pub fn wrap_degree0(degree: f64) -> f64 {
    let d = (degree + 180.0).rem_euclid(360.0);
    if d > 180.0 { d - 360.0 } else { d }
}

/// Convert raw ticks to seconds starting at zero.
///
/// Heuristic only: when the median tick delta exceeds 5 the ticks are taken
/// as milliseconds, otherwise as seconds. Fewer than 3 ticks give all zeros.
pub fn to_seconds(t_raw: &[f64]) -> Vec<f64> {
    if t_raw.len() < 3 {
        return vec![0.0; t_raw.len()];
    }
    let diffs: Vec<f64> = t_raw.windows(2).map(|w| w[1] - w[0]).collect();
    let median = Data::new(diffs).median();
    let scale = if median > MS_TICK_THRESHOLD { 0.001 } else { 1.0 };
    let t0 = t_raw[0];
    t_raw.iter().map(|v| (v - t0) * scale).collect()
}

/// Smoothed second derivative of `y` over `t`.
///
/// Interior points use the neighbour slopes over their own intervals.
/// Magnitudes above 90 repeat the previous value, then each point is
/// averaged with the previous output. Points with a non-positive interval
/// repeat the previous output. Edges copy their neighbour.
pub fn second_derivative(y: &[f64], t: &[f64]) -> Vec<f64> {
    let n = y.len().min(t.len());
    if n < MIN_FIT_POINTS {
        return vec![0.0; n];
    }

    let mut dd = vec![0.0; n];
    for i in 1..n - 1 {
        let dt1 = t[i] - t[i - 1];
        let dt2 = t[i + 1] - t[i];
        if dt1 <= 0.0 || dt2 <= 0.0 {
            dd[i] = dd[i - 1];
            continue;
        }
        let dy1 = (y[i] - y[i - 1]) / dt1;
        let dy2 = (y[i + 1] - y[i]) / dt2;
        let mut v = (dy2 - dy1) / ((dt1 + dt2) * 0.5);
        if v.abs() > ACCEL_CLAMP {
            v = dd[i - 1];
        }
        dd[i] = (v + dd[i - 1]) * 0.5;
    }
    dd[0] = dd[1];
    dd[n - 1] = dd[n - 2];
    dd
}

/// `y = slope * x + intercept`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
}

impl Regression {
    /// Uniform rod pivoted at one end: `L = -3g / (2a)`.
    pub fn rod_length(&self) -> Option<f64> {
        (self.slope.abs() > SLOPE_EPS).then(|| -3.0 * GRAVITY / (2.0 * self.slope))
    }

    /// Equivalent simple pendulum: `l = -g / a`.
    pub fn equivalent_length(&self) -> Option<f64> {
        (self.slope.abs() > SLOPE_EPS).then(|| -GRAVITY / self.slope)
    }
}

/// Ordinary least squares with Welford-style accumulation (no raw power sums).
/// Near-singular inputs give a zero fit.
pub fn linear_regression(x: &[f64], y: &[f64]) -> Regression {
    let n = x.len().min(y.len());
    if n < 2 {
        return Regression::default();
    }

    let var_x: Variance = x[..n].iter().copied().collect();
    let mut cov = Covariance::new();
    for (&xi, &yi) in x[..n].iter().zip(&y[..n]) {
        cov.add(xi, yi);
    }

    // Same threshold as the determinant n*Sxx - Sx^2 of the normal equations.
    let nf = n as f64;
    if (nf * nf * var_x.population_variance()).abs() < DEGENERATE_EPS {
        return Regression::default();
    }

    let slope = cov.population_covariance() / var_x.population_variance();
    Regression {
        slope,
        intercept: cov.mean_y() - slope * cov.mean_x(),
    }
}

/// Fit angular acceleration against sin(angle) over the window, skipping 2%
/// (at least 2 points) at each end.
pub fn fit_pendulum(t_raw: &[f64], degree0: &[f64]) -> Option<Regression> {
    let n = t_raw.len().min(degree0.len());
    if n < MIN_FIT_POINTS {
        return None;
    }
    let t = to_seconds(&t_raw[..n]);
    let rad: Vec<f64> = degree0[..n].iter().map(|d| d.to_radians()).collect();
    let x: Vec<f64> = rad.iter().map(|r| r.sin()).collect();
    let dd = second_derivative(&rad, &t);

    let i0 = (n / 50).max(2);
    let i1 = n - i0;
    Some(linear_regression(&x[i0..i1], &dd[i0..i1]))
}

// ============================================================================
// Capture window
// ============================================================================

/// Parallel columns of captured samples.
#[derive(Debug, Clone)]
pub struct TelemetryWindow {
    pub t_raw: Vec<f64>,
    pub cm_x: Vec<f64>,
    pub degree: Vec<f64>,
    pub degree0: Vec<f64>,
    max_points: usize,
}

impl TelemetryWindow {
    pub fn new(max_points: usize) -> Self {
        Self {
            t_raw: Vec::new(),
            cm_x: Vec::new(),
            degree: Vec::new(),
            degree0: Vec::new(),
            max_points: max_points.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.t_raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t_raw.is_empty()
    }

    pub fn push(&mut self, sample: &Sample) {
        self.t_raw.push(sample.tick as f64);
        self.cm_x.push(sample.cm_x);
        self.degree.push(sample.degree);
        self.degree0.push(wrap_degree0(sample.degree));
    }

    /// Drop the oldest entries beyond `max_points`; returns how many went.
    pub fn trim(&mut self) -> usize {
        let n = self.len();
        if n <= self.max_points {
            return 0;
        }
        let cut = n - self.max_points;
        self.t_raw.drain(..cut);
        self.cm_x.drain(..cut);
        self.degree.drain(..cut);
        self.degree0.drain(..cut);
        cut
    }

    pub fn clear(&mut self) {
        self.t_raw.clear();
        self.cm_x.clear();
        self.degree.clear();
        self.degree0.clear();
    }
}

/// Read-only summary for status output.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryReport {
    pub capturing: bool,
    pub history_len: usize,
    pub window_len: usize,
    pub fit: Regression,
    pub rod_length: Option<f64>,
    pub equivalent_length: Option<f64>,
}

pub struct Telemetry {
    history: VecDeque<Sample>,
    max_history: usize,
    window: TelemetryWindow,
    cursor: usize,
    capturing: bool,
    last_fit: Regression,
}

impl Telemetry {
    pub fn new(cfg: &TelemetryConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(cfg.history_points),
            max_history: cfg.history_points.max(1),
            window: TelemetryWindow::new(cfg.window_points),
            cursor: 0,
            capturing: false,
            last_fit: Regression::default(),
        }
    }

    /// Append a decoded sample to the history (called from the decode thread).
    pub fn record(&mut self, sample: Sample) {
        self.history.push_back(sample);
        if self.history.len() > self.max_history {
            let cut = self.history.len() - self.max_history;
            self.history.drain(..cut);
            self.cursor = self.cursor.saturating_sub(cut);
        }
    }

    /// Capture only samples that arrive from now on.
    pub fn start(&mut self) {
        self.window.clear();
        self.last_fit = Regression::default();
        self.cursor = self.history.len();
        self.capturing = true;
    }

    /// Freeze the window as it is.
    pub fn stop(&mut self) {
        self.capturing = false;
    }

    pub fn reset(&mut self) {
        self.capturing = false;
        self.cursor = 0;
        self.window.clear();
        self.last_fit = Regression::default();
    }

    /// Pull new history samples into the window, trim it and refit.
    /// Returns the number of samples appended.
    pub fn capture_tick(&mut self) -> usize {
        if !self.capturing {
            return 0;
        }
        let n = self.history.len();
        if n <= self.cursor {
            return 0;
        }
        for s in self.history.range(self.cursor..) {
            self.window.push(s);
        }
        let appended = n - self.cursor;
        self.cursor = n;
        self.window.trim();

        if let Some(fit) = fit_pendulum(&self.window.t_raw, &self.window.degree0) {
            self.last_fit = fit;
        }
        appended
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn window(&self) -> &TelemetryWindow {
        &self.window
    }

    pub fn report(&self) -> TelemetryReport {
        TelemetryReport {
            capturing: self.capturing,
            history_len: self.history.len(),
            window_len: self.window.len(),
            fit: self.last_fit,
            rod_length: self.last_fit.rod_length(),
            equivalent_length: self.last_fit.equivalent_length(),
        }
    }
}
