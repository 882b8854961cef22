//! The run callback boundary (§A.6): a caller-supplied sink invoked after
//! each (right, left) sweep pair. Persistence, logging, database indexing,
//! and config hashing all live on the far side of this trait — none of it is
//! this crate's concern (§A.1 "OUT OF SCOPE").
use std::time::Duration;

/// Non-fatal conditions folded into a sweep pair's report instead of an
/// `Err` (§A.7: `SOLVER_NON_CONVERGENCE`, `NUMERICAL_BREAKDOWN`,
/// `TRUNCATION_DEGRADED` never abort a sweep).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStatus {
    pub solver_non_convergence: bool,
    pub numerical_breakdown: bool,
    pub truncation_degraded: bool,
    /// Set when the sweep stopped early because [`crate::sweep::StopFlag`]
    /// was raised (§A.5: "finishes its in-flight bond update... and returns").
    pub stopped: bool,
}

impl SweepStatus {
    pub fn is_clean(&self) -> bool {
        *self == SweepStatus::default()
    }
}

/// What the sweep engine reports after one (right, left) sweep pair (§A.6).
#[derive(Debug, Clone, Copy)]
pub struct SweepReport {
    pub sweep_index: usize,
    pub reported_energy: Option<f64>,
    pub current_time: f64,
    pub max_bond_dim: usize,
    pub elapsed: Duration,
    pub status: SweepStatus,
}

/// The run callback contract (§A.6). Implementations are free to persist,
/// log, or render progress; the core only ever calls `on_sweep_pair`.
pub trait RunCallback {
    fn on_sweep_pair(&mut self, report: &SweepReport);
}

/// Does nothing; the default for callers that don't need per-sweep feedback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallback;

impl RunCallback for NoopCallback {
    fn on_sweep_pair(&mut self, _report: &SweepReport) {}
}

/// Renders a per-sweep-pair progress bar, the same granularity the teacher
/// drives `ParallelProgressIterator` at (there: per q-vector; here: per
/// sweep pair, since the engine is sequential at the algorithmic level, §5).
pub struct ProgressBarCallback {
    bar: indicatif::ProgressBar,
}

impl ProgressBarCallback {
    pub fn new(n_sweeps: u64) -> ProgressBarCallback {
        let bar = indicatif::ProgressBar::new(n_sweeps);
        bar.set_style(
            indicatif::ProgressStyle::with_template(
                "{bar:40.cyan/blue} {pos}/{len} sweeps (E={msg})",
            )
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar()),
        );
        ProgressBarCallback { bar }
    }
}

impl RunCallback for ProgressBarCallback {
    fn on_sweep_pair(&mut self, report: &SweepReport) {
        if let Some(e) = report.reported_energy {
            self.bar.set_message(format!("{e:.8}"));
        }
        if !report.status.is_clean() {
            tracing::warn!(
                sweep = report.sweep_index,
                status = ?report.status,
                "sweep pair completed with non-fatal degradation"
            );
        }
        self.bar.set_position(report.sweep_index as u64 + 1);
    }
}
