//! Kernel timing collection for `--stats` output.
//!
//! Created by the caller and threaded into the CG driver by mutable
//! reference, so there is no ambient global registry; dropping the value is
//! the teardown. Accumulates across calls, which is what the repeated-solve
//! benchmark loop wants.

use std::time::Duration;

/// Fixed slot positions of [`SolveStats::timing_slots`].
pub const SLOT_TOTAL: usize = 0;
pub const SLOT_DOT: usize = 1;
pub const SLOT_WAXPBY: usize = 2;
pub const SLOT_SPMV: usize = 3;
pub const SLOT_ALLREDUCE: usize = 4;
pub const SLOT_PRECOND: usize = 5;

/// Per-kernel timing breakdown of the CG solve.
#[derive(Debug, Default, Clone)]
pub struct SolveStats {
    pub total: Duration,
    pub dot: Duration,
    pub waxpby: Duration,
    pub spmv: Duration,
    /// Blocking all-reduce portion of the dot products (also contained in
    /// `dot`).
    pub allreduce: Duration,
    pub precond: Duration,
}

impl SolveStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// The conventional 7-slot layout: total, dot, waxpby, spmv, all-reduce,
    /// preconditioner apply. Slot 6 is reserved for halo-exchange time in
    /// optimized variants and reads zero here.
    pub fn timing_slots(&self) -> [f64; 7] {
        [
            self.total.as_secs_f64(),
            self.dot.as_secs_f64(),
            self.waxpby.as_secs_f64(),
            self.spmv.as_secs_f64(),
            self.allreduce.as_secs_f64(),
            self.precond.as_secs_f64(),
            0.0,
        ]
    }

    /// Print the stats table to stderr.
    pub fn display(&self) {
        eprintln!();
        eprintln!("=== Multigrain Solve Stats ===");
        eprintln!("  Dot products:      {:>8.3}s", self.dot.as_secs_f64());
        eprintln!("    All-reduce:      {:>8.3}s", self.allreduce.as_secs_f64());
        eprintln!("  Vector updates:    {:>8.3}s", self.waxpby.as_secs_f64());
        eprintln!("  SpMV:              {:>8.3}s", self.spmv.as_secs_f64());
        eprintln!("  Preconditioner:    {:>8.3}s", self.precond.as_secs_f64());
        eprintln!("  ────────────────────────────");
        eprintln!("  Total:             {:>8.3}s", self.total.as_secs_f64());
    }
}
