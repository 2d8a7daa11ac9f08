//! Adaptive integration of ordinary and delay differential equations with
//! the Dormand-Prince 5(4) embedded pair.
//!
//! Every accepted step stores its dense-output (continuous extension)
//! polynomial in a bounded history ring. The interpolant serves two
//! consumers: solution reporting at the requested output times, and lag
//! queries (`ylag_*`) made by the right-hand side of a delay equation
//! against past states. A PI (Lund-stabilised) controller drives the step
//! size; critical times can be supplied to force step boundaries onto
//! known non-smooth points of the right-hand side.

use std::error::Error;
use std::path::PathBuf;

pub mod dense;
pub mod lag;
pub mod model;
mod rk;
pub mod saving;
pub mod solver;
pub mod stepping;
pub mod tableau;

pub use lag::{LagError, ylag_1, ylag_all, ylag_vec, ylag_vec_int};
pub use model::DdeModel;
pub use saving::{MemoryResult, ResultStorage, SaveMethod};
pub use solver::{ConfigError, Method, ReturnCode, Solver, Stats};
pub use stepping::AdaptiveStepControl;

/// Container for a complete integration problem: model, dimensions,
/// history depth, step control and saving strategy.
///
/// This is the one-shot interface; use [`Solver`] directly to keep the
/// instance alive across repeated integrations.
pub struct DdeProblem<Model: DdeModel> {
    model: Model,
    n: usize,
    n_out: usize,
    n_history: usize,
    control: AdaptiveStepControl,
    save_method: SaveMethod,
}

impl<Model: DdeModel> DdeProblem<Model> {
    pub fn new(model: Model, n: usize) -> Self {
        Self {
            model,
            n,
            n_out: 0,
            n_history: 100,
            control: AdaptiveStepControl::default(),
            save_method: SaveMethod::Memory,
        }
    }

    /// Sets the auxiliary output dimension; the model's `output` callback
    /// runs at every reported time when this is nonzero.
    pub fn with_output(mut self, n_out: usize) -> Self {
        self.n_out = n_out;
        self
    }

    /// Sets the history depth in records (one per accepted step); bounds
    /// how far back lag queries can reach.
    pub fn with_history(mut self, n_history: usize) -> Self {
        self.n_history = n_history;
        self
    }

    pub fn with_step_control(mut self, control: AdaptiveStepControl) -> Self {
        self.control = control;
        self
    }

    /// Streams emitted rows to a CSV file instead of keeping them in
    /// memory.
    pub fn with_saving(mut self, path: PathBuf) -> Self {
        self.save_method = SaveMethod::File(path);
        self
    }

    /// Runs one integration across `times`, honouring the `tcrit`
    /// landmarks. `times[0]` is the initial time and is not reported.
    pub fn solve(
        self,
        y0: &[f64],
        times: &[f64],
        tcrit: &[f64],
    ) -> Result<Solution, Box<dyn Error>> {
        let mut storage = ResultStorage::from_method(&self.save_method, self.n, self.n_out)?;
        let mut solver =
            Solver::new(self.model, self.n, self.n_out, self.n_history)?.with_control(self.control);
        solver.integrate(y0, times, tcrit, &mut storage)?;
        let result = storage.into_memory().unwrap_or_default();
        Ok(Solution {
            t: result.t,
            y: result.y,
            out: result.out,
            code: solver.code(),
            stats: solver.stats(),
        })
    }
}

/// Outcome of one [`DdeProblem::solve`] run. When saving to file the rows
/// live on disk and the vectors here are empty.
#[derive(Debug, Clone)]
pub struct Solution {
    pub t: Vec<f64>,
    pub y: Vec<Vec<f64>>,
    pub out: Vec<Vec<f64>>,
    pub code: ReturnCode,
    pub stats: Stats,
}
