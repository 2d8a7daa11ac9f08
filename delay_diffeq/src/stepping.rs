use serde::{Deserialize, Serialize};

/// Step-size selection for the embedded pair: tolerances, step bounds, and
/// the Lund-stabilised (PI) predictor.
///
/// `step_beta` is the PI exponent; setting it to zero disables the
/// stabilisation and recovers the classical `err^(1/5)` controller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdaptiveStepControl {
    /// Absolute tolerance (uniform over components).
    pub atol: f64,
    /// Relative tolerance (uniform over components).
    pub rtol: f64,
    /// Starting step size; zero selects the automatic estimate.
    pub step_size_initial: f64,
    /// Ceiling on the step magnitude.
    pub step_size_max: f64,
    /// Cap on total iterations (accepted plus rejected).
    pub step_max_n: usize,
    pub step_factor_min: f64,
    pub step_factor_max: f64,
    pub step_factor_safe: f64,
    pub step_beta: f64,
}

impl Default for AdaptiveStepControl {
    fn default() -> Self {
        Self {
            atol: 1e-6,
            rtol: 1e-6,
            step_size_initial: 0.0,
            step_size_max: f64::INFINITY,
            step_max_n: 100_000,
            step_factor_min: 0.2,
            step_factor_max: 10.0,
            step_factor_safe: 0.9,
            step_beta: 0.04,
        }
    }
}

impl AdaptiveStepControl {
    pub fn with_abs_tol(mut self, atol: f64) -> Self {
        self.atol = atol;
        self
    }

    pub fn with_rel_tol(mut self, rtol: f64) -> Self {
        self.rtol = rtol;
        self
    }

    pub fn with_initial_step(mut self, h: f64) -> Self {
        self.step_size_initial = h;
        self
    }

    pub fn with_max_step(mut self, h: f64) -> Self {
        self.step_size_max = h;
        self
    }

    pub fn with_max_steps(mut self, n: usize) -> Self {
        self.step_max_n = n;
        self
    }

    pub fn with_step_beta(mut self, beta: f64) -> Self {
        self.step_beta = beta;
        self
    }

    fn fac11(&self, err: f64) -> f64 {
        err.powf(0.2 - 0.75 * self.step_beta)
    }

    /// Predict the next step size after an accepted step with error norm
    /// `err`, where `fac_old` carries the previous accepted error for the
    /// Lund stabilisation.
    pub fn h_new(&self, h: f64, err: f64, fac_old: f64) -> f64 {
        let mut fac = self.fac11(err) / fac_old.powf(self.step_beta);
        fac = (fac / self.step_factor_safe)
            .min(1.0 / self.step_factor_min)
            .max(1.0 / self.step_factor_max);
        h / fac
    }

    /// Predict the retry step size after a rejected step. Only the clamp
    /// differs from the acceptance predictor: growth is never allowed.
    pub fn h_shrink(&self, h: f64, err: f64) -> f64 {
        h / (1.0 / self.step_factor_min).min(self.fac11(err) / self.step_factor_safe)
    }
}
