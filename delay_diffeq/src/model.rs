use std::error::Error;

/// Trait for defining the right-hand side of an ODE or DDE system.
///
/// Types implementing this trait define how to compute the derivative of the
/// system at a given time and state. For delay equations the derivative may
/// query past states through the lag functions in [`crate::lag`] while an
/// integration is running.
pub trait DdeModel {
    /// Compute the derivative at time `t` and state `y`, storing the result
    /// in `dydt` (same length as `y`).
    ///
    /// Must be deterministic for a given input: the driver evaluates it more
    /// than once at identical `(t, y)` during initial-step estimation and
    /// the FSAL handoff.
    fn f(&mut self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Box<dyn Error>>;

    /// Auxiliary output at a reported time: derive `out.len()` extra values
    /// from the interpolated state `y`. Only called when the solver was
    /// allocated with a nonzero auxiliary dimension.
    fn output(&mut self, _t: f64, _y: &[f64], _out: &mut [f64]) -> Result<(), Box<dyn Error>> {
        Ok(())
    }
}
