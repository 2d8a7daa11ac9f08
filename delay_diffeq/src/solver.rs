//! Solver state container and the adaptive integration driver.

use std::cell::RefCell;
use std::error::Error;
use std::rc::Rc;

use log::{debug, trace, warn};
use ring_buffer::RingBufferError;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

use crate::dense::Record;
use crate::lag::{ActiveGuard, History};
use crate::model::DdeModel;
use crate::saving::ResultStorage;
use crate::stepping::AdaptiveStepControl;
use crate::tableau::ButcherTableau;

/// Configuration errors, detected before any stepping.
#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("system dimension must be at least 1")]
    ZeroDimension,
    #[error("history capacity must be at least 2")]
    HistoryTooSmall,
    #[error("at least two output times are required")]
    TooFewTimes,
    #[error("output times must be strictly monotonic")]
    TimesNotMonotonic,
    #[error("critical times must be strictly monotonic in the direction of integration")]
    TcritNotMonotonic,
    #[error("initial state length ({0}) does not match the system dimension ({1})")]
    StateLengthMismatch(usize, usize),
    #[error("absolute and relative tolerances must be positive")]
    NonPositiveTolerance,
    #[error("an integration is already running on this thread")]
    AlreadyIntegrating,
    #[error(transparent)]
    Ring(#[from] RingBufferError),
}

/// Tag for the Runge-Kutta family in use.
///
/// Only the Dormand-Prince 5(4) pair is supported; the tag carries the
/// per-method capability set (order, stage count, history record layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Dopri5,
}

impl Method {
    /// Order of the propagating solution, which is also the number of
    /// dense-output coefficient planes per history record.
    pub fn order(&self) -> usize {
        match self {
            Method::Dopri5 => 5,
        }
    }

    pub fn stages(&self) -> usize {
        match self {
            Method::Dopri5 => 7,
        }
    }

    /// Stage-derivative buffers, including the spare slot used as
    /// stage-state and error scratch.
    pub(crate) fn nk(&self) -> usize {
        self.order() + 2
    }

    /// Doubles per history record: `order` planes of length `n` plus the
    /// step start time and the step size.
    pub fn record_stride(&self, n: usize) -> usize {
        self.order() * n + 2
    }

    /// Offset of the stored step start time within a record.
    pub(crate) fn time_offset(&self, n: usize) -> usize {
        self.order() * n
    }
}

/// Terminal status of one integration, observable after
/// [`Solver::integrate`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnCode {
    /// Initial value; never observed after a completed call.
    NotSet,
    /// Reached the final output time.
    OkComplete,
    /// Exceeded the configured iteration cap.
    ErrTooManySteps,
    /// The step size shrank below the resolvable scale at the current time.
    ErrStepSizeTooSmall,
    /// A user callback reported an error.
    ErrTargetFailure,
}

impl ReturnCode {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ReturnCode::ErrTooManySteps
                | ReturnCode::ErrStepSizeTooSmall
                | ReturnCode::ErrTargetFailure
        )
    }
}

/// Work counters for one integration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Derivative evaluations.
    pub n_eval: usize,
    /// Trial steps, accepted or not.
    pub n_step: usize,
    pub n_accept: usize,
    /// Rejections; those before the first acceptance are not counted.
    pub n_reject: usize,
}

enum EmitFailure {
    Callback(Box<dyn Error>),
    Storage(Box<dyn Error>),
}

/// One integrator instance: owns every buffer for a system of fixed
/// dimension and can be reset for repeated integrations.
pub struct Solver<M: DdeModel> {
    pub(crate) model: M,
    pub(crate) method: Method,
    pub(crate) tableau: ButcherTableau<7>,
    pub(crate) n: usize,
    n_out: usize,
    pub(crate) control: AdaptiveStepControl,

    /// Current accepted state.
    pub(crate) y: Vec<f64>,
    /// Trial state.
    pub(crate) y1: Vec<f64>,
    /// Stage derivatives `k[0..order]`; the FSAL end-point evaluation lands
    /// in `k[1]`, the spare `k[order + 1]` holds stage-state and error
    /// scratch.
    pub(crate) k: Vec<Vec<f64>>,

    times: Vec<f64>,
    /// Next unreported output time; `times[0]` is the initial time and is
    /// never reported.
    times_idx: usize,
    tcrit: Vec<f64>,
    tcrit_idx: usize,
    pub(crate) t: f64,
    pub(crate) sign: f64,
    /// Working copy of the configured initial step; receives the
    /// controller's final prediction on completion.
    pub(crate) h_initial: f64,

    pub(crate) stats: Stats,
    code: ReturnCode,
    error: bool,
    failure: Option<Box<dyn Error>>,

    pub(crate) history: Rc<RefCell<History>>,
    y_report: Vec<f64>,
    out_report: Vec<f64>,
}

impl<M: DdeModel> Solver<M> {
    /// Allocates a solver for a system of dimension `n` with `n_out`
    /// auxiliary outputs and a history ring of `n_history` records.
    pub fn new(model: M, n: usize, n_out: usize, n_history: usize) -> Result<Self, ConfigError> {
        if n == 0 {
            return Err(ConfigError::ZeroDimension);
        }
        if n_history < 2 {
            return Err(ConfigError::HistoryTooSmall);
        }
        let method = Method::Dopri5;
        Ok(Self {
            history: Rc::new(RefCell::new(History::new(method, n, n_history)?)),
            model,
            method,
            tableau: ButcherTableau::<7>::DOPRI5,
            n,
            n_out,
            control: AdaptiveStepControl::default(),
            y: vec![0.0; n],
            y1: vec![0.0; n],
            k: (0..method.nk()).map(|_| vec![0.0; n]).collect(),
            times: Vec::new(),
            times_idx: 1,
            tcrit: Vec::new(),
            tcrit_idx: 0,
            t: 0.0,
            sign: 1.0,
            h_initial: 0.0,
            stats: Stats::default(),
            code: ReturnCode::NotSet,
            error: false,
            failure: None,
            y_report: vec![0.0; n],
            out_report: vec![0.0; n_out],
        })
    }

    pub fn with_control(mut self, control: AdaptiveStepControl) -> Self {
        self.control = control;
        self
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn n_out(&self) -> usize {
        self.n_out
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn control(&self) -> &AdaptiveStepControl {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut AdaptiveStepControl {
        &mut self.control
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn code(&self) -> ReturnCode {
        self.code
    }

    pub fn error(&self) -> bool {
        self.error
    }

    /// Current time, the end of the newest accepted step.
    pub fn t(&self) -> f64 {
        self.t
    }

    /// Current accepted state.
    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// The configured initial step, or after a completed integration the
    /// controller's prediction for the step that would have followed: a
    /// good starting step for a continuation run.
    pub fn step_size_initial(&self) -> f64 {
        self.h_initial
    }

    /// The error reported by a failed callback, when `code()` is
    /// [`ReturnCode::ErrTargetFailure`].
    pub fn failure(&self) -> Option<&(dyn Error + 'static)> {
        self.failure.as_deref()
    }

    /// Prepares a fresh integration: installs the schedule, snapshots the
    /// initial state, clears counters and retained history. Fails
    /// synchronously on invalid configuration, before any stepping.
    pub fn reset(&mut self, y: &[f64], times: &[f64], tcrit: &[f64]) -> Result<(), ConfigError> {
        if y.len() != self.n {
            return Err(ConfigError::StateLengthMismatch(y.len(), self.n));
        }
        if times.len() < 2 {
            return Err(ConfigError::TooFewTimes);
        }
        if !(self.control.atol > 0.0 && self.control.rtol > 0.0) {
            return Err(ConfigError::NonPositiveTolerance);
        }
        let sign = 1.0f64.copysign(times[1] - times[0]);
        if times.windows(2).any(|w| (w[1] - w[0]) * sign <= 0.0) {
            return Err(ConfigError::TimesNotMonotonic);
        }
        if tcrit.windows(2).any(|w| (w[1] - w[0]) * sign <= 0.0) {
            return Err(ConfigError::TcritNotMonotonic);
        }

        self.error = false;
        self.code = ReturnCode::NotSet;
        self.failure = None;
        self.stats = Stats::default();

        self.y.copy_from_slice(y);
        self.y1.fill(0.0);
        for stage in &mut self.k {
            stage.fill(0.0);
        }

        self.times.clear();
        self.times.extend_from_slice(times);
        self.times_idx = 1;
        self.tcrit.clear();
        self.tcrit.extend_from_slice(tcrit);

        self.t = times[0];
        self.sign = sign;
        self.h_initial = self.control.step_size_initial;

        // Skip critical times at or before the start in the direction of
        // integration.
        self.tcrit_idx = 0;
        while self.tcrit_idx < self.tcrit.len()
            && (self.tcrit[self.tcrit_idx] - self.t) * sign <= 0.0
        {
            self.tcrit_idx += 1;
        }

        let mut history = self.history.borrow_mut();
        history.ring.clear();
        history.y0.copy_from_slice(y);
        history.t0 = times[0];
        history.sign = sign;
        Ok(())
    }

    /// Runs one integration from `times[0]` to the last entry of `times`,
    /// reporting the interpolated solution at every intermediate output
    /// time into `result`.
    ///
    /// Returns `Err` only for configuration and storage failures; terminal
    /// integration outcomes are reported through [`Solver::code`] with
    /// statistics populated and already-emitted rows left valid.
    pub fn integrate(
        &mut self,
        y: &[f64],
        times: &[f64],
        tcrit: &[f64],
        result: &mut ResultStorage,
    ) -> Result<(), Box<dyn Error>> {
        self.reset(y, times, tcrit)?;
        let _guard = ActiveGuard::install(Rc::clone(&self.history))?;
        self.run(result)?;
        result.truncate()
    }

    fn run(&mut self, result: &mut ResultStorage) -> Result<(), Box<dyn Error>> {
        let t_end = self.times[self.times.len() - 1];
        let mut t_stop = self.next_stop(t_end);
        let uround = 10.0 * f64::EPSILON;
        let mut fac_old = 1e-4;
        let mut last = false;
        let mut stop = false;
        let mut reject = false;
        let mut h_save = 0.0;

        self.stats.n_eval += 1;
        if let Err(e) = self.model.f(self.t, &self.y, &mut self.k[0]) {
            self.fail_callback(e);
            return Ok(());
        }
        let mut h = match self.h_init() {
            Ok(h) => h,
            Err(e) => {
                self.fail_callback(e);
                return Ok(());
            }
        };
        debug!(
            "integrating from {} to {t_end} with initial step {h:e}",
            self.t
        );

        loop {
            if self.stats.n_step > self.control.step_max_n {
                self.fail(ReturnCode::ErrTooManySteps);
                break;
            }
            if 0.1 * h.abs() <= self.t.abs() * uround {
                self.fail(ReturnCode::ErrStepSizeTooSmall);
                break;
            }
            // Clamp onto the end of the interval, or failing that the next
            // critical time; the 1.01 margin shortens the second-to-last
            // step instead of leaving a sliver for the last one.
            if (self.t + 1.01 * h - t_end) * self.sign > 0.0 {
                h_save = h;
                h = t_end - self.t;
                last = true;
            } else if (self.t + 1.01 * h - t_stop) * self.sign > 0.0 {
                h = t_stop - self.t;
                stop = true;
            }
            self.stats.n_step += 1;

            if let Err(e) = self.rk_step(h) {
                self.fail_callback(e);
                break;
            }
            let err = self.error_norm();
            let mut h_new = self.control.h_new(h, err, fac_old);

            if err <= 1.0 {
                fac_old = err.max(1e-4);
                self.stats.n_accept += 1;
                trace!("accepted step to {} (h {h:e}, err {err:e})", self.t + h);
                self.save_history(h);
                // FSAL rotation: the end-point derivative becomes the next
                // first stage, the trial state becomes current.
                self.k.swap(0, 1);
                std::mem::swap(&mut self.y, &mut self.y1);
                self.t += h;

                if let Err(failure) = self.emit(result) {
                    match failure {
                        EmitFailure::Callback(e) => {
                            self.fail_callback(e);
                            break;
                        }
                        EmitFailure::Storage(e) => return Err(e),
                    }
                }
                // Later writes go to a fresh slot; lag queries from the
                // next step's stages can reach the record just saved.
                self.history.borrow_mut().ring.head_advance();

                if last {
                    self.h_initial = h_save;
                    self.code = ReturnCode::OkComplete;
                    debug!("completed at {} after {} steps", self.t, self.stats.n_step);
                    break;
                }
                if h_new.abs() >= self.control.step_size_max {
                    h_new = self.control.step_size_max.copysign(self.sign);
                }
                if reject {
                    h_new = h_new.abs().min(h.abs()).copysign(self.sign);
                    reject = false;
                }
                if stop {
                    self.tcrit_idx += 1;
                    t_stop = self.next_stop(t_end);
                    stop = false;
                    // Keep the clamped h: the next step starts fresh from
                    // the landmark.
                } else {
                    h = h_new;
                }
            } else {
                h = self.control.h_shrink(h, err);
                trace!("rejected step at {} (err {err:e})", self.t);
                reject = true;
                if self.stats.n_accept >= 1 {
                    self.stats.n_reject += 1;
                }
                last = false;
                stop = false;
            }
        }
        Ok(())
    }

    /// Next critical time ahead of the current position, clamped to the end
    /// of the interval.
    fn next_stop(&self, t_end: f64) -> f64 {
        match self.tcrit.get(self.tcrit_idx) {
            Some(&tc) if (tc - t_end) * self.sign < 0.0 => tc,
            _ => t_end,
        }
    }

    /// Report every pending output time covered by the step just accepted,
    /// interpolating from the record still sitting at the ring head.
    fn emit(&mut self, result: &mut ResultStorage) -> Result<(), EmitFailure> {
        while self.times_idx < self.times.len()
            && (self.times[self.times_idx] - self.t) * self.sign <= 0.0
        {
            let t_out = self.times[self.times_idx];
            {
                let history = self.history.borrow();
                let record = Record::new(history.ring.head(), self.method, self.n);
                record.eval_all(t_out, &mut self.y_report);
            }
            if self.n_out > 0 {
                if let Err(e) = self.model.output(t_out, &self.y_report, &mut self.out_report) {
                    return Err(EmitFailure::Callback(e));
                }
            }
            result
                .save(t_out, &self.y_report, &self.out_report)
                .map_err(EmitFailure::Storage)?;
            self.times_idx += 1;
        }
        Ok(())
    }

    fn fail(&mut self, code: ReturnCode) {
        self.error = true;
        self.code = code;
        warn!(
            "integration stopped at {}: {code:?} ({} steps)",
            self.t, self.stats.n_step
        );
    }

    fn fail_callback(&mut self, e: Box<dyn Error>) {
        warn!("callback failed at {}: {e}", self.t);
        self.error = true;
        self.code = ReturnCode::ErrTargetFailure;
        self.failure = Some(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lag::ylag_1;
    use crate::stepping::AdaptiveStepControl;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::{E, PI};

    struct Decay;

    impl DdeModel for Decay {
        fn f(&mut self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Box<dyn Error>> {
            dydt[0] = -y[0];
            Ok(())
        }
    }

    struct Oscillator;

    impl DdeModel for Oscillator {
        fn f(&mut self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), Box<dyn Error>> {
            dydt[0] = y[1];
            dydt[1] = -y[0];
            Ok(())
        }
    }

    // Constant slope with a sign flip at t = 1.
    struct Kick;

    impl DdeModel for Kick {
        fn f(&mut self, t: f64, _y: &[f64], dydt: &mut [f64]) -> Result<(), Box<dyn Error>> {
            dydt[0] = if t < 1.0 { 1.0 } else { -1.0 };
            Ok(())
        }
    }

    // y'(t) = -y(t - 1) with constant initial history.
    struct Delayed;

    impl DdeModel for Delayed {
        fn f(&mut self, t: f64, _y: &[f64], dydt: &mut [f64]) -> Result<(), Box<dyn Error>> {
            dydt[0] = -ylag_1(t - 1.0, 0)?;
            Ok(())
        }
    }

    fn tolerances(tol: f64) -> AdaptiveStepControl {
        AdaptiveStepControl::default()
            .with_abs_tol(tol)
            .with_rel_tol(tol)
    }

    #[test]
    fn test_exponential_decay() {
        let mut solver = Solver::new(Decay, 1, 0, 100)
            .unwrap()
            .with_control(tolerances(1e-8));
        let mut storage = ResultStorage::memory();
        let times = [0.0, 0.5, 1.0, 1.5, 2.0];
        solver
            .integrate(&[1.0], &times, &[], &mut storage)
            .unwrap();

        assert_eq!(solver.code(), ReturnCode::OkComplete);
        assert!(!solver.error());
        let rows = storage.as_memory().unwrap();
        assert_eq!(rows.t, &times[1..]);
        for (row, &t) in rows.y.iter().zip(&times[1..]) {
            assert_abs_diff_eq!(row[0], (-t).exp(), epsilon = 1e-6);
        }

        let stats = solver.stats();
        assert_eq!(stats.n_step, stats.n_accept + stats.n_reject);
        assert!(stats.n_accept >= rows.len());
        assert!(stats.n_eval >= 2 + 6 * stats.n_step);

        // FSAL: the first stage now holds the derivative at the end state.
        assert_abs_diff_eq!(solver.k[0][0], -solver.y()[0], epsilon = 1e-15);
    }

    #[test]
    fn test_harmonic_oscillator() {
        let mut solver = Solver::new(Oscillator, 2, 0, 400)
            .unwrap()
            .with_control(tolerances(1e-9));
        let mut storage = ResultStorage::memory();
        let times = [0.0, PI / 2.0, PI, 1.5 * PI, 2.0 * PI];
        solver
            .integrate(&[1.0, 0.0], &times, &[], &mut storage)
            .unwrap();

        assert_eq!(solver.code(), ReturnCode::OkComplete);
        let rows = storage.as_memory().unwrap();
        assert_abs_diff_eq!(rows.y[1][0], -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(rows.y[1][1], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(rows.y[3][0], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(rows.y[3][1], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_history_records_are_monotone_and_continuous() {
        let mut solver = Solver::new(Oscillator, 2, 0, 400)
            .unwrap()
            .with_control(tolerances(1e-9));
        let mut storage = ResultStorage::memory();
        solver
            .integrate(&[1.0, 0.0], &[0.0, 2.0 * PI], &[], &mut storage)
            .unwrap();
        assert_eq!(solver.code(), ReturnCode::OkComplete);

        let history = solver.history.borrow();
        let ring = &history.ring;
        assert!(ring.used() > 2);
        for k in 1..ring.used() {
            let prev = Record::new(ring.tail_offset(k - 1), solver.method, 2);
            let next = Record::new(ring.tail_offset(k), solver.method, 2);
            // Monotone time across accepted steps.
            assert!((next.t_start() - prev.t_start()) * solver.sign > 0.0);
            // Dense output is continuous at step boundaries: the end of
            // each record matches the start of the next.
            let t_bound = next.t_start();
            for i in 0..2 {
                assert_abs_diff_eq!(
                    prev.eval_1(t_bound, i),
                    next.eval_1(t_bound, i),
                    epsilon = 1e-9
                );
            }
        }
    }

    #[test]
    fn test_critical_time_lands_exactly() {
        let mut solver = Solver::new(Kick, 1, 0, 400)
            .unwrap()
            .with_control(tolerances(1e-12));
        let mut storage = ResultStorage::memory();
        solver
            .integrate(&[0.0], &[0.0, 0.5, 1.0, 1.5, 2.0], &[1.0], &mut storage)
            .unwrap();

        assert_eq!(solver.code(), ReturnCode::OkComplete);
        let rows = storage.as_memory().unwrap();
        assert_abs_diff_eq!(rows.y[0][0], 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(rows.y[1][0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(rows.y[3][0], 0.0, epsilon = 1e-9);

        // Exactly one accepted step boundary sits on the critical time.
        let history = solver.history.borrow();
        let ring = &history.ring;
        let boundaries = (0..ring.used())
            .map(|k| Record::new(ring.tail_offset(k), solver.method, 1).t_start())
            .filter(|t_start| (t_start - 1.0).abs() <= 1e-12)
            .count();
        assert_eq!(boundaries, 1);
    }

    #[test]
    fn test_tcrit_before_start_is_skipped() {
        let mut solver = Solver::new(Decay, 1, 0, 100)
            .unwrap()
            .with_control(tolerances(1e-8));
        let mut storage = ResultStorage::memory();
        solver
            .integrate(&[1.0], &[0.0, 2.0], &[-1.0, 1.0], &mut storage)
            .unwrap();
        assert_eq!(solver.code(), ReturnCode::OkComplete);

        let history = solver.history.borrow();
        let ring = &history.ring;
        assert!((0..ring.used()).any(|k| {
            let t_start = Record::new(ring.tail_offset(k), solver.method, 1).t_start();
            (t_start - 1.0).abs() <= 1e-12
        }));
    }

    #[test]
    fn test_max_steps_aborts_cleanly() {
        let mut solver = Solver::new(Decay, 1, 0, 100)
            .unwrap()
            .with_control(tolerances(1e-8).with_max_steps(5));
        let mut storage = ResultStorage::memory();
        solver
            .integrate(&[1.0], &[0.0, 0.5, 1.0, 1.5, 2.0], &[], &mut storage)
            .unwrap();

        assert!(solver.error());
        assert_eq!(solver.code(), ReturnCode::ErrTooManySteps);
        assert_eq!(solver.stats().n_step, 6);
        // Rows already emitted remain valid.
        let rows = storage.as_memory().unwrap();
        assert!(rows.len() < 4);
        for (t, row) in rows.t.iter().zip(&rows.y) {
            assert_abs_diff_eq!(row[0], (-t).exp(), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_delay_equation() {
        let mut solver = Solver::new(Delayed, 1, 0, 200).unwrap();
        let mut storage = ResultStorage::memory();
        let times = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        solver
            .integrate(&[1.0], &times, &[], &mut storage)
            .unwrap();

        assert_eq!(solver.code(), ReturnCode::OkComplete);
        let rows = storage.as_memory().unwrap();
        // With constant initial history the solution is 1 - t on [0, 1],
        // then (t - 2)^2 / 2 - 1/2 on [1, 2].
        assert_abs_diff_eq!(rows.y[0][0], 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(rows.y[1][0], -0.5, epsilon = 1e-4);
        for row in &rows.y {
            assert!(row[0].is_finite());
            assert!(row[0].abs() <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn test_lag_outside_window_fails_the_integration() {
        // Two history records cannot cover a unit delay once past t = 1.
        let mut solver = Solver::new(Delayed, 1, 0, 2)
            .unwrap()
            .with_control(AdaptiveStepControl::default().with_max_step(0.25));
        let mut storage = ResultStorage::memory();
        solver
            .integrate(&[1.0], &[0.0, 5.0], &[], &mut storage)
            .unwrap();

        assert!(solver.error());
        assert_eq!(solver.code(), ReturnCode::ErrTargetFailure);
        let failure = solver.failure().unwrap();
        assert!(failure.to_string().contains("history"));
    }

    #[test]
    fn test_reverse_integration() {
        let mut solver = Solver::new(Decay, 1, 0, 100)
            .unwrap()
            .with_control(tolerances(1e-8));
        let mut storage = ResultStorage::memory();
        solver
            .integrate(&[1.0], &[1.0, 0.5, 0.25, 0.0], &[], &mut storage)
            .unwrap();

        assert_eq!(solver.code(), ReturnCode::OkComplete);
        assert_eq!(solver.sign, -1.0);
        let rows = storage.as_memory().unwrap();
        assert_eq!(rows.t, vec![0.5, 0.25, 0.0]);
        assert_abs_diff_eq!(rows.y[2][0], E, epsilon = 1e-6);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut solver = Solver::new(Decay, 1, 0, 100)
            .unwrap()
            .with_control(tolerances(1e-8));
        let times = [0.0, 0.5, 1.0, 1.5, 2.0];

        let mut first = ResultStorage::memory();
        solver
            .integrate(&[1.0], &times, &[], &mut first)
            .unwrap();
        let first_stats = solver.stats();

        let mut second = ResultStorage::memory();
        solver
            .integrate(&[1.0], &times, &[], &mut second)
            .unwrap();

        assert_eq!(first.as_memory().unwrap(), second.as_memory().unwrap());
        assert_eq!(first_stats, solver.stats());
    }

    #[test]
    fn test_completion_suggests_a_continuation_step() {
        let mut solver = Solver::new(Decay, 1, 0, 100)
            .unwrap()
            .with_control(tolerances(1e-8));
        let mut storage = ResultStorage::memory();
        solver
            .integrate(&[1.0], &[0.0, 1.0], &[], &mut storage)
            .unwrap();
        assert_eq!(solver.code(), ReturnCode::OkComplete);
        // The configured value stays untouched; the suggestion is the
        // prediction saved when the final step was truncated.
        assert_eq!(solver.control().step_size_initial, 0.0);
        assert!(solver.step_size_initial() > 0.0);
    }

    #[test]
    fn test_configuration_errors() {
        assert!(matches!(
            Solver::new(Decay, 0, 0, 100),
            Err(ConfigError::ZeroDimension)
        ));
        assert!(matches!(
            Solver::new(Decay, 1, 0, 1),
            Err(ConfigError::HistoryTooSmall)
        ));

        let mut solver = Solver::new(Decay, 1, 0, 100).unwrap();
        assert!(matches!(
            solver.reset(&[1.0, 2.0], &[0.0, 1.0], &[]),
            Err(ConfigError::StateLengthMismatch(2, 1))
        ));
        assert!(matches!(
            solver.reset(&[1.0], &[0.0], &[]),
            Err(ConfigError::TooFewTimes)
        ));
        assert!(matches!(
            solver.reset(&[1.0], &[0.0, 1.0, 0.5], &[]),
            Err(ConfigError::TimesNotMonotonic)
        ));
        assert!(matches!(
            solver.reset(&[1.0], &[0.0, 1.0], &[0.5, 0.2]),
            Err(ConfigError::TcritNotMonotonic)
        ));
        solver.control_mut().atol = 0.0;
        assert!(matches!(
            solver.reset(&[1.0], &[0.0, 1.0], &[]),
            Err(ConfigError::NonPositiveTolerance)
        ));
    }
}
