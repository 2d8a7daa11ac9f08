//! Continuous extension of accepted steps.
//!
//! Each accepted step stores `order` coefficient planes of length `n`
//! followed by the step start time and the step size. Evaluation is the
//! nested Horner form in `theta = (t - t_start) / h`; callers pick the
//! record (the lag search, or the just-finalised head during output
//! emission) and may evaluate slightly outside `[0, 1]` when a lag falls
//! beyond the newest accepted step.

use crate::solver::Method;

/// Read-only view of one history record.
#[derive(Clone, Copy)]
pub struct Record<'a> {
    data: &'a [f64],
    method: Method,
    n: usize,
}

impl<'a> Record<'a> {
    pub fn new(data: &'a [f64], method: Method, n: usize) -> Self {
        debug_assert_eq!(data.len(), method.record_stride(n));
        Self { data, method, n }
    }

    /// Time at the start of the stored step.
    pub fn t_start(&self) -> f64 {
        self.data[self.method.time_offset(self.n)]
    }

    /// Signed step size of the stored step.
    pub fn h(&self) -> f64 {
        self.data[self.method.time_offset(self.n) + 1]
    }

    fn theta(&self, t: f64) -> (f64, f64) {
        let theta = (t - self.t_start()) / self.h();
        (theta, 1.0 - theta)
    }

    /// Evaluate component `i` at time `t`.
    pub fn eval_1(&self, t: f64, i: usize) -> f64 {
        let (theta, theta1) = self.theta(t);
        let n = self.n;
        let d = self.data;
        d[i] + theta
            * (d[n + i] + theta1 * (d[2 * n + i] + theta * (d[3 * n + i] + theta1 * d[4 * n + i])))
    }

    /// Evaluate every component at time `t` into `y` (length `n`).
    pub fn eval_all(&self, t: f64, y: &mut [f64]) {
        let (theta, theta1) = self.theta(t);
        let n = self.n;
        let d = self.data;
        for i in 0..n {
            y[i] = d[i]
                + theta
                    * (d[n + i]
                        + theta1
                            * (d[2 * n + i] + theta * (d[3 * n + i] + theta1 * d[4 * n + i])));
        }
    }

    /// Evaluate the components named by `idx` at time `t` into `y`
    /// (same length as `idx`).
    pub fn eval_idx(&self, t: f64, idx: &[usize], y: &mut [f64]) {
        let (theta, theta1) = self.theta(t);
        let n = self.n;
        let d = self.data;
        for (k, &i) in idx.iter().enumerate() {
            y[k] = d[i]
                + theta
                    * (d[n + i]
                        + theta1
                            * (d[2 * n + i] + theta * (d[3 * n + i] + theta1 * d[4 * n + i])));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    const TOL: f64 = 1e-14;

    // A record for a one-dimensional system: planes C0..C4 then t_start, h.
    fn record(c: [f64; 5], t_start: f64, h: f64) -> Vec<f64> {
        vec![c[0], c[1], c[2], c[3], c[4], t_start, h]
    }

    #[test]
    fn test_endpoints_recover_step_states() {
        // C0 is the state at the step start; theta = 1 collapses every
        // theta1 term, so the end state is C0 + C1.
        let data = record([2.0, -0.5, 0.3, -0.7, 0.11], 1.0, 0.25);
        let rec = Record::new(&data, Method::Dopri5, 1);
        assert_abs_diff_eq!(rec.eval_1(1.0, 0), 2.0, epsilon = TOL);
        assert_abs_diff_eq!(rec.eval_1(1.25, 0), 1.5, epsilon = TOL);
    }

    #[test]
    fn test_interior_value_is_nested_polynomial() {
        let data = record([1.0, 2.0, 3.0, 4.0, 5.0], 0.0, 2.0);
        let rec = Record::new(&data, Method::Dopri5, 1);
        let theta: f64 = 0.25;
        let theta1 = 1.0 - theta;
        let expected =
            1.0 + theta * (2.0 + theta1 * (3.0 + theta * (4.0 + theta1 * 5.0)));
        assert_abs_diff_eq!(rec.eval_1(0.5, 0), expected, epsilon = TOL);
    }

    #[test]
    fn test_entry_points_agree() {
        // Two components with different coefficient planes.
        let data = vec![
            1.0, 10.0, // C0
            2.0, 20.0, // C1
            3.0, 30.0, // C2
            4.0, 40.0, // C3
            5.0, 50.0, // C4
            0.0, 1.0, // t_start, h
        ];
        let rec = Record::new(&data, Method::Dopri5, 2);
        let t = 0.7;

        let mut all = [0.0; 2];
        rec.eval_all(t, &mut all);

        let mut sub = [0.0; 2];
        rec.eval_idx(t, &[1, 0], &mut sub);

        assert_abs_diff_eq!(all[0], rec.eval_1(t, 0), epsilon = TOL);
        assert_abs_diff_eq!(all[1], rec.eval_1(t, 1), epsilon = TOL);
        assert_abs_diff_eq!(sub[0], all[1], epsilon = TOL);
        assert_abs_diff_eq!(sub[1], all[0], epsilon = TOL);
    }
}
