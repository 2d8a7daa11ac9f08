//! The Dormand-Prince 5(4) trial-step kernel and its companions: the
//! weighted error norm, the history-record finalisation, and the automatic
//! initial-step estimate.

use std::error::Error;

use log::debug;

use crate::model::DdeModel;
use crate::solver::Solver;

impl<M: DdeModel> Solver<M> {
    /// One trial step of size `h` from the current `(t, y)`.
    ///
    /// On entry `k[0]` holds the derivative at `(t, y)`. Computes the
    /// remaining stages through the tableau, the trial state `y1`, the
    /// dense-output plane that needs the full stage set, and the embedded
    /// error vector. The evaluation at `(t + h, y1)` lands in `k[1]` and
    /// becomes the next first stage when the step is accepted.
    pub(crate) fn rk_step(&mut self, h: f64) -> Result<(), Box<dyn Error>> {
        let n = self.n;

        for s in 1..6 {
            let t_stage = self.t + self.tableau.c[s] * h;
            let (stages, scratch) = self.k.split_at_mut(6);
            let ys = &mut scratch[0];
            for i in 0..n {
                let mut acc = 0.0;
                for (j, kj) in stages.iter().take(s).enumerate() {
                    acc += self.tableau.a[s][j] * kj[i];
                }
                ys[i] = self.y[i] + h * acc;
            }
            self.stats.n_eval += 1;
            self.model.f(t_stage, &scratch[0], &mut stages[s])?;
        }

        // Trial end state from the propagating row.
        for i in 0..n {
            let mut acc = 0.0;
            for (j, kj) in self.k.iter().take(6).enumerate() {
                acc += self.tableau.a[6][j] * kj[i];
            }
            self.y1[i] = self.y[i] + h * acc;
        }
        self.stats.n_eval += 1;
        let t_next = self.t + h;
        self.model.f(t_next, &self.y1, &mut self.k[1])?;

        // Dense-output plane that combines the stage derivatives; the
        // remaining planes are cheap and are finalised on acceptance. The
        // end-point derivative lives in the second stage slot.
        {
            let d = &self.tableau.d;
            let mut history = self.history.borrow_mut();
            let head = history.ring.head_mut();
            for i in 0..n {
                head[4 * n + i] = h
                    * (d[0] * self.k[0][i]
                        + d[2] * self.k[2][i]
                        + d[3] * self.k[3][i]
                        + d[4] * self.k[4][i]
                        + d[5] * self.k[5][i]
                        + d[6] * self.k[1][i]);
            }
        }

        // Embedded error vector, into the spare slot.
        let e = &self.tableau.e;
        let (stages, scratch) = self.k.split_at_mut(6);
        for i in 0..n {
            scratch[0][i] = h
                * (e[0] * stages[0][i]
                    + e[2] * stages[2][i]
                    + e[3] * stages[3][i]
                    + e[4] * stages[4][i]
                    + e[5] * stages[5][i]
                    + e[6] * stages[1][i]);
        }
        Ok(())
    }

    /// Weighted RMS norm of the embedded error estimate left by
    /// [`Solver::rk_step`].
    pub(crate) fn error_norm(&self) -> f64 {
        let mut err = 0.0;
        for i in 0..self.n {
            let sk = self.control.atol
                + self.control.rtol * self.y[i].abs().max(self.y1[i].abs());
            err += (self.k[6][i] / sk).powi(2);
        }
        (err / self.n as f64).sqrt()
    }

    /// Finalise the history record at the ring head for an accepted step of
    /// size `h`. The stage-combination plane was already written during the
    /// trial; the remaining planes need only the step endpoints and the two
    /// end derivatives.
    pub(crate) fn save_history(&mut self, h: f64) {
        let n = self.n;
        let idx_t = self.method.time_offset(n);
        let mut history = self.history.borrow_mut();
        let head = history.ring.head_mut();
        for i in 0..n {
            let ydiff = self.y1[i] - self.y[i];
            let bspl = h * self.k[0][i] - ydiff;
            head[i] = self.y[i];
            head[n + i] = ydiff;
            head[2 * n + i] = bspl;
            head[3 * n + i] = -h * self.k[1][i] + ydiff - bspl;
        }
        head[idx_t] = self.t;
        head[idx_t + 1] = h;
    }

    /// Starting step size: the configured value when set, otherwise the
    /// two-phase estimate of Hairer's implementation (an explicit-Euler
    /// probe followed by a second-derivative bound).
    pub(crate) fn h_init(&mut self) -> Result<f64, Box<dyn Error>> {
        if self.h_initial > 0.0 {
            return Ok(self.h_initial.copysign(self.sign));
        }
        let n = self.n;
        let atol = self.control.atol;
        let rtol = self.control.rtol;

        // First guess h = 0.01 * norm(y) / norm(f): the Euler increment
        // stays small against the solution.
        let mut norm_f = 0.0;
        let mut norm_y = 0.0;
        for i in 0..n {
            let sk = atol + rtol * self.y[i].abs();
            norm_f += (self.k[0][i] / sk).powi(2);
            norm_y += (self.y[i] / sk).powi(2);
        }
        let mut h = if norm_f <= 1e-10 || norm_y <= 1e-10 {
            1e-6
        } else {
            0.01 * (norm_y / norm_f).sqrt()
        };
        h = h.min(self.control.step_size_max).copysign(self.sign);

        // Explicit Euler probe; clobbers the scratch slot and the second
        // stage, both rewritten by the first trial step.
        let t_probe = self.t + h;
        {
            let (stages, scratch) = self.k.split_at_mut(6);
            for i in 0..n {
                scratch[0][i] = self.y[i] + h * stages[0][i];
            }
        }
        self.stats.n_eval += 1;
        let (stages, scratch) = self.k.split_at_mut(6);
        self.model.f(t_probe, &scratch[0], &mut stages[1])?;

        // Second-derivative estimate from the derivative difference.
        let mut der2 = 0.0;
        for i in 0..n {
            let sk = atol + rtol * self.y[i].abs();
            der2 += ((stages[1][i] - stages[0][i]) / sk).powi(2);
        }
        let der2 = der2.sqrt() / h;

        // Step size such that h^order * max(norm(y''), norm(f)) = 0.01.
        let der12 = der2.abs().max(norm_f.sqrt());
        let h1 = if der12 <= 1e-15 {
            (1e-6f64).max(h.abs() * 1e-3)
        } else {
            (0.01 / der12).powf(1.0 / self.method.order() as f64)
        };
        let h = (100.0 * h.abs())
            .min(h1)
            .min(self.control.step_size_max);
        debug!("estimated initial step size {h:e}");
        Ok(h.copysign(self.sign))
    }
}
