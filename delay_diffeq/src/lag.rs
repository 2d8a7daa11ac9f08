//! Lag access for delay differential equations.
//!
//! While an integration runs, the derivative callback can query past states
//! without the solver appearing in its signature: the driver installs the
//! solver's history in a thread-local slot on entry and clears it on every
//! exit path. The context is per thread, so independent integrations on
//! different threads never alias, and entering the driver while a context
//! is already installed fails before any stepping.

use std::cell::RefCell;
use std::rc::Rc;

use ring_buffer::RingBuffer;
use thiserror::Error;

use crate::dense::Record;
use crate::solver::{ConfigError, Method};

/// Domain errors raised by lag queries, distinct from integration failure.
#[derive(Debug, Error)]
pub enum LagError {
    #[error("no integration is active on this thread")]
    NoActiveSolver,
    #[error("cannot find the queried time within the history buffer")]
    TimeNotRetained,
    #[error("lag index {0} is out of bounds for a system of dimension {1}")]
    IndexOutOfBounds(usize, usize),
    #[error("lag output length {0} does not match the query length {1}")]
    LengthMismatch(usize, usize),
}

/// The per-integration state consulted by lag queries: the initial-state
/// snapshot and the ring of dense-output records. Owned by the solver and
/// shared with the thread-local context for the duration of one driver run.
pub(crate) struct History {
    pub(crate) method: Method,
    pub(crate) n: usize,
    pub(crate) t0: f64,
    pub(crate) sign: f64,
    pub(crate) y0: Vec<f64>,
    pub(crate) ring: RingBuffer,
}

impl History {
    pub(crate) fn new(method: Method, n: usize, n_history: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            method,
            n,
            t0: 0.0,
            sign: 1.0,
            y0: vec![0.0; n],
            ring: RingBuffer::new(n_history, method.record_stride(n))?,
        })
    }

    /// Locate the newest record whose step start lies at or before `t` in
    /// the direction of integration.
    fn find(&self, t: f64) -> Result<Record<'_>, LagError> {
        let idx_t = self.method.time_offset(self.n);
        let used = self.ring.used();
        // Seed the bisection with a linear estimate of the record spacing;
        // the hint is advisory and temporally local queries land near it.
        let seed = if used > 1 {
            let t_first = self.ring.tail_offset(0)[idx_t];
            let t_last = self.ring.tail_offset(used - 1)[idx_t];
            let est = (t_last - t_first) / (used - 1) as f64;
            if est.is_finite() && est > 0.0 { est as usize } else { 0 }
        } else {
            0
        };
        let sign = self.sign;
        self.ring
            .search_bisect(seed, |rec| (rec[idx_t] - t) * sign <= 0.0)
            .map(|rec| Record::new(rec, self.method, self.n))
            .ok_or(LagError::TimeNotRetained)
    }
}

thread_local! {
    static ACTIVE: RefCell<Option<Rc<RefCell<History>>>> = const { RefCell::new(None) };
}

/// Installs the active history for the duration of one integration and
/// clears it when dropped, so every driver exit path releases the context.
pub(crate) struct ActiveGuard;

impl ActiveGuard {
    pub(crate) fn install(history: Rc<RefCell<History>>) -> Result<Self, ConfigError> {
        ACTIVE.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                return Err(ConfigError::AlreadyIntegrating);
            }
            *slot = Some(history);
            Ok(Self)
        })
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        ACTIVE.with(|slot| slot.borrow_mut().take());
    }
}

fn with_active<R>(query: impl FnOnce(&History) -> Result<R, LagError>) -> Result<R, LagError> {
    ACTIVE.with(|slot| {
        let slot = slot.borrow();
        let history = slot.as_ref().ok_or(LagError::NoActiveSolver)?;
        query(&history.borrow())
    })
}

/// Value of component `i` at a past time `t`.
///
/// Times at or before the initial time (in the direction of integration)
/// answer from the initial-state snapshot; later times interpolate the
/// retained history.
pub fn ylag_1(t: f64, i: usize) -> Result<f64, LagError> {
    with_active(|history| {
        if i >= history.n {
            return Err(LagError::IndexOutOfBounds(i, history.n));
        }
        if (t - history.t0) * history.sign <= 0.0 {
            Ok(history.y0[i])
        } else {
            Ok(history.find(t)?.eval_1(t, i))
        }
    })
}

/// Full state vector at a past time `t`, written into `y` (length `n`).
pub fn ylag_all(t: f64, y: &mut [f64]) -> Result<(), LagError> {
    with_active(|history| {
        if y.len() != history.n {
            return Err(LagError::LengthMismatch(y.len(), history.n));
        }
        if (t - history.t0) * history.sign <= 0.0 {
            y.copy_from_slice(&history.y0);
        } else {
            history.find(t)?.eval_all(t, y);
        }
        Ok(())
    })
}

/// Subset of components at a past time `t`: `y[k]` receives component
/// `idx[k]`.
pub fn ylag_vec(t: f64, idx: &[usize], y: &mut [f64]) -> Result<(), LagError> {
    with_active(|history| {
        if y.len() != idx.len() {
            return Err(LagError::LengthMismatch(y.len(), idx.len()));
        }
        if let Some(&bad) = idx.iter().find(|&&i| i >= history.n) {
            return Err(LagError::IndexOutOfBounds(bad, history.n));
        }
        if (t - history.t0) * history.sign <= 0.0 {
            for (slot, &i) in y.iter_mut().zip(idx) {
                *slot = history.y0[i];
            }
        } else {
            history.find(t)?.eval_idx(t, idx, y);
        }
        Ok(())
    })
}

/// As [`ylag_vec`], accepting integer-typed indices from hosts that cannot
/// supply the native size type.
pub fn ylag_vec_int(t: f64, idx: &[i32], y: &mut [f64]) -> Result<(), LagError> {
    with_active(|history| {
        if y.len() != idx.len() {
            return Err(LagError::LengthMismatch(y.len(), idx.len()));
        }
        let before = (t - history.t0) * history.sign <= 0.0;
        let record = if before { None } else { Some(history.find(t)?) };
        for (slot, &i) in y.iter_mut().zip(idx) {
            let i = usize::try_from(i).unwrap_or(history.n);
            if i >= history.n {
                return Err(LagError::IndexOutOfBounds(i, history.n));
            }
            *slot = match &record {
                None => history.y0[i],
                Some(rec) => rec.eval_1(t, i),
            };
        }
        Ok(())
    })
}
