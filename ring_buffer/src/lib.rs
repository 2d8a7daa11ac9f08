//! A fixed-capacity FIFO of fixed-stride `f64` records.
//!
//! The buffer hands out one *head* slot at a time as scratch space; calling
//! [`RingBuffer::head_advance`] commits it as the newest live record and,
//! once the buffer is full, evicts the oldest. Live records are addressed
//! oldest-first through [`RingBuffer::tail_offset`] and can be searched with
//! a seeded bisection over any monotone predicate.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingBufferError {
    #[error("capacity must be greater than zero")]
    ZeroCapacity,
    #[error("stride must be greater than zero")]
    ZeroStride,
}

#[derive(Debug, Clone)]
pub struct RingBuffer {
    /// One spare slot beyond the capacity, so the in-progress head record
    /// never aliases a live one even when the buffer is full.
    data: Vec<f64>,
    cap: usize,
    stride: usize,
    /// Slot index of the in-progress record.
    head: usize,
    /// Number of committed records.
    used: usize,
}

impl RingBuffer {
    pub fn new(cap: usize, stride: usize) -> Result<Self, RingBufferError> {
        if cap == 0 {
            return Err(RingBufferError::ZeroCapacity);
        }
        if stride == 0 {
            return Err(RingBufferError::ZeroStride);
        }
        Ok(Self {
            data: vec![0.0; (cap + 1) * stride],
            cap,
            stride,
            head: 0,
            used: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of committed records currently live.
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn is_full(&self) -> bool {
        self.used == self.cap
    }

    fn slot(&self, idx: usize) -> &[f64] {
        &self.data[idx * self.stride..(idx + 1) * self.stride]
    }

    /// The scratch slot where the next record is being built.
    pub fn head(&self) -> &[f64] {
        self.slot(self.head)
    }

    pub fn head_mut(&mut self) -> &mut [f64] {
        let start = self.head * self.stride;
        &mut self.data[start..start + self.stride]
    }

    /// Oldest live record, if any.
    pub fn tail(&self) -> Option<&[f64]> {
        if self.used == 0 { None } else { Some(self.tail_offset(0)) }
    }

    /// The `k`-th live record counting from the tail; `k == used() - 1` is
    /// the newest committed record.
    ///
    /// # Panics
    ///
    /// Panics if `k >= used()`.
    pub fn tail_offset(&self, k: usize) -> &[f64] {
        assert!(k < self.used, "tail offset {k} out of range ({} used)", self.used);
        let slots = self.cap + 1;
        let idx = (self.head + slots - self.used + k) % slots;
        self.slot(idx)
    }

    /// Commit the head slot. When the buffer is not yet full this grows
    /// `used()` by one; when full it evicts the oldest record.
    pub fn head_advance(&mut self) {
        self.head = (self.head + 1) % (self.cap + 1);
        if self.used < self.cap {
            self.used += 1;
        }
    }

    /// Drop all committed records, retaining the allocation.
    pub fn clear(&mut self) {
        self.head = 0;
        self.used = 0;
    }

    /// Find the newest live record satisfying `pred`.
    ///
    /// `pred` must be monotone over the live range: true from the tail up to
    /// some boundary, false from there through the newest record. `seed` is
    /// an advisory index hint (clamped into range) that narrows the initial
    /// bracket for temporally local queries; correctness does not depend on
    /// it. Returns `None` when no live record satisfies `pred`.
    pub fn search_bisect<F>(&self, seed: usize, pred: F) -> Option<&[f64]>
    where
        F: Fn(&[f64]) -> bool,
    {
        if self.used == 0 {
            return None;
        }
        // Invariant: records below lo satisfy pred, records at or above hi
        // do not.
        let mut lo = 0;
        let mut hi = self.used;
        let s = seed.min(self.used - 1);
        if pred(self.tail_offset(s)) {
            lo = s + 1;
        } else {
            hi = s;
        }
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if pred(self.tail_offset(mid)) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo == 0 { None } else { Some(self.tail_offset(lo - 1)) }
    }
}
