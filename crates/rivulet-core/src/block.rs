//! Sample blocks and per-block vector arithmetic.
//!
//! A [`SampleBlock`] is the unit of signal exchanged between processors: one
//! channel of one audio block. Every inlet and outlet of every processor owns
//! one, allocated when the processor is created (on the control thread) and
//! reused for the lifetime of the session.
//!
//! The free functions in this module ([`mac`], [`index_fetch`], [`prefix_sum`])
//! operate on plain slices so processors can apply them to sub-ranges of a block.
//! All loops are written as zipped iterators so the compiler can vectorize them.
//!
//! # Capacity semantics
//!
//! `length <= capacity` always holds. [`SampleBlock::resize`] to a length within
//! capacity only moves the length marker; growing past capacity reallocates and
//! does not preserve prior contents.

use core::ops::{Deref, DerefMut};

/// One channel of samples for a single audio block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleBlock {
    data: Vec<f32>,
    len: usize,
}

impl SampleBlock {
    /// Creates a zeroed block whose length and capacity are both `len`.
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0.0; len],
            len,
        }
    }

    /// Creates a block holding a copy of `samples`.
    pub fn from_slice(samples: &[f32]) -> Self {
        Self {
            data: samples.to_vec(),
            len: samples.len(),
        }
    }

    /// Number of valid samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the block holds no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of samples the block can hold without reallocating.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Changes the valid length.
    ///
    /// Within capacity this never touches storage, so samples past the old
    /// length keep whatever they held. Beyond capacity the storage is replaced
    /// by a zeroed allocation of exactly `new_len` samples.
    ///
    /// Returns `true` if the block was reallocated.
    pub fn resize(&mut self, new_len: usize) -> bool {
        if new_len <= self.data.len() {
            self.len = new_len;
            false
        } else {
            self.data = vec![0.0; new_len];
            self.len = new_len;
            true
        }
    }

    /// Valid samples as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data[..self.len]
    }

    /// Valid samples as a mutable slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data[..self.len]
    }

    /// Sets every sample to zero.
    #[inline]
    pub fn zero(&mut self) {
        self.as_mut_slice().fill(0.0);
    }

    /// Sets every sample to `value`.
    #[inline]
    pub fn fill(&mut self, value: f32) {
        self.as_mut_slice().fill(value);
    }

    /// Copies `src` into this block. Copies the overlapping length only.
    pub fn copy_from(&mut self, src: &[f32]) {
        let n = self.len.min(src.len());
        self.data[..n].copy_from_slice(&src[..n]);
    }

    /// Adds `src` sample-by-sample into this block (fan-in summing).
    pub fn accumulate(&mut self, src: &[f32]) {
        for (dst, s) in self.as_mut_slice().iter_mut().zip(src) {
            *dst += *s;
        }
    }

    /// Multiplies every sample by `k`.
    pub fn const_mul(&mut self, k: f32) {
        for s in self.as_mut_slice() {
            *s *= k;
        }
    }

    /// Adds `k` to every sample.
    pub fn const_add(&mut self, k: f32) {
        for s in self.as_mut_slice() {
            *s += k;
        }
    }

    /// Truncates every sample toward zero.
    pub fn truncate(&mut self) {
        for s in self.as_mut_slice() {
            *s = s.trunc();
        }
    }

    /// Replaces every sample with its floating-point remainder by `modulus`.
    ///
    /// Follows C `fmod`: the result has the sign of the sample. A zero modulus
    /// leaves the block unchanged.
    pub fn fmod(&mut self, modulus: f32) {
        if modulus == 0.0 {
            return;
        }
        for s in self.as_mut_slice() {
            *s %= modulus;
        }
    }
}

impl From<Vec<f32>> for SampleBlock {
    /// Takes ownership of `samples` without copying.
    fn from(samples: Vec<f32>) -> Self {
        let len = samples.len();
        Self { data: samples, len }
    }
}

impl Deref for SampleBlock {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        self.as_slice()
    }
}

impl DerefMut for SampleBlock {
    fn deref_mut(&mut self) -> &mut [f32] {
        self.as_mut_slice()
    }
}

/// Multiply-accumulate: `out[i] += a[i] * b[i] * gate[i]`.
///
/// Without a gate the factor is 1. Processes the shortest common length.
pub fn mac(a: &[f32], b: &[f32], gate: Option<&[f32]>, out: &mut [f32]) {
    match gate {
        Some(gate) => {
            for (((o, x), y), g) in out.iter_mut().zip(a).zip(b).zip(gate) {
                *o += x * y * g;
            }
        }
        None => {
            for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
                *o += x * y;
            }
        }
    }
}

/// Gather: `out[i] = table[trunc(indices[i])]`.
///
/// Indices outside the table (including negative and non-finite ones) yield 0.0.
pub fn index_fetch(indices: &[f32], table: &[f32], out: &mut [f32]) {
    for (o, &idx) in out.iter_mut().zip(indices) {
        *o = if idx >= 0.0 && idx < table.len() as f32 {
            table[idx as usize]
        } else {
            0.0
        };
    }
}

/// Running sum used for phase accumulation.
///
/// `out[i] = initial + scale * Σ_{j=0..=i} deltas[j]`, or a pure ramp
/// `initial + scale * (i + 1)` when `deltas` is `None`. Returns the final
/// accumulator, which is `initial` for an empty `out`.
///
/// The accumulator runs in `f64` so long blocks do not drift.
pub fn prefix_sum(deltas: Option<&[f32]>, scale: f32, initial: f32, out: &mut [f32]) -> f32 {
    let scale = f64::from(scale);
    let mut acc = f64::from(initial);
    match deltas {
        Some(deltas) => {
            debug_assert!(deltas.len() >= out.len(), "prefix_sum: deltas shorter than output");
            for (o, &d) in out.iter_mut().zip(deltas) {
                acc += scale * f64::from(d);
                *o = acc as f32;
            }
        }
        None => {
            for (i, o) in out.iter_mut().enumerate() {
                *o = (f64::from(initial) + scale * (i + 1) as f64) as f32;
            }
            acc += scale * out.len() as f64;
        }
    }
    acc as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_within_capacity_keeps_storage() {
        let mut block = SampleBlock::new(64);
        block.fill(1.0);
        assert!(!block.resize(16));
        assert_eq!(block.len(), 16);
        assert_eq!(block.capacity(), 64);
        // Growing back within capacity exposes the untouched samples.
        assert!(!block.resize(64));
        assert!(block.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_resize_beyond_capacity_reallocates() {
        let mut block = SampleBlock::new(8);
        assert!(block.resize(32));
        assert_eq!(block.len(), 32);
        assert_eq!(block.capacity(), 32);
    }

    #[test]
    fn test_fill_zero_and_const_ops() {
        let mut block = SampleBlock::new(4);
        block.fill(2.0);
        block.const_mul(3.0);
        block.const_add(-1.0);
        assert_eq!(block.as_slice(), &[5.0; 4]);
        block.zero();
        assert_eq!(block.as_slice(), &[0.0; 4]);
    }

    #[test]
    fn test_accumulate_sums() {
        let mut block = SampleBlock::new(3);
        block.accumulate(&[1.0, 2.0, 3.0]);
        block.accumulate(&[1.0, 1.0, 1.0]);
        assert_eq!(block.as_slice(), &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_copy_from_shorter_source() {
        let mut block = SampleBlock::new(4);
        block.fill(9.0);
        block.copy_from(&[1.0, 2.0]);
        assert_eq!(block.as_slice(), &[1.0, 2.0, 9.0, 9.0]);
    }

    #[test]
    fn test_truncate_and_fmod() {
        let mut block = SampleBlock::from_slice(&[1.7, -1.7, 3.5, -0.2]);
        block.truncate();
        assert_eq!(block.as_slice(), &[1.0, -1.0, 3.0, -0.0]);

        let mut block = SampleBlock::from_slice(&[2.5, -2.5, 0.75]);
        block.fmod(1.0);
        assert_eq!(block.as_slice(), &[0.5, -0.5, 0.75]);

        block.fmod(0.0);
        assert_eq!(block.as_slice(), &[0.5, -0.5, 0.75]);
    }

    #[test]
    fn test_mac_with_and_without_gate() {
        let a = [1.0, 2.0, 3.0];
        let b = [2.0, 2.0, 2.0];
        let mut out = [1.0; 3];
        mac(&a, &b, None, &mut out);
        assert_eq!(out, [3.0, 5.0, 7.0]);

        let gate = [1.0, 0.0, 0.5];
        let mut out = [0.0; 3];
        mac(&a, &b, Some(&gate), &mut out);
        assert_eq!(out, [2.0, 0.0, 3.0]);
    }

    #[test]
    fn test_index_fetch_out_of_range() {
        let table = [10.0, 20.0, 30.0];
        let mut out = [0.0; 5];
        index_fetch(&[0.0, 1.9, 2.0, 3.0, -1.0], &table, &mut out);
        assert_eq!(out, [10.0, 20.0, 30.0, 0.0, 0.0]);
    }

    #[test]
    fn test_prefix_sum_with_deltas() {
        let deltas = [1.0, 2.0, 3.0];
        let mut out = [0.0; 3];
        let last = prefix_sum(Some(&deltas), 2.0, 10.0, &mut out);
        assert_eq!(out, [12.0, 16.0, 22.0]);
        assert_eq!(last, 22.0);
    }

    #[test]
    fn test_prefix_sum_ramp() {
        let mut out = [0.0; 4];
        let last = prefix_sum(None, 0.5, 1.0, &mut out);
        assert_eq!(out, [1.5, 2.0, 2.5, 3.0]);
        assert_eq!(last, 3.0);
    }

    #[test]
    fn test_prefix_sum_empty_returns_initial() {
        let mut out: [f32; 0] = [];
        assert_eq!(prefix_sum(None, 1.0, 4.0, &mut out), 4.0);
    }
}
