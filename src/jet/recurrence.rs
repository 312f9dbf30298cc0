//! Normalized Taylor coefficient recurrences.
//!
//! Convention: `a^[n] = a^(n)(t₀) / n!` (normalized coefficients). The
//! rules below compute the order-`n` coefficient of a tape entry from the
//! coefficients of its operands at orders `≤ n`; operands always sit
//! earlier in the tape, so within one order the table can be filled in
//! entry order.
//!
//! The coefficient table is dense, laid out order-major with one lane per
//! batch element: `data[o * n_uvars * batch + u * batch + lane]`.

use std::f64::consts::FRAC_2_SQRT_PI;

use super::{Instr, Operand};
use crate::float::Float;

/// Mutable view of the jet coefficient table.
pub(crate) struct CoeffTable<'a, T> {
    pub data: &'a mut [T],
    /// Entries per order row (`n_uvars * batch`).
    pub stride: usize,
    /// Batch lanes per entry.
    pub batch: usize,
}

impl<T: Float> CoeffTable<'_, T> {
    #[inline]
    fn idx(&self, order: usize, u: u32, lane: usize) -> usize {
        order * self.stride + u as usize * self.batch + lane
    }

    #[inline]
    pub fn get(&self, order: usize, u: u32, lane: usize) -> T {
        self.data[self.idx(order, u, lane)]
    }

    #[inline]
    pub fn set(&mut self, order: usize, u: u32, lane: usize, value: T) {
        let idx = self.idx(order, u, lane);
        self.data[idx] = value;
    }

    /// Order-`order` coefficient of an operand. Literals and parameters
    /// are constants: their value at order 0, zero above.
    #[inline]
    pub fn operand(&self, op: &Operand<T>, order: usize, lane: usize, pars: &[T]) -> T {
        match op {
            Operand::U(u) => self.get(order, *u, lane),
            Operand::Const(c) => {
                if order == 0 {
                    *c
                } else {
                    T::zero()
                }
            }
            Operand::Par(p) => {
                if order == 0 {
                    pars[*p as usize]
                } else {
                    T::zero()
                }
            }
        }
    }
}

/// Write the order-0 (value) row for the tape entry `u` defined by `instr`.
pub(crate) fn order_zero<T: Float>(
    table: &mut CoeffTable<'_, T>,
    instr: &Instr<T>,
    u: u32,
    time: &[T],
    pars: &[T],
) {
    for lane in 0..table.batch {
        let value = match instr {
            Instr::Add(a, b) => {
                table.operand(a, 0, lane, pars) + table.operand(b, 0, lane, pars)
            }
            Instr::Sub(a, b) => {
                table.operand(a, 0, lane, pars) - table.operand(b, 0, lane, pars)
            }
            Instr::Mul(a, b) => {
                table.operand(a, 0, lane, pars) * table.operand(b, 0, lane, pars)
            }
            Instr::Div(a, b) => {
                table.operand(a, 0, lane, pars) / table.operand(b, 0, lane, pars)
            }
            Instr::Sin { arg, .. } => table.operand(arg, 0, lane, pars).sin(),
            Instr::Cos { arg, .. } => table.operand(arg, 0, lane, pars).cos(),
            Instr::Exp(arg) => table.operand(arg, 0, lane, pars).exp(),
            Instr::Log(arg) => table.operand(arg, 0, lane, pars).ln(),
            Instr::Square(arg) => {
                let v = table.operand(arg, 0, lane, pars);
                v * v
            }
            Instr::Pow { arg, alpha } => table.operand(arg, 0, lane, pars).powf(*alpha),
            Instr::Erf { arg, .. } => table.operand(arg, 0, lane, pars).erf(),
            Instr::Time => time[lane],
        };
        table.set(0, u, lane, value);
    }
}

/// Compute the order-`n` coefficient (`n ≥ 1`) for the tape entry `u`
/// defined by `instr`, given all coefficients of orders `< n` and the
/// order-`n` coefficients of earlier entries.
pub(crate) fn step_order<T: Float>(
    table: &mut CoeffTable<'_, T>,
    instr: &Instr<T>,
    u: u32,
    n: usize,
    pars: &[T],
) {
    let inv_n = T::one() / T::from(n).unwrap();

    for lane in 0..table.batch {
        let value = match instr {
            Instr::Add(a, b) => {
                table.operand(a, n, lane, pars) + table.operand(b, n, lane, pars)
            }
            Instr::Sub(a, b) => {
                table.operand(a, n, lane, pars) - table.operand(b, n, lane, pars)
            }
            // Cauchy product.
            Instr::Mul(a, b) => {
                let mut sum = T::zero();
                for j in 0..=n {
                    sum = sum + table.operand(a, j, lane, pars) * table.operand(b, n - j, lane, pars);
                }
                sum
            }
            // u = v / w  ⇒  u^[n] = (v^[n] − Σ_{j=1..n} w^[j] u^[n−j]) / w^[0]
            Instr::Div(v, w) => {
                let mut sum = table.operand(v, n, lane, pars);
                for j in 1..=n {
                    sum = sum - table.operand(w, j, lane, pars) * table.get(n - j, u, lane);
                }
                sum / table.operand(w, 0, lane, pars)
            }
            // s^[n] = (1/n) Σ_{j=1..n} j v^[j] c^[n−j], with c the cosine
            // companion of the same argument.
            Instr::Sin { arg, cos_idx } => {
                let mut sum = T::zero();
                for j in 1..=n {
                    sum = sum
                        + T::from(j).unwrap()
                            * table.operand(arg, j, lane, pars)
                            * table.get(n - j, *cos_idx, lane);
                }
                sum * inv_n
            }
            Instr::Cos { arg, sin_idx } => {
                let mut sum = T::zero();
                for j in 1..=n {
                    sum = sum
                        + T::from(j).unwrap()
                            * table.operand(arg, j, lane, pars)
                            * table.get(n - j, *sin_idx, lane);
                }
                -sum * inv_n
            }
            // u^[n] = (1/n) Σ_{j=1..n} j v^[j] u^[n−j]
            Instr::Exp(arg) => {
                let mut sum = T::zero();
                for j in 1..=n {
                    sum = sum
                        + T::from(j).unwrap()
                            * table.operand(arg, j, lane, pars)
                            * table.get(n - j, u, lane);
                }
                sum * inv_n
            }
            // u^[n] = (v^[n] − (1/n) Σ_{j=1..n−1} j u^[j] v^[n−j]) / v^[0]
            Instr::Log(v) => {
                let mut sum = T::zero();
                for j in 1..n {
                    sum = sum
                        + T::from(j).unwrap()
                            * table.get(j, u, lane)
                            * table.operand(v, n - j, lane, pars);
                }
                (table.operand(v, n, lane, pars) - sum * inv_n)
                    / table.operand(v, 0, lane, pars)
            }
            // Cauchy product of v with itself; the off-diagonal terms come
            // in equal pairs, the diagonal term (even n) is counted once.
            Instr::Square(v) => {
                let mut sum = T::zero();
                if n % 2 == 1 {
                    for j in 0..=(n - 1) / 2 {
                        sum = sum
                            + table.operand(v, j, lane, pars)
                                * table.operand(v, n - j, lane, pars);
                    }
                    sum + sum
                } else {
                    for j in 0..n / 2 {
                        sum = sum
                            + table.operand(v, j, lane, pars)
                                * table.operand(v, n - j, lane, pars);
                    }
                    let mid = table.operand(v, n / 2, lane, pars);
                    sum + sum + mid * mid
                }
            }
            // u^[n] = (1/(n v^[0])) Σ_{j=0..n−1} (α(n−j) − j) v^[n−j] u^[j]
            Instr::Pow { arg, alpha } => {
                let mut sum = T::zero();
                for j in 0..n {
                    let factor =
                        *alpha * T::from(n - j).unwrap() - T::from(j).unwrap();
                    sum = sum
                        + factor
                            * table.operand(arg, n - j, lane, pars)
                            * table.get(j, u, lane);
                }
                sum * inv_n / table.operand(arg, 0, lane, pars)
            }
            // u^[n] = (2/√π) (1/n) Σ_{j=1..n} j v^[j] e^[n−j], with e the
            // exp(-v²) companion entry.
            Instr::Erf { arg, exp_idx } => {
                let mut sum = T::zero();
                for j in 1..=n {
                    sum = sum
                        + T::from(j).unwrap()
                            * table.operand(arg, j, lane, pars)
                            * table.get(n - j, *exp_idx, lane);
                }
                sum * inv_n * T::from(FRAC_2_SQRT_PI).unwrap()
            }
            // Normalized derivatives of t: t, 1, 0, 0, …
            Instr::Time => {
                if n == 1 {
                    T::one()
                } else {
                    T::zero()
                }
            }
        };
        table.set(n, u, lane, value);
    }
}
