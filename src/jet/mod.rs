//! Lowered form of a decomposition and the derivative engine driving it.
//!
//! A [`Decomposition`] is lowered once into a [`JetTape`]: a flat list of
//! instructions over `u32` entry indices, with hidden-dependency
//! companions (the cosine of a sine, the `exp(-v²)` entry of an `erf`)
//! resolved to concrete indices by structural lookup. The
//! [`TapeEngine`] interprets the tape order by order to fill the jet of
//! normalized Taylor coefficients; compiled backends can be substituted
//! through the [`DerivativeEngine`] trait.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::decompose::{u_name, uname_to_index, Decomposition};
use crate::error::Error;
use crate::expr::{cos, exp, sin, square, BinaryOp, Expression, Func};
use crate::float::Float;

mod recurrence;

use recurrence::{order_zero, step_order, CoeffTable};

/// An operand of a tape instruction: an earlier entry, a literal or a
/// runtime parameter.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Operand<T> {
    U(u32),
    Const(T),
    Par(u32),
}

/// One lowered decomposition entry.
///
/// Companion indices (`cos_idx`, `sin_idx`, `exp_idx`) are resolved when
/// the tape is built; the recurrences never do index arithmetic.
#[derive(Clone, Debug)]
pub(crate) enum Instr<T> {
    Add(Operand<T>, Operand<T>),
    Sub(Operand<T>, Operand<T>),
    Mul(Operand<T>, Operand<T>),
    Div(Operand<T>, Operand<T>),
    Sin { arg: Operand<T>, cos_idx: u32 },
    Cos { arg: Operand<T>, sin_idx: u32 },
    Exp(Operand<T>),
    Log(Operand<T>),
    Square(Operand<T>),
    Pow { arg: Operand<T>, alpha: T },
    Erf { arg: Operand<T>, exp_idx: u32 },
    Time,
}

/// A decomposition lowered to flat instructions.
pub(crate) struct JetTape<T> {
    n_eq: usize,
    /// Width of the coefficient table: state variables plus middle entries
    /// (the tail aliases are read through, not stored).
    n_uvars: usize,
    /// One instruction per middle entry; entry `k` defines table column
    /// `n_eq + k`.
    instrs: Vec<Instr<T>>,
    /// The decomposed right-hand side of each equation.
    tail: Vec<Operand<T>>,
    /// Largest parameter index referenced anywhere, if any.
    max_par: Option<u32>,
}

fn operand<T: Float>(ex: &Expression, max_par: &mut Option<u32>) -> Result<Operand<T>, Error> {
    match ex {
        Expression::Num(x) => Ok(Operand::Const(T::from(*x).unwrap())),
        Expression::Par(idx) => {
            *max_par = Some(max_par.map_or(*idx, |m| m.max(*idx)));
            Ok(Operand::Par(*idx))
        }
        Expression::Var(name) => match uname_to_index(name) {
            Some(idx) => Ok(Operand::U(idx)),
            None => Err(Error::InvalidInput(format!(
                "'{}' is not an internal u variable",
                name
            ))),
        },
        other => Err(Error::InvalidInput(format!(
            "'{}' cannot appear as an operand of a decomposition entry",
            other
        ))),
    }
}

impl<T: Float> JetTape<T> {
    /// Lower a decomposition. Fails when an entry cannot be expressed in
    /// the recurrence set (e.g. `pow` with a non-constant exponent).
    pub fn lower(dc: &Decomposition) -> Result<Self, Error> {
        let n_eq = dc.n_eq();
        let n_uvars = dc.len() - n_eq;
        if u32::try_from(n_uvars).is_err() {
            return Err(Error::Overflow(
                "the decomposition is too large to index".to_string(),
            ));
        }

        // Index of every middle entry, used to resolve companions by
        // looking up the companion's expression.
        let mut entry_map: HashMap<Expression, u32> = HashMap::new();
        for (i, entry) in dc.entries().iter().enumerate().take(dc.len() - n_eq).skip(n_eq) {
            entry_map.insert(entry.clone(), i as u32);
        }

        let companion = |key: Expression, what: &str| -> Result<u32, Error> {
            entry_map.get(&key).copied().ok_or_else(|| {
                Error::InvalidInput(format!("{} companion entry missing for '{}'", what, key))
            })
        };

        let mut max_par = None;
        let mut instrs = Vec::with_capacity(n_uvars - n_eq);

        for entry in &dc.entries()[n_eq..dc.len() - n_eq] {
            let instr = match entry {
                Expression::Binary(op, lhs, rhs) => {
                    let l = operand(lhs, &mut max_par)?;
                    let r = operand(rhs, &mut max_par)?;
                    match op {
                        BinaryOp::Add => Instr::Add(l, r),
                        BinaryOp::Sub => Instr::Sub(l, r),
                        BinaryOp::Mul => Instr::Mul(l, r),
                        BinaryOp::Div => Instr::Div(l, r),
                    }
                }
                Expression::Func(func, args) => match func {
                    Func::Sin => Instr::Sin {
                        arg: operand(&args[0], &mut max_par)?,
                        cos_idx: companion(cos(args[0].clone()), "cosine")?,
                    },
                    Func::Cos => Instr::Cos {
                        arg: operand(&args[0], &mut max_par)?,
                        sin_idx: companion(sin(args[0].clone()), "sine")?,
                    },
                    Func::Exp => Instr::Exp(operand(&args[0], &mut max_par)?),
                    Func::Log => Instr::Log(operand(&args[0], &mut max_par)?),
                    Func::Square => Instr::Square(operand(&args[0], &mut max_par)?),
                    Func::Pow => {
                        let alpha = match &args[1] {
                            Expression::Num(x) => T::from(*x).unwrap(),
                            other => {
                                return Err(Error::UnsupportedOp(format!(
                                    "pow with non-constant exponent '{}' has no Taylor recurrence",
                                    other
                                )))
                            }
                        };
                        Instr::Pow {
                            arg: operand(&args[0], &mut max_par)?,
                            alpha,
                        }
                    }
                    Func::Erf => {
                        let sq = companion(square(args[0].clone()), "square")?;
                        let neg = companion(
                            Expression::Num(-1.0) * Expression::Var(u_name(sq as usize)),
                            "negation",
                        )?;
                        let exp_idx =
                            companion(exp(Expression::Var(u_name(neg as usize))), "exponential")?;
                        Instr::Erf {
                            arg: operand(&args[0], &mut max_par)?,
                            exp_idx,
                        }
                    }
                    Func::Time => Instr::Time,
                },
                other => {
                    return Err(Error::InvalidInput(format!(
                        "'{}' is not a valid decomposition entry",
                        other
                    )))
                }
            };
            instrs.push(instr);
        }

        let mut tail = Vec::with_capacity(n_eq);
        for entry in &dc.entries()[dc.len() - n_eq..] {
            tail.push(operand(entry, &mut max_par)?);
        }

        Ok(JetTape {
            n_eq,
            n_uvars,
            instrs,
            tail,
            max_par,
        })
    }

    pub fn max_par(&self) -> Option<u32> {
        self.max_par
    }

    fn fmt_operand(op: &Operand<T>, out: &mut String) {
        match op {
            Operand::U(u) => {
                let _ = write!(out, "u_{}", u);
            }
            Operand::Const(c) => {
                let _ = write!(out, "{}", c);
            }
            Operand::Par(p) => {
                let _ = write!(out, "par[{}]", p);
            }
        }
    }

    /// Render the instruction listing as text.
    pub fn ir(&self) -> String {
        let mut out = String::new();
        for i in 0..self.n_eq {
            let _ = writeln!(out, "u_{} = state[{}]", i, i);
        }
        for (k, instr) in self.instrs.iter().enumerate() {
            let _ = write!(out, "u_{} = ", self.n_eq + k);
            let (name, operands, note): (&str, Vec<&Operand<T>>, Option<String>) = match instr {
                Instr::Add(a, b) => ("add", vec![a, b], None),
                Instr::Sub(a, b) => ("sub", vec![a, b], None),
                Instr::Mul(a, b) => ("mul", vec![a, b], None),
                Instr::Div(a, b) => ("div", vec![a, b], None),
                Instr::Sin { arg, cos_idx } => {
                    ("sin", vec![arg], Some(format!("cos at u_{}", cos_idx)))
                }
                Instr::Cos { arg, sin_idx } => {
                    ("cos", vec![arg], Some(format!("sin at u_{}", sin_idx)))
                }
                Instr::Exp(arg) => ("exp", vec![arg], None),
                Instr::Log(arg) => ("log", vec![arg], None),
                Instr::Square(arg) => ("square", vec![arg], None),
                Instr::Pow { arg, alpha } => ("pow", vec![arg], Some(format!("alpha = {}", alpha))),
                Instr::Erf { arg, exp_idx } => {
                    ("erf", vec![arg], Some(format!("exp(-v^2) at u_{}", exp_idx)))
                }
                Instr::Time => ("time", vec![], None),
            };
            let _ = write!(out, "{}(", name);
            for (i, op) in operands.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                Self::fmt_operand(op, &mut out);
            }
            out.push(')');
            if let Some(note) = note {
                let _ = write!(out, "  ; {}", note);
            }
            out.push('\n');
        }
        for (i, op) in self.tail.iter().enumerate() {
            let _ = write!(out, "d/dt u_{} = ", i);
            Self::fmt_operand(op, &mut out);
            out.push('\n');
        }
        out
    }
}

/// Strategy computing the jet of normalized Taylor coefficients.
///
/// `jet` is laid out order-major: `(order+1)` rows of `n_eq * batch`
/// values. On entry row 0 holds the current state; on exit rows
/// `1..=order` hold the normalized coefficients of the state variables.
/// `time` holds the current time of each batch lane.
pub trait DerivativeEngine<T: Float> {
    /// Fill the jet up to (and including) `order`.
    fn fill_jet(&mut self, jet: &mut [T], time: &[T], pars: &[T], order: u32);

    /// A textual rendition of the engine's program, for debugging.
    fn ir(&self) -> String;
}

/// Interpreting [`DerivativeEngine`]: walks the tape entry by entry,
/// order by order. All scratch is allocated at construction.
pub struct TapeEngine<T: Float> {
    tape: JetTape<T>,
    batch: usize,
    /// Coefficient table, `(max_order + 1) × n_uvars × batch`.
    coeffs: Vec<T>,
}

impl<T: Float> TapeEngine<T> {
    /// Lower `dc` and preallocate the coefficient table for jets up to
    /// `max_order`.
    pub fn new(dc: &Decomposition, batch: usize, max_order: u32) -> Result<Self, Error> {
        let tape = JetTape::lower(dc)?;
        let rows = max_order as usize + 1;
        let size = rows
            .checked_mul(tape.n_uvars)
            .and_then(|n| n.checked_mul(batch))
            .ok_or_else(|| {
                Error::Overflow("the size of the jet coefficient table overflows".to_string())
            })?;
        Ok(TapeEngine {
            tape,
            batch,
            coeffs: vec![T::zero(); size],
        })
    }

    pub(crate) fn max_par(&self) -> Option<u32> {
        self.tape.max_par()
    }
}

impl<T: Float> DerivativeEngine<T> for TapeEngine<T> {
    fn fill_jet(&mut self, jet: &mut [T], time: &[T], pars: &[T], order: u32) {
        let batch = self.batch;
        let n_eq = self.tape.n_eq;
        let width = self.tape.n_uvars * batch;
        let state_row = n_eq * batch;

        // Order 0: state values, then every middle entry in order.
        self.coeffs[..state_row].copy_from_slice(&jet[..state_row]);
        let tape = &self.tape;
        let mut table = CoeffTable {
            data: &mut self.coeffs[..],
            stride: width,
            batch,
        };
        for (k, instr) in tape.instrs.iter().enumerate() {
            order_zero(&mut table, instr, (n_eq + k) as u32, time, pars);
        }

        // Order n: first the state variables (x^[n] = f^[n-1] / n, with f
        // the decomposed right-hand side), then the middle entries.
        for n in 1..=order as usize {
            let inv_n = T::one() / T::from(n).unwrap();
            for (v, rhs) in tape.tail.iter().enumerate() {
                for lane in 0..batch {
                    let f = table.operand(rhs, n - 1, lane, pars);
                    table.set(n, v as u32, lane, f * inv_n);
                }
            }
            for (k, instr) in tape.instrs.iter().enumerate() {
                step_order(&mut table, instr, (n_eq + k) as u32, n, pars);
            }
        }

        // Export the state-variable coefficients.
        for n in 1..=order as usize {
            jet[n * state_row..(n + 1) * state_row]
                .copy_from_slice(&self.coeffs[n * width..n * width + state_row]);
        }
    }

    fn ir(&self) -> String {
        self.tape.ir()
    }
}
