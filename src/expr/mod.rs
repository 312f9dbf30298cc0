//! Symbolic expression algebra.
//!
//! [`Expression`] is a plain tree over five variants: numeric literals,
//! named variables, runtime parameters, the four binary arithmetic
//! operators and elementary function calls. The tree supports structural
//! equality and hashing, substitution, symbolic differentiation, renaming
//! and numeric evaluation; it deliberately performs *no* algebraic
//! simplification (`ex + 0` is a different tree than `ex`).

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

use crate::error::Error;

mod diff;
mod eval;
mod ops;

pub use diff::diff;
pub use eval::{eval_batch, eval_scalar};

/// The four binary arithmetic operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// The infix symbol used when printing.
    pub fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
        }
    }
}

/// The closed set of elementary functions.
///
/// Each variant carries its behavior in match arms spread over the crate:
/// symbolic derivatives in [`diff`], numeric evaluation in [`eval_scalar`] /
/// [`eval_batch`], decomposition rules in [`crate::decompose`] and the
/// normalized Taylor recurrences in the jet machinery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Func {
    Sin,
    Cos,
    Exp,
    Log,
    Pow,
    Square,
    Erf,
    /// The independent variable of an ODE system, printed as `t`.
    Time,
}

impl Func {
    /// Short printable name.
    pub fn display_name(self) -> &'static str {
        match self {
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Exp => "exp",
            Func::Log => "log",
            Func::Pow => "pow",
            Func::Square => "square",
            Func::Erf => "erf",
            Func::Time => "time",
        }
    }

    /// Required argument count.
    pub fn arity(self) -> usize {
        match self {
            Func::Pow => 2,
            Func::Time => 0,
            _ => 1,
        }
    }

    /// Validate an argument list against the arity.
    pub(crate) fn check_arity(self, args: &[Expression]) -> Result<(), Error> {
        if args.len() != self.arity() {
            return Err(Error::ArityMismatch {
                name: self.display_name(),
                expected: self.arity(),
                found: args.len(),
            });
        }
        Ok(())
    }
}

/// A symbolic expression.
///
/// Built via the free constructors ([`num`], [`var`], [`par`], [`sin`],
/// [`pow`], …) and the overloaded arithmetic operators. Structural
/// equality and hashing are consistent: equal trees hash equally.
/// Numeric literals are expected to be finite.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Expression {
    /// A floating-point literal, stored at the widest precision.
    Num(f64),
    /// A named variable.
    Var(String),
    /// A runtime parameter, an index into a parameter array.
    Par(u32),
    /// A binary arithmetic operation.
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    /// An elementary function call.
    Func(Func, Vec<Expression>),
}

// Structural equality on finite literals is reflexive, which is all the
// decomposition machinery needs from Eq.
impl Eq for Expression {}

impl Hash for Expression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Expression::Num(x) => {
                // Fold -0.0 onto 0.0 so that equal literals hash equally.
                let x = if *x == 0.0 { 0.0 } else { *x };
                x.to_bits().hash(state);
            }
            Expression::Var(name) => name.hash(state),
            Expression::Par(idx) => idx.hash(state),
            Expression::Binary(op, lhs, rhs) => {
                op.hash(state);
                lhs.hash(state);
                rhs.hash(state);
            }
            Expression::Func(f, args) => {
                f.hash(state);
                args.hash(state);
            }
        }
    }
}

impl From<f64> for Expression {
    fn from(x: f64) -> Self {
        Expression::Num(x)
    }
}

/// A numeric literal.
pub fn num(x: f64) -> Expression {
    Expression::Num(x)
}

/// A named variable.
pub fn var(name: impl Into<String>) -> Expression {
    Expression::Var(name.into())
}

/// A runtime parameter.
pub fn par(idx: u32) -> Expression {
    Expression::Par(idx)
}

/// Several named variables at once.
///
/// ```
/// use taylor_jet::make_vars;
/// let [x, y] = make_vars(["x", "y"]);
/// assert_eq!((x + y).to_string(), "(x + y)");
/// ```
pub fn make_vars<const N: usize>(names: [&str; N]) -> [Expression; N] {
    names.map(var)
}

/// The sine of an expression.
pub fn sin(e: Expression) -> Expression {
    Expression::Func(Func::Sin, vec![e])
}

/// The cosine of an expression.
pub fn cos(e: Expression) -> Expression {
    Expression::Func(Func::Cos, vec![e])
}

/// The exponential of an expression.
pub fn exp(e: Expression) -> Expression {
    Expression::Func(Func::Exp, vec![e])
}

/// The natural logarithm of an expression.
pub fn log(e: Expression) -> Expression {
    Expression::Func(Func::Log, vec![e])
}

/// An expression raised to a power.
pub fn pow(base: Expression, exponent: Expression) -> Expression {
    Expression::Func(Func::Pow, vec![base, exponent])
}

/// The square of an expression.
pub fn square(e: Expression) -> Expression {
    Expression::Func(Func::Square, vec![e])
}

/// The error function of an expression.
pub fn erf(e: Expression) -> Expression {
    Expression::Func(Func::Erf, vec![e])
}

/// The independent variable (time) of an ODE system.
pub fn time() -> Expression {
    Expression::Func(Func::Time, Vec::new())
}

/// The sorted, deduplicated list of variable names appearing in `e`.
pub fn variables(e: &Expression) -> Vec<String> {
    fn collect(e: &Expression, out: &mut Vec<String>) {
        match e {
            Expression::Num(_) | Expression::Par(_) => {}
            Expression::Var(name) => out.push(name.clone()),
            Expression::Binary(_, lhs, rhs) => {
                collect(lhs, out);
                collect(rhs, out);
            }
            Expression::Func(_, args) => {
                for arg in args {
                    collect(arg, out);
                }
            }
        }
    }

    let mut names = Vec::new();
    collect(e, &mut names);
    names.sort();
    names.dedup();
    names
}

/// Rename the variables of `e` in place according to `repl`.
///
/// Variables not present in the map, numbers and parameters are untouched.
pub fn rename_variables(e: &mut Expression, repl: &HashMap<String, String>) {
    match e {
        Expression::Num(_) | Expression::Par(_) => {}
        Expression::Var(name) => {
            if let Some(new_name) = repl.get(name) {
                *name = new_name.clone();
            }
        }
        Expression::Binary(_, lhs, rhs) => {
            rename_variables(lhs, repl);
            rename_variables(rhs, repl);
        }
        Expression::Func(_, args) => {
            for arg in args {
                rename_variables(arg, repl);
            }
        }
    }
}

/// Structural substitution: replace each variable found in `map` by the
/// mapped expression. Numbers and parameters are unaffected.
pub fn subs(e: &Expression, map: &HashMap<String, Expression>) -> Expression {
    match e {
        Expression::Num(_) | Expression::Par(_) => e.clone(),
        Expression::Var(name) => match map.get(name) {
            Some(repl) => repl.clone(),
            None => e.clone(),
        },
        Expression::Binary(op, lhs, rhs) => {
            Expression::Binary(*op, Box::new(subs(lhs, map)), Box::new(subs(rhs, map)))
        }
        Expression::Func(f, args) => {
            Expression::Func(*f, args.iter().map(|arg| subs(arg, map)).collect())
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Num(x) => write!(f, "{}", x),
            Expression::Var(name) => write!(f, "{}", name),
            Expression::Par(idx) => write!(f, "par[{}]", idx),
            Expression::Binary(op, lhs, rhs) => {
                write!(f, "({} {} {})", lhs, op.symbol(), rhs)
            }
            Expression::Func(Func::Time, _) => write!(f, "t"),
            Expression::Func(func, args) => {
                write!(f, "{}(", func.display_name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}
