//! Symbolic differentiation.

use std::f64::consts::FRAC_2_SQRT_PI;

use super::{cos, exp, log, pow, sin, square, BinaryOp, Expression, Func};
use crate::error::Error;

/// The symbolic derivative of `e` with respect to the variable `var`.
///
/// Numbers and parameters differentiate to zero, variables to zero or one,
/// binary operators via the usual sum/product/quotient rules and elementary
/// functions via their chain rules. The derivative of [`crate::time`] is
/// one. No simplification is performed on the result.
pub fn diff(e: &Expression, var: &str) -> Result<Expression, Error> {
    match e {
        Expression::Num(_) | Expression::Par(_) => Ok(Expression::Num(0.0)),
        Expression::Var(name) => {
            if name == var {
                Ok(Expression::Num(1.0))
            } else {
                Ok(Expression::Num(0.0))
            }
        }
        Expression::Binary(op, lhs, rhs) => {
            let dl = diff(lhs, var)?;
            let dr = diff(rhs, var)?;
            let (l, r) = ((**lhs).clone(), (**rhs).clone());
            Ok(match op {
                BinaryOp::Add => dl + dr,
                BinaryOp::Sub => dl - dr,
                BinaryOp::Mul => dl * r + l * dr,
                BinaryOp::Div => (dl * r.clone() - l * dr) / (r.clone() * r),
            })
        }
        Expression::Func(func, args) => {
            func.check_arity(args)?;
            match func {
                Func::Sin => {
                    let u = args[0].clone();
                    Ok(cos(u) * diff(&args[0], var)?)
                }
                Func::Cos => {
                    let u = args[0].clone();
                    Ok(-sin(u) * diff(&args[0], var)?)
                }
                Func::Exp => {
                    let u = args[0].clone();
                    Ok(exp(u) * diff(&args[0], var)?)
                }
                Func::Log => {
                    let u = args[0].clone();
                    Ok(Expression::Num(1.0) / u * diff(&args[0], var)?)
                }
                Func::Pow => {
                    let (u, v) = (args[0].clone(), args[1].clone());
                    let du = diff(&args[0], var)?;
                    let dv = diff(&args[1], var)?;
                    Ok(v.clone() * pow(u.clone(), v.clone() - Expression::Num(1.0)) * du
                        + pow(u.clone(), v) * log(u) * dv)
                }
                Func::Square => {
                    let u = args[0].clone();
                    Ok(Expression::Num(2.0) * u * diff(&args[0], var)?)
                }
                Func::Erf => {
                    let u = args[0].clone();
                    Ok(Expression::Num(FRAC_2_SQRT_PI) * exp(-square(u)) * diff(&args[0], var)?)
                }
                Func::Time => Ok(Expression::Num(1.0)),
            }
        }
    }
}
