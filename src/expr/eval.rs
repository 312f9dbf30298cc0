//! Numeric evaluation of expressions, scalar and batch.

use std::collections::HashMap;

use super::{BinaryOp, Expression, Func};
use crate::error::Error;
use crate::float::Float;

fn lookup_par<T: Float>(pars: &[T], idx: u32) -> Result<T, Error> {
    pars.get(idx as usize)
        .copied()
        .ok_or(Error::OutOfRangeParam {
            index: idx,
            len: pars.len(),
        })
}

/// Evaluate `e` at the variable values in `env` with parameter values `pars`.
///
/// Fails with [`Error::MissingVariable`] when a variable has no entry in the
/// environment and [`Error::OutOfRangeParam`] when a parameter index exceeds
/// `pars`. `time()` cannot be evaluated outside an integrator and fails
/// with [`Error::UnsupportedOp`].
pub fn eval_scalar<T: Float>(
    e: &Expression,
    env: &HashMap<String, T>,
    pars: &[T],
) -> Result<T, Error> {
    match e {
        Expression::Num(x) => Ok(T::from(*x).unwrap()),
        Expression::Var(name) => env
            .get(name)
            .copied()
            .ok_or_else(|| Error::MissingVariable(name.clone())),
        Expression::Par(idx) => lookup_par(pars, *idx),
        Expression::Binary(op, lhs, rhs) => {
            let l = eval_scalar(lhs, env, pars)?;
            let r = eval_scalar(rhs, env, pars)?;
            Ok(match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
            })
        }
        Expression::Func(func, args) => {
            func.check_arity(args)?;
            match func {
                Func::Sin => Ok(eval_scalar(&args[0], env, pars)?.sin()),
                Func::Cos => Ok(eval_scalar(&args[0], env, pars)?.cos()),
                Func::Exp => Ok(eval_scalar(&args[0], env, pars)?.exp()),
                Func::Log => Ok(eval_scalar(&args[0], env, pars)?.ln()),
                Func::Pow => {
                    let base = eval_scalar(&args[0], env, pars)?;
                    let exponent = eval_scalar(&args[1], env, pars)?;
                    Ok(base.powf(exponent))
                }
                Func::Square => {
                    let u = eval_scalar(&args[0], env, pars)?;
                    Ok(u * u)
                }
                Func::Erf => Ok(eval_scalar(&args[0], env, pars)?.erf()),
                Func::Time => Err(Error::UnsupportedOp(
                    "time() cannot be evaluated outside an integrator".to_string(),
                )),
            }
        }
    }
}

/// Evaluate `e` over a batch of variable values.
///
/// `env` maps each variable to one value per lane; every lane vector must
/// have the length of `out`. Parameter values are broadcast across lanes.
pub fn eval_batch<T: Float>(
    out: &mut [T],
    e: &Expression,
    env: &HashMap<String, Vec<T>>,
    pars: &[T],
) -> Result<(), Error> {
    match e {
        Expression::Num(x) => {
            out.fill(T::from(*x).unwrap());
            Ok(())
        }
        Expression::Var(name) => {
            let lanes = env
                .get(name)
                .ok_or_else(|| Error::MissingVariable(name.clone()))?;
            if lanes.len() != out.len() {
                return Err(Error::InvalidInput(format!(
                    "batch environment entry '{}' has {} lanes, {} expected",
                    name,
                    lanes.len(),
                    out.len()
                )));
            }
            out.copy_from_slice(lanes);
            Ok(())
        }
        Expression::Par(idx) => {
            out.fill(lookup_par(pars, *idx)?);
            Ok(())
        }
        Expression::Binary(op, lhs, rhs) => {
            let mut lhs_vals = vec![T::zero(); out.len()];
            eval_batch(&mut lhs_vals, lhs, env, pars)?;
            eval_batch(out, rhs, env, pars)?;
            for (o, l) in out.iter_mut().zip(lhs_vals.iter()) {
                *o = match op {
                    BinaryOp::Add => *l + *o,
                    BinaryOp::Sub => *l - *o,
                    BinaryOp::Mul => *l * *o,
                    BinaryOp::Div => *l / *o,
                };
            }
            Ok(())
        }
        Expression::Func(func, args) => {
            func.check_arity(args)?;
            match func {
                Func::Sin => {
                    eval_batch(out, &args[0], env, pars)?;
                    for o in out.iter_mut() {
                        *o = o.sin();
                    }
                    Ok(())
                }
                Func::Cos => {
                    eval_batch(out, &args[0], env, pars)?;
                    for o in out.iter_mut() {
                        *o = o.cos();
                    }
                    Ok(())
                }
                Func::Exp => {
                    eval_batch(out, &args[0], env, pars)?;
                    for o in out.iter_mut() {
                        *o = o.exp();
                    }
                    Ok(())
                }
                Func::Log => {
                    eval_batch(out, &args[0], env, pars)?;
                    for o in out.iter_mut() {
                        *o = o.ln();
                    }
                    Ok(())
                }
                Func::Pow => {
                    let mut base = vec![T::zero(); out.len()];
                    eval_batch(&mut base, &args[0], env, pars)?;
                    eval_batch(out, &args[1], env, pars)?;
                    for (o, b) in out.iter_mut().zip(base.iter()) {
                        *o = b.powf(*o);
                    }
                    Ok(())
                }
                Func::Square => {
                    eval_batch(out, &args[0], env, pars)?;
                    for o in out.iter_mut() {
                        *o = *o * *o;
                    }
                    Ok(())
                }
                Func::Erf => {
                    eval_batch(out, &args[0], env, pars)?;
                    for o in out.iter_mut() {
                        *o = o.erf();
                    }
                    Ok(())
                }
                Func::Time => Err(Error::UnsupportedOp(
                    "time() cannot be evaluated outside an integrator".to_string(),
                )),
            }
        }
    }
}
