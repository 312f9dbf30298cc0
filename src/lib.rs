//! Adaptive Taylor-series integration of ODE systems defined symbolically.
//!
//! The right-hand sides of a system of first-order ODEs are written as
//! [`Expression`] trees. The integrator decomposes them into elementary
//! operations, propagates normalized Taylor coefficients through the
//! decomposition up to an order chosen from the tolerances, estimates the
//! radius of convergence of the series from its two highest orders and
//! picks each timestep accordingly.
//!
//! ```
//! use taylor_jet::{make_vars, Outcome, TaylorAdaptive};
//!
//! // x' = x, x(0) = 1, integrated to t = 1.
//! let [x] = make_vars(["x"]);
//! let mut ta = TaylorAdaptive::new(&[x], vec![1.0_f64], 0.0, 1e-12, 1e-12).unwrap();
//! let res = ta.propagate_until(1.0, 0).unwrap();
//! assert_eq!(res.outcome, Outcome::TimeLimit);
//! assert!((ta.state()[0] - 1.0_f64.exp()).abs() < 2e-12);
//! ```

pub mod decompose;
mod error;
pub mod expr;
mod float;
mod integrator;
mod jet;
mod stepper;

pub use decompose::{decompose, decompose_pairs, Decomposition};
pub use error::Error;
pub use expr::{
    cos, diff, erf, eval_batch, eval_scalar, exp, log, make_vars, num, par, pow, rename_variables,
    sin, square, subs, time, var, variables, BinaryOp, Expression, Func,
};
pub use float::Float;
pub use integrator::{EngineOpts, PropagateResult, TaylorAdaptive, TaylorAdaptiveBatch};
pub use jet::{DerivativeEngine, TapeEngine};
pub use stepper::{Outcome, StepResult};

/// Scalar integrator over `f64`.
pub type TaylorAdaptive64 = TaylorAdaptive<f64>;
/// Scalar integrator over `f32`.
pub type TaylorAdaptive32 = TaylorAdaptive<f32>;
/// Batch integrator over `f64`.
pub type TaylorAdaptiveBatch64 = TaylorAdaptiveBatch<f64>;
/// Batch integrator over `f32`.
pub type TaylorAdaptiveBatch32 = TaylorAdaptiveBatch<f32>;
