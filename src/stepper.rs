//! The adaptive step core shared by the scalar and batch integrators.
//!
//! One step: estimate the state's infinity norm, pick the tolerance regime
//! and with it the Taylor order, fill the jet, estimate the radius of
//! convergence from the two highest orders, derive the step size with
//! safety factors, and evaluate the Taylor polynomials. Everything is
//! computed per batch lane; the scalar integrator is the single-lane
//! specialization.

use crate::float::Float;
use crate::jet::DerivativeEngine;

/// The outcome of one integration step (or of a propagation loop).
///
/// The `Err*` variants are values, not errors: they report numerical
/// trouble mid-integration. State and time are left unchanged whenever a
/// step reports one of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Outcome {
    /// The step completed with the size deduced from the tolerances.
    Success,
    /// The step (or propagation) was clamped by the time limit.
    TimeLimit,
    /// The propagation loop hit its step budget.
    StepLimit,
    /// A non-finite value was detected in the state vector.
    ErrNonFiniteState,
    /// A non-finite value was detected in the jet of derivatives.
    ErrNonFiniteDerivative,
    /// The radius-of-convergence estimate came out as NaN.
    ErrNanRho,
}

/// Per-lane result of one step: outcome, step taken, Taylor order used.
pub type StepResult<T> = (Outcome, T, u32);

/// Step limiting mode for [`StepperCore::step_impl`].
#[derive(Clone, Copy)]
pub(crate) enum StepLimits<'a, T> {
    /// No bound on the step; the flag selects the direction.
    Free { forward: bool },
    /// Per-lane bound; each lane's sign selects its direction.
    Limited(&'a [T]),
}

/// Evaluate `Σ coeffs[k] · h^k` by Estrin's scheme.
///
/// Pair-reduces neighbouring coefficients with the running power of `h`,
/// passing an odd tail element through, until one value remains. The
/// reduction happens in place.
pub(crate) fn poly_eval_estrin<T: Float>(coeffs: &mut [T], h: T) -> T {
    let mut len = coeffs.len();
    let mut scale = h;
    while len > 1 {
        let pairs = len / 2;
        for i in 0..pairs {
            coeffs[i] = coeffs[2 * i] + scale * coeffs[2 * i + 1];
        }
        if len % 2 == 1 {
            coeffs[pairs] = coeffs[len - 1];
            len = pairs + 1;
        } else {
            len = pairs;
        }
        scale = scale * scale;
    }
    coeffs[0]
}

/// The batch-generic stepper state.
pub(crate) struct StepperCore<T: Float> {
    pub n_eq: usize,
    pub batch: usize,
    pub state: Vec<T>,
    pub time: Vec<T>,
    pub rtol: T,
    pub atol: T,
    pub order_r: u32,
    pub order_a: u32,
    /// `inv_order[i] = 1/i` for `i ≥ 1`; entry 0 is unused.
    pub inv_order: Vec<T>,
    pub rhofac_r: T,
    pub rhofac_a: T,
    pub pars: Vec<T>,
    pub engine: Box<dyn DerivativeEngine<T>>,
    /// Jet buffer, `(max_order + 1) × n_eq × batch`, order-major.
    pub jet: Vec<T>,
    /// Estrin scratch, `max_order + 1` coefficients.
    poly: Vec<T>,
    /// Per-lane step results of the latest call.
    results: Vec<StepResult<T>>,
    // Per-lane scratch, preallocated so stepping never allocates.
    max_abs_state: Vec<T>,
    use_abs_tol: Vec<bool>,
    alive: Vec<bool>,
}

impl<T: Float> StepperCore<T> {
    pub fn new(
        n_eq: usize,
        batch: usize,
        state: Vec<T>,
        time: Vec<T>,
        rtol: T,
        atol: T,
        order_r: u32,
        order_a: u32,
        pars: Vec<T>,
        engine: Box<dyn DerivativeEngine<T>>,
    ) -> Self {
        let max_order = order_r.max(order_a);
        let mut inv_order = vec![T::zero(); max_order as usize + 1];
        for (i, inv) in inv_order.iter_mut().enumerate().skip(1) {
            *inv = T::one() / T::from(i).unwrap();
        }

        // The timestep is rho times exp(-2) * exp(-0.7 / (order - 1)).
        let e = T::one().exp();
        let seven_tenths = T::from(0.7).unwrap();
        let rhofac = |order: u32| {
            T::one() / (e * e) * (-seven_tenths / T::from(order - 1).unwrap()).exp()
        };
        let rhofac_r = rhofac(order_r);
        let rhofac_a = rhofac(order_a);

        let jet = vec![T::zero(); (max_order as usize + 1) * n_eq * batch];
        let poly = vec![T::zero(); max_order as usize + 1];

        StepperCore {
            n_eq,
            batch,
            state,
            time,
            rtol,
            atol,
            order_r,
            order_a,
            inv_order,
            rhofac_r,
            rhofac_a,
            pars,
            engine,
            jet,
            poly,
            results: vec![(Outcome::Success, T::zero(), 0); batch],
            max_abs_state: vec![T::zero(); batch],
            use_abs_tol: vec![false; batch],
            alive: vec![true; batch],
        }
    }

    /// Per-lane results of the latest step.
    pub fn results(&self) -> &[StepResult<T>] {
        &self.results
    }

    /// Take one adaptive step on every lane.
    pub fn step_impl(&mut self, limits: StepLimits<'_, T>) {
        let n_eq = self.n_eq;
        let batch = self.batch;
        let row = n_eq * batch;

        // Norm infinity, regime and order per lane. Lanes with a
        // non-finite state are flagged and take no part in the step.
        let mut n_alive = 0usize;
        for lane in 0..batch {
            self.alive[lane] = true;
            let mut mas = T::zero();
            let mut finite = true;
            for v in 0..n_eq {
                let x = self.state[v * batch + lane];
                if !x.is_finite() {
                    finite = false;
                    break;
                }
                mas = mas.max(x.abs());
            }
            if !finite {
                self.results[lane] = (Outcome::ErrNonFiniteState, T::zero(), 0);
                self.alive[lane] = false;
                continue;
            }
            n_alive += 1;
            self.max_abs_state[lane] = mas;
            let abs_regime = self.rtol * mas <= self.atol;
            self.use_abs_tol[lane] = abs_regime;
            let order = if abs_regime { self.order_a } else { self.order_r };
            self.results[lane] = (Outcome::Success, T::zero(), order);
        }

        if n_alive == 0 {
            return;
        }

        // One jet evaluation at the largest order needed this step; lanes
        // that picked a smaller order ignore the extra coefficients.
        let jet_order = self
            .results
            .iter()
            .zip(self.alive.iter())
            .filter(|(_, &a)| a)
            .map(|(r, _)| r.2)
            .max()
            .unwrap();

        self.jet[..row].copy_from_slice(&self.state);
        self.engine
            .fill_jet(&mut self.jet, &self.time, &self.pars, jet_order);

        for lane in 0..batch {
            if !self.alive[lane] {
                continue;
            }
            let order = self.results[lane].2;

            // Derivatives up to the lane's own order must be finite.
            let mut finite = true;
            'outer: for o in 1..=order as usize {
                for v in 0..n_eq {
                    if !self.jet[o * row + v * batch + lane].is_finite() {
                        finite = false;
                        break 'outer;
                    }
                }
            }
            if !finite {
                self.results[lane] = (Outcome::ErrNonFiniteDerivative, T::zero(), 0);
                self.alive[lane] = false;
                continue;
            }

            // Radius-of-convergence estimate from the two highest orders.
            let mut max_abs_diff_o = T::zero();
            let mut max_abs_diff_om1 = T::zero();
            for v in 0..n_eq {
                let om1 = self.jet[(order as usize - 1) * row + v * batch + lane];
                let o = self.jet[order as usize * row + v * batch + lane];
                max_abs_diff_om1 = max_abs_diff_om1.max(om1.abs());
                max_abs_diff_o = max_abs_diff_o.max(o.abs());
            }
            let num = if self.use_abs_tol[lane] {
                T::one()
            } else {
                self.max_abs_state[lane]
            };
            let rho_om1 = (num / max_abs_diff_om1).powf(self.inv_order[order as usize - 1]);
            let rho_o = (num / max_abs_diff_o).powf(self.inv_order[order as usize]);
            if rho_om1.is_nan() || rho_o.is_nan() {
                self.results[lane] = (Outcome::ErrNanRho, T::zero(), 0);
                self.alive[lane] = false;
                continue;
            }

            let rhofac = if self.use_abs_tol[lane] {
                self.rhofac_a
            } else {
                self.rhofac_r
            };
            let mut h = rho_o.min(rho_om1) * rhofac;
            let mut outcome = Outcome::Success;
            let forward = match limits {
                StepLimits::Free { forward } => forward,
                StepLimits::Limited(max_delta_ts) => {
                    let cap = max_delta_ts[lane].abs();
                    if h > cap {
                        h = cap;
                        outcome = Outcome::TimeLimit;
                    }
                    max_delta_ts[lane] >= T::zero()
                }
            };
            if !forward {
                h = -h;
            }
            self.results[lane] = (outcome, h, order);
        }

        // State update and time advance. Dead lanes carry h = 0 and pass
        // through unchanged.
        self.update_state();
        for lane in 0..batch {
            let h = self.results[lane].1;
            self.time[lane] = self.time[lane] + h;
        }
    }

    /// Evaluate the Taylor polynomial of each state variable at the lane's
    /// step size and store the result as the new state.
    fn update_state(&mut self) {
        let batch = self.batch;
        let row = self.n_eq * batch;
        for lane in 0..batch {
            let (_, h, order) = self.results[lane];
            if h == T::zero() {
                // The polynomial at zero is its constant term, i.e. the
                // state is unchanged; skipping keeps non-finite high-order
                // coefficients of dead lanes out of the evaluation.
                continue;
            }
            for v in 0..self.n_eq {
                let poly = &mut self.poly[..order as usize + 1];
                for (o, c) in poly.iter_mut().enumerate() {
                    *c = self.jet[o * row + v * batch + lane];
                }
                self.state[v * batch + lane] = poly_eval_estrin(poly, h);
            }
        }
    }
}
