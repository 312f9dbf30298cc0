//! The adaptive Taylor integrators, scalar and batch.

use crate::decompose::{decompose, decompose_pairs, Decomposition};
use crate::error::Error;
use crate::expr::Expression;
use crate::float::Float;
use crate::jet::TapeEngine;
use crate::stepper::{Outcome, StepLimits, StepResult, StepperCore};

/// Hints forwarded to the derivative-engine backend.
///
/// The bundled interpreter ignores them; a compiled backend may use them
/// to steer its code generation.
#[derive(Clone, Copy, Debug)]
pub struct EngineOpts {
    /// Optimisation level, `0..=3`.
    pub opt_level: u32,
    /// Trade speed for tighter floating-point error accumulation.
    pub high_accuracy: bool,
    /// Prefer compact generated code over unrolled code.
    pub compact_mode: bool,
}

impl Default for EngineOpts {
    fn default() -> Self {
        EngineOpts {
            opt_level: 3,
            high_accuracy: false,
            compact_mode: false,
        }
    }
}

/// Summary of a propagation loop.
#[derive(Clone, Copy, Debug)]
pub struct PropagateResult<T> {
    /// Final outcome: `TimeLimit` when the target time was reached.
    pub outcome: Outcome,
    /// Smallest step taken, excluding the final clamped step.
    pub min_h: T,
    /// Largest step taken, excluding the final clamped step.
    pub max_h: T,
    /// Smallest Taylor order used.
    pub min_order: u32,
    /// Largest Taylor order used.
    pub max_order: u32,
    /// Number of completed steps.
    pub n_steps: usize,
}

/// `max(2, ⌈-ln(tol)/2 + 1⌉)`, with overflow surfaced as an error.
fn compute_order<T: Float>(tol: T) -> Result<u32, Error> {
    let two = T::from(2.0).unwrap();
    let order_f = (-(tol.ln()) / two + T::one()).ceil().max(two);
    if !order_f.is_finite() {
        return Err(Error::InvalidInput(
            "the computation of the Taylor orders produced a non-finite value".to_string(),
        ));
    }
    if order_f > T::from(u32::MAX).unwrap() {
        return Err(Error::Overflow(
            "the computation of the max Taylor orders resulted in an overflow condition"
                .to_string(),
        ));
    }
    order_f.to_u32().ok_or_else(|| {
        Error::Overflow(
            "the computation of the max Taylor orders resulted in an overflow condition"
                .to_string(),
        )
    })
}

/// Validate the common inputs and assemble the stepper core.
fn build_core<T: Float>(
    dc: Decomposition,
    state: Vec<T>,
    time: Vec<T>,
    rtol: T,
    atol: T,
    batch: usize,
) -> Result<(StepperCore<T>, Decomposition), Error> {
    let n_eq = dc.n_eq();

    if batch == 0 {
        return Err(Error::InvalidInput(
            "the batch size of an adaptive Taylor integrator cannot be zero".to_string(),
        ));
    }
    if state.iter().any(|x| !x.is_finite()) {
        return Err(Error::InvalidInput(
            "a non-finite value was detected in the initial state of an adaptive Taylor integrator"
                .to_string(),
        ));
    }
    if state.len() != n_eq * batch {
        return Err(Error::InvalidInput(format!(
            "inconsistent sizes detected in the initialization of an adaptive Taylor integrator: the state vector has a size of {}, while the number of equations is {}",
            state.len(),
            n_eq
        )));
    }
    if time.iter().any(|t| !t.is_finite()) {
        return Err(Error::InvalidInput(
            "cannot initialise an adaptive Taylor integrator with a non-finite initial time"
                .to_string(),
        ));
    }
    if !rtol.is_finite() || rtol <= T::zero() {
        return Err(Error::InvalidInput(format!(
            "the relative tolerance in an adaptive Taylor integrator must be finite and positive, but it is {} instead",
            rtol
        )));
    }
    if !atol.is_finite() || atol <= T::zero() {
        return Err(Error::InvalidInput(format!(
            "the absolute tolerance in an adaptive Taylor integrator must be finite and positive, but it is {} instead",
            atol
        )));
    }

    let order_r = compute_order(rtol)?;
    let order_a = compute_order(atol)?;
    let max_order = order_r.max(order_a);

    let engine = TapeEngine::new(&dc, batch, max_order)?;
    // Parameter values default to zero; set_pars replaces them.
    let pars = vec![T::zero(); engine.max_par().map_or(0, |m| m as usize + 1)];

    let mut core = StepperCore::new(
        n_eq,
        batch,
        state,
        time,
        rtol,
        atol,
        order_r,
        order_a,
        pars,
        Box::new(engine),
    );

    // Evaluate the jet once to validate the derivatives of the initial
    // state.
    let row = n_eq * batch;
    core.jet[..row].copy_from_slice(&core.state);
    core.engine
        .fill_jet(&mut core.jet, &core.time, &core.pars, max_order);
    if core.jet[row..].iter().any(|x| !x.is_finite()) {
        return Err(Error::InvalidInput(
            "non-finite value(s) detected in the jet of derivatives corresponding to the initial state of an adaptive Taylor integrator"
                .to_string(),
        ));
    }

    Ok((core, dc))
}

fn check_set_state<T: Float>(current: &[T], state: &[T]) -> Result<bool, Error> {
    // A self-copy is a no-op, detected by identity.
    if state.as_ptr() == current.as_ptr() {
        return Ok(false);
    }
    if state.len() != current.len() {
        return Err(Error::InvalidInput(format!(
            "the state vector passed to set_state() has a size of {}, which is inconsistent with the size of the current state vector ({})",
            state.len(),
            current.len()
        )));
    }
    if state.iter().any(|x| !x.is_finite()) {
        return Err(Error::InvalidInput(
            "a non-finite state vector was passed to set_state()".to_string(),
        ));
    }
    Ok(true)
}

/// An adaptive Taylor integrator for one state vector.
///
/// Construction decomposes the system, builds the derivative engine and
/// validates the initial data; afterwards [`step`](Self::step) and the
/// propagation loops advance the state without allocating.
pub struct TaylorAdaptive<T: Float> {
    core: StepperCore<T>,
    dc: Decomposition,
    opts: EngineOpts,
}

impl<T: Float> TaylorAdaptive<T> {
    /// New integrator for a system given as right-hand sides, with state
    /// variables deduced in alphabetical order.
    pub fn new(sys: &[Expression], state: Vec<T>, time: T, rtol: T, atol: T) -> Result<Self, Error> {
        Self::with_opts(sys, state, time, rtol, atol, EngineOpts::default())
    }

    /// Like [`new`](Self::new), with explicit engine options.
    pub fn with_opts(
        sys: &[Expression],
        state: Vec<T>,
        time: T,
        rtol: T,
        atol: T,
        opts: EngineOpts,
    ) -> Result<Self, Error> {
        let (core, dc) = build_core(decompose(sys)?, state, vec![time], rtol, atol, 1)?;
        Ok(TaylorAdaptive { core, dc, opts })
    }

    /// New integrator for a system given as `(lhs, rhs)` pairs, with state
    /// variables ordered as declared.
    pub fn new_pairs(
        sys: &[(Expression, Expression)],
        state: Vec<T>,
        time: T,
        rtol: T,
        atol: T,
    ) -> Result<Self, Error> {
        Self::new_pairs_with_opts(sys, state, time, rtol, atol, EngineOpts::default())
    }

    /// Like [`new_pairs`](Self::new_pairs), with explicit engine options.
    pub fn new_pairs_with_opts(
        sys: &[(Expression, Expression)],
        state: Vec<T>,
        time: T,
        rtol: T,
        atol: T,
        opts: EngineOpts,
    ) -> Result<Self, Error> {
        let (core, dc) = build_core(decompose_pairs(sys)?, state, vec![time], rtol, atol, 1)?;
        Ok(TaylorAdaptive { core, dc, opts })
    }

    /// One forward step with automatically deduced size.
    pub fn step(&mut self) -> StepResult<T> {
        self.core.step_impl(StepLimits::Free { forward: true });
        self.core.results()[0]
    }

    /// One backward step with automatically deduced size.
    pub fn step_backward(&mut self) -> StepResult<T> {
        self.core.step_impl(StepLimits::Free { forward: false });
        self.core.results()[0]
    }

    /// One step of at most `|max_delta_t|`, in the direction of its sign.
    pub fn step_limited(&mut self, max_delta_t: T) -> Result<StepResult<T>, Error> {
        if !max_delta_t.is_finite() {
            return Err(Error::InvalidInput(
                "a non-finite max_delta_t was passed to step_limited()".to_string(),
            ));
        }
        Ok(self.step_limited_unchecked(max_delta_t))
    }

    fn step_limited_unchecked(&mut self, max_delta_t: T) -> StepResult<T> {
        let limits = [max_delta_t];
        self.core.step_impl(StepLimits::Limited(&limits));
        self.core.results()[0]
    }

    /// Step until the time reaches `t` or `max_steps` steps were taken
    /// (`max_steps == 0` meaning no limit).
    pub fn propagate_until(&mut self, t: T, max_steps: usize) -> Result<PropagateResult<T>, Error> {
        if !t.is_finite() {
            return Err(Error::InvalidInput(
                "a non-finite time was passed to propagate_until()".to_string(),
            ));
        }

        let mut res = PropagateResult {
            outcome: Outcome::TimeLimit,
            min_h: T::infinity(),
            max_h: T::zero(),
            min_order: u32::MAX,
            max_order: 0,
            n_steps: 0,
        };

        if t == self.time() {
            return Ok(res);
        }
        if !(t - self.time()).is_finite() {
            return Err(Error::Overflow(
                "the time limit passed to propagate_until() is too large and it results in an overflow condition"
                    .to_string(),
            ));
        }

        let forward = t > self.time();
        loop {
            let (outcome, h, order) = self.step_limited_unchecked(t - self.time());

            if outcome != Outcome::Success && outcome != Outcome::TimeLimit {
                res.outcome = outcome;
                return Ok(res);
            }

            res.n_steps += 1;
            res.min_order = res.min_order.min(order);
            res.max_order = res.max_order.max(order);

            // Stop before folding the clamped final step into min_h/max_h.
            if (forward && t <= self.time()) || (!forward && t >= self.time()) {
                break;
            }

            res.min_h = res.min_h.min(h.abs());
            res.max_h = res.max_h.max(h.abs());

            if max_steps != 0 && res.n_steps == max_steps {
                res.outcome = Outcome::StepLimit;
                return Ok(res);
            }
        }

        Ok(res)
    }

    /// Step for a time span of `delta_t` from the current time.
    pub fn propagate_for(
        &mut self,
        delta_t: T,
        max_steps: usize,
    ) -> Result<PropagateResult<T>, Error> {
        self.propagate_until(self.time() + delta_t, max_steps)
    }

    /// The current state vector.
    pub fn state(&self) -> &[T] {
        &self.core.state
    }

    /// Replace the state vector. Size and finiteness are validated;
    /// passing the integrator's own state slice is a no-op.
    pub fn set_state(&mut self, state: &[T]) -> Result<(), Error> {
        if check_set_state(&self.core.state, state)? {
            self.core.state.copy_from_slice(state);
        }
        Ok(())
    }

    /// The current time.
    pub fn time(&self) -> T {
        self.core.time[0]
    }

    /// Set the current time.
    pub fn set_time(&mut self, t: T) -> Result<(), Error> {
        if !t.is_finite() {
            return Err(Error::InvalidInput(format!(
                "non-finite time {} passed to set_time()",
                t
            )));
        }
        self.core.time[0] = t;
        Ok(())
    }

    /// The runtime parameter values.
    pub fn pars(&self) -> &[T] {
        &self.core.pars
    }

    /// Replace the runtime parameter values; the length must match.
    pub fn set_pars(&mut self, pars: &[T]) -> Result<(), Error> {
        if pars.len() != self.core.pars.len() {
            return Err(Error::InvalidInput(format!(
                "the parameter vector passed to set_pars() has a size of {}, {} expected",
                pars.len(),
                self.core.pars.len()
            )));
        }
        self.core.pars.copy_from_slice(pars);
        Ok(())
    }

    /// The relative tolerance.
    pub fn rtol(&self) -> T {
        self.core.rtol
    }

    /// The absolute tolerance.
    pub fn atol(&self) -> T {
        self.core.atol
    }

    /// The Taylor decomposition of the system.
    pub fn decomposition(&self) -> &Decomposition {
        &self.dc
    }

    /// The engine options this integrator was built with.
    pub fn opts(&self) -> EngineOpts {
        self.opts
    }

    /// Textual listing of the derivative engine's program.
    pub fn ir(&self) -> String {
        self.core.engine.ir()
    }
}

/// An adaptive Taylor integrator advancing `batch` independent state
/// vectors per call, each with its own deduced step.
///
/// State is stored variable-major: entry `v * batch + lane`. All lanes
/// share one decomposition and, within a step, one jet evaluated at the
/// largest per-lane order.
pub struct TaylorAdaptiveBatch<T: Float> {
    core: StepperCore<T>,
    dc: Decomposition,
    opts: EngineOpts,
}

impl<T: Float> TaylorAdaptiveBatch<T> {
    /// New batch integrator; `states` holds `n_eq * batch` values
    /// (variable-major), `times` one value per lane.
    pub fn new(
        sys: &[Expression],
        states: Vec<T>,
        times: Vec<T>,
        rtol: T,
        atol: T,
        batch: usize,
    ) -> Result<Self, Error> {
        Self::with_opts(sys, states, times, rtol, atol, batch, EngineOpts::default())
    }

    /// Like [`new`](Self::new), with explicit engine options.
    pub fn with_opts(
        sys: &[Expression],
        states: Vec<T>,
        times: Vec<T>,
        rtol: T,
        atol: T,
        batch: usize,
        opts: EngineOpts,
    ) -> Result<Self, Error> {
        if times.len() != batch {
            return Err(Error::InvalidInput(format!(
                "the time vector of a batch integrator has a size of {}, the batch size is {}",
                times.len(),
                batch
            )));
        }
        let (core, dc) = build_core(decompose(sys)?, states, times, rtol, atol, batch)?;
        Ok(TaylorAdaptiveBatch { core, dc, opts })
    }

    /// One forward step with automatically deduced size on every lane.
    pub fn step(&mut self) -> &[StepResult<T>] {
        self.core.step_impl(StepLimits::Free { forward: true });
        self.core.results()
    }

    /// One backward step with automatically deduced size on every lane.
    pub fn step_backward(&mut self) -> &[StepResult<T>] {
        self.core.step_impl(StepLimits::Free { forward: false });
        self.core.results()
    }

    /// One step per lane bounded by `|max_delta_ts[lane]|`, each lane's
    /// sign choosing its direction.
    pub fn step_limited(&mut self, max_delta_ts: &[T]) -> Result<&[StepResult<T>], Error> {
        if max_delta_ts.len() != self.core.batch {
            return Err(Error::InvalidInput(format!(
                "the max_delta_t vector passed to step_limited() has a size of {}, the batch size is {}",
                max_delta_ts.len(),
                self.core.batch
            )));
        }
        if max_delta_ts.iter().any(|x| !x.is_finite()) {
            return Err(Error::InvalidInput(
                "a non-finite max_delta_t was passed to step_limited()".to_string(),
            ));
        }
        self.core.step_impl(StepLimits::Limited(max_delta_ts));
        Ok(self.core.results())
    }

    /// The state vectors, variable-major.
    pub fn states(&self) -> &[T] {
        &self.core.state
    }

    /// Replace all state vectors at once.
    pub fn set_states(&mut self, states: &[T]) -> Result<(), Error> {
        if check_set_state(&self.core.state, states)? {
            self.core.state.copy_from_slice(states);
        }
        Ok(())
    }

    /// The per-lane times.
    pub fn times(&self) -> &[T] {
        &self.core.time
    }

    /// Replace the per-lane times.
    pub fn set_times(&mut self, times: &[T]) -> Result<(), Error> {
        if times.as_ptr() == self.core.time.as_ptr() {
            return Ok(());
        }
        if times.len() != self.core.time.len() {
            return Err(Error::InvalidInput(format!(
                "the time vector passed to set_times() has a size of {}, {} expected",
                times.len(),
                self.core.time.len()
            )));
        }
        if times.iter().any(|t| !t.is_finite()) {
            return Err(Error::InvalidInput(
                "a non-finite time vector was passed to set_times()".to_string(),
            ));
        }
        self.core.time.copy_from_slice(times);
        Ok(())
    }

    /// The batch size.
    pub fn batch_size(&self) -> usize {
        self.core.batch
    }

    /// The runtime parameter values (broadcast across lanes).
    pub fn pars(&self) -> &[T] {
        &self.core.pars
    }

    /// Replace the runtime parameter values; the length must match.
    pub fn set_pars(&mut self, pars: &[T]) -> Result<(), Error> {
        if pars.len() != self.core.pars.len() {
            return Err(Error::InvalidInput(format!(
                "the parameter vector passed to set_pars() has a size of {}, {} expected",
                pars.len(),
                self.core.pars.len()
            )));
        }
        self.core.pars.copy_from_slice(pars);
        Ok(())
    }

    /// The Taylor decomposition of the system.
    pub fn decomposition(&self) -> &Decomposition {
        &self.dc
    }

    /// The engine options this integrator was built with.
    pub fn opts(&self) -> EngineOpts {
        self.opts
    }

    /// Textual listing of the derivative engine's program.
    pub fn ir(&self) -> String {
        self.core.engine.ir()
    }
}
