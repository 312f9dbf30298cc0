use approx::assert_relative_eq;
use taylor_jet::{
    erf, exp, make_vars, num, par, sin, square, var, Error, Outcome, TaylorAdaptive,
};

fn exponential(x0: f64, rtol: f64, atol: f64) -> TaylorAdaptive<f64> {
    let x = var("x");
    TaylorAdaptive::new(&[x], vec![x0], 0.0, rtol, atol).unwrap()
}

fn pendulum(x0: f64, v0: f64, tol: f64) -> TaylorAdaptive<f64> {
    let [x, v] = make_vars(["x", "v"]);
    let sys = [(x.clone(), v.clone()), (v, -sin(x))];
    TaylorAdaptive::new_pairs(&sys, vec![x0, v0], 0.0, tol, tol).unwrap()
}

// ══════════════════════════════════════════════
//  1. Construction and validation
// ══════════════════════════════════════════════

#[test]
fn construction_rejects_bad_input() {
    let x = var("x");

    // Non-finite state.
    assert!(matches!(
        TaylorAdaptive::new(&[x.clone()], vec![f64::NAN], 0.0, 1e-9, 1e-9),
        Err(Error::InvalidInput(_))
    ));
    // State size mismatch.
    assert!(matches!(
        TaylorAdaptive::new(&[x.clone()], vec![1.0, 2.0], 0.0, 1e-9, 1e-9),
        Err(Error::InvalidInput(_))
    ));
    // Non-finite time.
    assert!(matches!(
        TaylorAdaptive::new(&[x.clone()], vec![1.0], f64::INFINITY, 1e-9, 1e-9),
        Err(Error::InvalidInput(_))
    ));
    // Bad tolerances.
    assert!(matches!(
        TaylorAdaptive::new(&[x.clone()], vec![1.0], 0.0, -1e-9, 1e-9),
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        TaylorAdaptive::new(&[x.clone()], vec![1.0], 0.0, 1e-9, 0.0),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn construction_rejects_non_finite_initial_derivatives() {
    // x' = log(x) at x = 0 has an infinite derivative.
    let x = var("x");
    assert!(matches!(
        TaylorAdaptive::new(&[taylor_jet::log(x)], vec![0.0], 0.0, 1e-9, 1e-9),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn pow_with_expression_exponent_is_unsupported() {
    let x = var("x");
    assert!(matches!(
        TaylorAdaptive::new(
            &[taylor_jet::pow(x.clone(), x)],
            vec![1.5],
            0.0,
            1e-9,
            1e-9
        ),
        Err(Error::UnsupportedOp(_))
    ));
}

// ══════════════════════════════════════════════
//  2. Order selection
// ══════════════════════════════════════════════

#[test]
fn order_follows_tolerance() {
    // order = max(2, ceil(-ln(tol)/2 + 1))
    let expected = |tol: f64| ((-tol.ln() / 2.0 + 1.0).ceil()).max(2.0) as u32;

    let mut ta = exponential(1.0, 1e-12, 1e-12);
    let res = ta.propagate_until(0.1, 0).unwrap();
    assert_eq!(res.min_order, expected(1e-12));
    assert_eq!(res.max_order, expected(1e-12));

    // With a state of norm 1 and rtol·1 > atol the relative order is used.
    let mut ta = exponential(1.0, 1e-3, 1e-12);
    let res = ta.propagate_until(0.1, 0).unwrap();
    assert_eq!(res.max_order, expected(1e-3));

    // With a tiny state the absolute order takes over.
    let mut ta = exponential(1e-11, 1e-3, 1e-12);
    let (_, _, order) = ta.step();
    assert_eq!(order, expected(1e-12));
}

// ══════════════════════════════════════════════
//  3. Stepping
// ══════════════════════════════════════════════

#[test]
fn time_advance_is_exact() {
    let mut ta = exponential(1.0, 1e-12, 1e-12);
    let t0 = ta.time();
    let (outcome, h, order) = ta.step();
    assert_eq!(outcome, Outcome::Success);
    assert!(h > 0.0);
    assert!(order >= 2);
    assert_eq!(ta.time(), t0 + h);
}

#[test]
fn step_backward_goes_backward() {
    let mut ta = exponential(1.0, 1e-12, 1e-12);
    let (outcome, h, _) = ta.step_backward();
    assert_eq!(outcome, Outcome::Success);
    assert!(h < 0.0);
    assert_eq!(ta.time(), h);
}

#[test]
fn step_limited_clamps() {
    let mut ta = exponential(1.0, 1e-12, 1e-12);
    let cap = 1e-10;
    let (outcome, h, _) = ta.step_limited(cap).unwrap();
    assert_eq!(outcome, Outcome::TimeLimit);
    assert_eq!(h, cap);
    assert_eq!(ta.time(), cap);

    // Negative bound steps backward.
    let (outcome, h, _) = ta.step_limited(-cap).unwrap();
    assert_eq!(outcome, Outcome::TimeLimit);
    assert_eq!(h, -cap);

    assert!(matches!(
        ta.step_limited(f64::NAN),
        Err(Error::InvalidInput(_))
    ));
}

// ══════════════════════════════════════════════
//  4. Propagation
// ══════════════════════════════════════════════

#[test]
fn exponential_growth_to_t1() {
    // x' = x, x(0) = 1: x(1) = e within rtol·e + atol.
    let mut ta = exponential(1.0, 1e-12, 1e-12);
    let res = ta.propagate_until(1.0, 0).unwrap();
    assert_eq!(res.outcome, Outcome::TimeLimit);
    assert_eq!(ta.time(), 1.0);
    assert!((ta.state()[0] - 1.0_f64.exp()).abs() <= 2e-12);
    assert!(res.n_steps > 0);
    assert!(res.min_h <= res.max_h);
    assert!(res.min_h.is_finite());
}

#[test]
fn propagate_until_current_time_is_a_noop() {
    let mut ta = exponential(1.0, 1e-12, 1e-12);
    let res = ta.propagate_until(0.0, 0).unwrap();
    assert_eq!(res.outcome, Outcome::TimeLimit);
    assert_eq!(res.n_steps, 0);
    assert_eq!(ta.state()[0], 1.0);
}

#[test]
fn propagate_until_validates_times() {
    let mut ta = exponential(1.0, 1e-12, 1e-12);
    assert!(matches!(
        ta.propagate_until(f64::NAN, 0),
        Err(Error::InvalidInput(_))
    ));

    ta.set_time(-f64::MAX).unwrap();
    assert!(matches!(
        ta.propagate_until(f64::MAX, 0),
        Err(Error::Overflow(_))
    ));
}

#[test]
fn step_limit_is_reported() {
    let mut ta = exponential(1.0, 1e-12, 1e-12);
    let res = ta.propagate_until(1e6, 3).unwrap();
    assert_eq!(res.outcome, Outcome::StepLimit);
    assert_eq!(res.n_steps, 3);
    assert!(ta.time() < 1e6);
}

#[test]
fn propagate_backwards() {
    let mut ta = exponential(1.0, 1e-12, 1e-12);
    let res = ta.propagate_until(-1.0, 0).unwrap();
    assert_eq!(res.outcome, Outcome::TimeLimit);
    assert_eq!(ta.time(), -1.0);
    assert!((ta.state()[0] - (-1.0_f64).exp()).abs() <= 2e-12);
}

#[test]
fn propagate_for_matches_until() {
    let mut ta = pendulum(0.1, 0.0, 1e-12);
    ta.propagate_for(2.5, 0).unwrap();
    assert_relative_eq!(ta.time(), 2.5, epsilon = 1e-15);
}

#[test]
fn round_trip_returns_to_initial_state() {
    // Forward to t = 10, back to t = 0; the error is bounded by
    // n_vars · rtol · 10.
    let tol = 1e-12;
    let mut ta = pendulum(0.8, 0.3, tol);
    ta.propagate_until(10.0, 0).unwrap();
    let res = ta.propagate_until(0.0, 0).unwrap();
    assert_eq!(res.outcome, Outcome::TimeLimit);
    let err = (ta.state()[0] - 0.8)
        .abs()
        .max((ta.state()[1] - 0.3).abs());
    assert!(err < 2.0 * tol * 10.0, "round-trip error {}", err);
}

// ══════════════════════════════════════════════
//  5. erf against its series surrogate
// ══════════════════════════════════════════════

#[test]
fn erf_system_matches_augmented_surrogate() {
    // x' = erf(0.01 x) + x versus the augmented system where
    // s tracks erf(0.01 x) through its own ODE.
    let eps = f64::EPSILON;
    let x = var("x");
    let mut ta0 = TaylorAdaptive::new(
        &[erf(num(0.01) * x.clone()) + x.clone()],
        vec![0.5],
        0.0,
        eps,
        eps,
    )
    .unwrap();

    let [xv, s] = make_vars(["x", "s"]);
    let two_over_sqrt_pi = 2.0 / std::f64::consts::PI.sqrt();
    let sys = [
        (xv.clone(), s.clone() + xv.clone()),
        (
            s.clone(),
            num(two_over_sqrt_pi)
                * exp(num(-1e-4) * xv.clone() * xv.clone())
                * num(0.01)
                * (s + xv),
        ),
    ];
    let mut ta1 =
        TaylorAdaptive::new_pairs(&sys, vec![0.5, libm::erf(0.005)], 0.0, eps, eps).unwrap();

    ta0.propagate_until(5.0, 0).unwrap();
    ta1.propagate_until(5.0, 0).unwrap();

    let rel = ((ta0.state()[0] - ta1.state()[0]) / ta0.state()[0]).abs();
    assert!(rel < 1e-13, "relative difference {}", rel);

    let v0 = libm::erf(ta0.state()[0] * 0.01);
    let v1 = ta1.state()[1];
    assert!(((v0 - v1) / v0).abs() < 1e-13);
}

// ══════════════════════════════════════════════
//  6. Runtime parameters
// ══════════════════════════════════════════════

#[test]
fn params_default_to_zero_and_can_be_set() {
    let x = var("x");
    let mut ta = TaylorAdaptive::new(&[par(0) * x], vec![1.0], 0.0, 1e-12, 1e-12).unwrap();
    assert_eq!(ta.pars(), &[0.0]);

    // With par[0] = 0 the state is frozen.
    ta.propagate_until(1.0, 0).unwrap();
    assert_eq!(ta.state()[0], 1.0);

    // With par[0] = 0.5 the solution is exp(0.5 t).
    ta.set_pars(&[0.5]).unwrap();
    ta.set_time(0.0).unwrap();
    ta.propagate_until(1.0, 0).unwrap();
    assert_relative_eq!(ta.state()[0], 0.5_f64.exp(), epsilon = 1e-11);

    assert!(matches!(
        ta.set_pars(&[1.0, 2.0]),
        Err(Error::InvalidInput(_))
    ));
}

// ══════════════════════════════════════════════
//  7. Error outcomes
// ══════════════════════════════════════════════

#[test]
fn blow_up_reports_error_outcome_and_freezes() {
    // x' = x² blows up at t = 1; at some point the state or the jet
    // stops being finite and the integration reports it.
    let x = var("x");
    let mut ta =
        TaylorAdaptive::new(&[square(x)], vec![1.0], 0.0, 1e-9, 1e-9).unwrap();
    let res = ta.propagate_until(2.0, 100_000).unwrap();
    assert!(
        matches!(
            res.outcome,
            Outcome::ErrNonFiniteState | Outcome::ErrNonFiniteDerivative
        ),
        "unexpected outcome {:?}",
        res.outcome
    );
    assert!(ta.time() < 2.0);

    // Repeating the step reproduces the error without advancing time.
    let t = ta.time();
    let state = ta.state().to_vec();
    let (outcome, h, _) = ta.step();
    assert!(matches!(
        outcome,
        Outcome::ErrNonFiniteState | Outcome::ErrNonFiniteDerivative
    ));
    assert_eq!(h, 0.0);
    assert_eq!(ta.time(), t);
    assert_eq!(ta.state(), &state[..]);
}

// ══════════════════════════════════════════════
//  8. State access and introspection
// ══════════════════════════════════════════════

#[test]
fn set_state_validation() {
    let mut ta = pendulum(0.1, 0.0, 1e-9);
    assert!(matches!(
        ta.set_state(&[1.0]),
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        ta.set_state(&[1.0, f64::NAN]),
        Err(Error::InvalidInput(_))
    ));
    ta.set_state(&[0.2, 0.1]).unwrap();
    assert_eq!(ta.state(), &[0.2, 0.1]);
}

#[test]
fn set_time_validation() {
    let mut ta = pendulum(0.1, 0.0, 1e-9);
    assert!(matches!(
        ta.set_time(f64::NAN),
        Err(Error::InvalidInput(_))
    ));
    ta.set_time(4.0).unwrap();
    assert_eq!(ta.time(), 4.0);
}

#[test]
fn decomposition_and_ir_are_exposed() {
    let ta = pendulum(0.1, 0.0, 1e-9);
    assert_eq!(ta.decomposition().n_eq(), 2);
    let ir = ta.ir();
    assert!(ir.contains("sin"));
    assert!(ir.contains("d/dt u_0"));
    assert!(ta.decomposition().to_string().contains("u_0"));
}

#[test]
fn tolerances_are_exposed() {
    let ta = pendulum(0.1, 0.0, 1e-9);
    assert_eq!(ta.rtol(), 1e-9);
    assert_eq!(ta.atol(), 1e-9);
}
