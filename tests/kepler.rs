//! Long-term energy conservation on the two-body problem.

use taylor_jet::{make_vars, num, pow, square, Expression, Outcome, TaylorAdaptive};

/// Total energy of the two-body state (unit masses, G = 1).
fn energy(st: &[f64]) -> f64 {
    let dx = st[0] - st[6];
    let dy = st[1] - st[7];
    let dz = st[2] - st[8];
    let dist = (dx * dx + dy * dy + dz * dz).sqrt();
    let u = -1.0 / dist;

    let v2_0 = st[3] * st[3] + st[4] * st[4] + st[5] * st[5];
    let v2_1 = st[9] * st[9] + st[10] * st[10] + st[11] * st[11];

    0.5 * (v2_0 + v2_1) + u
}

/// The two-body equations with unit masses and G = 1, state layout
/// `[x0, y0, z0, vx0, vy0, vz0, x1, y1, z1, vx1, vy1, vz1]`.
fn two_body_system() -> Vec<(Expression, Expression)> {
    let [x0, y0, z0, vx0, vy0, vz0] = make_vars(["x0", "y0", "z0", "vx0", "vy0", "vz0"]);
    let [x1, y1, z1, vx1, vy1, vz1] = make_vars(["x1", "y1", "z1", "vx1", "vy1", "vz1"]);

    let dx = x1.clone() - x0.clone();
    let dy = y1.clone() - y0.clone();
    let dz = z1.clone() - z0.clone();
    let r2 = square(dx.clone()) + square(dy.clone()) + square(dz.clone());
    // 1 / r³, shared by all six accelerations through CSE.
    let rm3 = pow(r2, num(-1.5));

    let ax = dx * rm3.clone();
    let ay = dy * rm3.clone();
    let az = dz * rm3;

    vec![
        (x0, vx0.clone()),
        (y0, vy0.clone()),
        (z0, vz0.clone()),
        (vx0, ax.clone()),
        (vy0, ay.clone()),
        (vz0, az.clone()),
        (x1, vx1.clone()),
        (y1, vy1.clone()),
        (z1, vz1.clone()),
        (vx1, -ax),
        (vy1, -ay),
        (vz1, -az),
    ]
}

#[test]
fn two_body_energy_conservation() {
    let x0 = 0.12753732455163191;
    let y0 = 1.38595818266122;
    let z0 = 0.35732917545977527;
    let vx0 = -0.41861303824199964;
    let vy0 = 0.032224544954305295;
    let vz0 = 0.070829797576461351;

    let init_state = vec![
        x0, y0, z0, vx0, vy0, vz0, -x0, -y0, -z0, -vx0, -vy0, -vz0,
    ];

    let eps = f64::EPSILON;
    let sys = two_body_system();
    let mut ta = TaylorAdaptive::new_pairs(&sys, init_state, 0.0, eps, eps).unwrap();

    let e0 = energy(ta.state());
    assert!(e0.is_finite());

    // Integrate in unit chunks, checking the relative energy error after
    // each one.
    for chunk in 1..=20 {
        let res = ta.propagate_until(chunk as f64, 0).unwrap();
        assert_eq!(res.outcome, Outcome::TimeLimit);
        let e = energy(ta.state());
        let rel = ((e - e0) / e0).abs();
        assert!(
            rel < 1e-13,
            "relative energy error {} at t = {}",
            rel,
            chunk
        );
    }
}

#[test]
fn two_body_round_trip() {
    let init_state: Vec<f64> = vec![
        0.3, 1.1, 0.2, -0.4, 0.05, 0.03, -0.3, -1.1, -0.2, 0.4, -0.05, -0.03,
    ];
    let tol = 1e-12;
    let sys = two_body_system();
    let mut ta = TaylorAdaptive::new_pairs(&sys, init_state.clone(), 0.0, tol, tol).unwrap();

    ta.propagate_until(10.0, 0).unwrap();
    let res = ta.propagate_until(0.0, 0).unwrap();
    assert_eq!(res.outcome, Outcome::TimeLimit);

    let err = ta
        .state()
        .iter()
        .zip(init_state.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0_f64, f64::max);
    assert!(err < 12.0 * tol * 10.0, "round-trip error {}", err);
}
