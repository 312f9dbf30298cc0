use criterion::{criterion_group, criterion_main, Criterion};
use taylor_jet::{make_vars, num, par, pow, square, Expression, TaylorAdaptive};

/// The two-body equations with unit masses and G = 1.
fn two_body_system() -> Vec<(Expression, Expression)> {
    let [x0, y0, z0, vx0, vy0, vz0] = make_vars(["x0", "y0", "z0", "vx0", "vy0", "vz0"]);
    let [x1, y1, z1, vx1, vy1, vz1] = make_vars(["x1", "y1", "z1", "vx1", "vy1", "vz1"]);

    let dx = x1.clone() - x0.clone();
    let dy = y1.clone() - y0.clone();
    let dz = z1.clone() - z0.clone();
    let r2 = square(dx.clone()) + square(dy.clone()) + square(dz.clone());
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

fn bench_two_body(c: &mut Criterion) {
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
    let mut ta = TaylorAdaptive::new_pairs(&two_body_system(), init_state, 0.0, eps, eps).unwrap();

    c.bench_function("two_body_step", |b| b.iter(|| ta.step()));
}

fn bench_param_oscillator(c: &mut Criterion) {
    // x' = v, v' = -par[0]·x, stepping with a runtime parameter.
    let [x, v] = make_vars(["x", "v"]);
    let sys = [(x.clone(), v.clone()), (v, -(par(0) * x))];
    let mut ta =
        TaylorAdaptive::new_pairs(&sys, vec![1.0, 0.0], 0.0, 1e-15, 1e-15).unwrap();
    ta.set_pars(&[4.0]).unwrap();

    c.bench_function("param_oscillator_step", |b| b.iter(|| ta.step()));
}

criterion_group!(benches, bench_two_body, bench_param_oscillator);
criterion_main!(benches);
