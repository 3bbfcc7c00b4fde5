use criterion::{black_box, criterion_group, criterion_main, Criterion};
use shifted_l2_prox::{
    CompositeNormL2, Constraint, FnConstraint, Jacobian, JacobianPattern, JacobianValuesMut,
    ProxMethod, ProxOptions,
};

fn prox_options(method: ProxMethod) -> ProxOptions {
    ProxOptions {
        tol: 1e-12,
        method,
        ..ProxOptions::default()
    }
}

/// Chain constraints c_i(x) = x_i^2 - x_{i+1}, i = 0..n-1.
fn chain(n: usize) -> CompositeNormL2<impl Constraint> {
    let m = n - 1;
    let mut col_ptrs = Vec::with_capacity(n + 1);
    let mut row_indices = Vec::new();
    col_ptrs.push(0);
    for col in 0..n {
        if col > 0 {
            row_indices.push(col - 1);
        }
        if col < m {
            row_indices.push(col);
        }
        col_ptrs.push(row_indices.len());
    }
    let pattern = JacobianPattern::new(m, n, col_ptrs, row_indices).unwrap();
    let constraint = FnConstraint::new(
        move |x: &[f64], out: &mut [f64]| {
            for i in 0..m {
                out[i] = x[i] * x[i] - x[i + 1];
            }
        },
        move |x: &[f64], jac: &mut JacobianValuesMut<'_>| {
            for i in 0..m {
                *jac.entry_mut(i, i).unwrap() = 2.0 * x[i];
                *jac.entry_mut(i, i + 1).unwrap() = -1.0;
            }
        },
    );
    let psi = CompositeNormL2::new(1.0, constraint, Jacobian::zeros(pattern), vec![0.0; m]).unwrap();
    let xk: Vec<f64> = (0..n).map(|i| 1.0 + 0.01 * i as f64).collect();
    psi.shift(&xk).unwrap()
}

fn dense_identity() -> CompositeNormL2<impl Constraint> {
    let constraint = FnConstraint::new(
        |x: &[f64], out: &mut [f64]| out.copy_from_slice(x),
        |_x: &[f64], jac: &mut JacobianValuesMut<'_>| {
            for col in 0..jac.ncols() {
                jac.values_of_col_mut(col).fill(0.0);
                *jac.entry_mut(col, col).unwrap() = 1.0;
            }
        },
    );
    let jac = Jacobian::from_dense(2, 2, &[0.0; 4]).unwrap();
    CompositeNormL2::shifted(1.0, constraint, jac, vec![0.0; 2], &[0.0, 0.0]).unwrap()
}

fn bench_identity_boundary(c: &mut Criterion) {
    let mut psi = dense_identity();
    let mut y = vec![0.0; 2];
    let options = prox_options(ProxMethod::Cholesky);
    c.bench_function("identity_boundary", |b| {
        b.iter(|| {
            psi.prox(black_box(&[2.0, 0.0]), 1.0, &mut y, &options, None)
                .unwrap();
            black_box(&y);
        })
    });
}

fn bench_chain(c: &mut Criterion) {
    for method in [ProxMethod::Cholesky, ProxMethod::Qr] {
        let n = 40;
        let mut psi = chain(n);
        let q: Vec<f64> = (0..n).map(|i| 0.1 * (i % 7) as f64 - 0.3).collect();
        let mut y = vec![0.0; n];
        let options = prox_options(method);
        let name = format!("chain_{n}_{method:?}").to_lowercase();
        c.bench_function(&name, |b| {
            b.iter(|| {
                psi.prox(black_box(&q), 0.05, &mut y, &options, None)
                    .unwrap();
                black_box(&y);
            })
        });
    }
}

fn bench_shift(c: &mut Criterion) {
    let psi = chain(40);
    let xk = vec![0.5; 40];
    c.bench_function("chain_40_shift", |b| {
        b.iter(|| black_box(psi.shift(black_box(&xk)).unwrap()))
    });
}

criterion_group!(benches, bench_identity_boundary, bench_chain, bench_shift);
criterion_main!(benches);
