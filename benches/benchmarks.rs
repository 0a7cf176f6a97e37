use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use fdfd_rs::{
    Axis, ModeSpec, NlAlgorithm, Nonlinearity, NonlinearOptions, Polarization, Simulation, Units,
};
use ndarray::Array2;
use num_complex::Complex64;

fn grid_sizes() -> Vec<usize> {
    vec![40, 80]
}

fn waveguide_sim(n: usize) -> Simulation {
    let ny = n / 2 + 20;
    let half = 3;
    let mut eps = Array2::from_elem((n, ny), Complex64::new(1.0, 0.0));
    for i in 0..n {
        for j in ny / 2 - half..ny / 2 + half {
            eps[(i, j)] = Complex64::new(12.25, 0.0);
        }
    }

    let units = Units::default();
    let omega = units.omega_for_wavelength(2.0);
    let mut sim = Simulation::with_units(omega, eps, 0.05, [8, 8], Polarization::Ez, units)
        .expect("simulation setup");

    let width = 2 * (half + 5);
    let sigma = half as f64 + 1.0;
    let profile: Vec<Complex64> = (0..width)
        .map(|k| {
            let t = k as f64 - width as f64 / 2.0 + 0.5;
            Complex64::new((-t * t / (2.0 * sigma * sigma)).exp(), 0.0)
        })
        .collect();
    sim.add_mode(ModeSpec {
        normal: Axis::X,
        center: (12, ny / 2),
        width,
        profile,
        scale: 1.0,
    })
    .expect("mode setup");
    sim.setup_modes().expect("source setup");
    sim
}

fn bench_operator_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("operator_assembly");
    for &size in &grid_sizes() {
        let mut sim = waveguide_sim(size);
        let eps = sim.eps_r().clone();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &_| {
            b.iter(|| {
                sim.set_eps(std::hint::black_box(eps.clone()))
                    .expect("reassembly");
            });
        });
    }
    group.finish();
}

fn bench_linear_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("linear_solve");
    group.sample_size(10);
    for &size in &grid_sizes() {
        let mut sim = waveguide_sim(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &_| {
            b.iter(|| {
                sim.solve_fields().expect("linear solve");
            });
        });
    }
    group.finish();
}

fn bench_nonlinear_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("nonlinear_solve");
    group.sample_size(10);
    let size = 40;
    let mut sim = waveguide_sim(size);
    let ny = size / 2 + 20;
    let mut mask = Array2::zeros((size, ny));
    for i in 0..size {
        for j in ny / 2 - 3..ny / 2 + 3 {
            mask[(i, j)] = 1.0;
        }
    }
    let kerr = Nonlinearity::kerr(1e-22, mask, &Units::default());

    for algorithm in [NlAlgorithm::FixedPoint, NlAlgorithm::Newton] {
        let opts = NonlinearOptions {
            algorithm,
            tolerance: 1e-8,
            ..Default::default()
        };
        group.bench_function(format!("{algorithm:?}").to_lowercase(), |b| {
            b.iter(|| {
                sim.solve_fields_nl(&kerr, &opts).expect("nonlinear solve");
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_operator_assembly,
    bench_linear_solve,
    bench_nonlinear_solve
);
criterion_main!(benches);
