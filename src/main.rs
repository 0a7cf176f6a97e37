use fdfd_rs::numerics::timing::{finalize_and_print, reset_timing};
use fdfd_rs::{
    Axis, FieldComponent, ModeSpec, NlAlgorithm, Nonlinearity, NonlinearOptions, Polarization,
    Simulation, Units,
};
use ndarray::Array2;
use num_complex::Complex64;
use std::fs::{self, File};
use std::io::Write;
use std::time::Instant;

// Self-phase-modulation sweep: a Kerr waveguide driven at increasing source
// amplitudes, transmission recorded against the linear baseline.

const NX: usize = 160;
const NY: usize = 80;
const DL: f64 = 0.05; // grid spacing in units of L0 (microns)
const NPML: [usize; 2] = [15, 15];
const WAVELENGTH: f64 = 2.0;
const EPS_CORE: f64 = 12.25;
// m^2 / V^2, chosen so the peak permittivity shift at the top of the
// amplitude ramp stays a few percent of unity
const CHI3: f64 = 1e-21;
const CORE_HALF_WIDTH: usize = 3;

fn main() {
    fs::create_dir_all("output").expect("Failed to create output directory");

    let units = Units::default();
    let omega = units.omega_for_wavelength(WAVELENGTH);

    let (eps, core_mask) = waveguide_permittivity();
    let mut sim = Simulation::with_units(omega, eps, DL, NPML, Polarization::Ez, units)
        .expect("Failed to build simulation");

    let kerr = Nonlinearity::kerr(CHI3, core_mask, &units);

    let probe_x = NX - NPML[0] - 20;
    let probe_width = 2 * (CORE_HALF_WIDTH + 8);

    println!("SPM sweep: {NX}x{NY} grid, lambda = {WAVELENGTH} um, Ez polarization");
    println!(
        "{:>12} | {:>6} | {:>12} | {:>12}",
        "amplitude", "iters", "power", "transmission"
    );

    reset_timing();
    let start = Instant::now();
    let mut rows: Vec<(f64, u32, f64, f64)> = Vec::new();
    let mut linear_power = None;

    for step in 0..10 {
        // logarithmic amplitude ramp, 10 to 1000
        let amplitude = 10.0_f64 * 100.0_f64.powf(step as f64 / 9.0);
        install_source(&mut sim, amplitude);

        let opts = NonlinearOptions {
            algorithm: NlAlgorithm::Newton,
            ..Default::default()
        };
        let result = sim
            .solve_fields_nl(&kerr, &opts)
            .unwrap_or_else(|e| panic!("amplitude {amplitude:.1}: solve failed: {e}"));

        let power = sim
            .flux_probe(Axis::X, (probe_x, NY / 2), probe_width)
            .expect("Failed to probe flux");
        // source power scales quadratically, so normalize against it
        let baseline = *linear_power.get_or_insert(power / (amplitude * amplitude));
        let transmission = power / (amplitude * amplitude) / baseline;

        println!(
            "{:>12.2} | {:>6} | {:>12.4e} | {:>12.6}",
            amplitude, result.iterations, power, transmission
        );
        rows.push((amplitude, result.iterations, power, transmission));
    }

    let max_ez = sim
        .fields()
        .get(FieldComponent::Ez)
        .map(|ez| ez.iter().map(|v| v.norm()).fold(0.0_f64, f64::max))
        .unwrap_or(0.0);
    let max_deps = sim.eps_nl().iter().map(|v| v.norm()).fold(0.0_f64, f64::max);
    println!("Final solve: max |Ez| = {max_ez:.4e}, max |deps| = {max_deps:.4e}");
    println!("Sweep finished in {:.2}s", start.elapsed().as_secs_f64());
    finalize_and_print(start.elapsed());

    write_sweep_csv("output/spm_sweep.csv", &rows).expect("Failed to write sweep CSV");
    println!("Sweep saved to output/spm_sweep.csv");
}

/// Slab waveguide along x, centered in y, with a mask marking the Kerr core.
fn waveguide_permittivity() -> (Array2<Complex64>, Array2<f64>) {
    let mut eps = Array2::from_elem((NX, NY), Complex64::new(1.0, 0.0));
    let mut mask = Array2::zeros((NX, NY));
    let j0 = NY / 2 - CORE_HALF_WIDTH;
    let j1 = NY / 2 + CORE_HALF_WIDTH;
    for i in 0..NX {
        for j in j0..j1 {
            eps[(i, j)] = Complex64::new(EPS_CORE, 0.0);
            mask[(i, j)] = 1.0;
        }
    }
    (eps, mask)
}

/// Replace the registered source with a single mode of the given amplitude.
/// The profile is a Gaussian stand-in for the fundamental mode.
fn install_source(sim: &mut Simulation, amplitude: f64) {
    let width = 2 * (CORE_HALF_WIDTH + 8);
    let sigma = CORE_HALF_WIDTH as f64 + 1.0;
    let profile: Vec<Complex64> = (0..width)
        .map(|k| {
            let t = k as f64 - width as f64 / 2.0 + 0.5;
            Complex64::new((-t * t / (2.0 * sigma * sigma)).exp(), 0.0)
        })
        .collect();

    sim.clear_modes();
    sim.add_mode(ModeSpec {
        normal: Axis::X,
        center: (NPML[0] + 5, NY / 2),
        width,
        profile,
        scale: amplitude,
    })
    .expect("Failed to add mode");
    sim.setup_modes().expect("Failed to set up modes");
}

fn write_sweep_csv(path: &str, rows: &[(f64, u32, f64, f64)]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "amplitude,iterations,power,transmission")?;
    for (amp, iters, power, trans) in rows {
        writeln!(file, "{amp},{iters},{power},{trans}")?;
    }
    Ok(())
}
