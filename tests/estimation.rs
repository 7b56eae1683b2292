//! Parameter estimation round trips on synthetic concentration data.

use approx::assert_relative_eq;
use kinfit_rs::data::ConcentrationData;
use kinfit_rs::ReactionModel;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Series reaction A -> B -> C with the given rate constants, sampled on
/// `n_times` points over [0, tf], optionally with measurement noise.
fn synthetic_data(k1: f64, k2: f64, tf: f64, n_times: usize, noise: f64) -> ConcentrationData {
    let mut generator = ReactionModel::new("truth");
    generator.add_parameter("k1", k1).unwrap();
    generator.add_parameter("k2", k2).unwrap();
    generator.add_component("A", 1.0).unwrap();
    generator.add_component("B", 0.0).unwrap();
    generator.add_component("C", 0.0).unwrap();
    generator
        .add_odes(&[
            ("A", "-k1 * A"),
            ("B", "k1 * A - k2 * B"),
            ("C", "k2 * B"),
        ])
        .unwrap();
    generator.set_times(0.0, tf).unwrap();
    generator.settings.collocation.nfe = 200;
    generator.settings.collocation.ncp = 1;

    let results = generator.simulate().unwrap();
    let grid = results.simulation.times();
    let z = results.simulation.z();

    let mut rng = ChaCha8Rng::seed_from_u64(1234);
    let dist = Normal::new(0.0, noise.max(1e-300)).unwrap();

    let times: Vec<f64> = (0..n_times)
        .map(|i| tf * i as f64 / (n_times - 1) as f64)
        .collect();
    let mut columns = Vec::new();
    for (j, name) in ["A", "B", "C"].iter().enumerate() {
        let mut column = Vec::with_capacity(n_times);
        for &t in &times {
            // Nearest grid sample of the fine truth trajectory
            let idx = grid
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    (*a - t).abs().partial_cmp(&(*b - t).abs()).unwrap()
                })
                .map(|(i, _)| i)
                .unwrap();
            let mut v = z[[idx, j]];
            if noise > 0.0 {
                v += dist.sample(&mut rng);
            }
            column.push(v);
        }
        columns.push((name.to_string(), column));
    }

    ConcentrationData::from_columns(times, columns).unwrap()
}

fn fitting_model(k1_guess: f64, k2_guess: f64, data: ConcentrationData) -> ReactionModel {
    let mut r1 = ReactionModel::new("fit");
    r1.add_parameter_with_bounds("k1", k1_guess, 0.0, 5.0).unwrap();
    r1.add_parameter_with_bounds("k2", k2_guess, 0.0, 2.0).unwrap();
    r1.add_component("A", 1.0).unwrap();
    r1.add_component("B", 0.0).unwrap();
    r1.add_component("C", 0.0).unwrap();
    r1.add_odes(&[
        ("A", "-k1 * A"),
        ("B", "k1 * A - k2 * B"),
        ("C", "k2 * B"),
    ])
    .unwrap();
    r1.settings.collocation.nfe = 120;
    r1.settings.collocation.ncp = 1;
    r1.add_concentration_data(data).unwrap();
    r1
}

#[test]
fn recovers_rate_constants_from_clean_data() {
    let data = synthetic_data(2.0, 0.2, 10.0, 21, 0.0);
    let mut model = fitting_model(0.8, 0.6, data);

    let results = model.run_opt().unwrap();
    assert!(results.success, "fit did not converge: {}", results.message);

    assert_relative_eq!(results.parameter("k1").unwrap(), 2.0, epsilon = 0.01);
    assert_relative_eq!(results.parameter("k2").unwrap(), 0.2, epsilon = 0.01);
    assert!(results.chisqr < 1e-4);
}

#[test]
fn recovers_rate_constants_from_noisy_data() {
    let data = synthetic_data(2.0, 0.2, 10.0, 41, 0.01);
    let mut model = fitting_model(1.0, 0.5, data);

    let results = model.run_opt().unwrap();
    assert!(results.success, "fit did not converge: {}", results.message);

    // 1% noise: expect recovery within a few percent
    assert_relative_eq!(results.parameter("k1").unwrap(), 2.0, epsilon = 0.15);
    assert_relative_eq!(results.parameter("k2").unwrap(), 0.2, epsilon = 0.03);

    // Standard errors are attached and of a plausible scale
    let k1 = model.parameters().get("k1").unwrap();
    let stderr = k1.stderr().expect("stderr after fit");
    assert!(stderr > 0.0 && stderr < 0.5, "stderr = {}", stderr);

    // Confidence intervals bracket the estimate and widen with sigma
    let intervals = &results.confidence["k1"];
    assert_eq!(intervals.len(), 3);
    assert!(intervals[0].lower < results.parameter("k1").unwrap());
    assert!(intervals[0].upper > results.parameter("k1").unwrap());
    assert!(
        intervals[2].upper - intervals[2].lower > intervals[0].upper - intervals[0].lower
    );
}

#[test]
fn fixed_parameter_is_not_varied() {
    let data = synthetic_data(2.0, 0.2, 10.0, 21, 0.0);
    let mut model = fitting_model(2.0, 0.6, data);
    model.fix_parameter("k1").unwrap();

    let results = model.run_opt().unwrap();
    assert!(results.success);

    // k1 stays at its (correct) fixed value, k2 is recovered
    assert_eq!(results.parameter("k1").unwrap(), 2.0);
    assert_relative_eq!(results.parameter("k2").unwrap(), 0.2, epsilon = 0.01);
    assert!(model.parameters().get("k1").unwrap().stderr().is_none());
}

#[test]
fn sparse_measurements_are_tolerated() {
    // Only A is measured, and only on a handful of points
    let full = synthetic_data(2.0, 0.2, 10.0, 21, 0.0);
    let times: Vec<f64> = full.times().to_vec();
    let a: Vec<f64> = full.column("A").unwrap().to_vec();
    let data = ConcentrationData::from_columns(times, vec![("A".to_string(), a)]).unwrap();

    let mut r1 = ReactionModel::new("sparse");
    r1.add_parameter_with_bounds("k1", 0.7, 0.0, 5.0).unwrap();
    r1.add_component("A", 1.0).unwrap();
    r1.add_ode("A", "-k1 * A").unwrap();
    r1.settings.collocation.nfe = 60;
    r1.settings.collocation.ncp = 1;
    r1.add_concentration_data(data).unwrap();

    let results = r1.run_opt().unwrap();
    assert!(results.success);
    assert_relative_eq!(results.parameter("k1").unwrap(), 2.0, epsilon = 0.02);
}

#[test]
fn user_variances_weight_the_fit() {
    let data = synthetic_data(2.0, 0.2, 10.0, 21, 0.0);
    let mut model = fitting_model(1.0, 0.5, data);
    model
        .settings
        .parameter_estimator
        .variances
        .extend([
            ("A".to_string(), 1e-4),
            ("B".to_string(), 1e-4),
            ("C".to_string(), 1e-4),
        ]);

    let results = model.run_opt().unwrap();
    assert!(results.success);
    assert_relative_eq!(results.parameter("k1").unwrap(), 2.0, epsilon = 0.01);
    // chi-square scales with the inverse variances
    assert_eq!(results.sigma_sq["A"], 1e-4);
}
