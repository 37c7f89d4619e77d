use rand::{
    Rng,
    SeedableRng,
};
use rand_chacha::ChaCha8Rng;
use rtcalib::{
    AdditiveFitOptions,
    LinearFit,
    RetentionCoefficients,
    RtModelError,
};

const TRUE_RCS: [(char, f64); 8] = [
    ('A', 0.8),
    ('L', 9.6),
    ('K', -2.1),
    ('E', 0.0),
    ('P', 0.2),
    ('G', -0.5),
    ('F', 10.1),
    ('S', -0.8),
];

fn true_rt(seq: &str) -> f64 {
    let total: f64 = seq
        .chars()
        .map(|c| TRUE_RCS.iter().find(|(aa, _)| *aa == c).unwrap().1)
        .sum();
    total + 5.0
}

fn random_peptides(n: usize, seed: u64) -> Vec<String> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let len = rng.gen_range(8..16);
            (0..len)
                .map(|_| TRUE_RCS[rng.gen_range(0..TRUE_RCS.len())].0)
                .collect()
        })
        .collect()
}

#[test]
fn test_linear_fit_recovers_line() {
    // Test: y = 1.5 x - 3 exactly
    let x: Vec<f64> = (0..50).map(|i| i as f64).collect();
    let y: Vec<f64> = x.iter().map(|v| 1.5 * v - 3.0).collect();

    let fit = LinearFit::fit(&x, &y).unwrap();
    assert!((fit.coefficient - 1.5).abs() < 1e-9);
    assert!((fit.intercept + 3.0).abs() < 1e-9);
    assert!((fit.predict(100.0) - 147.0).abs() < 1e-9);
}

#[test]
fn test_additive_model_recovers_retention_times() {
    let peptides = random_peptides(300, 7);
    let rts: Vec<f64> = peptides.iter().map(|p| true_rt(p)).collect();

    let model =
        RetentionCoefficients::fit(&peptides, &rts, &AdditiveFitOptions::default()).unwrap();

    // The generating model has no length correction, the grid contains 0.
    assert!(model.length_correction().abs() < 1e-9);
    for held_out in ["LLKAEPGFS", "FFFFKKKKAA", "SGPEAKLF"] {
        let predicted = model.predict(held_out);
        let expected = true_rt(held_out);
        assert!(
            (predicted - expected).abs() < 1e-3,
            "{}: predicted {} expected {}",
            held_out,
            predicted,
            expected
        );
    }
}

#[test]
fn test_additive_model_missing_residues_can_be_filled() {
    let peptides = random_peptides(200, 11);
    let rts: Vec<f64> = peptides.iter().map(|p| true_rt(p)).collect();

    let mut model =
        RetentionCoefficients::fit(&peptides, &rts, &AdditiveFitOptions::default()).unwrap();
    assert_eq!(model.coefficient("C"), None);
    assert!(model.fill_missing("C", "P", 0.956));
    let p = model.coefficient("P").unwrap();
    assert!((model.coefficient("C").unwrap() - p * 0.956).abs() < 1e-12);
}

#[test]
fn test_additive_model_empty_input() {
    let empty: Vec<String> = vec![];
    let result = RetentionCoefficients::fit(&empty, &[], &AdditiveFitOptions::default());
    assert_eq!(result, Err(RtModelError::NoPoints));
}

#[test]
fn test_additive_model_constant_rts_does_not_fail() {
    // Test: no correlation can be computed, the fit still returns a model
    let peptides = vec!["LLKA".to_string(), "PEGS".to_string(), "FFKE".to_string()];
    let rts = vec![10.0, 10.0, 10.0];
    let model =
        RetentionCoefficients::fit(&peptides, &rts, &AdditiveFitOptions::default()).unwrap();
    assert!((model.predict("LLKA") - 10.0).abs() < 1e-3);
}
