use std::fs;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hr_forecast::calibration::{self, CalibrationMap, CalibrationModel, Example};
use hr_forecast::error::HrError;

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("hr_forecast_cal_{}_{name}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Raw probabilities that overstate the true rate by about 2x.
fn overconfident(n: usize, seed: u64) -> Vec<Example> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let p = rng.r#gen::<f64>() * 0.6;
            Example::new(p, rng.r#gen::<f64>() < p / 2.0)
        })
        .collect()
}

#[test]
fn fitted_platt_beats_raw_on_overconfident_scores() {
    let examples = overconfident(4000, 11);
    let model = calibration::fit(&examples, "platt".parse().unwrap()).unwrap();
    let diag = calibration::diagnose(&examples, Some(&model));
    assert_eq!(diag.raw.samples, 4000);
    assert!(diag.calibrated.brier < diag.raw.brier);
    assert!(diag.ece_calibrated < diag.ece_raw);
}

#[test]
fn isotonic_fit_saves_and_loads() {
    let dir = scratch("iso");
    let path = dir.join("model_calibration.json");
    let examples = overconfident(1500, 5);

    let model = calibration::fit_and_save(&examples, "isotonic", &path).unwrap();
    assert!(!path.with_extension("json.tmp").exists());
    let loaded = calibration::load(&path).expect("saved model should load");
    assert_eq!(loaded, model);

    let CalibrationMap::Isotonic { x, y } = &loaded.map else {
        panic!("expected isotonic");
    };
    assert!(x.windows(2).all(|w| w[0] < w[1]));
    for (xi, yi) in x.iter().zip(y) {
        assert!((loaded.apply(*xi) - yi).abs() < 1e-12);
    }
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn saved_breakpoints_reload_bit_for_bit() {
    let dir = scratch("bits");
    let path = dir.join("model_calibration.json");
    let model = CalibrationModel {
        map: CalibrationMap::Isotonic {
            x: vec![0.0012154167720868749, 0.1 + 0.2, 1.0 / 3.0],
            y: vec![0.0, 0.07000000000000001, 2.0 / 3.0],
        },
        fitted_at: "2025-07-04T00:00:00+00:00".to_string(),
        n_samples: 3,
    };
    calibration::save(&model, &path).unwrap();
    let loaded = calibration::load(&path).expect("saved model should load");
    let (CalibrationMap::Isotonic { x: x0, y: y0 }, CalibrationMap::Isotonic { x: x1, y: y1 }) =
        (&model.map, &loaded.map)
    else {
        panic!("expected isotonic");
    };
    for (a, b) in x0.iter().chain(y0).zip(x1.iter().chain(y1)) {
        assert_eq!(a.to_bits(), b.to_bits(), "{a} reloaded as {b}");
    }
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn unsupported_method_is_not_written() {
    let dir = scratch("bad");
    let path = dir.join("model_calibration.json");
    let err = calibration::fit_and_save(&overconfident(10, 1), "spline", &path).unwrap_err();
    assert!(matches!(err, HrError::UnsupportedMethod(_)));
    assert!(!path.exists());
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn garbage_file_means_no_calibration() {
    let dir = scratch("garbage");
    let path = dir.join("model_calibration.json");
    fs::write(&path, "{\"method\": \"platt\", \"params\": ").unwrap();
    assert!(calibration::load(&path).is_none());
    assert!(calibration::load(&dir.join("missing.json")).is_none());
    let _ = fs::remove_dir_all(dir);
}
