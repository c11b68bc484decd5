use anyhow::{Context, Result};

use hr_forecast::calibration::{self, CalibrationMethod};
use hr_forecast::cli;
use hr_forecast::outcome_log;

fn main() -> Result<()> {
    cli::load_env();
    cli::init_tracing();
    let args = cli::args();

    let data_dir = cli::data_dir(&args);
    let method = cli::arg_value(&args, "--method")
        .or_else(|| std::env::var("HR_CALIBRATION_METHOD").ok())
        .unwrap_or_else(|| "platt".to_string());
    let method: CalibrationMethod = method.parse()?;
    let db_path = cli::outcome_db_path(&args, &data_dir);
    let out_path = cli::arg_value(&args, "--out")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| cli::calibration_path(&args, &data_dir));

    let conn = outcome_log::open_db(&db_path)
        .with_context(|| format!("open outcome db {}", db_path.display()))?;
    let examples = outcome_log::load_calibration_examples(&conn).context("load examples")?;
    let usable = calibration::usable_examples(&examples);
    if usable.is_empty() {
        println!("No examples found; aborting calibration.");
        return Ok(());
    }

    let model = calibration::fit_and_save(&usable, method.as_str(), &out_path)
        .context("fit calibration")?;
    println!(
        "Saved calibration {} with {} samples -> {}",
        model.method_name(),
        model.n_samples,
        out_path.display()
    );

    let diag = calibration::diagnose(&usable, Some(&model));
    println!(
        "brier_raw={:.4} brier_cal={:.4} ll_raw={:.4} ll_cal={:.4} ece_raw={:.4} ece_cal={:.4}",
        diag.raw.brier,
        diag.calibrated.brier,
        diag.raw.log_loss,
        diag.calibrated.log_loss,
        diag.ece_raw,
        diag.ece_calibrated
    );
    for bin in diag.bins.iter().filter(|b| b.count > 0) {
        println!(
            "  [{:.1}, {:.1}) n={:<5} pred={:.3} actual={:.3}",
            bin.bucket_start, bin.bucket_end, bin.count, bin.avg_pred, bin.actual_rate
        );
    }

    Ok(())
}
