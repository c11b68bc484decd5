use std::path::PathBuf;

use anyhow::{Result, anyhow};
use tracing::warn;

use hr_forecast::backtest::{self, BacktestDay, GroundTruth};
use hr_forecast::cli;
use hr_forecast::data_dir::{self, DataDir, DocumentKind};
use hr_forecast::scoring_config::ScoringConfig;

fn main() -> Result<()> {
    cli::load_env();
    cli::init_tracing();
    let args = cli::args();

    let dir = DataDir::new(cli::data_dir(&args));
    let dates = match cli::arg_value(&args, "--dates") {
        Some(raw) => cli::parse_dates(&raw),
        None => dir.dates_for(DocumentKind::GroundTruth),
    };
    if dates.is_empty() {
        return Err(anyhow!(
            "no dates given (--dates) and no hr-hitters files in {}",
            dir.root().display()
        ));
    }

    let mut days = Vec::with_capacity(dates.len());
    for date in &dates {
        let inputs = match data_dir::load_inputs(&dir, date) {
            Ok(inputs) => inputs,
            Err(err) => {
                warn!(date = %date, error = %err, "skipping date");
                continue;
            }
        };
        let truth = match backtest::load_ground_truth(&dir, date)? {
            Some(truth) => truth,
            None => {
                warn!(date = %date, "no ground truth; every player counts as a miss");
                GroundTruth {
                    date: date.clone(),
                    ..GroundTruth::default()
                }
            }
        };
        days.push(BacktestDay {
            date: date.clone(),
            inputs,
            truth,
        });
    }
    if days.is_empty() {
        return Err(anyhow!("none of the requested dates had usable inputs"));
    }

    let settings = backtest::default_sweep(&ScoringConfig::from_env());
    let report = backtest::run_sweep(&days, &settings);

    println!();
    println!("Backtest Summary:");
    for result in &report.results {
        println!("{}", backtest::summary_line(result));
    }

    if let Some(out) = cli::arg_value(&args, "--out") {
        let path = PathBuf::from(out);
        data_dir::write_json_atomic(&path, &report)?;
        println!("Saved results to {}", path.display());
    }

    Ok(())
}
