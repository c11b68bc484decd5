use std::path::PathBuf;

use anyhow::{Context, Result};

use hr_forecast::calibration;
use hr_forecast::cli;
use hr_forecast::data_dir::{self, DataDir};
use hr_forecast::scoring;
use hr_forecast::scoring_config::ScoringConfig;

const DEFAULT_TOP: usize = 15;

fn main() -> Result<()> {
    cli::load_env();
    cli::init_tracing();
    let args = cli::args();

    let dir = DataDir::new(cli::data_dir(&args));
    let date = cli::target_date(&args);
    let config = ScoringConfig::from_env();
    let model = calibration::load(&cli::calibration_path(&args, dir.root()));

    let inputs = data_dir::load_inputs(&dir, &date)
        .with_context(|| format!("load inputs for {date} from {}", dir.root().display()))?;
    let run = scoring::score_day_with(&inputs, &config, model.as_ref());

    if !cli::has_flag(&args, "--no-save") {
        let path = match cli::arg_value(&args, "--out") {
            Some(out) => {
                let path = PathBuf::from(out);
                data_dir::write_json_atomic(&path, &run).context("write hr scores")?;
                path
            }
            None => dir.write_scores(&run).context("write hr scores")?,
        };
        println!(
            "Saved HR scores to {} with {} players",
            path.display(),
            run.total_players
        );
    }

    let top = cli::arg_value(&args, "--top")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_TOP);
    println!(
        "HR scores for {} (calibration: {})",
        run.date,
        calibration::method_label(model.as_ref())
    );
    for (rank, p) in run.players.iter().take(top).enumerate() {
        println!(
            "{:>3}. {:<24} {:<4} {:>5.1}  p={:.3}  vs {}",
            rank + 1,
            p.name,
            p.team,
            p.hr_score,
            p.model_prob,
            p.opposing_pitcher
        );
    }

    Ok(())
}
