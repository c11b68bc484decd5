use anyhow::{Context, Result, anyhow};

use hr_forecast::backtest;
use hr_forecast::cli;
use hr_forecast::data_dir::DataDir;
use hr_forecast::outcome_log;

fn main() -> Result<()> {
    cli::load_env();
    cli::init_tracing();
    let args = cli::args();

    let dir = DataDir::new(cli::data_dir(&args));
    let dates = match cli::arg_value(&args, "--dates") {
        Some(raw) => cli::parse_dates(&raw),
        None => vec![cli::target_date(&args)],
    };
    let db_path = cli::outcome_db_path(&args, dir.root());
    let mut conn = outcome_log::open_db(&db_path)
        .with_context(|| format!("open outcome db {}", db_path.display()))?;

    for date in &dates {
        let run = dir
            .read_scores(date)
            .with_context(|| format!("read scores for {date}"))?
            .ok_or_else(|| anyhow!("no hr-scores file for {date}"))?;
        let truth = backtest::load_ground_truth(&dir, date)
            .with_context(|| format!("read hr hitters for {date}"))?
            .ok_or_else(|| anyhow!("no hr-hitters file for {date}"))?;
        let summary = outcome_log::log_outcomes(&mut conn, &run, &truth)
            .with_context(|| format!("log outcomes for {date}"))?;
        println!(
            "{date}: logged {} players ({} homered) -> {}",
            summary.rows,
            summary.homered,
            db_path.display()
        );
    }

    Ok(())
}
