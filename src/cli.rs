//! Flag and environment helpers shared by the binaries.

use std::path::PathBuf;

use crate::data_dir::CALIBRATION_FILE;
use crate::outcome_log;

pub const DEFAULT_DATA_DIR: &str = "data";

pub fn args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

/// `.env.local` first so it wins over `.env`.
pub fn load_env() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Value of `--name=value` or `--name value`. Blank values are ignored.
pub fn arg_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
            && !next.starts_with("--")
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

pub fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|arg| arg == name)
}

pub fn parse_dates(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// `--data-dir`, then `HR_DATA_DIR`, then `./data`.
pub fn data_dir(args: &[String]) -> PathBuf {
    arg_value(args, "--data-dir")
        .map(PathBuf::from)
        .or_else(|| env_path("HR_DATA_DIR"))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub fn calibration_path(args: &[String], data_dir: &std::path::Path) -> PathBuf {
    arg_value(args, "--calibration")
        .map(PathBuf::from)
        .or_else(|| env_path("HR_CALIBRATION_FILE"))
        .unwrap_or_else(|| data_dir.join(CALIBRATION_FILE))
}

pub fn outcome_db_path(args: &[String], data_dir: &std::path::Path) -> PathBuf {
    arg_value(args, "--db")
        .map(PathBuf::from)
        .or_else(|| env_path("HR_OUTCOME_DB"))
        .unwrap_or_else(|| outcome_log::default_db_path(data_dir))
}

/// `--date`, else today's local date.
pub fn target_date(args: &[String]) -> String {
    arg_value(args, "--date").unwrap_or_else(today)
}

pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}
