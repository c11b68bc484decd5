//! SQLite history of daily predictions next to what actually happened.
//! This is the training set for calibration fits.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};
use tracing::info;

use crate::backtest::GroundTruth;
use crate::calibration::Example;
use crate::error::{HrError, HrResult};
use crate::scoring::ScoreRun;

pub const DEFAULT_DB_FILE: &str = "hr-outcomes.sqlite";

#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRow {
    pub date: String,
    pub name: String,
    pub team: String,
    pub mlbam_id: Option<u64>,
    pub hr_score: f64,
    pub model_prob: f64,
    pub model_prob_raw: f64,
    pub calibration_method: String,
    pub homered: bool,
    pub hr_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSummary {
    pub rows: usize,
    pub homered: usize,
}

pub fn default_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DEFAULT_DB_FILE)
}

pub fn open_db(path: &Path) -> HrResult<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| HrError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> HrResult<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS outcomes (
            date TEXT NOT NULL,
            name TEXT NOT NULL,
            team TEXT NOT NULL,
            mlbam_id INTEGER NULL,
            hr_score REAL NOT NULL,
            model_prob REAL NULL,
            model_prob_raw REAL NULL,
            calibration_method TEXT NULL,
            homered INTEGER NOT NULL,
            hr_count INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (date, name, team)
        );
        CREATE INDEX IF NOT EXISTS idx_outcomes_date ON outcomes(date);
        CREATE INDEX IF NOT EXISTS idx_outcomes_mlbam ON outcomes(mlbam_id);
        "#,
    )?;
    Ok(())
}

/// One row per scored player. Players join to the box score by MLBAM id,
/// else by case-insensitive name.
pub fn build_rows(run: &ScoreRun, truth: &GroundTruth) -> Vec<OutcomeRow> {
    run.players
        .iter()
        .map(|p| {
            let hit = truth.find(p.mlbam_id, &p.name);
            OutcomeRow {
                date: run.date.clone(),
                name: p.name.clone(),
                team: p.team.clone(),
                mlbam_id: p.mlbam_id,
                hr_score: p.hr_score,
                model_prob: p.model_prob,
                model_prob_raw: p.model_prob_raw,
                calibration_method: p.calibration_method.clone(),
                homered: hit.is_some(),
                hr_count: hit.map(|e| e.hr).unwrap_or(0),
            }
        })
        .collect()
}

pub fn upsert_outcomes(conn: &mut Connection, rows: &[OutcomeRow]) -> HrResult<usize> {
    let tx = conn.transaction()?;
    let now = chrono::Utc::now().to_rfc3339();
    for row in rows {
        tx.execute(
            r#"
            INSERT INTO outcomes (
                date, name, team, mlbam_id, hr_score, model_prob, model_prob_raw,
                calibration_method, homered, hr_count, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(date, name, team) DO UPDATE SET
                mlbam_id = excluded.mlbam_id,
                hr_score = excluded.hr_score,
                model_prob = excluded.model_prob,
                model_prob_raw = excluded.model_prob_raw,
                calibration_method = excluded.calibration_method,
                homered = excluded.homered,
                hr_count = excluded.hr_count,
                updated_at = excluded.updated_at
            "#,
            params![
                row.date,
                row.name,
                row.team,
                row.mlbam_id.map(|id| id as i64),
                row.hr_score,
                row.model_prob,
                row.model_prob_raw,
                row.calibration_method,
                row.homered as i64,
                row.hr_count,
                now,
            ],
        )?;
    }
    tx.commit()?;
    Ok(rows.len())
}

pub fn log_outcomes(
    conn: &mut Connection,
    run: &ScoreRun,
    truth: &GroundTruth,
) -> HrResult<LogSummary> {
    let rows = build_rows(run, truth);
    let homered = rows.iter().filter(|r| r.homered).count();
    let written = upsert_outcomes(conn, &rows)?;
    info!(date = %run.date, rows = written, homered, "logged outcomes");
    Ok(LogSummary {
        rows: written,
        homered,
    })
}

pub fn load_outcomes(conn: &Connection, date: &str) -> HrResult<Vec<OutcomeRow>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT date, name, team, mlbam_id, hr_score, model_prob, model_prob_raw,
               calibration_method, homered, hr_count
        FROM outcomes
        WHERE date = ?1
        ORDER BY hr_score DESC, name ASC
        "#,
    )?;
    let rows = stmt.query_map(params![date], |row| {
        Ok(OutcomeRow {
            date: row.get(0)?,
            name: row.get(1)?,
            team: row.get(2)?,
            mlbam_id: row.get::<_, Option<i64>>(3)?.map(|id| id as u64),
            hr_score: row.get(4)?,
            model_prob: row.get::<_, Option<f64>>(5)?.unwrap_or_default(),
            model_prob_raw: row.get::<_, Option<f64>>(6)?.unwrap_or_default(),
            calibration_method: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            homered: row.get::<_, i64>(8)? != 0,
            hr_count: row.get(9)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// `{p, y}` pairs from every logged row with a raw probability.
pub fn load_calibration_examples(conn: &Connection) -> HrResult<Vec<Example>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT model_prob_raw, homered
        FROM outcomes
        WHERE model_prob_raw IS NOT NULL
        ORDER BY date ASC, name ASC
        "#,
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Example::new(row.get::<_, f64>(0)?, row.get::<_, i64>(1)? != 0))
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{HRScoreResult, ScoreFactors, SourceDates, SourceStats};
    use serde_json::json;

    fn result(name: &str, id: Option<u64>, score: f64) -> HRScoreResult {
        HRScoreResult {
            name: name.to_string(),
            team: "NYY".to_string(),
            mlbam_id: id,
            position: "OF".to_string(),
            hr_score: score,
            stats: SourceStats {
                home_runs: 20,
                batting_avg: 0.270,
                slugging: 0.520,
                iso: 0.250,
            },
            opposing_pitcher: "TBD".to_string(),
            pitcher_era: None,
            pitcher_hr_allowed: None,
            factors: ScoreFactors::default(),
            model_prob_raw: score / 100.0,
            model_prob: score / 100.0,
            calibration_method: "none".to_string(),
        }
    }

    fn run() -> ScoreRun {
        ScoreRun {
            date: "2025-07-01".to_string(),
            generated_at: String::new(),
            source_dates: SourceDates::default(),
            total_players: 3,
            players: vec![
                result("Aaron Judge", Some(592450), 61.0),
                result("Giancarlo Stanton", None, 48.5),
                result("Anthony Volpe", Some(683011), 30.2),
            ],
        }
    }

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn rows_join_by_id_then_name() {
        let truth = GroundTruth::from_value(
            "2025-07-01",
            &json!({"hitters": {
                "592450": {"name": "Aaron Judge", "hr": 2},
                "519317": {"name": "giancarlo stanton", "hr": 1}
            }}),
        );
        let rows = build_rows(&run(), &truth);
        assert_eq!(rows.len(), 3);
        assert!(rows[0].homered);
        assert_eq!(rows[0].hr_count, 2);
        assert!(rows[1].homered);
        assert!(!rows[2].homered);
    }

    #[test]
    fn upsert_is_idempotent_and_feeds_calibration() {
        let mut conn = memory_db();
        let truth = GroundTruth::from_value(
            "2025-07-01",
            &json!({"hitters": {"592450": {"name": "Aaron Judge", "hr": 1}}}),
        );
        let first = log_outcomes(&mut conn, &run(), &truth).unwrap();
        assert_eq!(first, LogSummary { rows: 3, homered: 1 });
        log_outcomes(&mut conn, &run(), &truth).unwrap();

        let stored = load_outcomes(&conn, "2025-07-01").unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0].name, "Aaron Judge");
        assert_eq!(stored[0].mlbam_id, Some(592450));
        assert_eq!(stored[1].mlbam_id, None);

        let examples = load_calibration_examples(&conn).unwrap();
        assert_eq!(examples.len(), 3);
        assert_eq!(examples.iter().filter(|e| e.y == 1.0).count(), 1);
    }
}
