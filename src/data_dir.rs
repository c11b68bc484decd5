//! File-backed collaborator documents.
//!
//! Fetchers drop one JSON file per document kind and date into a single
//! directory (`player-stats-2025-07-04.json`, ...). The engine never talks to
//! the network; it asks a [`DocumentSource`] for a document and gets back the
//! parsed JSON plus the date the file was actually produced for.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::documents::{DayDocuments, ResolvedDoc, parse_head_to_head_js};
use crate::error::{HrError, HrResult};
use crate::matchups::schedule_date;
use crate::scoring::{DailyInputs, ScoreRun};

const TODAYS_SCHEDULE: &str = "todays-schedule.json";
const UNDATED_STATCAST: &str = "statcast-metrics.json";
const UNDATED_H2H_JS: &str = "hitter-vs-pitcher.js";
const SCORES_PREFIX: &str = "hr-scores-";
pub const CALIBRATION_FILE: &str = "model_calibration.json";
pub const UNKNOWN_DATE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Players,
    Pitchers,
    Recent,
    Schedule,
    Statcast,
    BallparkWeather,
    PitcherAdvanced,
    PitchType,
    Bullpen,
    ImpliedTotals,
    Lineups,
    HeadToHead,
    GroundTruth,
}

impl DocumentKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Players => "player-stats-",
            Self::Pitchers => "pitcher-stats-",
            Self::Recent => "recent-performance-",
            Self::Schedule => "fresh-schedule-",
            Self::Statcast => "statcast-metrics-",
            Self::BallparkWeather => "ballpark-weather-",
            Self::PitcherAdvanced => "pitcher-advanced-",
            Self::PitchType => "pitch-type-metrics-",
            Self::Bullpen => "bullpen-metrics-",
            Self::ImpliedTotals => "implied-totals-",
            Self::Lineups => "lineups-",
            Self::HeadToHead => "hitter-vs-pitcher-",
            Self::GroundTruth => "hr-hitters-",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Players => "players",
            Self::Pitchers => "pitchers",
            Self::Recent => "recent performance",
            Self::Schedule => "schedule",
            Self::Statcast => "statcast",
            Self::BallparkWeather => "ballpark weather",
            Self::PitcherAdvanced => "pitcher advanced",
            Self::PitchType => "pitch types",
            Self::Bullpen => "bullpen",
            Self::ImpliedTotals => "implied totals",
            Self::Lineups => "lineups",
            Self::HeadToHead => "hitter vs pitcher",
            Self::GroundTruth => "hr hitters",
        }
    }

    /// Ground truth is only meaningful for the exact date asked for.
    pub fn exact_date_only(self) -> bool {
        matches!(self, Self::GroundTruth)
    }
}

/// Supplies per-date collaborator documents.
///
/// `Ok(None)` means the document does not exist; `Err` means it exists but
/// could not be read or parsed.
pub trait DocumentSource {
    fn resolve(&self, kind: DocumentKind, date: &str) -> HrResult<Option<ResolvedDoc>>;
}

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn calibration_path(&self) -> PathBuf {
        self.root.join(CALIBRATION_FILE)
    }

    pub fn scores_path(&self, date: &str) -> PathBuf {
        self.root.join(format!("{SCORES_PREFIX}{date}.json"))
    }

    /// Dates for which a `<prefix><date>.json` file exists, ascending.
    pub fn dates_for(&self, kind: DocumentKind) -> Vec<String> {
        let mut dates: Vec<String> = self
            .files_with_prefix(kind.prefix())
            .into_iter()
            .filter_map(|name| date_part(&name, kind.prefix()).map(str::to_string))
            .collect();
        dates.sort();
        dates
    }

    pub fn write_scores(&self, run: &ScoreRun) -> HrResult<PathBuf> {
        let path = self.scores_path(&run.date);
        write_json_atomic(&path, run)?;
        Ok(path)
    }

    pub fn read_scores(&self, date: &str) -> HrResult<Option<ScoreRun>> {
        let path = self.scores_path(date);
        if !path.exists() {
            return Ok(None);
        }
        let raw = read_file(&path)?;
        let run = serde_json::from_str(&raw).map_err(|source| HrError::Json { path, source })?;
        Ok(Some(run))
    }

    fn files_with_prefix(&self, prefix: &str) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| name.starts_with(prefix) && name.ends_with(".json"))
            .collect();
        names.sort();
        names
    }

    /// Exact-date file, else the latest file not after `date`, else the
    /// latest file of any date.
    fn dated(&self, kind: DocumentKind, date: &str) -> HrResult<Option<ResolvedDoc>> {
        let prefix = kind.prefix();
        let exact = self.root.join(format!("{prefix}{date}.json"));
        if exact.exists() {
            return Ok(Some(ResolvedDoc::new(read_json(&exact)?, date)));
        }
        if kind.exact_date_only() {
            return Ok(None);
        }
        let names = self.files_with_prefix(prefix);
        let pick = names
            .iter()
            .rev()
            .find(|name| date_part(name, prefix).is_some_and(|d| d <= date))
            .or_else(|| names.last());
        let Some(name) = pick else {
            return Ok(None);
        };
        let resolved_date = date_part(name, prefix).unwrap_or(UNKNOWN_DATE).to_string();
        debug!(kind = kind.label(), requested = date, resolved = %resolved_date, "using nearest document");
        let doc = read_json(&self.root.join(name))?;
        Ok(Some(ResolvedDoc::new(doc, resolved_date)))
    }

    fn schedule(&self, date: &str) -> HrResult<Option<ResolvedDoc>> {
        let todays_path = self.root.join(TODAYS_SCHEDULE);
        let todays = if todays_path.exists() {
            match read_json(&todays_path) {
                Ok(doc) => Some(doc),
                Err(err) => {
                    warn!(error = %err, "ignoring unreadable todays-schedule");
                    None
                }
            }
        } else {
            None
        };
        if let Some(doc) = &todays
            && schedule_date(doc).as_deref() == Some(date)
        {
            return Ok(Some(ResolvedDoc::new(doc.clone(), date)));
        }
        if let Some(found) = self.dated(DocumentKind::Schedule, date)? {
            return Ok(Some(found));
        }
        Ok(todays.map(|doc| {
            let d = schedule_date(&doc).unwrap_or_else(|| date.to_string());
            ResolvedDoc::new(doc, d)
        }))
    }

    fn statcast(&self, date: &str) -> HrResult<Option<ResolvedDoc>> {
        if let Some(found) = self.dated(DocumentKind::Statcast, date)? {
            return Ok(Some(found));
        }
        let path = self.root.join(UNDATED_STATCAST);
        if !path.exists() {
            return Ok(None);
        }
        let doc = read_json(&path)?;
        let d = doc
            .get("date")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_DATE)
            .to_string();
        Ok(Some(ResolvedDoc::new(doc, d)))
    }

    fn head_to_head(&self, date: &str) -> HrResult<Option<ResolvedDoc>> {
        if let Some(found) = self.dated(DocumentKind::HeadToHead, date)? {
            return Ok(Some(found));
        }
        let path = self.root.join(UNDATED_H2H_JS);
        if !path.exists() {
            return Ok(None);
        }
        let raw = read_file(&path)?;
        match parse_head_to_head_js(&raw) {
            Some(doc) => Ok(Some(ResolvedDoc::new(doc, UNKNOWN_DATE))),
            None => {
                warn!(path = %path.display(), "no hitter-vs-pitcher map found in script");
                Ok(None)
            }
        }
    }
}

impl DocumentSource for DataDir {
    fn resolve(&self, kind: DocumentKind, date: &str) -> HrResult<Option<ResolvedDoc>> {
        match kind {
            DocumentKind::Schedule => self.schedule(date),
            DocumentKind::Statcast => self.statcast(date),
            DocumentKind::HeadToHead => self.head_to_head(date),
            _ => self.dated(kind, date),
        }
    }
}

/// Collects everything one scoring run needs. The four mandatory documents
/// fail the run when absent; optional ones degrade to `None`.
pub fn load_day<S: DocumentSource + ?Sized>(source: &S, date: &str) -> HrResult<DayDocuments> {
    let required = |kind: DocumentKind| -> HrResult<ResolvedDoc> {
        source
            .resolve(kind, date)?
            .ok_or_else(|| HrError::MissingInput {
                kind: kind.label(),
                date: date.to_string(),
            })
    };
    let optional = |kind: DocumentKind| -> Option<ResolvedDoc> {
        match source.resolve(kind, date) {
            Ok(found) => found,
            Err(err) => {
                warn!(kind = kind.label(), error = %err, "optional document skipped");
                None
            }
        }
    };

    let docs = DayDocuments {
        target_date: date.to_string(),
        players: required(DocumentKind::Players)?,
        pitchers: required(DocumentKind::Pitchers)?,
        recent: required(DocumentKind::Recent)?,
        schedule: required(DocumentKind::Schedule)?,
        statcast: optional(DocumentKind::Statcast),
        ballpark_weather: optional(DocumentKind::BallparkWeather),
        pitcher_advanced: optional(DocumentKind::PitcherAdvanced),
        pitch_types: optional(DocumentKind::PitchType),
        bullpen: optional(DocumentKind::Bullpen),
        implied_totals: optional(DocumentKind::ImpliedTotals),
        lineups: optional(DocumentKind::Lineups),
        head_to_head: optional(DocumentKind::HeadToHead),
    };
    info!(
        date,
        players = %docs.players.date,
        pitchers = %docs.pitchers.date,
        recent = %docs.recent.date,
        schedule = %docs.schedule.date,
        "resolved documents"
    );
    Ok(docs)
}

pub fn load_inputs<S: DocumentSource + ?Sized>(source: &S, date: &str) -> HrResult<DailyInputs> {
    Ok(DailyInputs::from_documents(&load_day(source, date)?))
}

fn date_part<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    name.strip_prefix(prefix)?.strip_suffix(".json")
}

fn read_file(path: &Path) -> HrResult<String> {
    fs::read_to_string(path).map_err(|source| HrError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_json(path: &Path) -> HrResult<Value> {
    let raw = read_file(path)?;
    serde_json::from_str(&raw).map_err(|source| HrError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty JSON written to `<path>.tmp` and renamed into place.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> HrResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| HrError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|source| HrError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|source| HrError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| HrError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    struct TempDir(PathBuf);

    impl TempDir {
        fn new(tag: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "hr_forecast_{tag}_{}_{}",
                std::process::id(),
                chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
            ));
            fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn put(&self, name: &str, value: &Value) {
            fs::write(self.0.join(name), value.to_string()).unwrap();
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[derive(Default)]
    struct MemorySource(HashMap<DocumentKind, ResolvedDoc>);

    impl DocumentSource for MemorySource {
        fn resolve(&self, kind: DocumentKind, _date: &str) -> HrResult<Option<ResolvedDoc>> {
            Ok(self.0.get(&kind).cloned())
        }
    }

    #[test]
    fn exact_date_wins_then_latest_not_after() {
        let tmp = TempDir::new("dated");
        tmp.put("player-stats-2025-07-01.json", &json!({"players": [], "v": 1}));
        tmp.put("player-stats-2025-07-03.json", &json!({"players": [], "v": 3}));
        tmp.put("player-stats-2025-07-09.json", &json!({"players": [], "v": 9}));
        let dir = DataDir::new(&tmp.0);

        let exact = dir.resolve(DocumentKind::Players, "2025-07-03").unwrap().unwrap();
        assert_eq!(exact.date, "2025-07-03");
        let older = dir.resolve(DocumentKind::Players, "2025-07-05").unwrap().unwrap();
        assert_eq!(older.date, "2025-07-03");
        assert_eq!(older.doc["v"], 3);
        let any = dir.resolve(DocumentKind::Players, "2025-06-01").unwrap().unwrap();
        assert_eq!(any.date, "2025-07-09");
    }

    #[test]
    fn ground_truth_requires_exact_date() {
        let tmp = TempDir::new("truth");
        tmp.put("hr-hitters-2025-07-01.json", &json!({"hitters": {}}));
        let dir = DataDir::new(&tmp.0);
        assert!(dir.resolve(DocumentKind::GroundTruth, "2025-07-02").unwrap().is_none());
        assert!(dir.resolve(DocumentKind::GroundTruth, "2025-07-01").unwrap().is_some());
        assert_eq!(dir.dates_for(DocumentKind::GroundTruth), vec!["2025-07-01"]);
    }

    #[test]
    fn todays_schedule_preferred_only_for_its_date() {
        let tmp = TempDir::new("sched");
        tmp.put(TODAYS_SCHEDULE, &json!({"dates": [{"date": "2025-07-04", "games": []}]}));
        tmp.put("fresh-schedule-2025-07-03.json", &json!({"games": [], "v": "fresh"}));
        let dir = DataDir::new(&tmp.0);

        let today = dir.resolve(DocumentKind::Schedule, "2025-07-04").unwrap().unwrap();
        assert!(today.doc.get("dates").is_some());
        let other = dir.resolve(DocumentKind::Schedule, "2025-07-03").unwrap().unwrap();
        assert_eq!(other.doc["v"], "fresh");
    }

    #[test]
    fn undated_fallbacks_are_used() {
        let tmp = TempDir::new("fallback");
        tmp.put(UNDATED_STATCAST, &json!({"date": "2025-06-30", "metrics": {}}));
        fs::write(
            tmp.0.join(UNDATED_H2H_JS),
            "const hitterVsPitcherData = {\"A\": {\"P\": {\"pa\": 3}}};",
        )
        .unwrap();
        let dir = DataDir::new(&tmp.0);
        let sc = dir.resolve(DocumentKind::Statcast, "2025-07-01").unwrap().unwrap();
        assert_eq!(sc.date, "2025-06-30");
        let h2h = dir.resolve(DocumentKind::HeadToHead, "2025-07-01").unwrap().unwrap();
        assert_eq!(h2h.date, UNKNOWN_DATE);
        assert_eq!(h2h.doc["A"]["P"]["pa"], 3);
    }

    #[test]
    fn missing_mandatory_document_is_reported() {
        let mut src = MemorySource::default();
        for kind in [DocumentKind::Players, DocumentKind::Pitchers, DocumentKind::Recent] {
            src.0.insert(kind, ResolvedDoc::new(json!({}), "2025-07-01"));
        }
        let err = load_day(&src, "2025-07-01").unwrap_err();
        assert!(matches!(err, HrError::MissingInput { kind: "schedule", .. }));

        src.0.insert(
            DocumentKind::Schedule,
            ResolvedDoc::new(json!({"games": []}), "2025-07-01"),
        );
        let docs = load_day(&src, "2025-07-01").unwrap();
        assert!(docs.statcast.is_none());
        assert!(docs.lineups.is_none());
    }

    #[test]
    fn malformed_optional_document_degrades() {
        let tmp = TempDir::new("malformed");
        let day = "2025-07-01";
        tmp.put(&format!("player-stats-{day}.json"), &json!({"players": []}));
        tmp.put(&format!("pitcher-stats-{day}.json"), &json!({"pitchers": []}));
        tmp.put(&format!("recent-performance-{day}.json"), &json!({"players": []}));
        tmp.put(&format!("fresh-schedule-{day}.json"), &json!({"games": []}));
        fs::write(tmp.0.join(format!("lineups-{day}.json")), "{not json").unwrap();
        let docs = load_day(&DataDir::new(&tmp.0), day).unwrap();
        assert!(docs.lineups.is_none());
    }

    #[test]
    fn scores_are_written_atomically_and_read_back() {
        let tmp = TempDir::new("scores");
        let dir = DataDir::new(&tmp.0);
        let run = ScoreRun {
            date: "2025-07-01".to_string(),
            generated_at: "2025-07-01T12:00:00+00:00".to_string(),
            source_dates: Default::default(),
            total_players: 0,
            players: Vec::new(),
        };
        let path = dir.write_scores(&run).unwrap();
        assert!(path.ends_with("hr-scores-2025-07-01.json"));
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(dir.read_scores("2025-07-01").unwrap(), Some(run));
        assert_eq!(dir.read_scores("2025-07-02").unwrap(), None);
    }
}
