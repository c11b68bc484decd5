//! Replays the scoring engine over historical dates and grades it against
//! who actually homered.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::data_dir::{DocumentKind, DocumentSource};
use crate::documents::pick_string;
use crate::error::HrResult;
use crate::normalize::safe_count;
use crate::scoring::{DailyInputs, HRScoreResult, score_day};
use crate::scoring_config::ScoringConfig;

pub const TOP_K: [usize; 3] = [10, 20, 30];
const DECILES: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct TruthEntry {
    pub name: String,
    pub hr: i64,
}

/// Batters who homered on one date, keyed by MLBAM id.
#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    pub date: String,
    pub hitters: HashMap<u64, TruthEntry>,
}

impl GroundTruth {
    /// Reads `{hitters: {"<mlbam_id>": {name, hr}}}`. Keys that are not ids
    /// are skipped; a missing HR count means one.
    pub fn from_value(date: &str, doc: &Value) -> Self {
        let mut hitters = HashMap::new();
        if let Some(map) = doc.get("hitters").and_then(Value::as_object) {
            for (key, rec) in map {
                let Ok(id) = key.trim().parse::<u64>() else {
                    continue;
                };
                let hr = match safe_count(rec.get("hr")) {
                    0 => 1,
                    n => n,
                };
                hitters.insert(
                    id,
                    TruthEntry {
                        name: pick_string(rec, &["name"]).unwrap_or_default(),
                        hr,
                    },
                );
            }
        }
        Self {
            date: date.to_string(),
            hitters,
        }
    }

    pub fn homered(&self, id: u64) -> bool {
        self.hitters.contains_key(&id)
    }

    pub fn positives(&self) -> usize {
        self.hitters.len()
    }

    /// Lookup by id, else by case-insensitive name.
    pub fn find(&self, id: Option<u64>, name: &str) -> Option<&TruthEntry> {
        if let Some(id) = id
            && let Some(entry) = self.hitters.get(&id)
        {
            return Some(entry);
        }
        let wanted = name.trim().to_lowercase();
        self.hitters
            .values()
            .find(|e| e.name.trim().to_lowercase() == wanted)
    }
}

pub fn load_ground_truth<S: DocumentSource + ?Sized>(
    source: &S,
    date: &str,
) -> HrResult<Option<GroundTruth>> {
    Ok(source
        .resolve(DocumentKind::GroundTruth, date)?
        .map(|r| GroundTruth::from_value(date, &r.doc)))
}

/// Pairwise ROC-AUC: `(wins + 0.5 * ties) / (pos * neg)`. NaN without both
/// classes.
pub fn auc_roc(pairs: &[(f64, bool)]) -> f64 {
    let pos: Vec<f64> = pairs.iter().filter(|(_, y)| *y).map(|(s, _)| *s).collect();
    let neg: Vec<f64> = pairs.iter().filter(|(_, y)| !*y).map(|(s, _)| *s).collect();
    if pos.is_empty() || neg.is_empty() {
        return f64::NAN;
    }
    let mut wins = 0.0_f64;
    let mut ties = 0.0_f64;
    for sp in &pos {
        for sn in &neg {
            if sp > sn {
                wins += 1.0;
            } else if sp == sn {
                ties += 1.0;
            }
        }
    }
    (wins + 0.5 * ties) / (pos.len() as f64 * neg.len() as f64)
}

/// Brier score after min-max scaling the day's scores onto [0, 1]. A flat
/// cohort predicts 0.5 for everyone.
pub fn brier_minmax(pairs: &[(f64, bool)]) -> f64 {
    if pairs.is_empty() {
        return f64::NAN;
    }
    let lo = pairs.iter().map(|(s, _)| *s).fold(f64::INFINITY, f64::min);
    let hi = pairs.iter().map(|(s, _)| *s).fold(f64::NEG_INFINITY, f64::max);
    let span = hi - lo;
    let sum: f64 = pairs
        .iter()
        .map(|(s, y)| {
            let p = if span < 1e-9 { 0.5 } else { (s - lo) / span };
            let y = if *y { 1.0 } else { 0.0 };
            (p - y).powi(2)
        })
        .sum();
    sum / pairs.len() as f64
}

fn sorted_desc(pairs: &[(f64, bool)]) -> Vec<(f64, bool)> {
    let mut sorted = pairs.to_vec();
    sorted.sort_by(|a, b| b.0.total_cmp(&a.0));
    sorted
}

/// `prec@K` and `recall@K` for each K. Recall is NaN when nobody homered.
pub fn topk_metrics(pairs: &[(f64, bool)], ks: &[usize]) -> BTreeMap<String, f64> {
    let sorted = sorted_desc(pairs);
    let total_pos = sorted.iter().filter(|(_, y)| *y).count();
    let mut out = BTreeMap::new();
    for &k in ks {
        let hits = sorted.iter().take(k).filter(|(_, y)| *y).count() as f64;
        let prec = if k > 0 { hits / k as f64 } else { f64::NAN };
        let recall = if total_pos > 0 {
            hits / total_pos as f64
        } else {
            f64::NAN
        };
        out.insert(format!("prec@{k}"), prec);
        out.insert(format!("recall@{k}"), recall);
    }
    out
}

/// Positive rate in each tenth of the cohort, best scores first. Empty
/// buckets are NaN.
pub fn decile_rates(pairs: &[(f64, bool)]) -> Vec<f64> {
    if pairs.is_empty() {
        return Vec::new();
    }
    let sorted = sorted_desc(pairs);
    let n = sorted.len();
    (0..DECILES)
        .map(|i| {
            let start = i * n / DECILES;
            let end = (i + 1) * n / DECILES;
            let bucket = &sorted[start..end];
            if bucket.is_empty() {
                f64::NAN
            } else {
                bucket.iter().filter(|(_, y)| *y).count() as f64 / bucket.len() as f64
            }
        })
        .collect()
}

/// Mean over non-NaN values; the denominator never drops below one.
pub fn mean_skip_nan(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    sum / n.max(1) as f64
}

#[derive(Debug, Clone, Serialize)]
pub struct DateReport {
    pub date: String,
    pub n_players: usize,
    pub n_hr: usize,
    pub auc: f64,
    pub brier: f64,
    pub topk: BTreeMap<String, f64>,
    pub deciles: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregate {
    pub dates: Vec<String>,
    pub auc: f64,
    pub brier: f64,
    pub topk: BTreeMap<String, f64>,
    pub n_players_total: usize,
    pub n_hr_total: usize,
}

/// Grades one day's predictions. Predictions without an MLBAM id cannot be
/// joined and are dropped.
pub fn eval_one(date: &str, predictions: &[HRScoreResult], truth: &GroundTruth) -> DateReport {
    let pairs: Vec<(f64, bool)> = predictions
        .iter()
        .filter_map(|p| p.mlbam_id.map(|id| (p.hr_score, truth.homered(id))))
        .collect();
    DateReport {
        date: date.to_string(),
        n_players: pairs.len(),
        n_hr: truth.positives(),
        auc: auc_roc(&pairs),
        brier: brier_minmax(&pairs),
        topk: topk_metrics(&pairs, &TOP_K),
        deciles: decile_rates(&pairs),
    }
}

pub fn aggregate(reports: &[DateReport]) -> Aggregate {
    let Some(first) = reports.first() else {
        return Aggregate::default();
    };
    let topk = first
        .topk
        .keys()
        .map(|key| {
            let mean = mean_skip_nan(
                reports
                    .iter()
                    .map(|r| r.topk.get(key).copied().unwrap_or(f64::NAN)),
            );
            (key.clone(), mean)
        })
        .collect();
    Aggregate {
        dates: reports.iter().map(|r| r.date.clone()).collect(),
        auc: mean_skip_nan(reports.iter().map(|r| r.auc)),
        brier: mean_skip_nan(reports.iter().map(|r| r.brier)),
        topk,
        n_players_total: reports.iter().map(|r| r.n_players).sum(),
        n_hr_total: reports.iter().map(|r| r.n_hr).sum(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepSetting {
    pub name: String,
    pub config: ScoringConfig,
}

impl SweepSetting {
    fn new(name: &str, config: ScoringConfig) -> Self {
        Self {
            name: name.to_string(),
            config: config.sanitized(),
        }
    }
}

/// The standard perturbations around `base`.
pub fn default_sweep(base: &ScoringConfig) -> Vec<SweepSetting> {
    vec![
        SweepSetting::new("base", base.clone()),
        SweepSetting::new(
            "park_1.05",
            ScoringConfig {
                park_exponent: 1.05,
                ..base.clone()
            },
        ),
        SweepSetting::new(
            "park_1.15",
            ScoringConfig {
                park_exponent: 1.15,
                ..base.clone()
            },
        ),
        SweepSetting::new(
            "market_off",
            ScoringConfig {
                market_scale_min: 1.0,
                market_scale_max: 1.0,
                ..base.clone()
            },
        ),
        SweepSetting::new(
            "market_wide",
            ScoringConfig {
                market_scale_min: 0.97,
                market_scale_max: 1.05,
                ..base.clone()
            },
        ),
        SweepSetting::new(
            "park_wide_clamp",
            ScoringConfig {
                park_clamp_min: 0.85,
                park_clamp_max: 1.15,
                ..base.clone()
            },
        ),
    ]
}

/// One historical date with its inputs already materialized.
#[derive(Debug, Clone)]
pub struct BacktestDay {
    pub date: String,
    pub inputs: DailyInputs,
    pub truth: GroundTruth,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettingResult {
    pub setting: String,
    pub config: ScoringConfig,
    pub aggregate: Aggregate,
    pub per_date: Vec<DateReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub results: Vec<SettingResult>,
}

pub fn run_setting(days: &[BacktestDay], setting: &SweepSetting) -> SettingResult {
    let per_date: Vec<DateReport> = days
        .iter()
        .map(|day| {
            let run = score_day(&day.inputs, &setting.config);
            eval_one(&day.date, &run.players, &day.truth)
        })
        .collect();
    SettingResult {
        setting: setting.name.clone(),
        config: setting.config.clone(),
        aggregate: aggregate(&per_date),
        per_date,
    }
}

/// Settings are independent reruns over the same immutable inputs, so they
/// run in parallel. Output order follows `settings`.
pub fn run_sweep(days: &[BacktestDay], settings: &[SweepSetting]) -> BacktestReport {
    let results: Vec<SettingResult> = settings
        .par_iter()
        .map(|setting| run_setting(days, setting))
        .collect();
    info!(
        settings = results.len(),
        dates = days.len(),
        "backtest sweep finished"
    );
    BacktestReport { results }
}

pub fn summary_line(result: &SettingResult) -> String {
    let agg = &result.aggregate;
    let k = |key: &str| agg.topk.get(key).copied().unwrap_or(f64::NAN);
    format!(
        "- {}: AUC={:.3} | Brier={:.3} | prec@10={:.3} | recall@10={:.3} | prec@20={:.3} | recall@20={:.3}",
        result.setting,
        agg.auc,
        agg.brier,
        k("prec@10"),
        k("recall@10"),
        k("prec@20"),
        k("recall@20"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use serde_json::json;

    #[test]
    fn auc_counts_wins_and_half_ties() {
        let pairs = [(0.9, true), (0.5, true), (0.7, false), (0.1, false)];
        // 0.9 beats both, 0.5 beats one of two.
        assert_abs_diff_eq!(auc_roc(&pairs), 0.75, epsilon = 1e-12);
        let tied = [(0.5, true), (0.5, false)];
        assert_abs_diff_eq!(auc_roc(&tied), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn auc_and_recall_are_nan_without_both_classes() {
        let all_neg = [(0.3, false), (0.2, false)];
        assert!(auc_roc(&all_neg).is_nan());
        let topk = topk_metrics(&all_neg, &[10]);
        assert!(topk["recall@10"].is_nan());
        assert_eq!(topk["prec@10"], 0.0);
        assert!(brier_minmax(&[]).is_nan());
    }

    #[test]
    fn flat_cohort_brier_uses_half() {
        let pairs = [(40.0, true), (40.0, false)];
        assert_abs_diff_eq!(brier_minmax(&pairs), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn precision_and_recall_at_ten() {
        // 30 players, 5 homered; three of them rank in the top ten.
        let mut pairs: Vec<(f64, bool)> = (0..30).map(|i| (100.0 - i as f64, false)).collect();
        for idx in [0, 4, 9, 15, 25] {
            pairs[idx].1 = true;
        }
        let m = topk_metrics(&pairs, &TOP_K);
        assert_abs_diff_eq!(m["prec@10"], 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(m["recall@10"], 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(m["recall@30"], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn ranking_metrics_ignore_monotone_rescaling() {
        let pairs: [(f64, bool); 5] = [
            (12.0, false),
            (55.0, true),
            (31.0, false),
            (78.0, true),
            (44.0, false),
        ];
        let squashed: Vec<(f64, bool)> = pairs.iter().map(|(s, y)| ((s / 10.0).exp(), *y)).collect();
        assert_eq!(auc_roc(&pairs), auc_roc(&squashed));
        assert_eq!(topk_metrics(&pairs, &TOP_K), topk_metrics(&squashed, &TOP_K));
    }

    #[test]
    fn deciles_split_by_integer_bounds() {
        let pairs: Vec<(f64, bool)> = (0..5).map(|i| (i as f64, i == 4)).collect();
        let d = decile_rates(&pairs);
        assert_eq!(d.len(), 10);
        // n = 5: buckets 0, 2, 4, 6, 8 are empty.
        assert!(d[0].is_nan());
        assert_eq!(d[1], 1.0);
        assert_eq!(d[9], 0.0);
    }

    #[test]
    fn aggregate_skips_nan_dates() {
        let report = |date: &str, auc: f64| DateReport {
            date: date.to_string(),
            n_players: 10,
            n_hr: 1,
            auc,
            brier: 0.2,
            topk: BTreeMap::from([("prec@10".to_string(), 0.1)]),
            deciles: Vec::new(),
        };
        let agg = aggregate(&[report("a", 0.6), report("b", f64::NAN), report("c", 0.8)]);
        assert_abs_diff_eq!(agg.auc, 0.7, epsilon = 1e-12);
        assert_eq!(agg.n_players_total, 30);
        assert_eq!(agg.dates, vec!["a", "b", "c"]);
        assert_eq!(mean_skip_nan([f64::NAN]), 0.0);
    }

    #[test]
    fn nan_metrics_serialize_as_null() {
        let report = DateReport {
            date: "2025-07-01".to_string(),
            n_players: 0,
            n_hr: 0,
            auc: f64::NAN,
            brier: f64::NAN,
            topk: BTreeMap::new(),
            deciles: vec![f64::NAN],
        };
        let value = serde_json::to_value(&report).unwrap();
        assert!(value["auc"].is_null());
        assert!(value["deciles"][0].is_null());
    }

    #[test]
    fn ground_truth_reads_id_keys() {
        let doc = json!({"hitters": {
            "660271": {"name": "Shohei Ohtani", "hr": 2},
            "592450": {"name": "Aaron Judge"},
            "nope": {"name": "X"}
        }});
        let truth = GroundTruth::from_value("2025-07-01", &doc);
        assert_eq!(truth.positives(), 2);
        assert!(truth.homered(660271));
        assert_eq!(truth.hitters[&592450].hr, 1);
        assert_eq!(truth.find(None, "aaron judge").map(|e| e.hr), Some(1));
        assert_eq!(truth.find(Some(660271), "").map(|e| e.hr), Some(2));
    }

    #[test]
    fn default_sweep_names_and_overrides() {
        let sweep = default_sweep(&ScoringConfig::default());
        let names: Vec<&str> = sweep.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            ["base", "park_1.05", "park_1.15", "market_off", "market_wide", "park_wide_clamp"]
        );
        assert_eq!(sweep[3].config.market_scale_min, 1.0);
        assert_eq!(sweep[5].config.park_clamp_max, 1.15);
    }
}
