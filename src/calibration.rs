use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::{HrError, HrResult};

const PLATT_MAX_ITER: usize = 250;
const PLATT_LR: f64 = 0.1;
const PLATT_L2: f64 = 1e-4;
const PLATT_TOL: f64 = 1e-6;
const FIT_CLIP: f64 = 1e-9;
const APPLY_CLIP: f64 = 1e-12;

/// One labelled training point: raw probability and whether the player homered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub p: f64,
    pub y: f64,
}

impl Example {
    pub fn new(p: f64, homered: bool) -> Self {
        Self {
            p,
            y: if homered { 1.0 } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationMethod {
    Platt,
    Isotonic,
}

impl CalibrationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Platt => "platt",
            Self::Isotonic => "isotonic",
        }
    }
}

impl FromStr for CalibrationMethod {
    type Err = HrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "platt" => Ok(Self::Platt),
            "isotonic" => Ok(Self::Isotonic),
            other => Err(HrError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl fmt::Display for CalibrationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationMap {
    Platt { alpha: f64, beta: f64 },
    /// `x` strictly increasing, `y` the fitted value at each breakpoint.
    Isotonic { x: Vec<f64>, y: Vec<f64> },
}

/// A fitted mapping from raw to calibrated probability. Immutable once fitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModelDoc", into = "ModelDoc")]
pub struct CalibrationModel {
    pub map: CalibrationMap,
    pub fitted_at: String,
    pub n_samples: usize,
}

/// On-disk shape: `{method, fitted_at, n_samples, params}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelDoc {
    method: String,
    #[serde(default)]
    fitted_at: String,
    #[serde(default)]
    n_samples: usize,
    #[serde(default)]
    params: Value,
}

impl TryFrom<ModelDoc> for CalibrationModel {
    type Error = String;

    fn try_from(doc: ModelDoc) -> Result<Self, Self::Error> {
        let method: CalibrationMethod = doc.method.parse().map_err(|e: HrError| e.to_string())?;
        let map = match method {
            CalibrationMethod::Platt => CalibrationMap::Platt {
                alpha: doc.params.get("alpha").and_then(Value::as_f64).unwrap_or(1.0),
                beta: doc.params.get("beta").and_then(Value::as_f64).unwrap_or(0.0),
            },
            CalibrationMethod::Isotonic => {
                let floats = |key: &str| -> Vec<f64> {
                    doc.params
                        .get(key)
                        .and_then(Value::as_array)
                        .map(|arr| arr.iter().filter_map(Value::as_f64).collect())
                        .unwrap_or_default()
                };
                let (x, y) = (floats("x"), floats("y"));
                if x.is_empty() || x.len() != y.len() {
                    return Err(format!(
                        "isotonic breakpoints malformed (x={}, y={})",
                        x.len(),
                        y.len()
                    ));
                }
                CalibrationMap::Isotonic { x, y }
            }
        };
        Ok(Self {
            map,
            fitted_at: doc.fitted_at,
            n_samples: doc.n_samples,
        })
    }
}

impl From<CalibrationModel> for ModelDoc {
    fn from(model: CalibrationModel) -> Self {
        let method = model.method().as_str().to_string();
        let params = match model.map {
            CalibrationMap::Platt { alpha, beta } => json!({"alpha": alpha, "beta": beta}),
            CalibrationMap::Isotonic { x, y } => json!({"x": x, "y": y}),
        };
        Self {
            method,
            fitted_at: model.fitted_at,
            n_samples: model.n_samples,
            params,
        }
    }
}

impl CalibrationModel {
    fn fitted(map: CalibrationMap, n_samples: usize) -> Self {
        Self {
            map,
            fitted_at: chrono::Utc::now().to_rfc3339(),
            n_samples,
        }
    }

    pub fn method(&self) -> CalibrationMethod {
        match self.map {
            CalibrationMap::Platt { .. } => CalibrationMethod::Platt,
            CalibrationMap::Isotonic { .. } => CalibrationMethod::Isotonic,
        }
    }

    pub fn method_name(&self) -> &'static str {
        self.method().as_str()
    }

    /// Calibrated probability in [0, 1].
    pub fn apply(&self, raw: f64) -> f64 {
        let out = match &self.map {
            CalibrationMap::Platt { alpha, beta } => sigmoid(alpha * logit(raw, APPLY_CLIP) + beta),
            CalibrationMap::Isotonic { x, y } => interpolate(x, y, raw),
        };
        out.clamp(0.0, 1.0)
    }
}

/// Raw probability for a 0..100 composite score.
pub fn score_to_raw_probability(score: f64) -> f64 {
    (score / 100.0).clamp(0.0, 1.0)
}

/// Pass-through when no model is loaded.
pub fn apply_optional(raw: f64, model: Option<&CalibrationModel>) -> f64 {
    match model {
        Some(m) => m.apply(raw),
        None => raw,
    }
}

pub fn method_label(model: Option<&CalibrationModel>) -> &'static str {
    model.map(CalibrationModel::method_name).unwrap_or("none")
}

fn sigmoid(z: f64) -> f64 {
    if z < -60.0 {
        0.0
    } else if z > 60.0 {
        1.0
    } else {
        1.0 / (1.0 + (-z).exp())
    }
}

fn logit(p: f64, clip: f64) -> f64 {
    let p = p.clamp(clip, 1.0 - clip);
    (p / (1.0 - p)).ln()
}

fn interpolate(xs: &[f64], ys: &[f64], raw: f64) -> f64 {
    let (Some(&x_first), Some(&x_last)) = (xs.first(), xs.last()) else {
        return raw;
    };
    if xs.len() != ys.len() {
        return raw;
    }
    if raw <= x_first {
        return ys[0];
    }
    if raw >= x_last {
        return ys[ys.len() - 1];
    }
    let hi = xs.partition_point(|x| *x < raw);
    if (xs[hi] - raw).abs() < APPLY_CLIP {
        return ys[hi];
    }
    let lo = hi.saturating_sub(1);
    let (x1, x2) = (xs[lo], xs[hi]);
    let (y1, y2) = (ys[lo], ys[hi]);
    if x2 == x1 {
        return y1;
    }
    let t = (raw - x1) / (x2 - x1);
    y1 + t * (y2 - y1)
}

/// Drops points with `p` outside [0, 1] or a label other than 0/1.
pub fn usable_examples(examples: &[Example]) -> Vec<Example> {
    examples
        .iter()
        .copied()
        .filter(|e| e.p.is_finite() && (0.0..=1.0).contains(&e.p))
        .filter(|e| e.y == 0.0 || e.y == 1.0)
        .collect()
}

/// Logistic recalibration on the logit of the raw probability, fitted by
/// batch gradient descent with a small L2 penalty.
pub fn fit_platt(examples: &[Example]) -> HrResult<CalibrationModel> {
    if examples.is_empty() {
        return Err(HrError::NoExamples);
    }
    let n = examples.len() as f64;
    let xs: Vec<f64> = examples.iter().map(|e| logit(e.p, FIT_CLIP)).collect();
    let mut alpha = 1.0_f64;
    let mut beta = 0.0_f64;

    for _ in 0..PLATT_MAX_ITER {
        let mut grad_a = 0.0;
        let mut grad_b = 0.0;
        for (x, ex) in xs.iter().zip(examples) {
            let diff = sigmoid(alpha * x + beta) - ex.y;
            grad_a += diff * x;
            grad_b += diff;
        }
        grad_a = grad_a / n + PLATT_L2 * alpha;
        grad_b = grad_b / n + PLATT_L2 * beta;
        alpha -= PLATT_LR * grad_a;
        beta -= PLATT_LR * grad_b;
        if grad_a.abs() < PLATT_TOL && grad_b.abs() < PLATT_TOL {
            break;
        }
    }

    Ok(CalibrationModel::fitted(
        CalibrationMap::Platt { alpha, beta },
        examples.len(),
    ))
}

struct Block {
    weight: f64,
    sum: f64,
    p_min: f64,
    p_max: f64,
}

impl Block {
    fn mean(&self) -> f64 {
        self.sum / self.weight
    }
}

/// Pool-adjacent-violators fit. Breakpoints are the block edges; repeated
/// x values keep the right-most fitted value.
pub fn fit_isotonic(examples: &[Example]) -> HrResult<CalibrationModel> {
    if examples.is_empty() {
        return Err(HrError::NoExamples);
    }
    let mut sorted = examples.to_vec();
    sorted.sort_by(|a, b| a.p.total_cmp(&b.p));

    let mut blocks: Vec<Block> = Vec::with_capacity(sorted.len());
    for ex in &sorted {
        blocks.push(Block {
            weight: 1.0,
            sum: ex.y,
            p_min: ex.p,
            p_max: ex.p,
        });
        while blocks.len() >= 2 {
            let n = blocks.len();
            if blocks[n - 2].mean() <= blocks[n - 1].mean() {
                break;
            }
            let Some(right) = blocks.pop() else {
                break;
            };
            if let Some(left) = blocks.last_mut() {
                left.weight += right.weight;
                left.sum += right.sum;
                left.p_max = right.p_max;
            }
        }
    }

    let mut x: Vec<f64> = Vec::with_capacity(blocks.len() * 2);
    let mut y: Vec<f64> = Vec::with_capacity(blocks.len() * 2);
    let mut push = |px: f64, py: f64| match x.last() {
        Some(&last) if px <= last => {
            if let Some(tail) = y.last_mut() {
                *tail = py;
            }
        }
        _ => {
            x.push(px);
            y.push(py);
        }
    };
    for b in &blocks {
        let mean = b.mean();
        push(b.p_min, mean);
        if b.p_max != b.p_min {
            push(b.p_max, mean);
        }
    }

    Ok(CalibrationModel::fitted(
        CalibrationMap::Isotonic { x, y },
        examples.len(),
    ))
}

pub fn fit(examples: &[Example], method: CalibrationMethod) -> HrResult<CalibrationModel> {
    let usable = usable_examples(examples);
    match method {
        CalibrationMethod::Platt => fit_platt(&usable),
        CalibrationMethod::Isotonic => fit_isotonic(&usable),
    }
}

pub fn fit_and_save(examples: &[Example], method: &str, path: &Path) -> HrResult<CalibrationModel> {
    let method: CalibrationMethod = method.parse()?;
    let model = fit(examples, method)?;
    save(&model, path)?;
    info!(
        method = model.method_name(),
        samples = model.n_samples,
        path = %path.display(),
        "saved calibration"
    );
    Ok(model)
}

/// Writes to a sibling temp file and renames over `path`, so readers never
/// see a partial document.
pub fn save(model: &CalibrationModel, path: &Path) -> HrResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| HrError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(model).map_err(|source| HrError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(&tmp, json).map_err(|source| HrError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| HrError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Missing, unreadable or malformed files all mean "no calibration".
pub fn load(path: &Path) -> Option<CalibrationModel> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %err, "calibration file unreadable");
            }
            return None;
        }
    };
    match serde_json::from_str::<CalibrationModel>(&raw) {
        Ok(model) => Some(model),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring calibration file");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub raw: Metrics,
    pub calibrated: Metrics,
    pub ece_raw: f64,
    pub ece_calibrated: f64,
    pub bins: Vec<CalibrationBin>,
}

pub fn evaluate_probs(probs: &[f64], outcomes: &[f64]) -> Metrics {
    if probs.is_empty() || probs.len() != outcomes.len() {
        return Metrics {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
        };
    }
    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    for (p, y) in probs.iter().zip(outcomes) {
        brier_sum += (p - y).powi(2);
        let actual = if *y >= 0.5 { *p } else { 1.0 - p };
        log_loss_sum += -actual.clamp(APPLY_CLIP, 1.0).ln();
    }
    let n = probs.len() as f64;
    Metrics {
        samples: probs.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
    }
}

pub fn calibration_bins(probs: &[f64], outcomes: &[f64], bins: usize) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, y) in probs.iter().zip(outcomes) {
        let p = p.clamp(0.0, 1.0);
        let idx = ((p * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += p;
        actual_sum[idx] += y;
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

/// Count-weighted mean gap between predicted and observed rate per bin.
pub fn expected_calibration_error(bins: &[CalibrationBin]) -> f64 {
    let total: usize = bins.iter().map(|b| b.count).sum();
    if total == 0 {
        return 0.0;
    }
    bins.iter()
        .map(|b| b.count as f64 * (b.avg_pred - b.actual_rate).abs())
        .sum::<f64>()
        / total as f64
}

/// Raw vs. calibrated quality over the same examples, with 10 reliability
/// bins of the calibrated output.
pub fn diagnose(examples: &[Example], model: Option<&CalibrationModel>) -> Diagnostics {
    let raw: Vec<f64> = examples.iter().map(|e| e.p).collect();
    let outcomes: Vec<f64> = examples.iter().map(|e| e.y).collect();
    let calibrated: Vec<f64> = raw.iter().map(|p| apply_optional(*p, model)).collect();

    let raw_bins = calibration_bins(&raw, &outcomes, 10);
    let bins = calibration_bins(&calibrated, &outcomes, 10);
    Diagnostics {
        raw: evaluate_probs(&raw, &outcomes),
        calibrated: evaluate_probs(&calibrated, &outcomes),
        ece_raw: expected_calibration_error(&raw_bins),
        ece_calibrated: expected_calibration_error(&bins),
        bins,
    }
}
