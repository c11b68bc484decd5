use serde_json::Value;

const FLAT_SCORE: f64 = 50.0;

/// Cohort-relative min-max scaling onto 0..100.
///
/// Built from the raw values seen in one scoring run. Lookups are by exact
/// value; anything outside the cohort scores the neutral 50.0.
#[derive(Debug, Clone, Default)]
pub struct NormalizationTable {
    lo: f64,
    hi: f64,
    members: Vec<f64>,
}

impl NormalizationTable {
    pub fn from_values(values: &[f64]) -> Self {
        let mut members: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if members.is_empty() {
            return Self::default();
        }
        members.sort_by(|a, b| a.total_cmp(b));
        members.dedup();
        let lo = members[0];
        let hi = members[members.len() - 1];
        Self { lo, hi, members }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Score for a cohort member, `None` when `value` was not in the cohort.
    pub fn get(&self, value: f64) -> Option<f64> {
        self.members
            .binary_search_by(|m| m.total_cmp(&value))
            .ok()
            .map(|_| self.scale(value))
    }

    pub fn score_or_neutral(&self, value: f64) -> f64 {
        self.get(value).unwrap_or(FLAT_SCORE)
    }

    fn scale(&self, value: f64) -> f64 {
        let span = self.hi - self.lo;
        if span < 1e-9 {
            return FLAT_SCORE;
        }
        100.0 * (value - self.lo) / span
    }
}

/// Lenient numeric coercion: numbers pass through, strings are trimmed and
/// accept a leading-dot decimal (".275"), everything else is `default`.
pub fn safe_float(value: Option<&Value>, default: f64) -> f64 {
    coerce_f64(value).unwrap_or(default)
}

pub fn coerce_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_lenient(s),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

pub fn parse_lenient(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = if trimmed.starts_with('.') {
        format!("0{trimmed}").parse::<f64>()
    } else if let Some(rest) = trimmed.strip_prefix("-.") {
        format!("-0.{rest}").parse::<f64>()
    } else {
        trimmed.parse::<f64>()
    };
    parsed.ok().filter(|v| v.is_finite())
}

/// Integer-valued counts (home runs, plate appearances). Fractions truncate.
pub fn safe_count(value: Option<&Value>) -> i64 {
    coerce_f64(value).map(|v| v.trunc() as i64).unwrap_or(0)
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn three_member_cohort_spans_full_range() {
        let table = NormalizationTable::from_values(&[10.0, 20.0, 30.0]);
        assert_eq!(table.get(10.0), Some(0.0));
        assert_eq!(table.get(20.0), Some(50.0));
        assert_eq!(table.get(30.0), Some(100.0));
    }

    #[test]
    fn flat_cohort_is_neutral() {
        let table = NormalizationTable::from_values(&[7.0, 7.0, 7.0]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(7.0), Some(50.0));
    }

    #[test]
    fn unknown_value_falls_back_to_neutral() {
        let table = NormalizationTable::from_values(&[1.0, 2.0]);
        assert_eq!(table.get(1.5), None);
        assert_eq!(table.score_or_neutral(1.5), 50.0);
        assert_eq!(NormalizationTable::default().score_or_neutral(3.0), 50.0);
    }

    #[test]
    fn safe_float_tolerates_leading_dot_and_junk() {
        assert_eq!(safe_float(Some(&json!(".275")), 0.0), 0.275);
        assert_eq!(safe_float(Some(&json!(" 0.5 ")), 0.0), 0.5);
        assert_eq!(safe_float(Some(&json!(12)), 0.0), 12.0);
        assert_eq!(safe_float(Some(&json!("n/a")), 0.0), 0.0);
        assert_eq!(safe_float(Some(&Value::Null), 1.5), 1.5);
        assert_eq!(safe_float(None, 2.0), 2.0);
    }

    #[test]
    fn round_to_one_decimal() {
        assert_eq!(round_to(12.345, 1), 12.3);
        assert_eq!(round_to(0.06, 1), 0.1);
    }
}
