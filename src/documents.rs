//! Typed views over the per-date collaborator documents.
//!
//! Every parser here is lenient: malformed numbers coerce to defaults and
//! records without a usable name are skipped, so a partially broken
//! document still yields whatever it can.

use std::collections::HashMap;

use serde_json::Value;

use crate::normalize::{coerce_f64, safe_count, safe_float};
use crate::reconcile::{NameIndex, canonical_team};

const RECENT_WINDOW_DAYS: f64 = 14.0;
const H2H_JS_MARKER: &str = "const hitterVsPitcherData =";

/// A document handed over by a collaborator together with the date it was
/// actually produced for (which may precede the requested date).
#[derive(Debug, Clone)]
pub struct ResolvedDoc {
    pub doc: Value,
    pub date: String,
}

impl ResolvedDoc {
    pub fn new(doc: Value, date: impl Into<String>) -> Self {
        Self {
            doc,
            date: date.into(),
        }
    }
}

/// Raw inputs for one scoring run. The first four are mandatory.
#[derive(Debug, Clone)]
pub struct DayDocuments {
    pub target_date: String,
    pub players: ResolvedDoc,
    pub pitchers: ResolvedDoc,
    pub recent: ResolvedDoc,
    pub schedule: ResolvedDoc,
    pub statcast: Option<ResolvedDoc>,
    pub ballpark_weather: Option<ResolvedDoc>,
    pub pitcher_advanced: Option<ResolvedDoc>,
    pub pitch_types: Option<ResolvedDoc>,
    pub bullpen: Option<ResolvedDoc>,
    pub implied_totals: Option<ResolvedDoc>,
    pub lineups: Option<ResolvedDoc>,
    pub head_to_head: Option<ResolvedDoc>,
}

#[derive(Debug, Clone)]
pub struct PlayerRecord {
    pub name: String,
    pub raw_team: String,
    pub team: Option<String>,
    pub mlbam_id: Option<u64>,
    pub position: String,
    pub batting_avg: f64,
    pub slugging: f64,
    pub home_runs: i64,
    pub bats: Option<char>,
}

impl PlayerRecord {
    pub fn is_pitcher(&self) -> bool {
        self.position.to_ascii_lowercase().contains("pitch")
    }

    pub fn iso(&self) -> f64 {
        (self.slugging - self.batting_avg).max(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct PitcherRecord {
    pub name: String,
    pub mlbam_id: Option<u64>,
    pub era: f64,
    pub home_runs_allowed: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatcastLine {
    pub exit_velocity: f64,
    pub barrel_rate: f64,
    pub xslg: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ParkFactor {
    pub hr_factor: Option<f64>,
    pub venue_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct WeatherReport {
    pub temperature: Option<f64>,
    pub wind_speed: f64,
    pub wind_direction: String,
    pub roof: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BallparkWeather {
    pub factors: HashMap<String, ParkFactor>,
    pub weather: HashMap<String, WeatherReport>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlatoonSplit {
    pub xslg: Option<f64>,
    pub hr_per_pa: Option<f64>,
}

impl PlatoonSplit {
    pub fn value(&self) -> Option<f64> {
        self.xslg.or(self.hr_per_pa)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PitcherAdvanced {
    pub barrel_rate_allowed: Option<f64>,
    pub hr_fb: Option<f64>,
    pub fb_pct: Option<f64>,
    pub vs_r: Option<PlatoonSplit>,
    pub vs_l: Option<PlatoonSplit>,
}

impl PitcherAdvanced {
    /// Split matching the batter's hand: xSLG preferred, then HR per PA.
    pub fn platoon_value(&self, bats: Option<char>) -> Option<f64> {
        match bats {
            Some('R') => self.vs_r.and_then(|s| s.value()),
            Some('L') => self.vs_l.and_then(|s| s.value()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PitchUsage {
    pub pitch_type: String,
    /// Percent of pitches thrown, 0..100.
    pub usage: f64,
    pub hr_per_100: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PitchTypeData {
    pub pitchers: NameIndex<Vec<PitchUsage>>,
    pub batters: NameIndex<HashMap<String, f64>>,
}

#[derive(Debug, Clone, Default)]
pub struct BullpenData {
    pub hr9_by_team: HashMap<String, f64>,
    pub starter_expected_ip: NameIndex<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct H2HLine {
    pub pa: i64,
    pub hr: i64,
    pub avg: f64,
    pub slg: f64,
}

pub type HeadToHead = NameIndex<NameIndex<H2HLine>>;

/// Lineup slots keyed by canonical team, then player name.
pub type LineupSlots = HashMap<String, NameIndex<u8>>;

pub fn parse_players(doc: &Value) -> Vec<PlayerRecord> {
    let mut out = Vec::new();
    for p in array_at(doc, "players") {
        let Some(name) = pick_string(p, &["name"]) else {
            continue;
        };
        let raw_team = pick_string(p, &["team"]).unwrap_or_default();
        let bats = pick_string(p, &["bats", "batting_hand"])
            .or_else(|| p.get("battingSide").and_then(|v| pick_string(v, &["code"])))
            .and_then(|s| s.trim().to_ascii_uppercase().chars().next());
        out.push(PlayerRecord {
            team: canonical_team(&raw_team),
            raw_team,
            mlbam_id: pick_id(p, "mlbam_id"),
            position: pick_string(p, &["position"]).unwrap_or_else(|| "Unknown".to_string()),
            batting_avg: safe_float(p.get("battingAvg"), 0.0),
            slugging: safe_float(p.get("sluggingPerc"), 0.0),
            home_runs: safe_count(p.get("homeRuns")),
            bats,
            name,
        });
    }
    out
}

/// Pitcher index. Repeated names keep whichever record shows the higher ERA
/// or the higher HR allowed.
pub fn parse_pitchers(doc: &Value) -> NameIndex<PitcherRecord> {
    let mut idx: NameIndex<PitcherRecord> = NameIndex::new();
    for p in array_at(doc, "pitchers") {
        let Some(name) = pick_string(p, &["name"]) else {
            continue;
        };
        let record = PitcherRecord {
            mlbam_id: pick_id(p, "mlbam_id"),
            era: safe_float(p.get("era"), 0.0),
            home_runs_allowed: safe_count(p.get("homeRunsAllowed")),
            name: name.clone(),
        };
        let replace = match idx.get_exact(&name) {
            None => true,
            Some(cur) => {
                record.era > cur.era || record.home_runs_allowed > cur.home_runs_allowed
            }
        };
        if replace {
            idx.insert(&name, record);
        }
    }
    idx
}

/// HR-per-day rate over the trailing window: the explicit rate when given,
/// otherwise the window HR count spread over 14 days.
pub fn parse_recent_form(doc: &Value) -> NameIndex<f64> {
    let mut idx = NameIndex::new();
    for p in array_at(doc, "players") {
        let Some(name) = pick_string(p, &["name"]) else {
            continue;
        };
        let rate = match p.get("last_14_day_hr_rate") {
            Some(v) if !v.is_null() => safe_float(Some(v), 0.0),
            _ => safe_float(p.get("last_14_day_hr"), 0.0) / RECENT_WINDOW_DAYS,
        };
        idx.insert(&name, rate);
    }
    idx
}

pub fn parse_statcast(doc: &Value) -> NameIndex<StatcastLine> {
    let mut idx = NameIndex::new();
    let Some(metrics) = doc.get("metrics").and_then(Value::as_object) else {
        return idx;
    };
    for (name, m) in metrics {
        idx.insert(
            name,
            StatcastLine {
                exit_velocity: safe_float(m.get("exit_velocity"), 0.0),
                barrel_rate: safe_float(m.get("barrel_rate"), 0.0),
                xslg: safe_float(m.get("xslg"), 0.0),
            },
        );
    }
    idx
}

pub fn parse_ballpark_weather(doc: &Value) -> BallparkWeather {
    let mut out = BallparkWeather::default();
    if let Some(factors) = doc.get("ballpark_factors").and_then(Value::as_object) {
        for (key, f) in factors {
            out.factors.insert(
                key.clone(),
                ParkFactor {
                    hr_factor: coerce_f64(f.get("hr_factor")),
                    venue_name: pick_string(f, &["venue_name"]).unwrap_or_default(),
                },
            );
        }
    }
    if let Some(weather) = doc.get("weather_conditions").and_then(Value::as_object) {
        for (key, w) in weather {
            out.weather.insert(
                key.clone(),
                WeatherReport {
                    temperature: coerce_f64(w.get("temperature")),
                    wind_speed: safe_float(w.get("wind_speed"), 0.0),
                    wind_direction: pick_string(w, &["wind_direction"]).unwrap_or_default(),
                    roof: pick_string(w, &["roof"]),
                },
            );
        }
    }
    out
}

pub fn parse_pitcher_advanced(doc: &Value) -> NameIndex<PitcherAdvanced> {
    let mut idx = NameIndex::new();
    for p in array_at(doc, "pitchers") {
        let Some(name) = pick_string(p, &["name"]) else {
            continue;
        };
        idx.insert(
            &name,
            PitcherAdvanced {
                barrel_rate_allowed: coerce_f64(p.get("barrel_rate_allowed")),
                hr_fb: coerce_f64(p.get("hr_fb")),
                fb_pct: coerce_f64(p.get("fb_pct")),
                vs_r: p.get("vsR").and_then(parse_platoon),
                vs_l: p.get("vsL").and_then(parse_platoon),
            },
        );
    }
    idx
}

fn parse_platoon(v: &Value) -> Option<PlatoonSplit> {
    if !v.is_object() {
        return None;
    }
    Some(PlatoonSplit {
        xslg: coerce_f64(v.get("xslg")),
        hr_per_pa: coerce_f64(v.get("hr_per_pa")),
    })
}

pub fn parse_pitch_types(doc: &Value) -> PitchTypeData {
    let mut out = PitchTypeData::default();
    if let Some(pitchers) = doc.get("pitchers").and_then(Value::as_object) {
        for (name, pd) in pitchers {
            let mut top: Vec<PitchUsage> = array_at(pd, "top_pitches")
                .filter_map(|entry| {
                    Some(PitchUsage {
                        pitch_type: pick_string(entry, &["type"])?,
                        usage: safe_float(entry.get("usage"), 0.0),
                        hr_per_100: safe_float(entry.get("hr_per_100"), 0.0),
                    })
                })
                .collect();
            top.sort_by(|a, b| b.usage.total_cmp(&a.usage));
            top.truncate(2);
            out.pitchers.insert(name, top);
        }
    }
    if let Some(batters) = doc.get("batters").and_then(Value::as_object) {
        for (name, bd) in batters {
            // Either {"xslg_by_pitch": {...}} or the per-pitch map itself.
            let map = match bd.get("xslg_by_pitch") {
                Some(nested) if nested.is_object() => nested,
                _ => bd,
            };
            let by_pitch: HashMap<String, f64> = map
                .as_object()
                .map(|obj| {
                    obj.iter()
                        .filter_map(|(k, v)| coerce_f64(Some(v)).map(|x| (k.clone(), x)))
                        .collect()
                })
                .unwrap_or_default();
            out.batters.insert(name, by_pitch);
        }
    }
    out
}

pub fn parse_bullpen(doc: &Value) -> BullpenData {
    let mut out = BullpenData::default();
    if let Some(bullpens) = doc.get("bullpens").and_then(Value::as_object) {
        for (team, bd) in bullpens {
            let (Some(code), Some(hr9)) = (canonical_team(team), coerce_f64(bd.get("hr9"))) else {
                continue;
            };
            out.hr9_by_team.insert(code, hr9);
        }
    }
    if let Some(starters) = doc.get("starters").and_then(Value::as_object) {
        for (name, sd) in starters {
            if let Some(ip) = coerce_f64(sd.get("expected_ip")) {
                out.starter_expected_ip.insert(name, ip);
            }
        }
    }
    out
}

/// Implied run totals by canonical team. Accepts `{teams: {T: n}}`,
/// `{teams: {T: {implied_runs|implied_hr}}}` or a flat `{T: n}` map.
pub fn parse_implied_totals(doc: &Value) -> HashMap<String, f64> {
    let mut out = HashMap::new();
    let (teams, nested) = match doc.get("teams").and_then(Value::as_object) {
        Some(teams) => (teams, true),
        None => match doc.as_object() {
            Some(flat) => (flat, false),
            None => return out,
        },
    };
    for (team, td) in teams {
        let Some(code) = canonical_team(team) else {
            continue;
        };
        let value = if nested && td.is_object() {
            coerce_f64(td.get("implied_runs")).or_else(|| coerce_f64(td.get("implied_hr")))
        } else {
            coerce_f64(Some(td))
        };
        if let Some(v) = value {
            out.insert(code, v);
        }
    }
    out
}

pub fn parse_lineups(doc: &Value) -> LineupSlots {
    let mut out: LineupSlots = HashMap::new();
    let Some(lineups) = doc.get("lineups").and_then(Value::as_object) else {
        return out;
    };
    for (team, entries) in lineups {
        let Some(code) = canonical_team(team) else {
            continue;
        };
        let slots = out.entry(code).or_default();
        for e in entries.as_array().into_iter().flatten() {
            let Some(name) = pick_string(e, &["name"]) else {
                continue;
            };
            let slot = safe_count(e.get("slot"));
            if (1..=9).contains(&slot) {
                slots.insert(&name, slot as u8);
            }
        }
    }
    out
}

/// Batter -> pitcher -> line. Accepts the bare map or `{h2h: {...}}`.
pub fn parse_head_to_head(doc: &Value) -> HeadToHead {
    let root = match doc.get("h2h") {
        Some(inner) if inner.is_object() => inner,
        _ => doc,
    };
    let mut out: HeadToHead = NameIndex::new();
    let Some(batters) = root.as_object() else {
        return out;
    };
    for (batter, vs) in batters {
        let Some(vs) = vs.as_object() else {
            continue;
        };
        let mut lines = NameIndex::new();
        for (pitcher, rec) in vs {
            if !rec.is_object() {
                continue;
            }
            lines.insert(
                pitcher,
                H2HLine {
                    pa: safe_count(rec.get("pa")),
                    hr: safe_count(rec.get("hr")),
                    avg: safe_float(rec.get("avg"), 0.0),
                    slg: safe_float(rec.get("slg"), 0.0),
                },
            );
        }
        out.insert(batter, lines);
    }
    out
}

/// Extracts the object literal from a `const hitterVsPitcherData = {...};`
/// script. Comments are stripped before parsing.
pub fn parse_head_to_head_js(raw: &str) -> Option<Value> {
    let start = raw.find(H2H_JS_MARKER)? + H2H_JS_MARKER.len();
    let body = strip_js_comments(&raw[start..]);
    let open = body.find('{')?;
    let close = body.rfind('}')?;
    if close < open {
        return None;
    }
    serde_json::from_str(&body[open..=close]).ok()
}

fn strip_js_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;
    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        let next = chars.peek().copied();
        match (ch, next) {
            ('"', _) => {
                in_string = true;
                out.push(ch);
            }
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

fn array_at<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> + use<'a> {
    value
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

pub(crate) fn pick_string(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        let Some(v) = value.get(*key) else {
            continue;
        };
        let s = match v {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => continue,
        };
        if !s.is_empty() {
            return Some(s);
        }
    }
    None
}

fn pick_id(value: &Value, key: &str) -> Option<u64> {
    let id = match value.get(key)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    id.filter(|id| *id != 0)
}
