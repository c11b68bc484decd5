//! Fusion engine: turns one day's documents into a ranked list of hitters.
//!
//! Every feature is scaled against today's cohort, so the same season line
//! can score differently from one day to the next.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::calibration::{self, CalibrationModel};
use crate::documents::{
    self, BallparkWeather, BullpenData, DayDocuments, HeadToHead, LineupSlots, PitchTypeData,
    PitcherAdvanced, PitcherRecord, PlayerRecord, ResolvedDoc, StatcastLine,
};
use crate::matchups::{self, MatchupContext, Slate};
use crate::normalize::{NormalizationTable, round_to};
use crate::park_weather;
use crate::reconcile::NameIndex;
use crate::scoring_config::ScoringConfig;

const NEUTRAL: f64 = 50.0;

const W_SEASON_HR: f64 = 0.28;
const W_ISO: f64 = 0.18;
const W_SLG: f64 = 0.10;
const W_EXIT_VELO: f64 = 0.22;
const W_BARREL: f64 = 0.22;

const W_ERA: f64 = 0.35;
const W_HR_ALLOWED: f64 = 0.25;
const W_BARREL_ALLOWED: f64 = 0.15;
const W_HR_FB: f64 = 0.10;
const W_FB_PCT: f64 = 0.05;
const W_PLATOON: f64 = 0.10;

const W_POWER: f64 = 0.52;
const W_RECENT: f64 = 0.12;
const W_PITCHER: f64 = 0.26;
const W_PARK: f64 = 0.07;

const H2H_MIN_PA: i64 = 3;
const H2H_MAX_BONUS: f64 = 2.0;
const PITCH_TYPE_MAX_BONUS: f64 = 3.0;
const PITCH_TYPE_SCALE: f64 = 6.0;
const USAGE_ONLY_NUDGE: f64 = 0.05;

/// Typed, indexed inputs for one scoring run.
#[derive(Debug, Clone, Default)]
pub struct DailyInputs {
    pub target_date: String,
    pub source_dates: SourceDates,
    pub players: Vec<PlayerRecord>,
    pub pitchers: NameIndex<PitcherRecord>,
    pub recent: NameIndex<f64>,
    pub slate: Slate,
    pub statcast: NameIndex<StatcastLine>,
    pub parks: BallparkWeather,
    pub pitcher_advanced: NameIndex<PitcherAdvanced>,
    pub pitch_types: PitchTypeData,
    pub bullpen: BullpenData,
    pub implied_totals: HashMap<String, f64>,
    pub lineups: LineupSlots,
    pub head_to_head: HeadToHead,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDates {
    pub players: String,
    pub pitchers: String,
    pub recent: String,
    pub schedule: String,
    pub statcast: String,
}

impl DailyInputs {
    pub fn from_documents(docs: &DayDocuments) -> Self {
        Self {
            target_date: docs.target_date.clone(),
            source_dates: SourceDates {
                players: docs.players.date.clone(),
                pitchers: docs.pitchers.date.clone(),
                recent: docs.recent.date.clone(),
                schedule: docs.schedule.date.clone(),
                statcast: docs
                    .statcast
                    .as_ref()
                    .map(|r| r.date.clone())
                    .unwrap_or_else(|| "unknown".to_string()),
            },
            players: documents::parse_players(&docs.players.doc),
            pitchers: documents::parse_pitchers(&docs.pitchers.doc),
            recent: documents::parse_recent_form(&docs.recent.doc),
            slate: matchups::build_slate(&docs.schedule.doc),
            statcast: doc_of(&docs.statcast)
                .map(documents::parse_statcast)
                .unwrap_or_default(),
            parks: doc_of(&docs.ballpark_weather)
                .map(documents::parse_ballpark_weather)
                .unwrap_or_default(),
            pitcher_advanced: doc_of(&docs.pitcher_advanced)
                .map(documents::parse_pitcher_advanced)
                .unwrap_or_default(),
            pitch_types: doc_of(&docs.pitch_types)
                .map(documents::parse_pitch_types)
                .unwrap_or_default(),
            bullpen: doc_of(&docs.bullpen)
                .map(documents::parse_bullpen)
                .unwrap_or_default(),
            implied_totals: doc_of(&docs.implied_totals)
                .map(documents::parse_implied_totals)
                .unwrap_or_default(),
            lineups: doc_of(&docs.lineups)
                .map(documents::parse_lineups)
                .unwrap_or_default(),
            head_to_head: doc_of(&docs.head_to_head)
                .map(documents::parse_head_to_head)
                .unwrap_or_default(),
        }
    }

    /// Run date: schedule date, then players date, then the requested date.
    pub fn run_date(&self) -> String {
        [&self.source_dates.schedule, &self.source_dates.players]
            .into_iter()
            .find(|d| !d.is_empty())
            .cloned()
            .unwrap_or_else(|| self.target_date.clone())
    }
}

fn doc_of(resolved: &Option<ResolvedDoc>) -> Option<&Value> {
    resolved.as_ref().map(|r| &r.doc)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStats {
    #[serde(rename = "homeRuns")]
    pub home_runs: i64,
    #[serde(rename = "battingAvg")]
    pub batting_avg: f64,
    pub slugging: f64,
    pub iso: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub power_comp: f64,
    pub recent_comp: f64,
    pub pitcher_comp: f64,
    pub park_weather_pct: f64,
    pub h2h_bonus: f64,
    pub pitchtype_bonus: f64,
    pub market_scaler_pct: f64,
    pub pa_multiplier_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HRScoreResult {
    pub name: String,
    pub team: String,
    #[serde(default)]
    pub mlbam_id: Option<u64>,
    pub position: String,
    pub hr_score: f64,
    pub stats: SourceStats,
    pub opposing_pitcher: String,
    #[serde(default)]
    pub pitcher_era: Option<f64>,
    #[serde(default)]
    pub pitcher_hr_allowed: Option<i64>,
    pub factors: ScoreFactors,
    #[serde(default)]
    pub model_prob_raw: f64,
    #[serde(default)]
    pub model_prob: f64,
    #[serde(default)]
    pub calibration_method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRun {
    pub date: String,
    pub generated_at: String,
    pub source_dates: SourceDates,
    pub total_players: usize,
    pub players: Vec<HRScoreResult>,
}

/// Cohort tables built once per run.
struct Cohorts {
    season_hr: NormalizationTable,
    iso: NormalizationTable,
    slg: NormalizationTable,
    exit_velo: NormalizationTable,
    barrel: NormalizationTable,
    era: NormalizationTable,
    hr_allowed: NormalizationTable,
    bullpen_hr9: NormalizationTable,
}

impl Cohorts {
    fn build(inputs: &DailyInputs, hitters: &[&PlayerRecord]) -> Self {
        let mut season_hr = Vec::with_capacity(hitters.len());
        let mut iso = Vec::with_capacity(hitters.len());
        let mut slg = Vec::with_capacity(hitters.len());
        let mut exit_velo = Vec::with_capacity(hitters.len());
        let mut barrel = Vec::with_capacity(hitters.len());
        for p in hitters {
            let sc = statcast_for(inputs, &p.name);
            season_hr.push(p.home_runs as f64);
            iso.push(p.iso());
            slg.push(p.slugging);
            exit_velo.push(sc.exit_velocity);
            barrel.push(sc.barrel_rate);
        }

        let era: Vec<f64> = inputs.pitchers.values().map(|p| p.era).collect();
        let hr_allowed: Vec<f64> = inputs
            .pitchers
            .values()
            .map(|p| p.home_runs_allowed as f64)
            .collect();
        let bullpen_hr9: Vec<f64> = inputs.bullpen.hr9_by_team.values().copied().collect();

        Self {
            season_hr: NormalizationTable::from_values(&season_hr),
            iso: NormalizationTable::from_values(&iso),
            slg: NormalizationTable::from_values(&slg),
            exit_velo: NormalizationTable::from_values(&exit_velo),
            barrel: NormalizationTable::from_values(&barrel),
            era: NormalizationTable::from_values(&era),
            hr_allowed: NormalizationTable::from_values(&hr_allowed),
            bullpen_hr9: NormalizationTable::from_values(&bullpen_hr9),
        }
    }
}

struct PitcherView<'a> {
    name: String,
    record: Option<&'a PitcherRecord>,
    component: f64,
}

pub fn score_day(inputs: &DailyInputs, config: &ScoringConfig) -> ScoreRun {
    score_day_with(inputs, config, None)
}

/// Scores every eligible hitter and, when a calibration model is supplied,
/// attaches calibrated probabilities to each result.
pub fn score_day_with(
    inputs: &DailyInputs,
    config: &ScoringConfig,
    calibration: Option<&CalibrationModel>,
) -> ScoreRun {
    let hitters: Vec<&PlayerRecord> = inputs.players.iter().filter(|p| !p.is_pitcher()).collect();
    let cohorts = Cohorts::build(inputs, &hitters);
    let market = market_scalers(inputs, config);

    let mut results = Vec::with_capacity(hitters.len());
    for p in hitters {
        let Some(team) = p.team.as_deref() else {
            continue;
        };
        let Some(ctx) = inputs.slate.get(team) else {
            continue;
        };
        results.push(score_hitter(
            inputs,
            config,
            &cohorts,
            &market,
            p,
            ctx,
            calibration,
        ));
    }

    results.sort_by(|a, b| b.hr_score.total_cmp(&a.hr_score));

    let run = ScoreRun {
        date: inputs.run_date(),
        generated_at: chrono::Utc::now().to_rfc3339(),
        source_dates: inputs.source_dates.clone(),
        total_players: results.len(),
        players: results,
    };
    info!(
        date = %run.date,
        players = run.total_players,
        calibration = calibration::method_label(calibration),
        "scored slate"
    );
    run
}

fn score_hitter(
    inputs: &DailyInputs,
    config: &ScoringConfig,
    cohorts: &Cohorts,
    market: &HashMap<String, f64>,
    p: &PlayerRecord,
    ctx: &MatchupContext,
    calibration: Option<&CalibrationModel>,
) -> HRScoreResult {
    let sc = statcast_for(inputs, &p.name);
    let iso = p.iso();

    let power = W_SEASON_HR * cohorts.season_hr.score_or_neutral(p.home_runs as f64)
        + W_ISO * cohorts.iso.score_or_neutral(iso)
        + W_SLG * cohorts.slg.score_or_neutral(p.slugging)
        + W_EXIT_VELO * cohorts.exit_velo.score_or_neutral(sc.exit_velocity)
        + W_BARREL * cohorts.barrel.score_or_neutral(sc.barrel_rate);

    let recent_rate = inputs.recent.get(&p.name).copied().unwrap_or(0.0);
    let recent = (recent_rate * 100.0).clamp(0.0, 100.0);

    let pitcher = pitcher_view(inputs, config, cohorts, p, ctx);
    let park_factor = park_weather::factor_for_team(&ctx.park_team, &inputs.parks, config);
    let h2h = h2h_bonus(inputs, p, &pitcher.name);
    let pitch_type = pitch_type_bonus(inputs, p, &pitcher.name, &sc);

    let mut score = W_POWER * power
        + W_RECENT * recent
        + W_PITCHER * pitcher.component
        + W_PARK * (park_factor * 100.0)
        + h2h
        + pitch_type;

    let market_factor = market.get(&ctx.team).copied().unwrap_or(1.0);
    score *= market_factor;

    let pa_multiplier = inputs
        .lineups
        .get(&ctx.team)
        .and_then(|slots| slots.get(&p.name))
        .map(|slot| lineup_multiplier(*slot))
        .unwrap_or(1.0);
    score *= pa_multiplier;

    let hr_score = round_to(score, 1).clamp(0.0, 100.0);

    let model_prob_raw = calibration::score_to_raw_probability(hr_score);
    let model_prob = calibration::apply_optional(model_prob_raw, calibration);

    HRScoreResult {
        name: p.name.clone(),
        team: ctx.team.clone(),
        mlbam_id: p.mlbam_id,
        position: p.position.clone(),
        hr_score,
        stats: SourceStats {
            home_runs: p.home_runs,
            batting_avg: p.batting_avg,
            slugging: p.slugging,
            iso: round_to(iso, 3),
        },
        opposing_pitcher: pitcher.name,
        pitcher_era: pitcher.record.map(|r| r.era),
        pitcher_hr_allowed: pitcher.record.map(|r| r.home_runs_allowed),
        factors: ScoreFactors {
            power_comp: round_to(power, 1),
            recent_comp: round_to(recent, 1),
            pitcher_comp: round_to(pitcher.component, 1),
            park_weather_pct: round_to((park_factor - 1.0) * 100.0, 1),
            h2h_bonus: round_to(h2h, 2),
            pitchtype_bonus: round_to(pitch_type, 1),
            market_scaler_pct: round_to((market_factor - 1.0) * 100.0, 1),
            pa_multiplier_pct: round_to((pa_multiplier - 1.0) * 100.0, 1),
        },
        model_prob_raw,
        model_prob,
        calibration_method: calibration::method_label(calibration).to_string(),
    }
}

fn statcast_for(inputs: &DailyInputs, name: &str) -> StatcastLine {
    inputs.statcast.get(name).copied().unwrap_or_default()
}

fn pitcher_view<'a>(
    inputs: &'a DailyInputs,
    config: &ScoringConfig,
    cohorts: &Cohorts,
    batter: &PlayerRecord,
    ctx: &MatchupContext,
) -> PitcherView<'a> {
    let name = ctx.opp_pitcher.clone();
    let record = if ctx.has_probable_pitcher() {
        inputs.pitchers.get(&name)
    } else {
        None
    };
    let Some(record) = record else {
        return PitcherView {
            name,
            record: None,
            component: NEUTRAL,
        };
    };
    if inputs.pitchers.get_exact(&name).is_none() {
        debug!(schedule = %name, roster = %record.name, "pitcher matched by folded name");
    }

    let era_score = cohorts.era.score_or_neutral(record.era);
    let hr_score = cohorts
        .hr_allowed
        .score_or_neutral(record.home_runs_allowed as f64);
    // Splits mix xSLG and HR/PA, so a split is only scored against itself.
    let platoon_score = inputs
        .pitcher_advanced
        .get(&name)
        .and_then(|adv| adv.platoon_value(batter.bats))
        .map(|v| NormalizationTable::from_values(&[v]).score_or_neutral(v))
        .unwrap_or(NEUTRAL);
    // Barrel-allowed, HR/FB and FB% are carried at neutral weight until
    // opponent-specific values are wired in.
    let barrel_score = NEUTRAL;
    let hr_fb_score = NEUTRAL;
    let fb_pct_score = NEUTRAL;

    let mut component = W_ERA * era_score
        + W_HR_ALLOWED * hr_score
        + W_BARREL_ALLOWED * barrel_score
        + W_HR_FB * hr_fb_score
        + W_FB_PCT * fb_pct_score
        + W_PLATOON * platoon_score;

    if config.bullpen_blend
        && let Some(hr9) = inputs.bullpen.hr9_by_team.get(&ctx.opp_team)
    {
        let expected_ip = inputs
            .bullpen
            .starter_expected_ip
            .get(&name)
            .copied()
            .unwrap_or(config.default_starter_ip);
        let w_start = (expected_ip / 9.0).clamp(0.0, 1.0);
        let pen = cohorts.bullpen_hr9.score_or_neutral(*hr9);
        component = w_start * component + (1.0 - w_start) * pen;
    }

    PitcherView {
        name,
        record: Some(record),
        component,
    }
}

/// Batter-vs-pitcher bonus in [0, 2]. Needs at least three plate appearances.
pub fn h2h_bonus(inputs: &DailyInputs, batter: &PlayerRecord, pitcher: &str) -> f64 {
    let Some(line) = inputs
        .head_to_head
        .get(&batter.name)
        .and_then(|vs| vs.get(pitcher))
    else {
        return 0.0;
    };
    if line.pa < H2H_MIN_PA {
        return 0.0;
    }
    let baseline = batter.slugging.max(0.0);
    let delta = (line.slg - baseline).max(0.0);
    let pa_term = 0.15 * (line.pa as f64 / 6.0).min(3.0);
    let hr_term = 0.1 * (line.hr.clamp(0, 2) as f64);
    let weight = (0.2 + pa_term + hr_term).min(1.0);
    (delta * 10.0 * weight).min(H2H_MAX_BONUS)
}

/// Bonus in [0, 3] for facing a pitcher whose two most-used pitches the
/// batter hits well. Without per-pitch batter data only a small usage
/// nudge applies.
pub fn pitch_type_bonus(
    inputs: &DailyInputs,
    batter: &PlayerRecord,
    pitcher: &str,
    statcast: &StatcastLine,
) -> f64 {
    let Some(top) = inputs.pitch_types.pitchers.get(pitcher) else {
        return 0.0;
    };
    let by_pitch = inputs.pitch_types.batters.get(&batter.name);
    let baseline = if statcast.xslg > 0.0 {
        statcast.xslg
    } else {
        batter.slugging
    };

    let mut agg = 0.0;
    match by_pitch {
        Some(by_pitch) if !by_pitch.is_empty() => {
            for entry in top {
                let batter_vs = by_pitch.get(&entry.pitch_type).copied().unwrap_or(0.0);
                if batter_vs <= 0.0 || baseline <= 0.0 {
                    continue;
                }
                let usage = (entry.usage / 100.0).clamp(0.0, 1.0);
                let hr_boost = 1.0 + (entry.hr_per_100.max(0.0) / 3.0).min(0.5);
                agg += (batter_vs - baseline).max(0.0) * usage * hr_boost;
            }
        }
        _ => {
            for entry in top {
                agg += (entry.usage / 100.0).clamp(0.0, 1.0) * USAGE_ONLY_NUDGE;
            }
        }
    }
    if agg <= 0.0 {
        return 0.0;
    }
    (agg * PITCH_TYPE_SCALE).clamp(0.0, PITCH_TYPE_MAX_BONUS)
}

/// Per-team market multiplier from implied run totals, rescaled across the
/// teams playing today. Unknown totals stay at 1.0.
pub fn market_scalers(inputs: &DailyInputs, config: &ScoringConfig) -> HashMap<String, f64> {
    let teams = inputs.slate.teams_today();
    let known: Vec<f64> = teams
        .iter()
        .filter_map(|t| inputs.implied_totals.get(t).copied())
        .collect();
    let lo = known.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = known.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = if hi > lo { hi - lo } else { 1.0 };

    teams
        .into_iter()
        .map(|t| {
            let factor = match inputs.implied_totals.get(&t) {
                Some(v) => config.market_multiplier((v - lo) / span),
                None => 1.0,
            };
            (t, factor)
        })
        .collect()
}

/// Plate-appearance proxy by batting-order slot.
pub fn lineup_multiplier(slot: u8) -> f64 {
    match slot {
        1 => 1.08,
        2 => 1.06,
        3 => 1.05,
        4 => 1.04,
        5 => 1.03,
        6 => 1.02,
        7 => 1.01,
        8 => 1.00,
        9 => 0.99,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{H2HLine, PitchUsage, PlatoonSplit};

    fn hitter(name: &str, slg: f64) -> PlayerRecord {
        PlayerRecord {
            name: name.to_string(),
            raw_team: "NYY".to_string(),
            team: Some("NYY".to_string()),
            mlbam_id: None,
            position: "OF".to_string(),
            batting_avg: 0.250,
            slugging: slg,
            home_runs: 10,
            bats: Some('R'),
        }
    }

    fn with_h2h(pa: i64, hr: i64, slg: f64) -> DailyInputs {
        let mut lines = NameIndex::new();
        lines.insert("P", H2HLine { pa, hr, avg: 0.3, slg });
        let mut inputs = DailyInputs::default();
        inputs.head_to_head.insert("A", lines);
        inputs
    }

    #[test]
    fn h2h_needs_three_plate_appearances() {
        let inputs = with_h2h(2, 2, 2.0);
        assert_eq!(h2h_bonus(&inputs, &hitter("A", 0.400), "P"), 0.0);
    }

    #[test]
    fn h2h_bonus_scales_with_sample_and_is_capped() {
        let inputs = with_h2h(6, 1, 0.600);
        // weight = 0.2 + 0.15 * 1 + 0.1 * 1 = 0.45; delta = 0.2
        let b = h2h_bonus(&inputs, &hitter("A", 0.400), "P");
        assert!((b - 0.9).abs() < 1e-9);

        let inputs = with_h2h(30, 5, 1.500);
        assert_eq!(h2h_bonus(&inputs, &hitter("A", 0.400), "P"), 2.0);
    }

    #[test]
    fn pitch_type_bonus_uses_per_pitch_deltas() {
        let mut inputs = DailyInputs::default();
        inputs.pitch_types.pitchers.insert(
            "P",
            vec![
                PitchUsage {
                    pitch_type: "FF".to_string(),
                    usage: 50.0,
                    hr_per_100: 1.5,
                },
                PitchUsage {
                    pitch_type: "SL".to_string(),
                    usage: 30.0,
                    hr_per_100: 0.0,
                },
            ],
        );
        inputs
            .pitch_types
            .batters
            .insert("A", HashMap::from([("FF".to_string(), 0.600)]));
        let sc = StatcastLine {
            xslg: 0.500,
            ..StatcastLine::default()
        };
        // (0.1 * 0.5 * 1.5) * 6 = 0.45
        let b = pitch_type_bonus(&inputs, &hitter("A", 0.400), "P", &sc);
        assert!((b - 0.45).abs() < 1e-9);
    }

    #[test]
    fn pitch_type_falls_back_to_usage_nudge() {
        let mut inputs = DailyInputs::default();
        inputs.pitch_types.pitchers.insert(
            "P",
            vec![PitchUsage {
                pitch_type: "FF".to_string(),
                usage: 60.0,
                hr_per_100: 0.0,
            }],
        );
        let b = pitch_type_bonus(&inputs, &hitter("A", 0.400), "P", &StatcastLine::default());
        assert!((b - 0.6 * 0.05 * 6.0).abs() < 1e-9);
    }

    #[test]
    fn platoon_split_units_do_not_leak_into_pitcher_score() {
        let mut inputs = DailyInputs::default();
        for name in ["XPitch", "HPitch"] {
            inputs.pitchers.insert(
                name,
                PitcherRecord {
                    name: name.to_string(),
                    mlbam_id: None,
                    era: 4.0,
                    home_runs_allowed: 10,
                },
            );
        }
        inputs.pitcher_advanced.insert(
            "XPitch",
            PitcherAdvanced {
                vs_r: Some(PlatoonSplit { xslg: Some(0.450), hr_per_pa: None }),
                vs_l: Some(PlatoonSplit { xslg: Some(0.380), hr_per_pa: None }),
                ..PitcherAdvanced::default()
            },
        );
        inputs.pitcher_advanced.insert(
            "HPitch",
            PitcherAdvanced {
                vs_r: Some(PlatoonSplit { xslg: None, hr_per_pa: Some(0.045) }),
                ..PitcherAdvanced::default()
            },
        );
        let cohorts = Cohorts::build(&inputs, &[]);
        let cfg = ScoringConfig::default();
        let batter = hitter("A", 0.400);

        for pitcher in ["XPitch", "HPitch"] {
            let ctx = MatchupContext {
                team: "NYY".to_string(),
                opp_team: "BOS".to_string(),
                opp_pitcher: pitcher.to_string(),
                home: true,
                park_team: "NYY".to_string(),
            };
            let view = pitcher_view(&inputs, &cfg, &cohorts, &batter, &ctx);
            assert!(view.record.is_some());
            assert!((view.component - NEUTRAL).abs() < 1e-9, "{pitcher}: {}", view.component);
        }
    }

    #[test]
    fn lineup_table_is_monotone() {
        let values: Vec<f64> = (1..=9).map(lineup_multiplier).collect();
        assert!(values.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(lineup_multiplier(8), 1.0);
        assert_eq!(lineup_multiplier(0), 1.0);
    }
}
