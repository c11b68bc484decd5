use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::documents::pick_string;
use crate::reconcile::{canonical_team, team_from_full_name};

pub const UNKNOWN_PITCHER: &str = "TBD";

/// One team's game today, seen from that team's dugout.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchupContext {
    pub team: String,
    pub opp_team: String,
    pub opp_pitcher: String,
    pub home: bool,
    /// Team whose park hosts the game.
    pub park_team: String,
}

impl MatchupContext {
    pub fn has_probable_pitcher(&self) -> bool {
        !self.opp_pitcher.is_empty() && self.opp_pitcher != UNKNOWN_PITCHER
    }
}

#[derive(Debug, Clone, Default)]
pub struct Slate {
    pub by_team: HashMap<String, MatchupContext>,
}

impl Slate {
    pub fn get(&self, team: &str) -> Option<&MatchupContext> {
        self.by_team.get(team)
    }

    pub fn teams_today(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for ctx in self.by_team.values() {
            out.insert(ctx.team.clone());
            out.insert(ctx.opp_team.clone());
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.by_team.is_empty()
    }
}

/// Date carried inside an MLB-style schedule (`dates[0].date`), if any.
pub fn schedule_date(schedule: &Value) -> Option<String> {
    schedule
        .get("dates")
        .and_then(Value::as_array)
        .and_then(|dates| dates.first())
        .and_then(|d| pick_string(d, &["date"]))
}

/// Builds the per-team matchup table. Games where either side cannot be
/// resolved to a team code are dropped; a missing probable starter becomes
/// `TBD`. When a team appears twice (doubleheader) the later game wins.
pub fn build_slate(schedule: &Value) -> Slate {
    let mut slate = Slate::default();
    for game in games(schedule) {
        let (Some(home), Some(away)) = (game_team(game, "home"), game_team(game, "away")) else {
            continue;
        };
        let home_pitcher =
            probable_pitcher(game, "home").unwrap_or_else(|| UNKNOWN_PITCHER.to_string());
        let away_pitcher =
            probable_pitcher(game, "away").unwrap_or_else(|| UNKNOWN_PITCHER.to_string());

        slate.by_team.insert(
            home.clone(),
            MatchupContext {
                team: home.clone(),
                opp_team: away.clone(),
                opp_pitcher: away_pitcher,
                home: true,
                park_team: home.clone(),
            },
        );
        slate.by_team.insert(
            away.clone(),
            MatchupContext {
                team: away,
                opp_team: home.clone(),
                opp_pitcher: home_pitcher,
                home: false,
                park_team: home,
            },
        );
    }
    slate
}

fn games(schedule: &Value) -> impl Iterator<Item = &Value> {
    let direct = schedule.get("games").and_then(Value::as_array);
    let nested = || {
        schedule
            .get("dates")
            .and_then(Value::as_array)
            .and_then(|d| d.first())
            .and_then(|d| d.get("games"))
            .and_then(Value::as_array)
    };
    direct
        .filter(|g| !g.is_empty())
        .or_else(nested)
        .into_iter()
        .flatten()
}

fn game_team(game: &Value, side: &str) -> Option<String> {
    let flat_key = format!("{side}_team");
    if let Some(v) = game.get(&flat_key) {
        let code = match v {
            Value::Object(_) => team_object_code(v),
            _ => pick_string(game, &[flat_key.as_str()]).and_then(|s| canonical_team(&s)),
        };
        if code.is_some() {
            return code;
        }
    }
    let team_obj = game.get("teams")?.get(side)?.get("team")?;
    team_object_code(team_obj)
}

fn team_object_code(team: &Value) -> Option<String> {
    if let Some(abbr) = pick_string(team, &["abbreviation", "triCode", "teamCode"]) {
        return canonical_team(&abbr);
    }
    let name = pick_string(team, &["name", "teamName", "shortName"])?;
    team_from_full_name(&name)
}

fn probable_pitcher(game: &Value, side: &str) -> Option<String> {
    let flat_key = format!("{side}_pitcher");
    if let Some(v) = game.get(&flat_key) {
        let name = match v {
            Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            _ => pick_string(v, &["name", "fullName"]),
        };
        if name.is_some() {
            return name;
        }
    }
    if let Some(pp) = game.get("probablePitchers").and_then(|p| p.get(side))
        && let Some(name) = pick_string(pp, &["fullName", "name"])
    {
        return Some(name);
    }
    let pp = game.get("teams")?.get(side)?.get("probablePitcher")?;
    pick_string(pp, &["fullName", "lastFirstName", "name"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_schedule_builds_both_sides() {
        let schedule = json!({"games": [{
            "home_team": "NYY", "away_team": "WSN",
            "home_pitcher": {"name": "Gerrit Cole"}, "away_pitcher": {"name": "MacKenzie Gore"}
        }]});
        let slate = build_slate(&schedule);
        let nyy = slate.get("NYY").unwrap();
        assert!(nyy.home);
        assert_eq!(nyy.opp_team, "WSH");
        assert_eq!(nyy.opp_pitcher, "MacKenzie Gore");
        let wsh = slate.get("WSH").unwrap();
        assert!(!wsh.home);
        assert_eq!(wsh.opp_pitcher, "Gerrit Cole");
        assert_eq!(wsh.park_team, "NYY");
        assert_eq!(slate.teams_today().len(), 2);
    }

    #[test]
    fn nested_schedule_uses_names_and_probable_pitchers() {
        let schedule = json!({"dates": [{"date": "2025-07-04", "games": [{
            "teams": {
                "home": {"team": {"name": "Chicago White Sox"}, "probablePitcher": {"fullName": "A Home"}},
                "away": {"team": {"abbreviation": "KCR"}}
            }
        }]}]});
        assert_eq!(schedule_date(&schedule).as_deref(), Some("2025-07-04"));
        let slate = build_slate(&schedule);
        let kc = slate.get("KC").unwrap();
        assert_eq!(kc.opp_team, "CWS");
        assert_eq!(kc.opp_pitcher, "A Home");
        let cws = slate.get("CWS").unwrap();
        assert_eq!(cws.opp_pitcher, UNKNOWN_PITCHER);
        assert!(!cws.has_probable_pitcher());
    }

    #[test]
    fn unresolvable_games_are_skipped() {
        let schedule = json!({"games": [{"home_team": "NYY"}]});
        assert!(build_slate(&schedule).is_empty());
    }
}
