use crate::documents::{BallparkWeather, ParkFactor, WeatherReport};
use crate::reconcile::{park_alias_key, park_key};
use crate::scoring_config::ScoringConfig;

/// Venues with a dome or retractable roof; weather is ignored there.
const ROOFED_VENUES: [&str; 9] = [
    "Tropicana Field",
    "American Family Field",
    "Rogers Centre",
    "Chase Field",
    "loanDepot Park",
    "Globe Life Field",
    "T-Mobile Park",
    "Minute Maid Park",
    "Miller Park",
];

const DEFAULT_TEMPERATURE_F: f64 = 70.0;
const HOT_TEMPERATURE_F: f64 = 85.0;
const COLD_TEMPERATURE_F: f64 = 55.0;
const TEMPERATURE_BONUS: f64 = 0.02;
const TAILWIND_CAP: f64 = 0.03;
const TAILWIND_PER_MPH: f64 = 0.005;
const HEADWIND_CAP: f64 = 0.02;
const HEADWIND_PER_MPH: f64 = 0.004;

/// Park key for the hosting team: its own key if either table knows it,
/// then the alias key, else the own key (which then finds nothing).
pub fn resolve_park_key(team: &str, parks: &BallparkWeather) -> String {
    let known = |key: &str| parks.factors.contains_key(key) || parks.weather.contains_key(key);
    let primary = park_key(team);
    if known(&primary) {
        return primary;
    }
    if let Some(alias) = park_alias_key(team)
        && known(&alias)
    {
        return alias;
    }
    primary
}

pub fn is_roof_closed(park: Option<&ParkFactor>, weather: Option<&WeatherReport>) -> bool {
    let roof_closed = weather
        .and_then(|w| w.roof.as_deref())
        .is_some_and(|r| r.eq_ignore_ascii_case("closed"));
    let roofed_venue = park.is_some_and(|p| ROOFED_VENUES.contains(&p.venue_name.as_str()));
    roof_closed || roofed_venue
}

/// Additive weather adjustment before it multiplies the park base.
pub fn weather_bonus(weather: &WeatherReport) -> f64 {
    let mut bonus = 0.0;
    let wind = weather.wind_direction.to_ascii_lowercase();
    let speed = weather.wind_speed.max(0.0);
    if wind.contains("out") {
        bonus += (TAILWIND_PER_MPH * speed).min(TAILWIND_CAP);
    } else if wind.contains("in") {
        bonus -= (HEADWIND_PER_MPH * speed).min(HEADWIND_CAP);
    }
    // A zero or negative reading is a feed placeholder, not a real temperature.
    let temp = weather
        .temperature
        .filter(|t| *t > 0.0)
        .unwrap_or(DEFAULT_TEMPERATURE_F);
    if temp >= HOT_TEMPERATURE_F {
        bonus += TEMPERATURE_BONUS;
    } else if temp <= COLD_TEMPERATURE_F {
        bonus -= TEMPERATURE_BONUS;
    }
    bonus
}

/// Park/weather multiplier around 1.0 for a game hosted by `park_team`.
pub fn park_weather_factor(
    park: Option<&ParkFactor>,
    weather: Option<&WeatherReport>,
    config: &ScoringConfig,
) -> f64 {
    if park.is_none() && weather.is_none() {
        return 1.0;
    }
    let base = park
        .and_then(|p| p.hr_factor)
        .filter(|f| *f > 0.0)
        .map(|f| f.powf(config.park_exponent))
        .unwrap_or(1.0);
    let bonus = match weather {
        Some(w) if !is_roof_closed(park, weather) => weather_bonus(w),
        _ => 0.0,
    };
    (base * (1.0 + bonus)).clamp(config.park_clamp_min, config.park_clamp_max)
}

pub fn factor_for_team(team: &str, parks: &BallparkWeather, config: &ScoringConfig) -> f64 {
    let key = resolve_park_key(team, parks);
    park_weather_factor(parks.factors.get(&key), parks.weather.get(&key), config)
}
