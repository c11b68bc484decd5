use std::env;

use serde::{Deserialize, Serialize};

/// Tunables for one scoring run. Passed by reference into the engine so
/// parameter sweeps can run side by side without shared state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Park HR factor is raised to this power before weather is applied.
    pub park_exponent: f64,
    pub park_clamp_min: f64,
    pub park_clamp_max: f64,
    pub market_scale_min: f64,
    pub market_scale_max: f64,
    /// Blend the opposing bullpen into the pitcher component.
    pub bullpen_blend: bool,
    pub default_starter_ip: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            park_exponent: 1.0,
            park_clamp_min: 0.90,
            park_clamp_max: 1.10,
            market_scale_min: 0.98,
            market_scale_max: 1.04,
            bullpen_blend: false,
            default_starter_ip: 6.0,
        }
    }
}

impl ScoringConfig {
    /// Defaults overridden by `HR_*` environment variables. Unparseable
    /// values are ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_f64("HR_PARK_EXPONENT") {
            cfg.park_exponent = v.clamp(0.0, 3.0);
        }
        if let Some(v) = env_f64("HR_PARK_CLAMP_MIN") {
            cfg.park_clamp_min = v;
        }
        if let Some(v) = env_f64("HR_PARK_CLAMP_MAX") {
            cfg.park_clamp_max = v;
        }
        if let Some(v) = env_f64("HR_MARKET_SCALE_MIN") {
            cfg.market_scale_min = v;
        }
        if let Some(v) = env_f64("HR_MARKET_SCALE_MAX") {
            cfg.market_scale_max = v;
        }
        if let Ok(raw) = env::var("HR_BULLPEN_BLEND") {
            cfg.bullpen_blend = matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "on" | "yes"
            );
        }
        if let Some(v) = env_f64("HR_DEFAULT_STARTER_IP") {
            cfg.default_starter_ip = v.clamp(0.0, 9.0);
        }
        cfg.sanitized()
    }

    /// Swaps inverted bounds so clamps never panic.
    pub fn sanitized(mut self) -> Self {
        if self.park_clamp_min > self.park_clamp_max {
            std::mem::swap(&mut self.park_clamp_min, &mut self.park_clamp_max);
        }
        if self.market_scale_min > self.market_scale_max {
            std::mem::swap(&mut self.market_scale_min, &mut self.market_scale_max);
        }
        self
    }

    /// Market multiplier for a team whose implied total sits at `norm01`
    /// of today's range.
    pub fn market_multiplier(&self, norm01: f64) -> f64 {
        let span = self.market_scale_max - self.market_scale_min;
        self.market_scale_min + span * norm01.clamp(0.0, 1.0)
    }
}

fn env_f64(key: &str) -> Option<f64> {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_market_band_matches_documented_range() {
        let cfg = ScoringConfig::default();
        assert!((cfg.market_multiplier(0.0) - 0.98).abs() < 1e-12);
        assert!((cfg.market_multiplier(1.0) - 1.04).abs() < 1e-12);
        assert!((cfg.market_multiplier(0.5) - 1.01).abs() < 1e-12);
        assert!((cfg.market_multiplier(7.0) - 1.04).abs() < 1e-12);
    }

    #[test]
    fn inverted_bounds_are_swapped() {
        let cfg = ScoringConfig {
            park_clamp_min: 1.2,
            park_clamp_max: 0.8,
            ..ScoringConfig::default()
        }
        .sanitized();
        assert_eq!(cfg.park_clamp_min, 0.8);
        assert_eq!(cfg.park_clamp_max, 1.2);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ScoringConfig = serde_json::from_str(r#"{"park_exponent": 1.15}"#).unwrap();
        assert_eq!(cfg.park_exponent, 1.15);
        assert_eq!(cfg.market_scale_max, 1.04);
    }
}
