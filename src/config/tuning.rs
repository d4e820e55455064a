//! Match rules and tuning

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{parse_var, ConfigError};
use crate::game::destruction::CityLayout;
use crate::game::monster::KaijuTuning;
use crate::game::score::ScoreWeights;
use crate::game::weapons::WeaponTuning;

/// Everything a match needs to know before it starts. Shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Round length in seconds
    pub match_duration: f32,
    pub warmup_duration: f32,
    pub respawn_delay: f32,
    /// Destruction percent that ends the round
    pub destruction_threshold: f32,
    pub total_destruction_value: f32,
    pub score_weights: ScoreWeights,
    pub kaiju: KaijuTuning,
    /// Overrides for the default loadout; empty keeps catalog values
    pub weapon_tuning: Vec<WeaponTuning>,
    pub kaiju_spawn: Option<Vec3>,
    pub player_starts: Vec<Vec3>,
    pub city: CityLayout,
    /// Seconds a finished match stays queryable
    pub post_round_linger: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            match_duration: 180.0,
            warmup_duration: 5.0,
            respawn_delay: 4.0,
            destruction_threshold: 100.0,
            total_destruction_value: 10_000.0,
            score_weights: ScoreWeights::default(),
            kaiju: KaijuTuning::default(),
            weapon_tuning: Vec::new(),
            kaiju_spawn: Some(Vec3::new(0.0, 0.0, 500.0)),
            player_starts: vec![
                Vec3::new(2000.0, 2000.0, 90.0),
                Vec3::new(-2000.0, 2000.0, 90.0),
                Vec3::new(2000.0, -2000.0, 90.0),
                Vec3::new(-2000.0, -2000.0, 90.0),
            ],
            city: CityLayout::default(),
            post_round_linger: 10.0,
        }
    }
}

impl MatchConfig {
    /// Apply env overrides, clamping parsed values into range
    pub fn with_overrides(mut self, lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(v) = parse_var::<f32>(lookup, "MATCH_DURATION_SECS")? {
            self.match_duration = v;
        }
        if let Some(v) = parse_var::<f32>(lookup, "WARMUP_DURATION_SECS")? {
            self.warmup_duration = v;
        }
        if let Some(v) = parse_var::<f32>(lookup, "RESPAWN_DELAY_SECS")? {
            self.respawn_delay = v;
        }
        if let Some(v) = parse_var::<f32>(lookup, "DESTRUCTION_THRESHOLD")? {
            self.destruction_threshold = v;
        }
        if let Some(v) = parse_var::<f32>(lookup, "TOTAL_DESTRUCTION_VALUE")? {
            self.total_destruction_value = v;
        }
        if let Some(v) = parse_var::<f32>(lookup, "KAIJU_MAX_HEALTH")? {
            self.kaiju.max_health = v;
        }
        if let Some(v) = parse_var::<f32>(lookup, "KAIJU_STAGGER_SECS")? {
            self.kaiju.stagger_duration = v;
        }
        if let Some(v) = parse_var::<f32>(lookup, "KAIJU_HEAD_MULTIPLIER")? {
            self.kaiju.head_damage_multiplier = v;
        }
        Ok(self.clamped())
    }

    fn clamped(mut self) -> Self {
        self.match_duration = self.match_duration.max(0.0);
        self.warmup_duration = self.warmup_duration.max(0.0);
        self.respawn_delay = self.respawn_delay.max(0.0);
        self.total_destruction_value = self.total_destruction_value.max(1.0);
        self.kaiju.max_health = self.kaiju.max_health.max(1.0);
        self.kaiju.stagger_duration = self.kaiju.stagger_duration.max(0.0);
        self.destruction_threshold = if self.destruction_threshold.is_finite() {
            self.destruction_threshold.clamp(0.0, 100.0)
        } else {
            Self::default().destruction_threshold
        };
        self.kaiju.head_damage_multiplier = if self.kaiju.head_damage_multiplier.is_finite() {
            self.kaiju.head_damage_multiplier.max(0.0)
        } else {
            KaijuTuning::default().head_damage_multiplier
        };
        self
    }
}
