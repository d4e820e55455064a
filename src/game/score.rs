//! Score model - per-player counters, weighted totals, scoreboard and awards

use serde::{Deserialize, Serialize};

use crate::ws::protocol::PlayerRole;

use super::player::PlayerId;

/// Award winner id used when nobody qualifies
pub const NO_WINNER_ID: i32 = -1;

/// Match-wide score multipliers, fixed before the match starts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub kaiju_damage_weight: f32,
    pub collateral_damage_weight: f32,
    pub weak_point_destroyed_bonus: f32,
    pub final_blow_bonus: f32,
    pub death_penalty: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            kaiju_damage_weight: 1.0,
            collateral_damage_weight: 0.5,
            weak_point_destroyed_bonus: 500.0,
            final_blow_bonus: 1000.0,
            death_penalty: 100.0,
        }
    }
}

/// Cumulative per-player counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerScoreData {
    pub kaiju_damage_dealt: f32,
    pub collateral_damage_score: f32,
    pub weak_points_destroyed: u32,
    pub deaths: u32,
    pub final_blow_count: u32,
    /// Only refreshed by `calculate_total_score`
    pub total_score: f32,
}

impl PlayerScoreData {
    pub fn add_kaiju_damage(&mut self, damage: f32) {
        self.kaiju_damage_dealt += damage.max(0.0);
    }

    pub fn add_collateral_damage(&mut self, damage: f32) {
        self.collateral_damage_score += damage.max(0.0);
    }

    pub fn increment_weak_points_destroyed(&mut self) {
        self.weak_points_destroyed += 1;
    }

    pub fn increment_deaths(&mut self) {
        self.deaths += 1;
    }

    pub fn increment_final_blow_count(&mut self) {
        self.final_blow_count += 1;
    }

    /// Apply the weights and store the result, floored at zero
    pub fn calculate_total_score(&mut self, weights: &ScoreWeights) -> f32 {
        let total = self.kaiju_damage_dealt * weights.kaiju_damage_weight
            + self.collateral_damage_score * weights.collateral_damage_weight
            + self.weak_points_destroyed as f32 * weights.weak_point_destroyed_bonus
            + self.final_blow_count as f32 * weights.final_blow_bonus
            - self.deaths as f32 * weights.death_penalty;
        self.total_score = total.max(0.0);
        self.total_score
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One scoreboard row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreboardEntry {
    pub player_name: String,
    pub player_id: i32,
    pub total_score: f32,
    pub kaiju_damage_dealt: f32,
    pub collateral_damage_score: f32,
    pub weak_points_destroyed: u32,
    pub deaths: u32,
    pub is_local_player: bool,
}

/// Everything the scoreboard and award passes need to know about one player
#[derive(Debug, Clone, Copy)]
pub struct ScoreLine<'a> {
    pub player_id: PlayerId,
    pub name: &'a str,
    pub role: PlayerRole,
    pub is_local: bool,
    pub score: &'a PlayerScoreData,
}

/// Sort by total score (descending) and cut to `max_entries`.
///
/// `max_entries == 0` means no cutoff. With `include_all_locals` set, local
/// players are kept even past the cutoff. Player ids never repeat.
pub fn sorted_scoreboard<'a>(
    lines: impl IntoIterator<Item = ScoreLine<'a>>,
    max_entries: usize,
    include_all_locals: bool,
) -> Vec<ScoreboardEntry> {
    let mut lines: Vec<ScoreLine<'a>> = lines.into_iter().collect();
    // Stable sort keeps roster order for equal scores
    lines.sort_by(|a, b| b.score.total_score.total_cmp(&a.score.total_score));

    let effective_max = if max_entries == 0 {
        usize::MAX
    } else {
        max_entries
    };

    let mut result: Vec<ScoreboardEntry> = Vec::new();
    for line in lines {
        let is_local = include_all_locals && line.is_local;
        if result.len() >= effective_max && !is_local {
            continue;
        }
        if result.iter().any(|e| e.player_id == line.player_id.0) {
            continue;
        }

        result.push(ScoreboardEntry {
            player_name: line.name.to_string(),
            player_id: line.player_id.0,
            total_score: line.score.total_score,
            kaiju_damage_dealt: line.score.kaiju_damage_dealt,
            collateral_damage_score: line.score.collateral_damage_score,
            weak_points_destroyed: line.score.weak_points_destroyed,
            deaths: line.score.deaths,
            is_local_player: is_local,
        });
    }

    result
}

/// End-of-round award categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwardType {
    MostKaijuDamage,
    MostCollateralDamage,
    MostDeaths,
    FinalBlow,
    WorstDayEver,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardResult {
    pub award_type: AwardType,
    pub winner_player_name: String,
    pub winner_player_id: i32,
    pub value: f32,
}

impl AwardResult {
    fn new(award_type: AwardType, winner: Option<&ScoreLine<'_>>, value: f32) -> Self {
        Self {
            award_type,
            winner_player_name: winner.map(|w| w.name.to_string()).unwrap_or_default(),
            winner_player_id: winner.map(|w| w.player_id.0).unwrap_or(NO_WINNER_ID),
            value: value.max(0.0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndOfRoundAwards {
    pub awards: Vec<AwardResult>,
}

impl EndOfRoundAwards {
    pub fn get(&self, award_type: AwardType) -> Option<&AwardResult> {
        self.awards.iter().find(|a| a.award_type == award_type)
    }
}

/// Running "strictly greater wins" pick; the first maximal entry is kept.
struct Best<'l, 'a> {
    line: Option<&'l ScoreLine<'a>>,
    value: f32,
}

impl<'l, 'a> Best<'l, 'a> {
    fn new() -> Self {
        Self {
            line: None,
            value: -1.0,
        }
    }

    fn offer(&mut self, line: &'l ScoreLine<'a>, value: f32) {
        if value > self.value {
            self.value = value;
            self.line = Some(line);
        }
    }

    fn into_award(self, award_type: AwardType) -> AwardResult {
        AwardResult::new(award_type, self.line, self.value)
    }
}

/// Compute the five end-of-round awards from finalized scores.
///
/// "Worst Day Ever" goes to the highest-collateral kaiju-role player when one
/// exists, otherwise to the highest-collateral player overall.
pub fn compute_end_of_round_awards<'a>(
    lines: impl IntoIterator<Item = ScoreLine<'a>>,
) -> EndOfRoundAwards {
    let lines: Vec<ScoreLine<'a>> = lines.into_iter().collect();

    let mut kaiju_damage = Best::new();
    let mut collateral = Best::new();
    let mut deaths = Best::new();
    let mut final_blows = Best::new();
    let mut worst_day_kaiju = Best::new();
    let mut worst_day_any = Best::new();

    for line in &lines {
        let score = line.score;
        kaiju_damage.offer(line, score.kaiju_damage_dealt);
        collateral.offer(line, score.collateral_damage_score);
        deaths.offer(line, score.deaths as f32);
        final_blows.offer(line, score.final_blow_count as f32);

        if score.collateral_damage_score >= 0.0 {
            if line.role == PlayerRole::Kaiju {
                worst_day_kaiju.offer(line, score.collateral_damage_score);
            }
            worst_day_any.offer(line, score.collateral_damage_score);
        }
    }

    let worst_day = if worst_day_kaiju.line.is_some() {
        worst_day_kaiju
    } else {
        worst_day_any
    };

    EndOfRoundAwards {
        awards: vec![
            kaiju_damage.into_award(AwardType::MostKaijuDamage),
            collateral.into_award(AwardType::MostCollateralDamage),
            deaths.into_award(AwardType::MostDeaths),
            final_blows.into_award(AwardType::FinalBlow),
            worst_day.into_award(AwardType::WorstDayEver),
        ],
    }
}
