//! Snapshot building for observers

use glam::Vec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ws::protocol::{MatchEndReason, MatchPhase, PlayerRole};

use super::monster::{ControlMode, KaijuAiState};
use super::player::PlayerId;
use super::r#match::MatchController;
use super::score::{sorted_scoreboard, EndOfRoundAwards, PlayerScoreData, ScoreLine, ScoreboardEntry};
use super::state::WeakPointState;

/// Read-only copy of the replicated match state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub tick: u64,
    pub phase: MatchPhase,
    pub time_remaining: f32,
    pub destruction_percent: f32,
    pub current_destruction_value: f32,
    pub total_destruction_value: f32,
    pub kaiju_health_percent: f32,
    pub kaiju_staggered: bool,
    pub weak_points: Vec<WeakPointState>,
    pub end_reason: MatchEndReason,
    pub kaiju: Option<KaijuSnapshot>,
    pub players: Vec<PlayerSnapshot>,
    pub projectiles: Vec<ProjectileSnapshot>,
    /// Ids of buildings that have been destroyed
    pub broken_breakables: Vec<u32>,
    pub awards: Option<EndOfRoundAwards>,
}

impl MatchSnapshot {
    /// Scoreboard from the score data captured in this snapshot
    pub fn scoreboard(&self, max_entries: usize, include_all_locals: bool) -> Vec<ScoreboardEntry> {
        let lines = self.players.iter().map(|p| ScoreLine {
            player_id: p.player_id,
            name: &p.display_name,
            role: p.role,
            is_local: p.is_local,
            score: &p.score,
        });
        sorted_scoreboard(lines, max_entries, include_all_locals)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KaijuSnapshot {
    pub position: Vec3,
    pub yaw: f32,
    pub health: f32,
    pub max_health: f32,
    pub ai_state: KaijuAiState,
    pub control: ControlMode,
    pub stagger_time_remaining: f32,
    pub is_dead: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub player_id: PlayerId,
    pub display_name: String,
    pub role: PlayerRole,
    pub is_local: bool,
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub health: f32,
    pub alive: bool,
    pub weapon_index: usize,
    pub ammo: u32,
    pub is_reloading: bool,
    pub last_input_seq: u32,
    /// Totals are current as of this snapshot
    pub score: PlayerScoreData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    pub id: Uuid,
    pub owner: PlayerId,
    pub position: Vec3,
    pub velocity: Vec3,
}

/// Decides when snapshots go out and builds them
pub struct SnapshotBuilder {
    /// Ticks since last snapshot, carries the fractional remainder
    ticks_since_snapshot: f32,
    /// Snapshot interval in ticks, may be fractional
    snapshot_interval: f32,
    forced: bool,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self::with_interval(snapshot_interval as f32)
    }

    /// Cadence for `snapshot_tps` snapshots out of `simulation_tps` ticks
    pub fn from_rates(simulation_tps: u32, snapshot_tps: u32) -> Self {
        Self::with_interval(simulation_tps as f32 / snapshot_tps.max(1) as f32)
    }

    fn with_interval(snapshot_interval: f32) -> Self {
        Self {
            ticks_since_snapshot: 0.0,
            snapshot_interval: snapshot_interval.max(1.0),
            forced: false,
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        if self.forced {
            self.forced = false;
            self.ticks_since_snapshot = 0.0;
            return true;
        }

        self.ticks_since_snapshot += 1.0;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot -= self.snapshot_interval;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used for important events)
    pub fn force_next(&mut self) {
        self.forced = true;
    }

    pub fn build(&self, controller: &MatchController) -> MatchSnapshot {
        let state = controller.state();
        let weights = state.score_weights();
        let finalized = state.phase() == MatchPhase::PostRound;

        let players = controller
            .roster()
            .iter()
            .map(|p| {
                let mut score = p.score;
                // Finalized totals are authoritative once the round is over
                if !finalized {
                    score.calculate_total_score(weights);
                }
                PlayerSnapshot {
                    player_id: p.player_id,
                    display_name: p.display_name.clone(),
                    role: p.role,
                    is_local: p.is_local,
                    position: p.position,
                    yaw: p.yaw,
                    pitch: p.pitch,
                    health: p.health,
                    alive: p.alive,
                    weapon_index: p.weapons.current_index(),
                    ammo: p.weapons.current_ammo(),
                    is_reloading: p.weapons.is_reloading(),
                    last_input_seq: p.last_input_seq,
                    score,
                }
            })
            .collect();

        let kaiju = controller.kaiju().map(|k| KaijuSnapshot {
            position: k.position,
            yaw: k.yaw,
            health: k.health(),
            max_health: k.max_health(),
            ai_state: k.ai_state(),
            control: k.control(),
            stagger_time_remaining: k.stagger_time_remaining(),
            is_dead: k.is_dead(),
        });

        let projectiles = controller
            .projectiles()
            .iter()
            .map(|p| ProjectileSnapshot {
                id: p.id,
                owner: p.owner,
                position: p.position,
                velocity: p.velocity,
            })
            .collect();

        MatchSnapshot {
            tick: controller.tick_count(),
            phase: state.phase(),
            time_remaining: state.time_remaining(),
            destruction_percent: state.destruction_percent(),
            current_destruction_value: state.current_destruction_value(),
            total_destruction_value: state.total_destruction_value(),
            kaiju_health_percent: state.kaiju_health_percent(),
            kaiju_staggered: state.is_kaiju_staggered(),
            weak_points: state.weak_point_states().to_vec(),
            end_reason: state.end_reason(),
            kaiju,
            players,
            projectiles,
            broken_breakables: controller
                .breakables()
                .iter()
                .filter(|b| b.is_broken())
                .map(|b| b.id)
                .collect(),
            awards: state.awards().cloned(),
        }
    }
}
