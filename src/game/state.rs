//! Replicated match state
//!
//! One `MatchState` exists per match and is owned by the match controller.
//! Every mutation goes through a setter that records a `GameEvent` when the
//! observable value actually changes. Events are drained once per tick and
//! broadcast to observers.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ws::protocol::{GameEvent, MatchEndReason, MatchPhase, WeakPointType};

use super::destruction::DestructionMeter;
use super::player::{PlayerId, Roster};
use super::score::{EndOfRoundAwards, ScoreWeights};

/// Floats closer than this count as unchanged
pub const CHANGE_TOLERANCE: f32 = 1e-6;

fn nearly_equal(a: f32, b: f32) -> bool {
    (a - b).abs() <= CHANGE_TOLERANCE
}

/// Health of one kaiju weak point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeakPointState {
    pub weak_point_type: WeakPointType,
    pub current_health: f32,
    pub max_health: f32,
    pub is_destroyed: bool,
}

impl WeakPointState {
    pub fn new(weak_point_type: WeakPointType, max_health: f32) -> Self {
        let max_health = max_health.max(1.0);
        Self {
            weak_point_type,
            current_health: max_health,
            max_health,
            is_destroyed: false,
        }
    }

    /// 0.0 - 1.0
    pub fn health_percent(&self) -> f32 {
        if self.max_health <= 0.0 {
            return 0.0;
        }
        (self.current_health / self.max_health).clamp(0.0, 1.0)
    }

    /// The default set, one per type in `WeakPointType::ALL` order
    pub fn full_set(max_health: [f32; 3]) -> [WeakPointState; 3] {
        WeakPointType::ALL.map(|t| WeakPointState::new(t, max_health[t.index()]))
    }
}

/// Match-wide replicated state
#[derive(Debug)]
pub struct MatchState {
    phase: MatchPhase,
    time_remaining: f32,
    destruction: DestructionMeter,
    destruction_percent: f32,
    kaiju_health_percent: f32,
    weak_points: [WeakPointState; 3],
    kaiju_staggered: bool,
    end_reason: MatchEndReason,
    score_weights: ScoreWeights,
    awards: Option<EndOfRoundAwards>,
    events: Vec<GameEvent>,
}

impl MatchState {
    pub fn new(total_destruction_value: f32, score_weights: ScoreWeights, weak_point_health: [f32; 3]) -> Self {
        Self {
            phase: MatchPhase::None,
            time_remaining: 0.0,
            destruction: DestructionMeter::new(total_destruction_value),
            destruction_percent: 0.0,
            kaiju_health_percent: 1.0,
            weak_points: WeakPointState::full_set(weak_point_health),
            kaiju_staggered: false,
            end_reason: MatchEndReason::None,
            score_weights,
            awards: None,
            events: Vec::new(),
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: MatchPhase) {
        if self.phase == phase {
            return;
        }
        self.phase = phase;
        self.emit(GameEvent::MatchPhaseChanged { phase });
    }

    pub fn time_remaining(&self) -> f32 {
        self.time_remaining
    }

    pub fn set_time_remaining(&mut self, seconds: f32) {
        self.time_remaining = seconds.max(0.0);
    }

    pub fn destruction_percent(&self) -> f32 {
        self.destruction_percent
    }

    pub fn current_destruction_value(&self) -> f32 {
        self.destruction.current_value()
    }

    pub fn total_destruction_value(&self) -> f32 {
        self.destruction.total_value()
    }

    pub fn set_total_destruction_value(&mut self, total: f32) {
        self.destruction.set_total_value(total);
        self.refresh_destruction_percent();
    }

    /// Feed the destruction meter and credit the instigator with collateral damage
    pub fn add_destruction_value(&mut self, amount: f32, instigator: Option<PlayerId>, roster: &mut Roster) {
        let amount = amount.max(0.0);
        self.destruction.add(amount);
        roster.credit(instigator, |score| score.add_collateral_damage(amount));
        self.refresh_destruction_percent();
    }

    fn refresh_destruction_percent(&mut self) {
        let percent = self.destruction.percent();
        if nearly_equal(percent, self.destruction_percent) {
            return;
        }
        self.destruction_percent = percent;
        self.emit(GameEvent::DestructionPercentChanged { percent });
    }

    /// 0.0 - 1.0
    pub fn kaiju_health_percent(&self) -> f32 {
        self.kaiju_health_percent
    }

    pub fn set_kaiju_health_percent(&mut self, percent: f32) {
        let percent = percent.clamp(0.0, 1.0);
        if nearly_equal(percent, self.kaiju_health_percent) {
            return;
        }
        self.kaiju_health_percent = percent;
        self.emit(GameEvent::KaijuHealthChanged { percent });
    }

    pub fn is_kaiju_staggered(&self) -> bool {
        self.kaiju_staggered
    }

    pub fn set_kaiju_staggered(&mut self, staggered: bool) {
        if self.kaiju_staggered == staggered {
            return;
        }
        self.kaiju_staggered = staggered;
        self.emit(GameEvent::KaijuStaggeredChanged { staggered });
    }

    pub fn weak_point_states(&self) -> &[WeakPointState; 3] {
        &self.weak_points
    }

    pub fn weak_point_state(&self, weak_point: WeakPointType) -> &WeakPointState {
        &self.weak_points[weak_point.index()]
    }

    /// Mirror a weak point. The destroyer is credited on the intact -> destroyed edge only.
    pub fn update_weak_point_state(
        &mut self,
        update: WeakPointState,
        destroyer: Option<PlayerId>,
        roster: &mut Roster,
    ) {
        let slot = &mut self.weak_points[update.weak_point_type.index()];
        let newly_destroyed = !slot.is_destroyed && update.is_destroyed;

        slot.current_health = update.current_health;
        slot.max_health = update.max_health;
        // Destroyed never reverts
        slot.is_destroyed |= update.is_destroyed;

        if newly_destroyed {
            roster.credit(destroyer, |score| score.increment_weak_points_destroyed());
            info!(weak_point = ?update.weak_point_type, destroyer = ?destroyer, "Weak point destroyed");
            self.emit(GameEvent::WeakPointDestroyed {
                weak_point: update.weak_point_type,
                destroyer_id: destroyer,
            });
        }
    }

    pub fn end_reason(&self) -> MatchEndReason {
        self.end_reason
    }

    pub fn set_end_reason(&mut self, reason: MatchEndReason) {
        self.end_reason = reason;
    }

    pub fn score_weights(&self) -> &ScoreWeights {
        &self.score_weights
    }

    pub fn awards(&self) -> Option<&EndOfRoundAwards> {
        self.awards.as_ref()
    }

    pub fn set_awards(&mut self, awards: EndOfRoundAwards) {
        self.awards = Some(awards);
    }

    /// Queue a change notification for this tick
    pub fn emit(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Mutable view over the match state and roster, handed to gameplay code
/// that needs to attribute score while it mutates the match.
pub struct MatchContext<'a> {
    pub state: &'a mut MatchState,
    pub roster: &'a mut Roster,
}

impl<'a> MatchContext<'a> {
    pub fn new(state: &'a mut MatchState, roster: &'a mut Roster) -> Self {
        Self { state, roster }
    }

    pub fn add_destruction_value(&mut self, amount: f32, instigator: Option<PlayerId>) {
        self.state.add_destruction_value(amount, instigator, self.roster);
    }

    pub fn update_weak_point_state(&mut self, update: WeakPointState, destroyer: Option<PlayerId>) {
        self.state.update_weak_point_state(update, destroyer, self.roster);
    }
}
