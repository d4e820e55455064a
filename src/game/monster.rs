//! Kaiju - health, weak points, stagger and the pursuit/attack AI
//!
//! Overall health and weak point health are tracked separately. Weak point
//! damage also feeds half of itself into overall health. Destroying both legs
//! staggers the kaiju, which exposes the head to bonus damage for a while.

use glam::{Quat, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ws::protocol::{GameEvent, KaijuAttackKind, WeakPointType};

use super::physics::{Aabb, PhysicsSystem};
use super::player::{PlayerId, TargetInfo};
use super::state::{MatchContext, WeakPointState};

/// Share of weak point damage that also hits overall health
pub const WEAK_POINT_HEALTH_TRANSFER: f32 = 0.5;

/// Yaw interpolation speed while pursuing
pub const KAIJU_TURN_SPEED: f32 = 2.0;

/// Kaiju tuning knobs, fixed for the lifetime of a match
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KaijuTuning {
    pub max_health: f32,
    /// Seconds a stagger lasts
    pub stagger_duration: f32,
    /// Head damage multiplier while staggered
    pub head_damage_multiplier: f32,
    pub pursuit_speed: f32,
    pub attack_range: f32,
    pub attack_cooldown: f32,
    pub attack_duration: f32,
    /// Seconds between nearest-target searches
    pub target_update_interval: f32,
    pub stomp_damage: f32,
    pub stomp_radius: f32,
    /// Stomp lands this far below the kaiju origin
    pub stomp_drop: f32,
    pub sweep_damage: f32,
    pub sweep_radius: f32,
    /// Sweep lands this far in front of the kaiju origin
    pub sweep_reach: f32,
    /// Radius of buildings flattened by an attack; pursuit crushes half of it
    pub destruction_radius: f32,
    /// LeftLeg, RightLeg, Head
    pub weak_point_health: [f32; 3],
}

impl Default for KaijuTuning {
    fn default() -> Self {
        Self {
            max_health: 5000.0,
            stagger_duration: 6.0,
            head_damage_multiplier: 2.0,
            pursuit_speed: 300.0,
            attack_range: 500.0,
            attack_cooldown: 2.0,
            attack_duration: 1.0,
            target_update_interval: 0.5,
            stomp_damage: 50.0,
            stomp_radius: 400.0,
            stomp_drop: 200.0,
            sweep_damage: 30.0,
            sweep_radius: 600.0,
            sweep_reach: 300.0,
            destruction_radius: 800.0,
            weak_point_health: [100.0, 100.0, 200.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KaijuAiState {
    Idle,
    Pursuing,
    Attacking,
    Staggered,
    Dead,
}

/// Who drives the kaiju
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "player_id", rename_all = "snake_case")]
pub enum ControlMode {
    Ai,
    Player(PlayerId),
}

/// Hit geometry regions on the kaiju
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitRegion {
    Body,
    LeftLegHitbox,
    RightLegHitbox,
    HeadHitbox,
}

pub fn weak_point_for_region(region: HitRegion) -> Option<WeakPointType> {
    match region {
        HitRegion::Body => None,
        HitRegion::LeftLegHitbox => Some(WeakPointType::LeftLeg),
        HitRegion::RightLegHitbox => Some(WeakPointType::RightLeg),
        HitRegion::HeadHitbox => Some(WeakPointType::Head),
    }
}

fn region_for_weak_point(weak_point: WeakPointType) -> HitRegion {
    match weak_point {
        WeakPointType::LeftLeg => HitRegion::LeftLegHitbox,
        WeakPointType::RightLeg => HitRegion::RightLegHitbox,
        WeakPointType::Head => HitRegion::HeadHitbox,
    }
}

/// Body box half extents around the kaiju origin
const BODY_HALF_EXTENTS: Vec3 = Vec3::new(200.0, 200.0, 480.0);

/// (local offset, half extents) per weak point, in `WeakPointType::ALL` order
const WEAK_POINT_VOLUMES: [(Vec3, Vec3); 3] = [
    (Vec3::new(0.0, -100.0, -200.0), Vec3::new(50.0, 50.0, 150.0)),
    (Vec3::new(0.0, 100.0, -200.0), Vec3::new(50.0, 50.0, 150.0)),
    (Vec3::new(0.0, 0.0, 400.0), Vec3::new(75.0, 75.0, 75.0)),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitVolume {
    pub region: HitRegion,
    pub bounds: Aabb,
}

/// What dealt damage to the kaiju, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageCauser {
    Hitscan,
    Splash,
    WeakPoint(WeakPointType),
    External,
}

/// Side effects of a kaiju tick that reach outside the kaiju
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KaijuAction {
    /// Damage players around `center` with linear falloff, flatten buildings
    Attack {
        kind: KaijuAttackKind,
        center: Vec3,
        radius: f32,
        damage: f32,
        destruction_radius: f32,
    },
    /// Passive building damage while walking
    Crush { center: Vec3, radius: f32 },
}

/// The monster
#[derive(Debug, Clone)]
pub struct Kaiju {
    pub position: Vec3,
    pub yaw: f32,
    tuning: KaijuTuning,
    health: f32,
    weak_points: [WeakPointState; 3],
    is_dead: bool,
    hidden: bool,
    is_staggered: bool,
    stagger_time_remaining: f32,

    // AI
    ai_state: KaijuAiState,
    ai_enabled: bool,
    control: ControlMode,
    current_target: Option<PlayerId>,
    target_update_timer: f32,
    is_attacking: bool,
    attack_time_remaining: f32,
    attack_cooldown_remaining: f32,
}

impl Kaiju {
    pub fn new(position: Vec3, tuning: KaijuTuning) -> Self {
        let max_health = tuning.max_health.max(1.0);
        Self {
            position,
            yaw: 0.0,
            tuning: KaijuTuning { max_health, ..tuning },
            health: max_health,
            weak_points: WeakPointState::full_set(tuning.weak_point_health),
            is_dead: false,
            hidden: false,
            is_staggered: false,
            stagger_time_remaining: 0.0,
            ai_state: KaijuAiState::Idle,
            ai_enabled: true,
            control: ControlMode::Ai,
            current_target: None,
            target_update_timer: 0.0,
            is_attacking: false,
            attack_time_remaining: 0.0,
            attack_cooldown_remaining: 0.0,
        }
    }

    pub fn tuning(&self) -> &KaijuTuning {
        &self.tuning
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn max_health(&self) -> f32 {
        self.tuning.max_health
    }

    pub fn health_percent(&self) -> f32 {
        (self.health / self.tuning.max_health).clamp(0.0, 1.0)
    }

    pub fn is_dead(&self) -> bool {
        self.is_dead
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_staggered(&self) -> bool {
        self.is_staggered
    }

    pub fn stagger_time_remaining(&self) -> f32 {
        self.stagger_time_remaining
    }

    pub fn ai_state(&self) -> KaijuAiState {
        self.ai_state
    }

    pub fn control(&self) -> ControlMode {
        self.control
    }

    pub fn current_target(&self) -> Option<PlayerId> {
        self.current_target
    }

    pub fn attack_cooldown_remaining(&self) -> f32 {
        self.attack_cooldown_remaining
    }

    pub fn weak_points(&self) -> &[WeakPointState; 3] {
        &self.weak_points
    }

    pub fn weak_point(&self, weak_point: WeakPointType) -> &WeakPointState {
        &self.weak_points[weak_point.index()]
    }

    /// The controller that should be credited for damage the kaiju deals
    pub fn controller(&self) -> Option<PlayerId> {
        match self.control {
            ControlMode::Ai => None,
            ControlMode::Player(id) => Some(id),
        }
    }

    /// Subtract from overall health and credit the instigator. No-op once dead.
    pub fn apply_damage(
        &mut self,
        amount: f32,
        instigator: Option<PlayerId>,
        causer: DamageCauser,
        ctx: &mut MatchContext<'_>,
    ) {
        if self.is_dead {
            return;
        }

        let amount = amount.max(0.0);
        self.health = (self.health - amount).max(0.0);
        ctx.roster.credit(instigator, |score| score.add_kaiju_damage(amount));
        ctx.state.set_kaiju_health_percent(self.health_percent());

        debug!(amount, health = self.health, causer = ?causer, instigator = ?instigator, "Kaiju damaged");

        if self.health <= 0.0 {
            self.die(instigator, ctx);
        }
    }

    /// Damage a weak point. Rejected once dead or once that weak point is destroyed.
    pub fn apply_damage_to_weak_point(
        &mut self,
        weak_point: WeakPointType,
        amount: f32,
        instigator: Option<PlayerId>,
        ctx: &mut MatchContext<'_>,
    ) {
        if self.is_dead || self.weak_points[weak_point.index()].is_destroyed {
            return;
        }

        let mut damage = amount.max(0.0);
        if weak_point == WeakPointType::Head && self.is_staggered {
            damage = (damage * self.tuning.head_damage_multiplier).max(0.0);
        }

        let slot = &mut self.weak_points[weak_point.index()];
        slot.current_health = (slot.current_health - damage).clamp(0.0, slot.max_health);

        self.apply_damage(
            damage * WEAK_POINT_HEALTH_TRANSFER,
            instigator,
            DamageCauser::WeakPoint(weak_point),
            ctx,
        );

        let slot = &mut self.weak_points[weak_point.index()];
        if slot.current_health <= 0.0 {
            slot.is_destroyed = true;
        }
        let update = *slot;
        ctx.update_weak_point_state(update, instigator);

        self.check_stagger_conditions(ctx);
    }

    /// The head only takes hits while staggered; everything else always does
    pub fn is_weak_point_exposed(&self, weak_point: WeakPointType) -> bool {
        match weak_point {
            WeakPointType::Head => self.is_staggered,
            _ => true,
        }
    }

    fn check_stagger_conditions(&mut self, ctx: &mut MatchContext<'_>) {
        let legs_destroyed = self.weak_point(WeakPointType::LeftLeg).is_destroyed
            && self.weak_point(WeakPointType::RightLeg).is_destroyed;
        if legs_destroyed && !self.is_staggered {
            self.trigger_stagger(ctx);
        }
    }

    pub fn trigger_stagger(&mut self, ctx: &mut MatchContext<'_>) {
        // Dead is terminal
        if self.is_staggered || self.is_dead {
            return;
        }

        self.is_staggered = true;
        self.stagger_time_remaining = self.tuning.stagger_duration;
        self.ai_state = KaijuAiState::Staggered;
        self.is_attacking = false;
        ctx.state.set_kaiju_staggered(true);

        info!(duration = self.tuning.stagger_duration, "Kaiju staggered");
    }

    pub fn end_stagger(&mut self, ctx: &mut MatchContext<'_>) {
        if !self.is_staggered {
            return;
        }

        self.is_staggered = false;
        self.stagger_time_remaining = 0.0;
        ctx.state.set_kaiju_staggered(false);
        if !self.is_dead {
            self.ai_state = KaijuAiState::Pursuing;
        }

        info!("Kaiju recovered from stagger");
    }

    fn die(&mut self, killer: Option<PlayerId>, ctx: &mut MatchContext<'_>) {
        if self.is_dead {
            return;
        }

        self.is_dead = true;
        self.hidden = true;
        self.is_attacking = false;
        self.ai_state = KaijuAiState::Dead;
        self.current_target = None;

        ctx.roster.credit(killer, |score| score.increment_final_blow_count());
        ctx.state.emit(GameEvent::KaijuDied { killer_id: killer });

        info!(killer = ?killer, "Kaiju defeated");
    }

    pub fn set_ai_enabled(&mut self, enabled: bool) {
        self.ai_enabled = enabled;
        if !enabled && !self.is_dead {
            self.ai_state = KaijuAiState::Idle;
        }
    }

    pub fn is_ai_enabled(&self) -> bool {
        self.ai_enabled
    }

    /// Hand control to a player; the AI path stops running
    pub fn possess(&mut self, player_id: PlayerId) {
        self.control = ControlMode::Player(player_id);
        self.current_target = None;
    }

    pub fn unpossess(&mut self) {
        self.control = ControlMode::Ai;
        self.target_update_timer = 0.0;
    }

    /// Advance stagger, AI and attack timers
    pub fn tick<R: Rng>(
        &mut self,
        dt: f32,
        targets: &[TargetInfo],
        rng: &mut R,
        ctx: &mut MatchContext<'_>,
    ) -> Vec<KaijuAction> {
        let mut actions = Vec::new();

        if self.is_staggered {
            self.stagger_time_remaining -= dt;
            if self.stagger_time_remaining <= 0.0 {
                self.end_stagger(ctx);
            }
        }

        if self.ai_enabled && self.control == ControlMode::Ai && !self.is_dead {
            self.update_ai(dt, targets, rng, &mut actions);
        }

        if self.attack_cooldown_remaining > 0.0 {
            self.attack_cooldown_remaining -= dt;
        }

        if self.is_attacking {
            self.attack_time_remaining -= dt;
            if self.attack_time_remaining <= 0.0 {
                self.is_attacking = false;
                self.ai_state = KaijuAiState::Pursuing;
            }
        }

        actions
    }

    fn update_ai<R: Rng>(
        &mut self,
        dt: f32,
        targets: &[TargetInfo],
        rng: &mut R,
        actions: &mut Vec<KaijuAction>,
    ) {
        if matches!(self.ai_state, KaijuAiState::Dead | KaijuAiState::Staggered) {
            return;
        }

        let target_lost = self
            .current_target
            .map_or(true, |id| !targets.iter().any(|t| t.player_id == id));

        self.target_update_timer -= dt;
        if self.target_update_timer <= 0.0 || target_lost {
            self.current_target = self.find_nearest(targets);
            self.target_update_timer = self.tuning.target_update_interval;
        }

        let Some(target) = self
            .current_target
            .and_then(|id| targets.iter().find(|t| t.player_id == id))
        else {
            self.ai_state = KaijuAiState::Idle;
            return;
        };

        if self.ai_state == KaijuAiState::Attacking {
            return;
        }

        let distance = self.position.distance(target.position);
        if distance <= self.tuning.attack_range && self.attack_cooldown_remaining <= 0.0 {
            let attack = if rng.gen_bool(0.5) {
                self.perform_stomp()
            } else {
                self.perform_sweep()
            };
            actions.extend(attack);
        } else {
            self.ai_state = KaijuAiState::Pursuing;
            actions.push(self.pursue(target.position, dt));
        }
    }

    fn find_nearest(&self, targets: &[TargetInfo]) -> Option<PlayerId> {
        targets
            .iter()
            .map(|t| (t.player_id, self.position.distance_squared(t.position)))
            .fold(None, |best: Option<(PlayerId, f32)>, (id, d)| match best {
                Some((_, best_d)) if best_d <= d => best,
                _ => Some((id, d)),
            })
            .map(|(id, _)| id)
    }

    /// Step straight at the target and crush what is underfoot
    fn pursue(&mut self, target: Vec3, dt: f32) -> KaijuAction {
        let direction = PhysicsSystem::safe_normal_2d(target - self.position);
        self.position += direction * self.tuning.pursuit_speed * dt;
        if direction != Vec3::ZERO {
            self.yaw = PhysicsSystem::interp_yaw(
                self.yaw,
                PhysicsSystem::yaw_of(direction),
                dt,
                KAIJU_TURN_SPEED,
            );
        }

        KaijuAction::Crush {
            center: self.position,
            radius: self.tuning.destruction_radius * 0.5,
        }
    }

    fn can_attack(&self) -> bool {
        !(self.is_dead || self.is_attacking || self.is_staggered || self.attack_cooldown_remaining > 0.0)
    }

    fn begin_attack(&mut self) {
        self.is_attacking = true;
        self.attack_time_remaining = self.tuning.attack_duration;
        self.attack_cooldown_remaining = self.tuning.attack_cooldown;
        self.ai_state = KaijuAiState::Attacking;
    }

    pub fn perform_stomp(&mut self) -> Option<KaijuAction> {
        if !self.can_attack() {
            return None;
        }
        self.begin_attack();

        Some(KaijuAction::Attack {
            kind: KaijuAttackKind::Stomp,
            center: self.position - Vec3::new(0.0, 0.0, self.tuning.stomp_drop),
            radius: self.tuning.stomp_radius,
            damage: self.tuning.stomp_damage,
            destruction_radius: self.tuning.destruction_radius,
        })
    }

    pub fn perform_sweep(&mut self) -> Option<KaijuAction> {
        if !self.can_attack() {
            return None;
        }
        self.begin_attack();

        Some(KaijuAction::Attack {
            kind: KaijuAttackKind::Sweep,
            center: self.position + PhysicsSystem::forward_2d(self.yaw) * self.tuning.sweep_reach,
            radius: self.tuning.sweep_radius,
            damage: self.tuning.sweep_damage,
            destruction_radius: self.tuning.destruction_radius,
        })
    }

    /// Player-driven movement while possessed
    pub fn drive(&mut self, forward: f32, right: f32, yaw: f32, dt: f32) -> Option<KaijuAction> {
        if self.is_dead || self.is_staggered || self.control == ControlMode::Ai {
            return None;
        }

        self.yaw = yaw;
        let moved = PhysicsSystem::move_pawn(self.position, yaw, forward, right, self.tuning.pursuit_speed, dt);
        if moved == self.position {
            return None;
        }
        self.position = moved;

        Some(KaijuAction::Crush {
            center: self.position,
            radius: self.tuning.destruction_radius * 0.5,
        })
    }

    pub fn body_bounds(&self) -> Aabb {
        Aabb::new(self.position, BODY_HALF_EXTENTS)
    }

    /// Targetable volumes, weak points first. Destroyed or unexposed weak
    /// points are left out so hits on them fall through to the body.
    pub fn hit_volumes(&self) -> Vec<HitVolume> {
        if self.hidden {
            return Vec::new();
        }

        let rotation = Quat::from_rotation_z(self.yaw);
        let mut volumes: Vec<HitVolume> = WeakPointType::ALL
            .iter()
            .filter(|wp| self.is_weak_point_exposed(**wp) && !self.weak_point(**wp).is_destroyed)
            .map(|wp| {
                let (offset, half_extents) = WEAK_POINT_VOLUMES[wp.index()];
                HitVolume {
                    region: region_for_weak_point(*wp),
                    bounds: Aabb::new(self.position + rotation * offset, half_extents),
                }
            })
            .collect();

        volumes.push(HitVolume {
            region: HitRegion::Body,
            bounds: self.body_bounds(),
        });
        volumes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::player::Roster;
    use crate::game::score::ScoreWeights;
    use crate::game::state::MatchState;
    use crate::game::weapons::default_loadout;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    struct Fixture {
        state: MatchState,
        roster: Roster,
        kaiju: Kaiju,
        shooter: PlayerId,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_tuning(KaijuTuning::default())
        }

        fn with_tuning(tuning: KaijuTuning) -> Self {
            let mut roster = Roster::new();
            let shooter = roster.join(Uuid::new_v4(), "shooter".into(), false, Vec3::ZERO, default_loadout(&[]));
            Self {
                state: MatchState::new(10_000.0, ScoreWeights::default(), tuning.weak_point_health),
                roster,
                kaiju: Kaiju::new(Vec3::new(0.0, 0.0, 500.0), tuning),
                shooter,
            }
        }

        fn damage(&mut self, amount: f32) {
            let mut ctx = MatchContext::new(&mut self.state, &mut self.roster);
            self.kaiju.apply_damage(amount, Some(self.shooter), DamageCauser::External, &mut ctx);
        }

        fn damage_weak_point(&mut self, weak_point: WeakPointType, amount: f32) {
            let mut ctx = MatchContext::new(&mut self.state, &mut self.roster);
            self.kaiju
                .apply_damage_to_weak_point(weak_point, amount, Some(self.shooter), &mut ctx);
        }

        fn tick(&mut self, dt: f32, targets: &[TargetInfo]) -> Vec<KaijuAction> {
            let mut rng = ChaCha8Rng::seed_from_u64(1);
            let mut ctx = MatchContext::new(&mut self.state, &mut self.roster);
            self.kaiju.tick(dt, targets, &mut rng, &mut ctx)
        }

        fn score(&self) -> crate::game::score::PlayerScoreData {
            self.roster.get(self.shooter).unwrap().score
        }

        fn stagger_events(&mut self) -> usize {
            self.state
                .drain_events()
                .iter()
                .filter(|e| matches!(e, GameEvent::KaijuStaggeredChanged { staggered: true }))
                .count()
        }
    }

    fn target(id: i32, position: Vec3) -> TargetInfo {
        TargetInfo {
            player_id: PlayerId(id),
            position,
        }
    }

    #[test]
    fn test_health_never_negative() {
        for amount in [0.0, 1.0, 4999.0, 5000.0, 12_345.0] {
            let mut f = Fixture::new();
            f.damage(amount);
            assert_eq!(f.kaiju.health(), (5000.0_f32 - amount).max(0.0));
        }
    }

    #[test]
    fn test_negative_damage_is_clamped() {
        let mut f = Fixture::new();
        f.damage(-100.0);
        assert_eq!(f.kaiju.health(), 5000.0);
        assert_eq!(f.score().kaiju_damage_dealt, 0.0);
    }

    #[test]
    fn test_damage_credits_instigator_and_updates_percent() {
        let mut f = Fixture::new();
        f.damage(1000.0);
        assert_eq!(f.score().kaiju_damage_dealt, 1000.0);
        assert_eq!(f.state.kaiju_health_percent(), 0.8);
    }

    #[test]
    fn test_death_is_idempotent_with_single_final_blow() {
        let mut f = Fixture::new();
        f.damage(6000.0);
        f.damage(100.0);
        assert!(f.kaiju.is_dead());
        assert_eq!(f.kaiju.ai_state(), KaijuAiState::Dead);
        assert_eq!(f.score().final_blow_count, 1);
        // Damage after death is not credited
        assert_eq!(f.score().kaiju_damage_dealt, 6000.0);
        assert!(f.kaiju.hit_volumes().is_empty());

        let died = f
            .state
            .drain_events()
            .iter()
            .filter(|e| matches!(e, GameEvent::KaijuDied { .. }))
            .count();
        assert_eq!(died, 1);
    }

    #[test]
    fn test_weak_point_damage_funnels_half_to_health() {
        let mut f = Fixture::new();
        f.damage_weak_point(WeakPointType::LeftLeg, 40.0);
        assert_eq!(f.kaiju.weak_point(WeakPointType::LeftLeg).current_health, 60.0);
        assert_eq!(f.kaiju.health(), 4980.0);
        assert_eq!(f.score().kaiju_damage_dealt, 20.0);
    }

    #[test]
    fn test_weak_point_destruction_is_monotonic() {
        let mut f = Fixture::new();
        f.damage_weak_point(WeakPointType::LeftLeg, 150.0);
        let destroyed = *f.kaiju.weak_point(WeakPointType::LeftLeg);
        assert!(destroyed.is_destroyed);
        assert_eq!(destroyed.current_health, 0.0);
        let health_after_destroy = f.kaiju.health();

        f.damage_weak_point(WeakPointType::LeftLeg, 500.0);
        assert_eq!(*f.kaiju.weak_point(WeakPointType::LeftLeg), destroyed);
        assert_eq!(f.kaiju.health(), health_after_destroy);
        assert_eq!(f.score().weak_points_destroyed, 1);
        assert!(f.state.weak_point_state(WeakPointType::LeftLeg).is_destroyed);
    }

    #[test]
    fn test_stagger_requires_both_legs() {
        let mut f = Fixture::new();
        f.damage_weak_point(WeakPointType::LeftLeg, 100.0);
        assert!(!f.kaiju.is_staggered());
        f.damage_weak_point(WeakPointType::RightLeg, 100.0);
        assert!(f.kaiju.is_staggered());
        assert_eq!(f.kaiju.ai_state(), KaijuAiState::Staggered);
        assert!(f.state.is_kaiju_staggered());
    }

    #[test]
    fn test_overkill_twice_staggers_once() {
        let mut f = Fixture::new();
        f.damage_weak_point(WeakPointType::LeftLeg, 1000.0);
        f.damage_weak_point(WeakPointType::RightLeg, 1000.0);
        f.damage_weak_point(WeakPointType::RightLeg, 1000.0);
        assert!(f.kaiju.is_staggered());
        assert_eq!(f.stagger_events(), 1);
        assert_eq!(f.score().weak_points_destroyed, 2);
    }

    #[test]
    fn test_staggered_head_damage_multiplied() {
        let mut f = Fixture::new();
        f.damage_weak_point(WeakPointType::LeftLeg, 100.0);
        f.damage_weak_point(WeakPointType::RightLeg, 100.0);
        let health_before = f.kaiju.health();

        f.damage_weak_point(WeakPointType::Head, 50.0);
        assert_eq!(f.kaiju.weak_point(WeakPointType::Head).current_health, 100.0);
        assert_eq!(f.kaiju.health(), health_before - 50.0);
    }

    #[test]
    fn test_negative_head_multiplier_never_heals() {
        let mut f = Fixture::with_tuning(KaijuTuning {
            head_damage_multiplier: -2.0,
            ..KaijuTuning::default()
        });
        f.damage_weak_point(WeakPointType::LeftLeg, 100.0);
        f.damage_weak_point(WeakPointType::RightLeg, 100.0);
        let health_before = f.kaiju.health();

        f.damage_weak_point(WeakPointType::Head, 50.0);
        let head = f.kaiju.weak_point(WeakPointType::Head);
        assert_eq!(head.current_health, head.max_health);
        assert!(!head.is_destroyed);
        assert_eq!(f.kaiju.health(), health_before);
    }

    #[test]
    fn test_head_damage_unmultiplied_when_not_staggered() {
        let mut f = Fixture::new();
        f.damage_weak_point(WeakPointType::Head, 50.0);
        assert_eq!(f.kaiju.weak_point(WeakPointType::Head).current_health, 150.0);
    }

    #[test]
    fn test_head_exposed_only_while_staggered() {
        let mut f = Fixture::new();
        assert!(!f.kaiju.is_weak_point_exposed(WeakPointType::Head));
        assert!(f.kaiju.is_weak_point_exposed(WeakPointType::LeftLeg));
        let regions: Vec<HitRegion> = f.kaiju.hit_volumes().iter().map(|v| v.region).collect();
        assert!(!regions.contains(&HitRegion::HeadHitbox));

        f.damage_weak_point(WeakPointType::LeftLeg, 100.0);
        f.damage_weak_point(WeakPointType::RightLeg, 100.0);
        assert!(f.kaiju.is_weak_point_exposed(WeakPointType::Head));
        let regions: Vec<HitRegion> = f.kaiju.hit_volumes().iter().map(|v| v.region).collect();
        assert_eq!(regions, vec![HitRegion::HeadHitbox, HitRegion::Body]);
    }

    #[test]
    fn test_stagger_expires_to_pursuing() {
        let mut f = Fixture::new();
        f.damage_weak_point(WeakPointType::LeftLeg, 100.0);
        f.damage_weak_point(WeakPointType::RightLeg, 100.0);
        f.state.drain_events();

        for _ in 0..5 {
            f.tick(1.0, &[]);
        }
        assert!(f.kaiju.is_staggered());
        f.tick(1.0, &[]);
        assert!(!f.kaiju.is_staggered());
        assert!(f
            .state
            .drain_events()
            .contains(&GameEvent::KaijuStaggeredChanged { staggered: false }));
    }

    #[test]
    fn test_dead_kaiju_does_not_stagger() {
        let mut f = Fixture::new();
        f.damage_weak_point(WeakPointType::LeftLeg, 100.0);
        f.damage(10_000.0);
        f.damage_weak_point(WeakPointType::RightLeg, 100.0);
        assert!(!f.kaiju.is_staggered());
        assert_eq!(f.kaiju.ai_state(), KaijuAiState::Dead);
    }

    #[test]
    fn test_idle_without_targets() {
        let mut f = Fixture::new();
        let actions = f.tick(0.1, &[]);
        assert!(actions.is_empty());
        assert_eq!(f.kaiju.ai_state(), KaijuAiState::Idle);
    }

    #[test]
    fn test_pursues_nearest_target_and_crushes() {
        let mut f = Fixture::new();
        let targets = [target(1, Vec3::new(5000.0, 0.0, 90.0)), target(2, Vec3::new(-3000.0, 0.0, 90.0))];
        let actions = f.tick(1.0, &targets);

        assert_eq!(f.kaiju.current_target(), Some(PlayerId(2)));
        assert_eq!(f.kaiju.ai_state(), KaijuAiState::Pursuing);
        assert!((f.kaiju.position.x - -300.0).abs() < 1e-3);
        assert_eq!(f.kaiju.position.z, 500.0);
        assert!(matches!(actions.as_slice(), [KaijuAction::Crush { radius, .. }] if *radius == 400.0));
    }

    #[test]
    fn test_retargets_immediately_when_target_dies() {
        let mut f = Fixture::new();
        f.tick(0.1, &[target(1, Vec3::new(2000.0, 0.0, 90.0))]);
        assert_eq!(f.kaiju.current_target(), Some(PlayerId(1)));

        f.tick(0.1, &[target(2, Vec3::new(-2000.0, 0.0, 90.0))]);
        assert_eq!(f.kaiju.current_target(), Some(PlayerId(2)));
    }

    #[test]
    fn test_attacks_in_range_then_cools_down() {
        let mut f = Fixture::new();
        let targets = [target(1, Vec3::new(100.0, 0.0, 400.0))];
        let actions = f.tick(0.1, &targets);

        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], KaijuAction::Attack { destruction_radius, .. } if destruction_radius == 800.0));
        assert_eq!(f.kaiju.ai_state(), KaijuAiState::Attacking);

        // Attack lasts 1s, then the kaiju pursues while on cooldown
        let mut attacks = 0;
        for _ in 0..10 {
            attacks += f
                .tick(0.1, &targets)
                .iter()
                .filter(|a| matches!(a, KaijuAction::Attack { .. }))
                .count();
        }
        assert_eq!(attacks, 0);
        assert_eq!(f.kaiju.ai_state(), KaijuAiState::Pursuing);
        assert!(f.kaiju.attack_cooldown_remaining() > 0.0);
    }

    #[test]
    fn test_stomp_lands_below_and_sweep_in_front() {
        let mut kaiju = Kaiju::new(Vec3::new(0.0, 0.0, 500.0), KaijuTuning::default());
        match kaiju.perform_stomp() {
            Some(KaijuAction::Attack { kind, center, radius, damage, .. }) => {
                assert_eq!(kind, KaijuAttackKind::Stomp);
                assert_eq!(center, Vec3::new(0.0, 0.0, 300.0));
                assert_eq!(radius, 400.0);
                assert_eq!(damage, 50.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        // On cooldown
        assert!(kaiju.perform_sweep().is_none());

        let mut kaiju = Kaiju::new(Vec3::new(0.0, 0.0, 500.0), KaijuTuning::default());
        match kaiju.perform_sweep() {
            Some(KaijuAction::Attack { kind, center, radius, .. }) => {
                assert_eq!(kind, KaijuAttackKind::Sweep);
                assert_eq!(center, Vec3::new(300.0, 0.0, 500.0));
                assert_eq!(radius, 600.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_possessed_kaiju_skips_ai() {
        let mut f = Fixture::new();
        f.kaiju.possess(PlayerId(1));
        let actions = f.tick(1.0, &[target(2, Vec3::new(5000.0, 0.0, 90.0))]);
        assert!(actions.is_empty());
        assert_eq!(f.kaiju.position, Vec3::new(0.0, 0.0, 500.0));
        assert_eq!(f.kaiju.controller(), Some(PlayerId(1)));

        let crush = f.kaiju.drive(1.0, 0.0, 0.0, 1.0);
        assert!(crush.is_some());
        assert!((f.kaiju.position.x - 300.0).abs() < 1e-3);
    }

    #[test]
    fn test_disabling_ai_forces_idle() {
        let mut f = Fixture::new();
        f.tick(0.1, &[target(1, Vec3::new(5000.0, 0.0, 90.0))]);
        assert_eq!(f.kaiju.ai_state(), KaijuAiState::Pursuing);
        f.kaiju.set_ai_enabled(false);
        assert_eq!(f.kaiju.ai_state(), KaijuAiState::Idle);
        let before = f.kaiju.position;
        f.tick(0.1, &[target(1, Vec3::new(5000.0, 0.0, 90.0))]);
        assert_eq!(f.kaiju.position, before);
    }
}
