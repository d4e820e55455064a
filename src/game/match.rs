//! Match controller and authoritative tick loop

use dashmap::DashMap;
use glam::Vec3;
use parking_lot::RwLock;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MatchConfig;
use crate::util::time::{tick_delta, SIMULATION_TPS, SNAPSHOT_TPS};
use crate::ws::protocol::{
    ClientMsg, GameEvent, KaijuAttackKind, MatchEndReason, MatchPhase, PlayerRole, ServerMsg,
    WeakPointType,
};

use super::combat::{CombatWorld, Projectile, ProjectileStep};
use super::destruction::Breakable;
use super::monster::{DamageCauser, Kaiju};
use super::player::{PlayerId, PlayerState, Roster};
use super::score::{
    compute_end_of_round_awards, sorted_scoreboard, EndOfRoundAwards, PlayerScoreData, ScoreboardEntry,
};
use super::snapshot::{MatchSnapshot, SnapshotBuilder};
use super::state::{MatchContext, MatchState, WeakPointState};
use super::weapons::{default_loadout, FireMode, WeaponHolder};
use super::{PlayerInput, TickInput};

/// Where the kaiju appears when no spawn point is configured
pub const KAIJU_FALLBACK_SPAWN: Vec3 = Vec3::new(0.0, 0.0, 500.0);

/// Why a join was refused
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("Match is full")]
    MatchFull,

    #[error("Match has already ended")]
    MatchOver,
}

impl JoinError {
    pub fn code(&self) -> &'static str {
        match self {
            JoinError::MatchFull => "match_full",
            JoinError::MatchOver => "match_over",
        }
    }
}

/// Owns and advances everything in one match
pub struct MatchController {
    config: Arc<MatchConfig>,
    state: MatchState,
    roster: Roster,
    kaiju: Option<Kaiju>,
    breakables: Vec<Breakable>,
    projectiles: Vec<Projectile>,
    /// Seconds until each queued player respawns
    pending_respawns: BTreeMap<PlayerId, f32>,
    warmup_elapsed: f32,
    rng: ChaCha8Rng,
    tick: u64,
    max_players: usize,
}

impl MatchController {
    pub fn new(config: Arc<MatchConfig>, seed: u64, max_players: usize) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let breakables = config.city.build(config.total_destruction_value, &mut rng);
        let state = MatchState::new(
            config.total_destruction_value,
            config.score_weights,
            config.kaiju.weak_point_health,
        );

        Self {
            config,
            state,
            roster: Roster::new(),
            kaiju: None,
            breakables,
            projectiles: Vec::new(),
            pending_respawns: BTreeMap::new(),
            warmup_elapsed: 0.0,
            rng,
            tick: 0,
            max_players: max_players.max(1),
        }
    }

    // ---- Queries ----

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn kaiju(&self) -> Option<&Kaiju> {
        self.kaiju.as_ref()
    }

    pub fn breakables(&self) -> &[Breakable] {
        &self.breakables
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn phase(&self) -> MatchPhase {
        self.state.phase()
    }

    pub fn time_remaining(&self) -> f32 {
        self.state.time_remaining()
    }

    pub fn destruction_percent(&self) -> f32 {
        self.state.destruction_percent()
    }

    pub fn kaiju_health_percent(&self) -> f32 {
        self.state.kaiju_health_percent()
    }

    pub fn weak_point_states(&self) -> &[WeakPointState; 3] {
        self.state.weak_point_states()
    }

    pub fn is_kaiju_staggered(&self) -> bool {
        self.state.is_kaiju_staggered()
    }

    pub fn end_reason(&self) -> MatchEndReason {
        self.state.end_reason()
    }

    pub fn awards(&self) -> Option<&EndOfRoundAwards> {
        self.state.awards()
    }

    pub fn pending_respawn(&self, player_id: PlayerId) -> Option<f32> {
        self.pending_respawns.get(&player_id).copied()
    }

    /// Sorted scoreboard. Totals are finalized after the round, live before it.
    pub fn scoreboard(&self, max_entries: usize, include_all_locals: bool) -> Vec<ScoreboardEntry> {
        if self.state.phase() == MatchPhase::PostRound {
            return sorted_scoreboard(self.roster.score_lines(), max_entries, include_all_locals);
        }

        let weights = *self.state.score_weights();
        let live: Vec<(&PlayerState, PlayerScoreData)> = self
            .roster
            .iter()
            .map(|p| {
                let mut score = p.score;
                score.calculate_total_score(&weights);
                (p, score)
            })
            .collect();
        let lines = live.iter().map(|(p, score)| {
            let mut line = p.score_line();
            line.score = score;
            line
        });
        sorted_scoreboard(lines, max_entries, include_all_locals)
    }

    // ---- Phase machine ----

    /// Enter warmup. Only valid from `None`.
    pub fn start_play(&mut self) {
        if self.state.phase() != MatchPhase::None {
            return;
        }

        self.warmup_elapsed = 0.0;
        self.state.set_time_remaining(self.config.warmup_duration);
        self.state.set_phase(MatchPhase::Warmup);
        info!(warmup_secs = self.config.warmup_duration, "Warmup started");
    }

    /// Begin the round: spawn the kaiju and start the match clock
    pub fn start_match(&mut self) {
        if !matches!(self.state.phase(), MatchPhase::None | MatchPhase::Warmup) {
            return;
        }

        self.state.set_phase(MatchPhase::InProgress);
        self.state.set_time_remaining(self.config.match_duration);
        self.spawn_kaiju();
        info!(duration_secs = self.config.match_duration, "Match in progress");
    }

    /// Enter PostRound, finalize scores and compute awards. Runs once.
    pub fn end_match(&mut self, reason: MatchEndReason) {
        if self.state.phase() == MatchPhase::PostRound {
            return;
        }

        self.state.set_phase(MatchPhase::PostRound);
        self.state.set_end_reason(reason);
        self.state.emit(GameEvent::MatchEnded { reason });

        let weights = *self.state.score_weights();
        for player in self.roster.iter_mut() {
            player.score.calculate_total_score(&weights);
            player.weapons.stop_fire();
        }

        let awards = compute_end_of_round_awards(self.roster.score_lines());
        self.state.set_awards(awards);

        info!(reason = ?reason, players = self.roster.len(), "Match ended");
    }

    /// Advance the match by `dt` seconds and return the events it produced
    pub fn tick(&mut self, dt: f32) -> Vec<GameEvent> {
        self.tick += 1;

        match self.state.phase() {
            MatchPhase::None | MatchPhase::PostRound => {}
            MatchPhase::Warmup => {
                self.warmup_elapsed += dt;
                self.state
                    .set_time_remaining(self.config.warmup_duration - self.warmup_elapsed);
                if self.warmup_elapsed >= self.config.warmup_duration {
                    self.start_match();
                }
            }
            MatchPhase::InProgress => {
                self.simulate(dt);
                self.update_match_timer(dt);
                self.check_match_end_conditions();
            }
        }

        // Queued respawns keep counting down in every phase
        self.process_pending_respawns(dt);

        self.state.drain_events()
    }

    fn update_match_timer(&mut self, dt: f32) {
        let remaining = self.state.time_remaining() - dt;
        self.state.set_time_remaining(remaining);
    }

    /// First satisfied condition wins: kaiju, then city, then clock
    fn check_match_end_conditions(&mut self) {
        if self.state.phase() != MatchPhase::InProgress {
            return;
        }

        if self.state.kaiju_health_percent() <= 0.0 {
            self.end_match(MatchEndReason::KaijuDefeated);
        } else if self.state.destruction_percent() >= self.config.destruction_threshold {
            self.end_match(MatchEndReason::CityDestroyed);
        } else if self.state.time_remaining() <= 0.0 {
            self.end_match(MatchEndReason::TimerExpired);
        }
    }

    pub fn spawn_kaiju(&mut self) {
        if self.kaiju.is_some() {
            return;
        }

        let location = match self.config.kaiju_spawn {
            Some(location) => location,
            None => {
                warn!(fallback = ?KAIJU_FALLBACK_SPAWN, "No kaiju spawn point, using fallback");
                KAIJU_FALLBACK_SPAWN
            }
        };

        let kaiju = Kaiju::new(location, self.config.kaiju);
        self.state.set_kaiju_health_percent(kaiju.health_percent());
        self.kaiju = Some(kaiju);
        info!(location = ?location, "Kaiju spawned");
    }

    /// Random configured start, or the world origin when none exist
    pub fn choose_player_start(&mut self) -> Vec3 {
        let starts = &self.config.player_starts;
        if starts.is_empty() {
            debug!("No player starts configured, spawning at origin");
            return Vec3::ZERO;
        }
        starts[self.rng.gen_range(0..starts.len())]
    }

    // ---- Respawns ----

    /// Queue a respawn and count the death. Ignored outside InProgress or when already queued.
    pub fn request_respawn(&mut self, player_id: PlayerId) -> bool {
        if self.state.phase() != MatchPhase::InProgress {
            return false;
        }
        if self.pending_respawns.contains_key(&player_id) {
            return false;
        }
        let Some(player) = self.roster.get_mut(player_id) else {
            warn!(player_id = %player_id, "Respawn requested for unknown player");
            return false;
        };

        player.score.increment_deaths();
        self.pending_respawns.insert(player_id, self.config.respawn_delay);
        info!(player_id = %player_id, delay = self.config.respawn_delay, "Respawn queued");
        true
    }

    fn process_pending_respawns(&mut self, dt: f32) {
        if self.pending_respawns.is_empty() {
            return;
        }

        let mut ready = Vec::new();
        for (player_id, remaining) in self.pending_respawns.iter_mut() {
            *remaining -= dt;
            if *remaining <= 0.0 {
                ready.push(*player_id);
            }
        }

        for player_id in ready {
            self.pending_respawns.remove(&player_id);
            self.respawn_player(player_id);
        }
    }

    fn respawn_player(&mut self, player_id: PlayerId) {
        let location = self.choose_player_start();
        let Some(player) = self.roster.get_mut(player_id) else {
            debug!(player_id = %player_id, "Respawn skipped, player left");
            return;
        };

        player.respawn_at(location);
        self.state.emit(GameEvent::PlayerRespawned { player_id, location });
        info!(player_id = %player_id, location = ?location, "Player respawned");
    }

    // ---- Roster ----

    /// Add a player as a human. The first join starts warmup.
    pub fn join_player(&mut self, user_id: Uuid, display_name: String, is_local: bool) -> Result<PlayerId, JoinError> {
        if let Some(existing) = self.roster.id_for_user(&user_id) {
            return Ok(existing);
        }
        if self.state.phase() == MatchPhase::PostRound {
            return Err(JoinError::MatchOver);
        }
        if self.roster.len() >= self.max_players {
            return Err(JoinError::MatchFull);
        }

        let spawn = self.choose_player_start();
        let loadout = default_loadout(&self.config.weapon_tuning);
        let player_id = self.roster.join(user_id, display_name, is_local, spawn, loadout);

        if self.state.phase() == MatchPhase::None {
            self.start_play();
        }
        Ok(player_id)
    }

    pub fn leave_player(&mut self, user_id: &Uuid) -> Option<PlayerState> {
        let player = self.roster.leave(user_id)?;
        if let Some(kaiju) = self.kaiju.as_mut() {
            if kaiju.controller() == Some(player.player_id) {
                kaiju.unpossess();
            }
        }
        Some(player)
    }

    pub fn player_id_for(&self, user_id: &Uuid) -> Option<PlayerId> {
        self.roster.id_for_user(user_id)
    }

    pub fn set_player_role(&mut self, player_id: PlayerId, role: PlayerRole) {
        if let Some(player) = self.roster.get_mut(player_id) {
            player.role = role;
        }
    }

    pub fn player_role(&self, player_id: PlayerId) -> Option<PlayerRole> {
        self.roster.get(player_id).map(|p| p.role)
    }

    pub fn reset_score(&mut self, player_id: PlayerId) {
        if let Some(player) = self.roster.get_mut(player_id) {
            player.score.reset();
        }
    }

    /// Give a player direct control of the kaiju
    pub fn possess_kaiju(&mut self, player_id: PlayerId) -> bool {
        match (self.kaiju.as_mut(), self.roster.get(player_id)) {
            (Some(kaiju), Some(_)) => {
                kaiju.possess(player_id);
                info!(player_id = %player_id, "Kaiju possessed");
                true
            }
            _ => false,
        }
    }

    pub fn release_kaiju(&mut self) {
        if let Some(kaiju) = self.kaiju.as_mut() {
            kaiju.unpossess();
        }
    }

    /// Release only if `player_id` is the one in control
    pub fn release_kaiju_from(&mut self, player_id: PlayerId) {
        if self.kaiju.as_ref().and_then(Kaiju::controller) == Some(player_id) {
            self.release_kaiju();
            info!(player_id = %player_id, "Kaiju released");
        }
    }

    // ---- Player commands ----

    /// Latest movement/aim input. Stale sequence numbers are dropped.
    pub fn handle_input(&mut self, player_id: PlayerId, input: TickInput) {
        let Some(player) = self.roster.get_mut(player_id) else {
            return;
        };
        if input.seq <= player.last_input_seq {
            return;
        }

        player.last_input_seq = input.seq;
        player.current_input = TickInput {
            move_forward: input.move_forward.clamp(-1.0, 1.0),
            move_right: input.move_right.clamp(-1.0, 1.0),
            ..input
        };
    }

    fn with_weapons(&mut self, player_id: PlayerId, f: impl FnOnce(&mut WeaponHolder, &mut Vec<GameEvent>)) {
        let Some(player) = self.roster.get_mut(player_id) else {
            return;
        };
        let mut events = Vec::new();
        f(&mut player.weapons, &mut events);
        for event in events {
            self.state.emit(event);
        }
    }

    pub fn start_fire(&mut self, player_id: PlayerId) {
        self.with_weapons(player_id, |weapons, _| weapons.start_fire());
    }

    pub fn stop_fire(&mut self, player_id: PlayerId) {
        self.with_weapons(player_id, |weapons, _| weapons.stop_fire());
    }

    /// Switch to `index`, or cycle to the next weapon
    pub fn switch_weapon(&mut self, player_id: PlayerId, index: Option<usize>) {
        self.with_weapons(player_id, |weapons, events| match index {
            Some(index) => weapons.switch_to(index, events),
            None => weapons.switch_to_next(events),
        });
    }

    pub fn start_reload(&mut self, player_id: PlayerId) {
        self.with_weapons(player_id, |weapons, events| weapons.start_reload(events));
    }

    /// Attack ordered by the player possessing the kaiju
    pub fn kaiju_attack(&mut self, player_id: PlayerId, kind: KaijuAttackKind) {
        if self.state.phase() != MatchPhase::InProgress {
            return;
        }
        let Some(kaiju) = self.kaiju.as_mut() else {
            return;
        };
        if kaiju.controller() != Some(player_id) {
            return;
        }

        let action = match kind {
            KaijuAttackKind::Stomp => kaiju.perform_stomp(),
            KaijuAttackKind::Sweep => kaiju.perform_sweep(),
        };
        if let Some(action) = action {
            let killed = self.combat_world().apply_kaiju_action(action, Some(player_id));
            self.handle_deaths(killed);
        }
    }

    // ---- Inbound damage ----

    pub fn apply_damage_to_monster(&mut self, amount: f32, instigator: Option<PlayerId>, causer: DamageCauser) {
        if let Some(kaiju) = self.kaiju.as_mut() {
            let mut ctx = MatchContext::new(&mut self.state, &mut self.roster);
            kaiju.apply_damage(amount, instigator, causer, &mut ctx);
        }
    }

    pub fn apply_damage_to_weak_point(&mut self, weak_point: WeakPointType, amount: f32, instigator: Option<PlayerId>) {
        if let Some(kaiju) = self.kaiju.as_mut() {
            let mut ctx = MatchContext::new(&mut self.state, &mut self.roster);
            kaiju.apply_damage_to_weak_point(weak_point, amount, instigator, &mut ctx);
        }
    }

    pub fn add_destruction_value(&mut self, amount: f32, instigator: Option<PlayerId>) {
        self.state.add_destruction_value(amount, instigator, &mut self.roster);
    }

    /// Break a building by id. Returns false if unknown or already broken.
    pub fn break_breakable(&mut self, breakable_id: u32, instigator: Option<PlayerId>) -> bool {
        let Some(breakable) = self.breakables.iter_mut().find(|b| b.id == breakable_id) else {
            return false;
        };
        let mut ctx = MatchContext::new(&mut self.state, &mut self.roster);
        breakable.break_apart(instigator, &mut ctx)
    }

    // ---- Simulation ----

    fn combat_world(&mut self) -> CombatWorld<'_> {
        CombatWorld {
            kaiju: self.kaiju.as_mut(),
            breakables: &mut self.breakables,
            state: &mut self.state,
            roster: &mut self.roster,
        }
    }

    /// Queue respawns for pawns that just died
    fn handle_deaths(&mut self, killed: Vec<PlayerId>) {
        for player_id in killed {
            info!(player_id = %player_id, "Player killed");
            self.request_respawn(player_id);
        }
    }

    fn simulate(&mut self, dt: f32) {
        let possessor = self.kaiju.as_ref().and_then(Kaiju::controller);

        // Pawns move and weapons cycle
        let mut shots = Vec::new();
        let mut weapon_events = Vec::new();
        let mut kaiju_input = None;
        for player in self.roster.iter_mut() {
            if !player.alive {
                continue;
            }
            if Some(player.player_id) == possessor {
                kaiju_input = Some(player.current_input.clone());
            } else {
                player.apply_input(dt);
            }
            if let Some(shot) = player.weapons.tick(dt, &mut weapon_events) {
                shots.push((player.player_id, shot, player.muzzle_location(), player.aim_direction()));
            }
        }
        for event in weapon_events {
            self.state.emit(event);
        }

        let mut kaiju_actions = Vec::new();
        if let (Some(kaiju), Some(input)) = (self.kaiju.as_mut(), kaiju_input) {
            kaiju_actions.extend(kaiju.drive(input.move_forward, input.move_right, input.aim_yaw, dt));
        }

        let mut killed = Vec::new();
        let mut new_projectiles = Vec::new();
        {
            let mut world = CombatWorld {
                kaiju: self.kaiju.as_mut(),
                breakables: &mut self.breakables,
                state: &mut self.state,
                roster: &mut self.roster,
            };

            for (shooter, shot, origin, direction) in shots {
                match shot.weapon.fire_mode {
                    FireMode::Hitscan => {
                        killed.extend(world.fire_hitscan(shooter, origin, direction, &shot.weapon));
                    }
                    FireMode::Projectile => {
                        new_projectiles.extend(Projectile::new(shooter, origin, direction, &shot.weapon));
                    }
                }
            }

            self.projectiles.retain_mut(|projectile| match world.step_projectile(projectile, dt) {
                ProjectileStep::Flying => true,
                ProjectileStep::Expired => false,
                ProjectileStep::Exploded { killed: victims, .. } => {
                    killed.extend(victims);
                    false
                }
            });

            // Kaiju AI
            let targets = world.roster.targets();
            if let Some(kaiju) = world.kaiju.as_deref_mut() {
                let mut ctx = MatchContext::new(&mut *world.state, &mut *world.roster);
                kaiju_actions.extend(kaiju.tick(dt, &targets, &mut self.rng, &mut ctx));
            }

            for action in kaiju_actions {
                killed.extend(world.apply_kaiju_action(action, possessor));
            }
        }
        self.projectiles.extend(new_projectiles);

        self.handle_deaths(killed);
    }
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub seed: u64,
    pub input_tx: mpsc::Sender<PlayerInput>,
    pub snapshot_tx: broadcast::Sender<ServerMsg>,
    pub player_count: Arc<AtomicUsize>,
    pub latest_snapshot: Arc<RwLock<Option<MatchSnapshot>>>,
}

impl MatchHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn latest_snapshot(&self) -> Option<MatchSnapshot> {
        self.latest_snapshot.read().clone()
    }
}

/// Registry of all active matches
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, handle: MatchHandle) {
        self.matches.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.remove(id).map(|(_, h)| h)
    }

    pub fn handles(&self) -> Vec<MatchHandle> {
        self.matches.iter().map(|m| m.value().clone()).collect()
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_players(&self) -> usize {
        self.matches
            .iter()
            .map(|m| m.value().player_count())
            .sum()
    }

    /// Find a match with free slots that is still accepting players
    pub fn find_available_match(&self, max_players: usize) -> Option<MatchHandle> {
        self.matches
            .iter()
            .find(|entry| {
                let handle = entry.value();
                let open = handle
                    .latest_snapshot()
                    .map_or(true, |s| s.phase != MatchPhase::PostRound);
                open && handle.player_count() < max_players
            })
            .map(|entry| entry.value().clone())
    }

    /// Create a match task and register it until the task finishes
    pub fn spawn_match(
        self: &Arc<Self>,
        config: Arc<MatchConfig>,
        max_players: usize,
        seed: Option<u64>,
    ) -> MatchHandle {
        let id = Uuid::new_v4();
        let seed = seed.unwrap_or_else(rand::random);
        let (game_match, handle) = GameMatch::new(id, seed, config, max_players);
        self.insert(handle.clone());

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            game_match.run().await;
            registry.remove(&id);
        });

        info!(match_id = %id, seed, "Match created");
        handle
    }

    /// The requested match, else any open match, else a fresh one
    pub fn find_or_spawn(
        self: &Arc<Self>,
        requested: Option<Uuid>,
        config: Arc<MatchConfig>,
        max_players: usize,
        seed: Option<u64>,
    ) -> Option<MatchHandle> {
        if let Some(id) = requested {
            return self.get(&id);
        }
        Some(
            self.find_available_match(max_players)
                .unwrap_or_else(|| self.spawn_match(config, max_players, seed)),
        )
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative game match
pub struct GameMatch {
    id: Uuid,
    seed: u64,
    controller: MatchController,
    input_rx: mpsc::Receiver<PlayerInput>,
    snapshot_tx: broadcast::Sender<ServerMsg>,
    snapshot_builder: SnapshotBuilder,
    player_count: Arc<AtomicUsize>,
    latest_snapshot: Arc<RwLock<Option<MatchSnapshot>>>,
}

impl GameMatch {
    /// Create a new match
    pub fn new(id: Uuid, seed: u64, config: Arc<MatchConfig>, max_players: usize) -> (Self, MatchHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (snapshot_tx, _) = broadcast::channel(64);
        let player_count = Arc::new(AtomicUsize::new(0));
        let latest_snapshot = Arc::new(RwLock::new(None));

        let handle = MatchHandle {
            id,
            seed,
            input_tx,
            snapshot_tx: snapshot_tx.clone(),
            player_count: player_count.clone(),
            latest_snapshot: latest_snapshot.clone(),
        };

        let game_match = Self {
            id,
            seed,
            controller: MatchController::new(config, seed, max_players),
            input_rx,
            snapshot_tx,
            snapshot_builder: SnapshotBuilder::from_rates(SIMULATION_TPS, SNAPSHOT_TPS),
            player_count,
            latest_snapshot,
        };

        (game_match, handle)
    }

    /// Run the authoritative tick loop
    pub async fn run(mut self) {
        info!(match_id = %self.id, "Match task started");

        let tick_duration = Duration::from_micros(1_000_000 / SIMULATION_TPS as u64);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            // Drain input queue
            self.process_inputs();

            // Run simulation tick
            let events = self.controller.tick(tick_delta());
            if !events.is_empty() {
                if events.iter().any(|e| matches!(e, GameEvent::MatchPhaseChanged { .. })) {
                    self.snapshot_builder.force_next();
                }
                let _ = self.snapshot_tx.send(ServerMsg::Events {
                    tick: self.controller.tick_count(),
                    events,
                });
            }

            // Build and broadcast snapshot if needed
            if self.snapshot_builder.should_send() {
                self.publish_snapshot();
            }

            // Check for match end
            if self.controller.phase() == MatchPhase::PostRound {
                self.publish_snapshot();
                self.broadcast_match_end();
                break;
            }

            // Check if all players disconnected
            if self.controller.roster().is_empty() && self.controller.phase() != MatchPhase::None {
                info!(match_id = %self.id, "All players left, closing match");
                return;
            }
        }

        // Keep results queryable for a while
        let linger = self.controller.config().post_round_linger;
        tokio::time::sleep(Duration::from_secs_f32(linger.max(0.0))).await;
        info!(match_id = %self.id, "Match task finished");
    }

    fn publish_snapshot(&mut self) {
        let snapshot = self.snapshot_builder.build(&self.controller);
        *self.latest_snapshot.write() = Some(snapshot.clone());
        let _ = self.snapshot_tx.send(ServerMsg::Snapshot {
            snapshot: Box::new(snapshot),
        });
    }

    fn broadcast_match_end(&self) {
        let awards = self.controller.awards().cloned().unwrap_or_default();
        let _ = self.snapshot_tx.send(ServerMsg::MatchEnd {
            reason: self.controller.end_reason(),
            scoreboard: self.controller.scoreboard(0, false),
            awards,
        });
    }

    /// Process all pending inputs from players
    fn process_inputs(&mut self) {
        while let Ok(input) = self.input_rx.try_recv() {
            let user_id = input.user_id;

            let msg = match input.msg {
                ClientMsg::JoinMatch {
                    display_name, local, ..
                } => {
                    self.handle_join(user_id, display_name, local);
                    continue;
                }
                ClientMsg::LeaveMatch => {
                    self.handle_leave(user_id);
                    continue;
                }
                msg => msg,
            };

            let Some(player_id) = self.controller.player_id_for(&user_id) else {
                debug!(user_id = %user_id, "Input from player not in match");
                continue;
            };

            match msg {
                ClientMsg::InputTick {
                    seq,
                    move_forward,
                    move_right,
                    aim_yaw,
                    aim_pitch,
                } => self.controller.handle_input(
                    player_id,
                    TickInput {
                        seq,
                        move_forward,
                        move_right,
                        aim_yaw,
                        aim_pitch,
                    },
                ),
                ClientMsg::StartFire => self.controller.start_fire(player_id),
                ClientMsg::StopFire => self.controller.stop_fire(player_id),
                ClientMsg::SwitchWeapon { index } => self.controller.switch_weapon(player_id, index),
                ClientMsg::StartReload => self.controller.start_reload(player_id),
                ClientMsg::RequestRespawn => {
                    self.controller.request_respawn(player_id);
                }
                ClientMsg::SetRole { role } => self.controller.set_player_role(player_id, role),
                ClientMsg::PossessKaiju => {
                    self.controller.possess_kaiju(player_id);
                }
                ClientMsg::ReleaseKaiju => self.controller.release_kaiju_from(player_id),
                ClientMsg::KaijuAttack { kind } => self.controller.kaiju_attack(player_id, kind),
                // Answered by the session
                ClientMsg::Ping { .. } => {}
                ClientMsg::JoinMatch { .. } | ClientMsg::LeaveMatch => {}
            }
        }
    }

    /// Handle player join request
    fn handle_join(&mut self, user_id: Uuid, display_name: Option<String>, local: bool) {
        let display_name =
            display_name.unwrap_or_else(|| format!("Player_{}", &user_id.simple().to_string()[..8]));

        match self.controller.join_player(user_id, display_name, local) {
            Ok(player_id) => {
                self.player_count
                    .store(self.controller.roster().len(), Ordering::Relaxed);

                if let Some(player) = self.controller.roster().get(player_id) {
                    let _ = self.snapshot_tx.send(ServerMsg::PlayerJoined {
                        player: player.info(),
                    });
                }

                let _ = self.snapshot_tx.send(ServerMsg::MatchJoined {
                    match_id: self.id,
                    user_id,
                    player_id,
                    seed: self.seed,
                    players: self.controller.roster().infos(),
                });

                info!(
                    match_id = %self.id,
                    user_id = %user_id,
                    player_id = %player_id,
                    player_count = self.controller.roster().len(),
                    "Player joined match"
                );
            }
            Err(e) => {
                warn!(match_id = %self.id, user_id = %user_id, error = %e, "Join refused");
                let _ = self.snapshot_tx.send(ServerMsg::JoinRefused {
                    user_id,
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    /// Handle player leave
    fn handle_leave(&mut self, user_id: Uuid) {
        if let Some(player) = self.controller.leave_player(&user_id) {
            self.player_count
                .store(self.controller.roster().len(), Ordering::Relaxed);

            let _ = self.snapshot_tx.send(ServerMsg::PlayerLeft {
                player_id: player.player_id,
                reason: "disconnected".to_string(),
            });

            info!(
                match_id = %self.id,
                user_id = %user_id,
                player_id = %player.player_id,
                "Player left match"
            );
        }
    }
}
