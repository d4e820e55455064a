//! Player sessions - identity, role, pawn, weapons and score

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

use crate::ws::protocol::{PlayerInfo, PlayerRole};

use super::physics::{Aabb, PhysicsSystem};
use super::score::{PlayerScoreData, ScoreLine};
use super::weapons::{WeaponHolder, WeaponStats};
use super::TickInput;

/// Default pawn health
pub const PLAYER_MAX_HEALTH: f32 = 100.0;

/// Ground movement speed (units per second)
pub const PLAYER_WALK_SPEED: f32 = 600.0;

/// Pawn collision half extents (capsule approximated by a box)
pub const PLAYER_HALF_EXTENTS: Vec3 = Vec3::new(35.0, 35.0, 90.0);

/// Match-local player id, assigned in join order starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub i32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Player state in a match (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub player_id: PlayerId,
    pub user_id: Uuid,
    pub display_name: String,
    pub role: PlayerRole,
    /// Split-screen seat on the connecting machine
    pub is_local: bool,
    pub score: PlayerScoreData,

    // Pawn
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub health: f32,
    pub max_health: f32,
    pub alive: bool,

    // Combat
    pub weapons: WeaponHolder,

    // Input tracking
    pub last_input_seq: u32,
    pub current_input: TickInput,
}

impl PlayerState {
    pub fn new(
        player_id: PlayerId,
        user_id: Uuid,
        display_name: String,
        is_local: bool,
        spawn: Vec3,
        loadout: Vec<WeaponStats>,
    ) -> Self {
        Self {
            player_id,
            user_id,
            display_name,
            role: PlayerRole::Human,
            is_local,
            score: PlayerScoreData::default(),
            position: spawn,
            yaw: 0.0,
            pitch: 0.0,
            health: PLAYER_MAX_HEALTH,
            max_health: PLAYER_MAX_HEALTH,
            alive: true,
            weapons: WeaponHolder::new(player_id, loadout),
            last_input_seq: 0,
            current_input: TickInput::default(),
        }
    }

    /// Apply generic damage. Returns true only on the hit that kills the pawn.
    pub fn take_damage(&mut self, amount: f32) -> bool {
        if !self.alive {
            return false;
        }

        self.health = (self.health - amount.max(0.0)).max(0.0);
        if self.health <= 0.0 {
            self.alive = false;
            self.weapons.stop_fire();
            return true;
        }
        false
    }

    /// Restore the pawn at a spawn point with full health and ammo
    pub fn respawn_at(&mut self, location: Vec3) {
        self.position = location;
        self.health = self.max_health;
        self.alive = true;
        self.weapons.reset();
    }

    /// Move and aim from the latest input
    pub fn apply_input(&mut self, dt: f32) {
        let input = &self.current_input;
        self.yaw = input.aim_yaw;
        self.pitch = input.aim_pitch;
        self.position = PhysicsSystem::move_pawn(
            self.position,
            self.yaw,
            input.move_forward,
            input.move_right,
            PLAYER_WALK_SPEED,
            dt,
        );
    }

    pub fn muzzle_location(&self) -> Vec3 {
        self.position + PhysicsSystem::forward_2d(self.yaw) * 100.0 + Vec3::new(0.0, 0.0, 50.0)
    }

    pub fn aim_direction(&self) -> Vec3 {
        PhysicsSystem::aim_direction(self.yaw, self.pitch)
    }

    pub fn hit_volume(&self) -> Aabb {
        Aabb::new(self.position, PLAYER_HALF_EXTENTS)
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            player_id: self.player_id,
            display_name: self.display_name.clone(),
            role: self.role,
            is_local: self.is_local,
        }
    }

    pub fn score_line(&self) -> ScoreLine<'_> {
        ScoreLine {
            player_id: self.player_id,
            name: &self.display_name,
            role: self.role,
            is_local: self.is_local,
            score: &self.score,
        }
    }
}

/// Position of a living pawn, as seen by the kaiju AI
#[derive(Debug, Clone, Copy)]
pub struct TargetInfo {
    pub player_id: PlayerId,
    pub position: Vec3,
}

/// Players in a match, iterated in join order
#[derive(Debug, Default)]
pub struct Roster {
    players: BTreeMap<PlayerId, PlayerState>,
    by_user: HashMap<Uuid, PlayerId>,
    next_id: i32,
}

impl Roster {
    pub fn new() -> Self {
        Self {
            players: BTreeMap::new(),
            by_user: HashMap::new(),
            next_id: 1,
        }
    }

    /// Add a player. Returns the existing id if the user is already present.
    pub fn join(
        &mut self,
        user_id: Uuid,
        display_name: String,
        is_local: bool,
        spawn: Vec3,
        loadout: Vec<WeaponStats>,
    ) -> PlayerId {
        if let Some(id) = self.by_user.get(&user_id) {
            return *id;
        }

        let player_id = PlayerId(self.next_id.max(1));
        self.next_id = player_id.0 + 1;

        let player = PlayerState::new(player_id, user_id, display_name, is_local, spawn, loadout);
        self.players.insert(player_id, player);
        self.by_user.insert(user_id, player_id);
        player_id
    }

    pub fn leave(&mut self, user_id: &Uuid) -> Option<PlayerState> {
        let id = self.by_user.remove(user_id)?;
        self.players.remove(&id)
    }

    pub fn get(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut PlayerState> {
        self.players.get_mut(&id)
    }

    pub fn id_for_user(&self, user_id: &Uuid) -> Option<PlayerId> {
        self.by_user.get(user_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PlayerState> {
        self.players.values_mut()
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Run a score update for the instigator. Missing instigators are skipped.
    pub fn credit(&mut self, instigator: Option<PlayerId>, update: impl FnOnce(&mut PlayerScoreData)) {
        if let Some(player) = instigator.and_then(|id| self.players.get_mut(&id)) {
            update(&mut player.score);
        }
    }

    /// Living pawns the kaiju can chase
    pub fn targets(&self) -> Vec<TargetInfo> {
        self.players
            .values()
            .filter(|p| p.alive)
            .map(|p| TargetInfo {
                player_id: p.player_id,
                position: p.position,
            })
            .collect()
    }

    pub fn score_lines(&self) -> impl Iterator<Item = ScoreLine<'_>> {
        self.players.values().map(PlayerState::score_line)
    }

    pub fn infos(&self) -> Vec<PlayerInfo> {
        self.players.values().map(PlayerState::info).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::weapons::default_loadout;

    fn join(roster: &mut Roster, name: &str) -> PlayerId {
        roster.join(Uuid::new_v4(), name.to_string(), false, Vec3::ZERO, default_loadout(&[]))
    }

    #[test]
    fn test_ids_assigned_in_join_order() {
        let mut roster = Roster::new();
        let a = join(&mut roster, "a");
        let b = join(&mut roster, "b");
        assert_eq!(a, PlayerId(1));
        assert_eq!(b, PlayerId(2));
        let names: Vec<&str> = roster.iter().map(|p| p.display_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_rejoin_returns_same_id() {
        let mut roster = Roster::new();
        let user = Uuid::new_v4();
        let first = roster.join(user, "a".into(), false, Vec3::ZERO, default_loadout(&[]));
        let second = roster.join(user, "a".into(), false, Vec3::ZERO, default_loadout(&[]));
        assert_eq!(first, second);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_new_player_defaults_to_human() {
        let mut roster = Roster::new();
        let id = join(&mut roster, "a");
        assert_eq!(roster.get(id).unwrap().role, PlayerRole::Human);
    }

    #[test]
    fn test_take_damage_kills_once() {
        let mut roster = Roster::new();
        let id = join(&mut roster, "a");
        let player = roster.get_mut(id).unwrap();
        assert!(!player.take_damage(60.0));
        assert!(player.take_damage(60.0));
        assert_eq!(player.health, 0.0);
        assert!(!player.take_damage(60.0));
        assert!(!player.alive);
    }

    #[test]
    fn test_respawn_restores_health() {
        let mut roster = Roster::new();
        let id = join(&mut roster, "a");
        let player = roster.get_mut(id).unwrap();
        player.take_damage(500.0);
        player.respawn_at(Vec3::new(10.0, 0.0, 0.0));
        assert!(player.alive);
        assert_eq!(player.health, PLAYER_MAX_HEALTH);
        assert_eq!(player.position.x, 10.0);
    }

    #[test]
    fn test_credit_skips_missing_instigator() {
        let mut roster = Roster::new();
        let id = join(&mut roster, "a");
        roster.credit(None, |s| s.add_kaiju_damage(10.0));
        roster.credit(Some(PlayerId(99)), |s| s.add_kaiju_damage(10.0));
        roster.credit(Some(id), |s| s.add_kaiju_damage(10.0));
        assert_eq!(roster.get(id).unwrap().score.kaiju_damage_dealt, 10.0);
    }

    #[test]
    fn test_targets_only_living_pawns() {
        let mut roster = Roster::new();
        let a = join(&mut roster, "a");
        let b = join(&mut roster, "b");
        roster.get_mut(a).unwrap().take_damage(1000.0);
        let targets = roster.targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].player_id, b);
    }
}
