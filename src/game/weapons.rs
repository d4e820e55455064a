//! Weapons - catalog, tuning table and the per-player weapon holder

use serde::{Deserialize, Serialize};

use crate::ws::protocol::GameEvent;

use super::player::PlayerId;

/// How a weapon resolves its shots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireMode {
    /// Instant ray trace
    Hitscan,
    /// Spawns a travelling projectile that explodes on impact
    Projectile,
}

/// Weapon definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponStats {
    pub name: String,
    pub weapon_id: WeaponId,
    pub fire_mode: FireMode,
    /// Damage per hit
    pub damage: f32,
    /// Shots per second
    pub fire_rate: f32,
    pub range: f32,
    pub max_ammo: u32,
    /// Reload time (seconds)
    pub reload_time: f32,
    pub splash_radius: f32,
    pub splash_damage: f32,
    pub projectile_speed: f32,
}

impl WeaponStats {
    pub fn assault_rifle() -> Self {
        Self {
            name: "Assault Rifle".to_string(),
            weapon_id: WeaponId::Rifle,
            fire_mode: FireMode::Hitscan,
            damage: 25.0,
            fire_rate: 10.0,
            range: 10_000.0,
            max_ammo: 30,
            reload_time: 2.0,
            splash_radius: 0.0,
            splash_damage: 0.0,
            projectile_speed: 0.0,
        }
    }

    pub fn rocket_launcher() -> Self {
        Self {
            name: "Rocket Launcher".to_string(),
            weapon_id: WeaponId::RocketLauncher,
            fire_mode: FireMode::Projectile,
            damage: 100.0,
            fire_rate: 1.0,
            range: 15_000.0,
            max_ammo: 4,
            reload_time: 3.0,
            splash_radius: 400.0,
            splash_damage: 75.0,
            projectile_speed: 2000.0,
        }
    }

    /// Seconds between shots
    pub fn fire_interval(&self) -> f32 {
        if self.fire_rate > 0.0 {
            1.0 / self.fire_rate
        } else {
            0.0
        }
    }

    /// Override fire rate, damage and splash radius from a tuning entry
    pub fn apply_tuning(&mut self, tuning: &WeaponTuning) {
        self.fire_rate = tuning.fire_rate.max(0.0);
        self.damage = tuning.damage.max(0.0);
        self.splash_radius = tuning.splash_radius.max(0.0);
    }
}

/// Stable weapon identity used by the tuning table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponId {
    Rifle,
    RocketLauncher,
}

/// Per-weapon tuning. Feedback fields are hints for clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeaponTuning {
    pub weapon_id: WeaponId,
    pub fire_rate: f32,
    pub damage: f32,
    pub splash_radius: f32,
    pub camera_shake_intensity: f32,
    pub ragdoll_impulse_strength: f32,
    /// 0..1 hint of how much the weapon favors city damage
    pub destruction_bias: f32,
}

impl WeaponTuning {
    pub fn rifle() -> Self {
        Self {
            weapon_id: WeaponId::Rifle,
            fire_rate: 12.0,
            damage: 12.0,
            splash_radius: 0.0,
            camera_shake_intensity: 0.2,
            ragdoll_impulse_strength: 900.0,
            destruction_bias: 0.15,
        }
    }

    pub fn rocket_launcher() -> Self {
        Self {
            weapon_id: WeaponId::RocketLauncher,
            fire_rate: 1.0,
            damage: 120.0,
            splash_radius: 450.0,
            camera_shake_intensity: 1.0,
            ragdoll_impulse_strength: 6000.0,
            destruction_bias: 0.75,
        }
    }

    /// The tuned table shipped with the game
    pub fn reference_table() -> Vec<Self> {
        vec![Self::rifle(), Self::rocket_launcher()]
    }

    pub fn find(table: &[WeaponTuning], weapon_id: WeaponId) -> Option<&WeaponTuning> {
        table.iter().find(|t| t.weapon_id == weapon_id)
    }
}

/// Rifle plus rocket launcher, with any matching tuning applied
pub fn default_loadout(tuning: &[WeaponTuning]) -> Vec<WeaponStats> {
    let mut loadout = vec![WeaponStats::assault_rifle(), WeaponStats::rocket_launcher()];
    for weapon in &mut loadout {
        if let Some(entry) = WeaponTuning::find(tuning, weapon.weapon_id) {
            weapon.apply_tuning(entry);
        }
    }
    loadout
}

/// A shot the holder wants resolved this tick
#[derive(Debug, Clone)]
pub struct ShotRequest {
    pub weapon_index: usize,
    pub weapon: WeaponStats,
}

/// Per-player weapon state
#[derive(Debug, Clone)]
pub struct WeaponHolder {
    owner: PlayerId,
    weapons: Vec<WeaponStats>,
    current_index: usize,
    current_ammo: u32,
    wants_to_fire: bool,
    fire_cooldown: f32,
    reload_timer: f32,
    is_reloading: bool,
}

impl WeaponHolder {
    pub fn new(owner: PlayerId, weapons: Vec<WeaponStats>) -> Self {
        let current_ammo = weapons.first().map(|w| w.max_ammo).unwrap_or(0);
        Self {
            owner,
            weapons,
            current_index: 0,
            current_ammo,
            wants_to_fire: false,
            fire_cooldown: 0.0,
            reload_timer: 0.0,
            is_reloading: false,
        }
    }

    pub fn current_weapon(&self) -> Option<&WeaponStats> {
        self.weapons.get(self.current_index)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_ammo(&self) -> u32 {
        self.current_ammo
    }

    pub fn is_reloading(&self) -> bool {
        self.is_reloading
    }

    pub fn wants_to_fire(&self) -> bool {
        self.wants_to_fire
    }

    pub fn weapon_count(&self) -> usize {
        self.weapons.len()
    }

    pub fn start_fire(&mut self) {
        self.wants_to_fire = true;
    }

    pub fn stop_fire(&mut self) {
        self.wants_to_fire = false;
    }

    /// Full ammo, no reload, no cooldown, trigger released
    pub fn reset(&mut self) {
        self.current_ammo = self.current_weapon().map(|w| w.max_ammo).unwrap_or(0);
        self.is_reloading = false;
        self.reload_timer = 0.0;
        self.fire_cooldown = 0.0;
        self.wants_to_fire = false;
    }

    /// Switch slots. Invalid or current index is a no-op.
    pub fn switch_to(&mut self, index: usize, events: &mut Vec<GameEvent>) {
        if index >= self.weapons.len() || index == self.current_index {
            return;
        }

        self.current_index = index;
        self.current_ammo = self.weapons[index].max_ammo;
        self.is_reloading = false;
        self.reload_timer = 0.0;
        self.fire_cooldown = 0.0;

        events.push(GameEvent::WeaponSwitched {
            player_id: self.owner,
            weapon_index: index,
        });
    }

    pub fn switch_to_next(&mut self, events: &mut Vec<GameEvent>) {
        if self.weapons.len() < 2 {
            return;
        }
        let next = (self.current_index + 1) % self.weapons.len();
        self.switch_to(next, events);
    }

    /// Begin reloading. No-op while reloading or with a full magazine.
    pub fn start_reload(&mut self, events: &mut Vec<GameEvent>) {
        let Some(weapon) = self.weapons.get(self.current_index) else {
            return;
        };
        if self.is_reloading || self.current_ammo >= weapon.max_ammo {
            return;
        }

        self.is_reloading = true;
        self.reload_timer = weapon.reload_time;
        events.push(GameEvent::ReloadStarted {
            player_id: self.owner,
            duration: weapon.reload_time,
        });
    }

    /// Advance timers and fire at most once
    pub fn tick(&mut self, dt: f32, events: &mut Vec<GameEvent>) -> Option<ShotRequest> {
        if self.fire_cooldown > 0.0 {
            self.fire_cooldown -= dt;
        }

        if self.is_reloading {
            self.reload_timer -= dt;
            if self.reload_timer <= 0.0 {
                self.finish_reload(events);
            }
        }

        if self.wants_to_fire && !self.is_reloading && self.fire_cooldown <= 0.0 {
            return self.fire(events);
        }
        None
    }

    fn finish_reload(&mut self, events: &mut Vec<GameEvent>) {
        self.is_reloading = false;
        self.reload_timer = 0.0;
        self.current_ammo = self.current_weapon().map(|w| w.max_ammo).unwrap_or(0);
        events.push(GameEvent::ReloadFinished {
            player_id: self.owner,
        });
    }

    fn fire(&mut self, events: &mut Vec<GameEvent>) -> Option<ShotRequest> {
        if self.current_ammo == 0 {
            self.start_reload(events);
            return None;
        }

        let weapon = self.weapons.get(self.current_index)?.clone();
        self.current_ammo -= 1;
        self.fire_cooldown = weapon.fire_interval();

        events.push(GameEvent::WeaponFired {
            player_id: self.owner,
            weapon_index: self.current_index,
            ammo_remaining: self.current_ammo,
        });

        Some(ShotRequest {
            weapon_index: self.current_index,
            weapon,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.1;

    fn holder() -> WeaponHolder {
        WeaponHolder::new(PlayerId(1), default_loadout(&[]))
    }

    #[test]
    fn test_fire_respects_cooldown() {
        let mut weapons = holder();
        let mut events = Vec::new();
        weapons.start_fire();

        assert!(weapons.tick(0.01, &mut events).is_some());
        // Rifle interval is 0.1s
        assert!(weapons.tick(0.05, &mut events).is_none());
        assert!(weapons.tick(0.06, &mut events).is_some());
        assert_eq!(weapons.current_ammo(), 28);
    }

    #[test]
    fn test_no_fire_without_intent() {
        let mut weapons = holder();
        let mut events = Vec::new();
        assert!(weapons.tick(DT, &mut events).is_none());
        assert!(events.is_empty());
    }

    #[test]
    fn test_empty_magazine_starts_reload() {
        let mut weapons = holder();
        let mut events = Vec::new();
        weapons.start_fire();
        for _ in 0..30 {
            assert!(weapons.tick(DT, &mut events).is_some());
        }
        assert_eq!(weapons.current_ammo(), 0);

        assert!(weapons.tick(DT, &mut events).is_none());
        assert!(weapons.is_reloading());
        assert!(matches!(events.last(), Some(GameEvent::ReloadStarted { duration, .. }) if *duration == 2.0));

        // 2s reload
        events.clear();
        for _ in 0..19 {
            weapons.tick(DT, &mut events);
        }
        assert!(weapons.is_reloading());
        let shot = weapons.tick(DT + 0.01, &mut events);
        assert!(!weapons.is_reloading());
        assert!(events.contains(&GameEvent::ReloadFinished { player_id: PlayerId(1) }));
        // Fires in the same tick the reload completes
        assert!(shot.is_some());
        assert_eq!(weapons.current_ammo(), 29);
    }

    #[test]
    fn test_reload_when_full_is_noop() {
        let mut weapons = holder();
        let mut events = Vec::new();
        weapons.start_reload(&mut events);
        assert!(!weapons.is_reloading());
        assert!(events.is_empty());
    }

    #[test]
    fn test_switch_resets_ammo_and_cancels_reload() {
        let mut weapons = holder();
        let mut events = Vec::new();
        weapons.start_fire();
        weapons.tick(DT, &mut events);
        weapons.stop_fire();
        weapons.start_reload(&mut events);
        assert!(weapons.is_reloading());

        events.clear();
        weapons.switch_to(1, &mut events);
        assert_eq!(weapons.current_index(), 1);
        assert_eq!(weapons.current_ammo(), 4);
        assert!(!weapons.is_reloading());
        assert_eq!(
            events,
            vec![GameEvent::WeaponSwitched {
                player_id: PlayerId(1),
                weapon_index: 1
            }]
        );
    }

    #[test]
    fn test_switch_to_same_or_invalid_is_noop() {
        let mut weapons = holder();
        let mut events = Vec::new();
        weapons.switch_to(0, &mut events);
        weapons.switch_to(9, &mut events);
        assert!(events.is_empty());
        assert_eq!(weapons.current_index(), 0);
    }

    #[test]
    fn test_switch_to_next_cycles() {
        let mut weapons = holder();
        let mut events = Vec::new();
        weapons.switch_to_next(&mut events);
        assert_eq!(weapons.current_index(), 1);
        weapons.switch_to_next(&mut events);
        assert_eq!(weapons.current_index(), 0);
    }

    #[test]
    fn test_tuning_overrides_matching_slot() {
        let loadout = default_loadout(&WeaponTuning::reference_table());
        assert_eq!(loadout[0].damage, 12.0);
        assert_eq!(loadout[0].fire_rate, 12.0);
        assert_eq!(loadout[1].damage, 120.0);
        assert_eq!(loadout[1].splash_radius, 450.0);
        // Untuned fields keep their catalog values
        assert_eq!(loadout[1].splash_damage, 75.0);
        assert_eq!(loadout[1].max_ammo, 4);
    }

    #[test]
    fn test_weapon_fired_reports_ammo() {
        let mut weapons = holder();
        let mut events = Vec::new();
        weapons.start_fire();
        weapons.tick(DT, &mut events);
        assert_eq!(
            events,
            vec![GameEvent::WeaponFired {
                player_id: PlayerId(1),
                weapon_index: 0,
                ammo_remaining: 29
            }]
        );
    }
}
