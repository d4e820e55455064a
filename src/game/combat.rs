//! Combat system - traces, hit routing, splash damage and projectiles

use glam::Vec3;
use std::collections::HashSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ws::protocol::GameEvent;

use super::destruction::Breakable;
use super::monster::{weak_point_for_region, DamageCauser, HitRegion, Kaiju, KaijuAction};
use super::physics::{PhysicsSystem, GRAVITY_Z};
use super::player::{PlayerId, Roster};
use super::state::{MatchContext, MatchState};
use super::weapons::WeaponStats;

/// Projectile collision sphere radius
pub const PROJECTILE_RADIUS: f32 = 15.0;

/// Fraction of world gravity applied to projectiles
pub const PROJECTILE_GRAVITY_SCALE: f32 = 0.1;

/// Seconds before an unexploded projectile is discarded
pub const PROJECTILE_LIFETIME: f32 = 5.0;

/// What a trace or explosion touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HitTarget {
    Kaiju(HitRegion),
    /// Index into the match's breakable list
    Breakable(usize),
    Player(PlayerId),
    /// Static world geometry (the ground plane)
    World,
}

/// Identity of a damageable thing, used to process each one once per explosion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ActorKey {
    Kaiju,
    Breakable(usize),
    Player(PlayerId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceHit {
    pub target: HitTarget,
    pub location: Vec3,
    pub distance: f32,
}

/// Active projectile in the game
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: Uuid,
    pub owner: PlayerId,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Carried for clients; only splash damage is applied on impact
    pub damage: f32,
    pub splash_radius: f32,
    pub splash_damage: f32,
    pub lifetime_remaining: f32,
}

impl Projectile {
    /// Create a new projectile. None when the weapon has no usable speed.
    pub fn new(owner: PlayerId, origin: Vec3, direction: Vec3, stats: &WeaponStats) -> Option<Self> {
        if stats.projectile_speed <= 0.0 {
            warn!(weapon = %stats.name, "Weapon has no projectile speed, shot dropped");
            return None;
        }

        Some(Self {
            id: Uuid::new_v4(),
            owner,
            position: origin,
            velocity: direction.normalize_or_zero() * stats.projectile_speed,
            damage: stats.damage,
            splash_radius: stats.splash_radius,
            splash_damage: stats.splash_damage,
            lifetime_remaining: PROJECTILE_LIFETIME,
        })
    }
}

/// What happened to a projectile during one step
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectileStep {
    Flying,
    Expired,
    Exploded {
        location: Vec3,
        killed: Vec<PlayerId>,
    },
}

/// Mutable view of everything combat can touch during a tick
pub struct CombatWorld<'a> {
    pub kaiju: Option<&'a mut Kaiju>,
    pub breakables: &'a mut [Breakable],
    pub state: &'a mut MatchState,
    pub roster: &'a mut Roster,
}

impl<'a> CombatWorld<'a> {
    /// Sweep a sphere of `radius` along a normalized ray and return the first blocking hit.
    ///
    /// On the kaiju, an active weak point volume crossed by the ray wins over the body.
    pub fn trace(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        radius: f32,
        ignore: Option<PlayerId>,
    ) -> Option<TraceHit> {
        let mut best: Option<(HitTarget, f32)> = None;
        let mut consider = |target: HitTarget, distance: f32| {
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((target, distance));
            }
        };

        if let Some(kaiju) = self.kaiju.as_deref() {
            let volumes = kaiju.hit_volumes();
            let body_hit = volumes
                .iter()
                .find(|v| v.region == HitRegion::Body)
                .and_then(|v| v.bounds.expanded(radius).ray_intersect(origin, direction, max_distance));

            if let Some(body_distance) = body_hit {
                // Nearest weak point crossed anywhere along the ray, not the first blocking volume
                let region = volumes
                    .iter()
                    .filter(|v| v.region != HitRegion::Body)
                    .filter_map(|v| {
                        v.bounds
                            .expanded(radius)
                            .ray_intersect(origin, direction, max_distance)
                            .map(|d| (v.region, d))
                    })
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(region, _)| region)
                    .unwrap_or(HitRegion::Body);
                consider(HitTarget::Kaiju(region), body_distance);
            }
        }

        for (index, breakable) in self.breakables.iter().enumerate() {
            if breakable.is_broken() {
                continue;
            }
            if let Some(d) = breakable
                .hit_volume()
                .expanded(radius)
                .ray_intersect(origin, direction, max_distance)
            {
                consider(HitTarget::Breakable(index), d);
            }
        }

        for player in self.roster.iter() {
            if !player.alive || Some(player.player_id) == ignore {
                continue;
            }
            if let Some(d) = player
                .hit_volume()
                .expanded(radius)
                .ray_intersect(origin, direction, max_distance)
            {
                consider(HitTarget::Player(player.player_id), d);
            }
        }

        // Ground plane at z = 0
        if direction.z < 0.0 && origin.z >= radius {
            let d = (origin.z - radius) / -direction.z;
            if d <= max_distance {
                consider(HitTarget::World, d);
            }
        }

        best.map(|(target, distance)| TraceHit {
            target,
            location: origin + direction * distance,
            distance,
        })
    }

    /// Apply damage to whatever was hit. Returns the player killed by it, if any.
    pub fn route_hit(
        &mut self,
        target: HitTarget,
        damage: f32,
        instigator: Option<PlayerId>,
        causer: DamageCauser,
    ) -> Option<PlayerId> {
        match target {
            HitTarget::Kaiju(region) => {
                if let Some(kaiju) = self.kaiju.as_deref_mut() {
                    let mut ctx = MatchContext::new(&mut *self.state, &mut *self.roster);
                    match weak_point_for_region(region) {
                        Some(weak_point) => {
                            kaiju.apply_damage_to_weak_point(weak_point, damage, instigator, &mut ctx)
                        }
                        None => kaiju.apply_damage(damage, instigator, causer, &mut ctx),
                    }
                }
                None
            }
            HitTarget::Breakable(index) => {
                if let Some(breakable) = self.breakables.get_mut(index) {
                    let mut ctx = MatchContext::new(&mut *self.state, &mut *self.roster);
                    breakable.break_apart(instigator, &mut ctx);
                }
                None
            }
            HitTarget::Player(player_id) => self.damage_player(player_id, damage),
            HitTarget::World => None,
        }
    }

    fn damage_player(&mut self, player_id: PlayerId, damage: f32) -> Option<PlayerId> {
        let player = self.roster.get_mut(player_id)?;
        if !player.take_damage(damage) {
            return None;
        }
        self.state.emit(GameEvent::PlayerDied { player_id });
        Some(player_id)
    }

    /// Resolve an instant shot from `origin` along `direction`
    pub fn fire_hitscan(
        &mut self,
        shooter: PlayerId,
        origin: Vec3,
        direction: Vec3,
        weapon: &WeaponStats,
    ) -> Option<PlayerId> {
        let direction = direction.normalize_or_zero();
        if direction == Vec3::ZERO {
            return None;
        }

        let hit = self.trace(origin, direction, weapon.range, 0.0, Some(shooter))?;
        debug!(shooter = %shooter, target = ?hit.target, distance = hit.distance, "Hitscan hit");
        self.route_hit(hit.target, weapon.damage, Some(shooter), DamageCauser::Hitscan)
    }

    /// Damage everything within `radius` of `center` once, scaled by distance.
    /// The owner is never hit by their own explosion.
    pub fn apply_splash_damage(
        &mut self,
        center: Vec3,
        radius: f32,
        damage: f32,
        instigator: Option<PlayerId>,
    ) -> Vec<PlayerId> {
        if radius <= 0.0 {
            return Vec::new();
        }

        let mut processed: HashSet<ActorKey> = HashSet::new();
        let mut affected: Vec<(HitTarget, f32)> = Vec::new();

        if let Some(kaiju) = self.kaiju.as_deref() {
            // Several kaiju volumes can overlap the blast; the kaiju counts once
            for volume in kaiju.hit_volumes() {
                if volume.bounds.intersects_sphere(center, radius) && processed.insert(ActorKey::Kaiju) {
                    affected.push((HitTarget::Kaiju(HitRegion::Body), center.distance(kaiju.position)));
                }
            }
        }

        for (index, breakable) in self.breakables.iter().enumerate() {
            if !breakable.is_broken()
                && breakable.hit_volume().intersects_sphere(center, radius)
                && processed.insert(ActorKey::Breakable(index))
            {
                affected.push((HitTarget::Breakable(index), center.distance(breakable.position)));
            }
        }

        for player in self.roster.iter() {
            if !player.alive || Some(player.player_id) == instigator {
                continue;
            }
            if player.hit_volume().intersects_sphere(center, radius)
                && processed.insert(ActorKey::Player(player.player_id))
            {
                affected.push((HitTarget::Player(player.player_id), center.distance(player.position)));
            }
        }

        affected
            .into_iter()
            .filter_map(|(target, distance)| {
                let scaled = damage * PhysicsSystem::falloff_scale(distance, radius);
                self.route_hit(target, scaled, instigator, DamageCauser::Splash)
            })
            .collect()
    }

    /// Move a projectile one step; explode it on the first thing it touches
    pub fn step_projectile(&mut self, projectile: &mut Projectile, dt: f32) -> ProjectileStep {
        projectile.velocity.z += GRAVITY_Z * PROJECTILE_GRAVITY_SCALE * dt;
        let travel = projectile.velocity * dt;
        let distance = travel.length();

        if distance > 0.0 {
            let direction = travel / distance;
            if let Some(hit) = self.trace(
                projectile.position,
                direction,
                distance,
                PROJECTILE_RADIUS,
                Some(projectile.owner),
            ) {
                projectile.position = hit.location;
                return self.explode(projectile, hit.location);
            }
        }

        projectile.position += travel;
        projectile.lifetime_remaining -= dt;
        if projectile.lifetime_remaining <= 0.0 {
            ProjectileStep::Expired
        } else {
            ProjectileStep::Flying
        }
    }

    fn explode(&mut self, projectile: &Projectile, location: Vec3) -> ProjectileStep {
        self.state.emit(GameEvent::ProjectileExploded {
            projectile_id: projectile.id,
            location,
        });
        let killed = self.apply_splash_damage(
            location,
            projectile.splash_radius,
            projectile.splash_damage,
            Some(projectile.owner),
        );
        ProjectileStep::Exploded { location, killed }
    }

    /// Apply a kaiju attack or crush. Returns players killed by it.
    pub fn apply_kaiju_action(&mut self, action: KaijuAction, instigator: Option<PlayerId>) -> Vec<PlayerId> {
        match action {
            KaijuAction::Attack {
                kind,
                center,
                radius,
                damage,
                destruction_radius,
            } => {
                self.state.emit(GameEvent::KaijuAttack { kind, center });

                let victims: Vec<(PlayerId, f32)> = self
                    .roster
                    .iter()
                    .filter(|p| p.alive && Some(p.player_id) != instigator)
                    .filter_map(|p| {
                        let distance = center.distance(p.position);
                        (distance <= radius).then(|| (p.player_id, damage * PhysicsSystem::falloff_scale(distance, radius)))
                    })
                    .collect();

                let killed = victims
                    .into_iter()
                    .filter_map(|(player_id, amount)| self.damage_player(player_id, amount))
                    .collect();

                self.crush(center, destruction_radius, instigator);
                killed
            }
            KaijuAction::Crush { center, radius } => {
                self.crush(center, radius, instigator);
                Vec::new()
            }
        }
    }

    fn crush(&mut self, center: Vec3, radius: f32, instigator: Option<PlayerId>) {
        let mut ctx = MatchContext::new(&mut *self.state, &mut *self.roster);
        for breakable in self.breakables.iter_mut() {
            if !breakable.is_broken() && breakable.position.distance(center) <= radius {
                breakable.break_apart(instigator, &mut ctx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::monster::KaijuTuning;
    use crate::game::score::ScoreWeights;
    use crate::game::weapons::default_loadout;
    use crate::ws::protocol::WeakPointType;

    struct Fixture {
        state: MatchState,
        roster: Roster,
        kaiju: Option<Kaiju>,
        breakables: Vec<Breakable>,
        shooter: PlayerId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut roster = Roster::new();
            let shooter = roster.join(
                Uuid::new_v4(),
                "shooter".into(),
                false,
                Vec3::new(-2000.0, 0.0, 90.0),
                default_loadout(&[]),
            );
            Self {
                state: MatchState::new(10_000.0, ScoreWeights::default(), [100.0, 100.0, 200.0]),
                roster,
                kaiju: Some(Kaiju::new(Vec3::new(0.0, 0.0, 500.0), KaijuTuning::default())),
                breakables: Vec::new(),
                shooter,
            }
        }

        fn world(&mut self) -> CombatWorld<'_> {
            CombatWorld {
                kaiju: self.kaiju.as_mut(),
                breakables: &mut self.breakables,
                state: &mut self.state,
                roster: &mut self.roster,
            }
        }

        fn kaiju(&self) -> &Kaiju {
            self.kaiju.as_ref().unwrap()
        }

        fn add_player(&mut self, name: &str, position: Vec3) -> PlayerId {
            self.roster
                .join(Uuid::new_v4(), name.into(), false, position, default_loadout(&[]))
        }
    }

    fn rifle() -> WeaponStats {
        WeaponStats::assault_rifle()
    }

    #[test]
    fn test_hitscan_on_leg_routes_to_weak_point() {
        let mut f = Fixture::new();
        let shooter = f.shooter;
        // Left leg sits at y = -100, z = 300
        f.world()
            .fire_hitscan(shooter, Vec3::new(-2000.0, -100.0, 300.0), Vec3::X, &rifle());

        assert_eq!(f.kaiju().weak_point(WeakPointType::LeftLeg).current_health, 75.0);
        assert_eq!(f.kaiju().health(), 5000.0 - 12.5);
        assert_eq!(f.roster.get(shooter).unwrap().score.kaiju_damage_dealt, 12.5);
    }

    #[test]
    fn test_hitscan_on_hidden_head_hits_body() {
        let mut f = Fixture::new();
        let shooter = f.shooter;
        f.world()
            .fire_hitscan(shooter, Vec3::new(-2000.0, 0.0, 900.0), Vec3::X, &rifle());

        assert_eq!(f.kaiju().weak_point(WeakPointType::Head).current_health, 200.0);
        assert_eq!(f.kaiju().health(), 4975.0);
    }

    #[test]
    fn test_hitscan_out_of_range_misses() {
        let mut f = Fixture::new();
        let shooter = f.shooter;
        let mut weapon = rifle();
        weapon.range = 500.0;
        f.world()
            .fire_hitscan(shooter, Vec3::new(-2000.0, 0.0, 500.0), Vec3::X, &weapon);
        assert_eq!(f.kaiju().health(), 5000.0);
    }

    #[test]
    fn test_hitscan_breaks_building_and_credits_collateral() {
        let mut f = Fixture::new();
        let shooter = f.shooter;
        f.kaiju = None;
        f.breakables
            .push(Breakable::new(3, Vec3::new(0.0, 0.0, 200.0), Vec3::splat(200.0), 100.0));

        f.world()
            .fire_hitscan(shooter, Vec3::new(-2000.0, 0.0, 200.0), Vec3::X, &rifle());

        assert!(f.breakables[0].is_broken());
        assert_eq!(f.state.destruction_percent(), 1.0);
        assert_eq!(f.roster.get(shooter).unwrap().score.collateral_damage_score, 100.0);
    }

    #[test]
    fn test_hitscan_kills_player() {
        let mut f = Fixture::new();
        let shooter = f.shooter;
        f.kaiju = None;
        let victim = f.add_player("victim", Vec3::new(0.0, 0.0, 90.0));
        f.roster.get_mut(victim).unwrap().health = 10.0;

        let killed = f
            .world()
            .fire_hitscan(shooter, Vec3::new(-2000.0, 0.0, 90.0), Vec3::X, &rifle());
        assert_eq!(killed, Some(victim));
        assert!(f.state.drain_events().contains(&GameEvent::PlayerDied { player_id: victim }));
    }

    #[test]
    fn test_splash_damages_kaiju_once_with_falloff() {
        let mut f = Fixture::new();
        let shooter = f.shooter;
        // 200 units below the kaiju origin, touching both legs and the body
        f.world()
            .apply_splash_damage(Vec3::new(0.0, 0.0, 300.0), 400.0, 75.0, Some(shooter));

        assert_eq!(f.kaiju().health(), 5000.0 - 37.5);
        assert_eq!(f.roster.get(shooter).unwrap().score.kaiju_damage_dealt, 37.5);
        // Splash goes to overall health, not to weak points
        assert_eq!(f.kaiju().weak_point(WeakPointType::LeftLeg).current_health, 100.0);
    }

    #[test]
    fn test_splash_spares_owner_and_hits_others() {
        let mut f = Fixture::new();
        let shooter = f.shooter;
        f.kaiju = None;
        let bystander = f.add_player("bystander", Vec3::new(-1900.0, 0.0, 90.0));
        f.world()
            .apply_splash_damage(Vec3::new(-2000.0, 0.0, 90.0), 400.0, 75.0, Some(shooter));

        assert_eq!(f.roster.get(shooter).unwrap().health, 100.0);
        let bystander_health = f.roster.get(bystander).unwrap().health;
        assert!((bystander_health - (100.0 - 75.0 * 0.75)).abs() < 1e-3);
    }

    #[test]
    fn test_splash_breaks_buildings() {
        let mut f = Fixture::new();
        f.kaiju = None;
        f.breakables
            .push(Breakable::new(0, Vec3::new(0.0, 0.0, 100.0), Vec3::splat(100.0), 100.0));
        f.breakables
            .push(Breakable::new(1, Vec3::new(5000.0, 0.0, 100.0), Vec3::splat(100.0), 100.0));

        f.world().apply_splash_damage(Vec3::new(250.0, 0.0, 100.0), 400.0, 75.0, None);
        assert!(f.breakables[0].is_broken());
        assert!(!f.breakables[1].is_broken());
    }

    #[test]
    fn test_projectile_explodes_on_kaiju() {
        let mut f = Fixture::new();
        let shooter = f.shooter;
        let rocket = WeaponStats::rocket_launcher();
        let mut projectile =
            Projectile::new(shooter, Vec3::new(-1000.0, 0.0, 500.0), Vec3::X, &rocket).unwrap();

        let mut outcome = ProjectileStep::Flying;
        for _ in 0..30 {
            outcome = f.world().step_projectile(&mut projectile, 1.0 / 30.0);
            if outcome != ProjectileStep::Flying {
                break;
            }
        }

        assert!(matches!(outcome, ProjectileStep::Exploded { .. }));
        assert!(f.kaiju().health() < 5000.0);
        assert!(f
            .state
            .drain_events()
            .iter()
            .any(|e| matches!(e, GameEvent::ProjectileExploded { .. })));
    }

    #[test]
    fn test_projectile_passes_through_owner() {
        let mut f = Fixture::new();
        let shooter = f.shooter;
        f.kaiju = None;
        let rocket = WeaponStats::rocket_launcher();
        // Starts inside the owner's own hit volume
        let mut projectile =
            Projectile::new(shooter, Vec3::new(-2000.0, 0.0, 90.0), Vec3::new(0.0, 1.0, 0.2), &rocket)
                .unwrap();
        let outcome = f.world().step_projectile(&mut projectile, 1.0 / 30.0);
        assert_eq!(outcome, ProjectileStep::Flying);
    }

    #[test]
    fn test_projectile_expires_after_lifetime() {
        let mut f = Fixture::new();
        let shooter = f.shooter;
        f.kaiju = None;
        let rocket = WeaponStats::rocket_launcher();
        let mut projectile =
            Projectile::new(shooter, Vec3::new(0.0, 0.0, 50_000.0), Vec3::Z, &rocket).unwrap();

        let mut steps = 0;
        loop {
            steps += 1;
            match f.world().step_projectile(&mut projectile, 0.5) {
                ProjectileStep::Flying => continue,
                ProjectileStep::Expired => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(steps, 10);
    }

    #[test]
    fn test_projectile_without_speed_is_dropped() {
        let shot = Projectile::new(PlayerId(1), Vec3::ZERO, Vec3::X, &WeaponStats::assault_rifle());
        assert!(shot.is_none());
    }

    #[test]
    fn test_stomp_damage_falls_off_linearly() {
        let mut f = Fixture::new();
        f.kaiju = None;
        let near = f.add_player("near", Vec3::new(0.0, 0.0, 0.0));
        let mid = f.add_player("mid", Vec3::new(200.0, 0.0, 0.0));
        let far = f.add_player("far", Vec3::new(450.0, 0.0, 0.0));

        f.world().apply_kaiju_action(
            KaijuAction::Attack {
                kind: crate::ws::protocol::KaijuAttackKind::Stomp,
                center: Vec3::ZERO,
                radius: 400.0,
                damage: 50.0,
                destruction_radius: 800.0,
            },
            None,
        );

        assert_eq!(f.roster.get(near).unwrap().health, 50.0);
        assert_eq!(f.roster.get(mid).unwrap().health, 75.0);
        assert_eq!(f.roster.get(far).unwrap().health, 100.0);
    }

    #[test]
    fn test_crush_breaks_buildings_in_radius_without_credit() {
        let mut f = Fixture::new();
        f.breakables
            .push(Breakable::new(0, Vec3::new(300.0, 0.0, 100.0), Vec3::splat(100.0), 100.0));
        f.breakables
            .push(Breakable::new(1, Vec3::new(900.0, 0.0, 100.0), Vec3::splat(100.0), 100.0));

        f.world().apply_kaiju_action(
            KaijuAction::Crush {
                center: Vec3::new(0.0, 0.0, 100.0),
                radius: 400.0,
            },
            None,
        );

        assert!(f.breakables[0].is_broken());
        assert!(!f.breakables[1].is_broken());
        assert_eq!(f.state.destruction_percent(), 1.0);
        assert_eq!(f.roster.get(f.shooter).unwrap().score.collateral_damage_score, 0.0);
    }
}
