//! City destruction - the destruction meter, breakable buildings and city layout

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ws::protocol::GameEvent;

use super::physics::Aabb;
use super::player::PlayerId;
use super::state::MatchContext;

/// Aggregated city damage against a fixed "full destruction" budget
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DestructionMeter {
    total_value: f32,
    current_value: f32,
}

impl DestructionMeter {
    pub fn new(total_value: f32) -> Self {
        Self {
            total_value: total_value.max(1.0),
            current_value: 0.0,
        }
    }

    pub fn total_value(&self) -> f32 {
        self.total_value
    }

    pub fn current_value(&self) -> f32 {
        self.current_value
    }

    /// Reconfigure the budget. Never below 1.
    pub fn set_total_value(&mut self, total_value: f32) {
        self.total_value = total_value.max(1.0);
    }

    /// Accumulate damage; the running total never decreases
    pub fn add(&mut self, amount: f32) {
        self.current_value += amount.max(0.0);
    }

    /// 0 - 100
    pub fn percent(&self) -> f32 {
        ((self.current_value / self.total_value) * 100.0).clamp(0.0, 100.0)
    }
}

/// A destructible city object. Breaks exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breakable {
    pub id: u32,
    pub position: Vec3,
    pub half_extents: Vec3,
    pub destruction_value: f32,
    /// Whether breaking this feeds the destruction meter
    pub contributes_to_meter: bool,
    broken: bool,
}

impl Breakable {
    pub fn new(id: u32, position: Vec3, half_extents: Vec3, destruction_value: f32) -> Self {
        Self {
            id,
            position,
            half_extents,
            destruction_value: destruction_value.max(0.0),
            contributes_to_meter: true,
            broken: false,
        }
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn hit_volume(&self) -> Aabb {
        Aabb::new(self.position, self.half_extents)
    }

    /// Break the object. Returns false if it was already broken.
    pub fn break_apart(&mut self, instigator: Option<PlayerId>, ctx: &mut MatchContext<'_>) -> bool {
        if self.broken {
            return false;
        }
        self.broken = true;

        if self.contributes_to_meter {
            ctx.add_destruction_value(self.destruction_value, instigator);
        }

        ctx.state.emit(GameEvent::BreakableDestroyed {
            breakable_id: self.id,
            instigator_id: instigator,
        });

        debug!(
            breakable_id = self.id,
            instigator = ?instigator,
            value = self.destruction_value,
            "Breakable destroyed"
        );
        true
    }
}

/// Grid of buildings generated from the match seed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityLayout {
    pub rows: u32,
    pub columns: u32,
    /// Distance between building centers
    pub spacing: f32,
    /// Grid center on the ground plane
    pub origin: Vec3,
    /// Base building half extents; height is jittered per building
    pub building_half_extents: Vec3,
    /// Fixed value per building, otherwise the total budget is split evenly
    pub value_per_building: Option<f32>,
}

impl Default for CityLayout {
    fn default() -> Self {
        Self {
            rows: 10,
            columns: 10,
            spacing: 1200.0,
            origin: Vec3::ZERO,
            building_half_extents: Vec3::new(250.0, 250.0, 400.0),
            value_per_building: None,
        }
    }
}

impl CityLayout {
    pub fn building_count(&self) -> u32 {
        self.rows * self.columns
    }

    /// Lay out the buildings. Deterministic for a given rng state.
    pub fn build<R: Rng>(&self, total_destruction_value: f32, rng: &mut R) -> Vec<Breakable> {
        let count = self.building_count();
        if count == 0 {
            return Vec::new();
        }

        let value = self
            .value_per_building
            .unwrap_or(total_destruction_value.max(1.0) / count as f32);

        let row_offset = (self.rows as f32 - 1.0) * 0.5;
        let column_offset = (self.columns as f32 - 1.0) * 0.5;

        let mut buildings = Vec::with_capacity(count as usize);
        for row in 0..self.rows {
            for column in 0..self.columns {
                let height_scale: f32 = rng.gen_range(0.75..1.25);
                let half_extents = Vec3::new(
                    self.building_half_extents.x,
                    self.building_half_extents.y,
                    self.building_half_extents.z * height_scale,
                );
                let position = self.origin
                    + Vec3::new(
                        (column as f32 - column_offset) * self.spacing,
                        (row as f32 - row_offset) * self.spacing,
                        half_extents.z,
                    );
                let id = row * self.columns + column;
                buildings.push(Breakable::new(id, position, half_extents, value));
            }
        }

        buildings
    }
}
