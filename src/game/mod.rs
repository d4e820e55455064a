//! Match simulation modules

pub mod combat;
pub mod destruction;
pub mod r#match;
pub mod monster;
pub mod physics;
pub mod player;
pub mod score;
pub mod snapshot;
pub mod state;
pub mod weapons;

pub use r#match::{MatchHandle, MatchRegistry};

use crate::ws::protocol::ClientMsg;
use uuid::Uuid;

/// Player input received from WebSocket
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub user_id: Uuid,
    pub msg: ClientMsg,
    pub received_at: u64,
}

/// Input state for a single tick (processed from ClientMsg::InputTick)
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    pub seq: u32,
    pub move_forward: f32,
    pub move_right: f32,
    pub aim_yaw: f32,
    pub aim_pitch: f32,
}
