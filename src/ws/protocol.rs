//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use glam::Vec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::player::PlayerId;
use crate::game::score::{EndOfRoundAwards, ScoreboardEntry};
use crate::game::snapshot::MatchSnapshot;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Match object exists but play has not started
    #[default]
    None,
    /// Countdown before the kaiju is let loose
    Warmup,
    /// Match in progress
    InProgress,
    /// Match ended, scores frozen
    PostRound,
}

/// Why a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchEndReason {
    #[default]
    None,
    KaijuDefeated,
    CityDestroyed,
    TimerExpired,
}

/// Targetable sub-regions of the kaiju
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeakPointType {
    LeftLeg,
    RightLeg,
    Head,
}

impl WeakPointType {
    pub const ALL: [WeakPointType; 3] = [Self::LeftLeg, Self::RightLeg, Self::Head];

    /// Slot in fixed-size weak point arrays
    pub fn index(self) -> usize {
        match self {
            Self::LeftLeg => 0,
            Self::RightLeg => 1,
            Self::Head => 2,
        }
    }

    pub fn is_leg(self) -> bool {
        matches!(self, Self::LeftLeg | Self::RightLeg)
    }
}

/// Player role. Every joining player starts as a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerRole {
    #[default]
    Human,
    Kaiju,
    Spectator,
}

/// Kaiju attack variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KaijuAttackKind {
    /// Radial slam centered below the kaiju
    Stomp,
    /// Forward arc in front of the kaiju
    Sweep,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Request to join a match
    JoinMatch {
        /// Optional specific match ID, otherwise the registry assigns one
        match_id: Option<Uuid>,
        display_name: Option<String>,
        /// Split-screen seat on the connecting machine
        #[serde(default)]
        local: bool,
    },

    /// Movement and aim input for current tick
    InputTick {
        /// Sequence number, older inputs are dropped
        seq: u32,
        /// Forward axis (-1.0 to 1.0)
        move_forward: f32,
        /// Strafe axis (-1.0 to 1.0)
        move_right: f32,
        /// Aim yaw in radians
        aim_yaw: f32,
        /// Aim pitch in radians
        aim_pitch: f32,
    },

    StartFire,

    StopFire,

    /// Switch to a weapon slot, or cycle to the next one when no index is given
    SwitchWeapon { index: Option<usize> },

    StartReload,

    /// The player's pawn died client-side (e.g. fell out of the world)
    RequestRespawn,

    /// Pass-through role setter
    SetRole { role: PlayerRole },

    /// Take direct control of the kaiju
    PossessKaiju,

    /// Hand the kaiju back to its AI
    ReleaseKaiju,

    /// Attack ordered while possessing the kaiju
    KaijuAttack { kind: KaijuAttackKind },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave current match
    LeaveMatch,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { user_id: Uuid, server_time: u64 },

    /// Confirmation of match join
    MatchJoined {
        match_id: Uuid,
        user_id: Uuid,
        player_id: PlayerId,
        /// Seed for deterministic layout generation
        seed: u64,
        /// All players in the match at join time
        players: Vec<PlayerInfo>,
    },

    /// Player joined the match
    PlayerJoined { player: PlayerInfo },

    /// Player left the match
    PlayerLeft { player_id: PlayerId, reason: String },

    /// Change notifications produced by one simulation tick
    Events { tick: u64, events: Vec<GameEvent> },

    /// Full replicated state (sent at regular intervals)
    Snapshot { snapshot: Box<MatchSnapshot> },

    /// Match has ended
    MatchEnd {
        reason: MatchEndReason,
        scoreboard: Vec<ScoreboardEntry>,
        awards: EndOfRoundAwards,
    },

    /// A join request was refused
    JoinRefused {
        user_id: Uuid,
        code: String,
        message: String,
    },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

impl ServerMsg {
    /// The one user a message is addressed to, `None` for broadcasts
    pub fn recipient(&self) -> Option<Uuid> {
        match self {
            ServerMsg::MatchJoined { user_id, .. } | ServerMsg::JoinRefused { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }
}

/// Player info for lobby/join
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub player_id: PlayerId,
    pub display_name: String,
    pub role: PlayerRole,
    pub is_local: bool,
}

/// Discrete change notifications. Each fires at most once per actual change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    MatchPhaseChanged {
        phase: MatchPhase,
    },

    DestructionPercentChanged {
        percent: f32,
    },

    /// Kaiju health as a 0.0 - 1.0 fraction
    KaijuHealthChanged {
        percent: f32,
    },

    KaijuStaggeredChanged {
        staggered: bool,
    },

    WeakPointDestroyed {
        weak_point: WeakPointType,
        destroyer_id: Option<PlayerId>,
    },

    MatchEnded {
        reason: MatchEndReason,
    },

    WeaponFired {
        player_id: PlayerId,
        weapon_index: usize,
        ammo_remaining: u32,
    },

    WeaponSwitched {
        player_id: PlayerId,
        weapon_index: usize,
    },

    ReloadStarted {
        player_id: PlayerId,
        duration: f32,
    },

    ReloadFinished {
        player_id: PlayerId,
    },

    BreakableDestroyed {
        breakable_id: u32,
        instigator_id: Option<PlayerId>,
    },

    KaijuAttack {
        kind: KaijuAttackKind,
        center: Vec3,
    },

    KaijuDied {
        killer_id: Option<PlayerId>,
    },

    ProjectileExploded {
        projectile_id: Uuid,
        location: Vec3,
    },

    PlayerDied {
        player_id: PlayerId,
    },

    PlayerRespawned {
        player_id: PlayerId,
        location: Vec3,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_msg_wire_names() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"join_match","match_id":null,"display_name":"Rex"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMsg::JoinMatch {
                match_id: None,
                local: false,
                ..
            }
        ));

        let msg: ClientMsg = serde_json::from_str(r#"{"type":"kaiju_attack","kind":"sweep"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMsg::KaijuAttack {
                kind: KaijuAttackKind::Sweep
            }
        ));

        let msg: ClientMsg = serde_json::from_str(r#"{"type":"set_role","role":"kaiju"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::SetRole { role: PlayerRole::Kaiju }));
    }

    #[test]
    fn test_event_tagging() {
        let json = serde_json::to_value(GameEvent::WeakPointDestroyed {
            weak_point: WeakPointType::Head,
            destroyer_id: Some(PlayerId(3)),
        })
        .unwrap();
        assert_eq!(json["event_type"], "weak_point_destroyed");
        assert_eq!(json["weak_point"], "head");
        assert_eq!(json["destroyer_id"], 3);
    }

    #[test]
    fn test_recipient() {
        let user_id = Uuid::new_v4();
        let refused = ServerMsg::JoinRefused {
            user_id,
            code: "match_full".into(),
            message: "Match is full".into(),
        };
        assert_eq!(refused.recipient(), Some(user_id));
        assert_eq!(ServerMsg::Pong { t: 1 }.recipient(), None);
    }

    #[test]
    fn test_weak_point_indices() {
        for (i, wp) in WeakPointType::ALL.iter().enumerate() {
            assert_eq!(wp.index(), i);
        }
        assert!(WeakPointType::LeftLeg.is_leg());
        assert!(!WeakPointType::Head.is_leg());
    }
}
