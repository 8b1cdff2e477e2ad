use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const ARENA_HALF_EXTENT: f32 = 100.0;
pub const PICKUP_RADIUS: f32 = 1.5;
pub const HEALTH_BOX_HEAL: i32 = 30;
pub const MAX_HEALTH_BOXES: usize = 10;
pub const MAX_POWER_UPS: usize = 5;

/// Server-assigned identity of one live connection.
pub type SessionId = u64;

/// Identity of a world object (health box or power-up).
pub type ObjectId = u64;

/// Combat profile selected at handshake or respawn. Fixes the hit point
/// pool, per-shot damage, and the movement/projectile speeds the client
/// simulation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TankType {
    #[default]
    Starter,
    Heavy,
    Sniper,
    Merkava,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TankStats {
    pub max_hp: i32,
    pub damage: i32,
    pub move_speed: f32,
    pub pellet_speed: f32,
}

impl TankType {
    pub fn stats(self) -> TankStats {
        match self {
            TankType::Starter => TankStats {
                max_hp: 100,
                damage: 10,
                move_speed: 0.075,
                pellet_speed: 0.5,
            },
            TankType::Heavy => TankStats {
                max_hp: 150,
                damage: 15,
                move_speed: 0.05,
                pellet_speed: 0.4,
            },
            TankType::Sniper => TankStats {
                max_hp: 80,
                damage: 20,
                move_speed: 0.06,
                pellet_speed: 0.7,
            },
            TankType::Merkava => TankStats {
                max_hp: 200,
                damage: 8,
                move_speed: 0.075,
                pellet_speed: 0.5,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerUpKind {
    Health,
    Ammo,
}

/// Per-player entry of the `init` snapshot. The hp/maxHP/damage/tankType
/// fields are null until the peer completes its handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rot_y: f32,
    pub hp: Option<i32>,
    pub kills: u32,
    pub name: String,
    pub tank_type: Option<TankType>,
    #[serde(rename = "maxHP")]
    pub max_hp: Option<i32>,
    pub damage: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthBoxSnapshot {
    pub x: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerUpSnapshot {
    pub x: f32,
    pub z: f32,
    #[serde(rename = "type")]
    pub kind: PowerUpKind,
}

/// Client-to-server message (internally tagged JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Handshake: names the player and picks an archetype. Gates movement
    /// and combat; a missing tankType falls back to the starter tank.
    #[serde(rename_all = "camelCase")]
    SetName {
        name: String,
        tank_type: Option<TankType>,
    },
    #[serde(rename_all = "camelCase")]
    Move { x: f32, y: f32, z: f32, rot_y: f32 },
    #[serde(rename_all = "camelCase")]
    Shoot {
        x: f32,
        y: f32,
        z: f32,
        dir_x: f32,
        dir_z: f32,
    },
    #[serde(rename_all = "camelCase")]
    Hit {
        target_id: SessionId,
        shooter_id: SessionId,
    },
    #[serde(rename_all = "camelCase")]
    Respawn { tank_type: Option<TankType> },
}

/// Server-to-client message (internally tagged JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Full world snapshot, sent only to a session completing its handshake.
    /// JSON object keys are strings, so the maps are keyed by the decimal
    /// rendering of the numeric ids.
    #[serde(rename_all = "camelCase")]
    Init {
        id: SessionId,
        players: HashMap<String, PlayerSnapshot>,
        power_ups: HashMap<String, PowerUpSnapshot>,
        health_boxes: HashMap<String, HealthBoxSnapshot>,
    },
    #[serde(rename_all = "camelCase")]
    NewPlayer {
        id: SessionId,
        x: f32,
        y: f32,
        z: f32,
        rot_y: f32,
        hp: i32,
        name: String,
        tank_type: TankType,
        #[serde(rename = "maxHP")]
        max_hp: i32,
        damage: i32,
    },
    #[serde(rename_all = "camelCase")]
    PlayerUpdate {
        id: SessionId,
        name: String,
        tank_type: TankType,
        #[serde(rename = "maxHP")]
        max_hp: i32,
        damage: i32,
        x: f32,
        y: f32,
        z: f32,
        rot_y: f32,
        hp: i32,
    },
    #[serde(rename_all = "camelCase")]
    Move {
        id: SessionId,
        x: f32,
        y: f32,
        z: f32,
        rot_y: f32,
        hp: i32,
    },
    #[serde(rename_all = "camelCase")]
    Shoot {
        id: SessionId,
        x: f32,
        y: f32,
        z: f32,
        dir_x: f32,
        dir_z: f32,
        tank_type: TankType,
    },
    #[serde(rename = "updateHP")]
    UpdateHp { id: SessionId, hp: i32 },
    #[serde(rename_all = "camelCase")]
    Kill {
        killer_id: SessionId,
        victim_id: SessionId,
        killer_name: String,
        killer_kills: u32,
        victim_kills: u32,
    },
    #[serde(rename_all = "camelCase")]
    Respawn {
        id: SessionId,
        x: f32,
        y: f32,
        z: f32,
        rot_y: f32,
        hp: i32,
        kills: u32,
        name: String,
        tank_type: TankType,
        #[serde(rename = "maxHP")]
        max_hp: i32,
        damage: i32,
    },
    RemovePlayer { id: SessionId },
    HealthBoxSpawn { id: ObjectId, x: f32, z: f32 },
    HealthBoxDespawn { id: ObjectId },
    #[serde(rename_all = "camelCase")]
    HealthBoxCollected {
        box_id: ObjectId,
        player_id: SessionId,
        hp: i32,
    },
    /// Resource lifecycle announcement. The kind rides under `kind` rather
    /// than `type`, which is already taken by the message discriminant (the
    /// original server let the two collide and the message never reached a
    /// client handler).
    #[serde(rename_all = "camelCase")]
    PowerUpSpawn {
        id: ObjectId,
        x: f32,
        z: f32,
        kind: PowerUpKind,
    },
}
