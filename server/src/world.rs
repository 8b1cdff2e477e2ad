//! Authoritative world state: players, health boxes, and power-ups.
//!
//! All maps are owned by the dispatch loop and mutated only through the
//! methods below, so one inbound event is always fully applied before the
//! next one is looked at. Pickup and expiry both funnel through map removal,
//! which makes exactly one of them win for any given box id.

use log::{debug, info};
use rand::Rng;
use shared::{
    HealthBoxSnapshot, ObjectId, PlayerSnapshot, PowerUpKind, PowerUpSnapshot, SessionId,
    TankType, ARENA_HALF_EXTENT, HEALTH_BOX_HEAL, MAX_HEALTH_BOXES, MAX_POWER_UPS, PICKUP_RADIUS,
};
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PlayerState {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rot_y: f32,
    pub hp: i32,
    pub max_hp: i32,
    pub damage: i32,
    pub kills: u32,
    pub name: String,
    /// None until the handshake completes; such players are excluded from
    /// movement and combat.
    pub tank_type: Option<TankType>,
}

impl PlayerState {
    fn placeholder(x: f32, z: f32) -> Self {
        Self {
            x,
            y: 0.0,
            z,
            rot_y: 0.0,
            hp: 0,
            max_hp: 0,
            damage: 0,
            kills: 0,
            name: String::new(),
            tank_type: None,
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            x: self.x,
            y: self.y,
            z: self.z,
            rot_y: self.rot_y,
            hp: self.tank_type.map(|_| self.hp),
            kills: self.kills,
            name: self.name.clone(),
            tank_type: self.tank_type,
            max_hp: self.tank_type.map(|_| self.max_hp),
            damage: self.tank_type.map(|_| self.damage),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthBox {
    pub x: f32,
    pub z: f32,
    pub spawned_at: Instant,
}

#[derive(Debug, Clone)]
pub struct PowerUp {
    pub x: f32,
    pub z: f32,
    pub kind: PowerUpKind,
}

/// One health box consumed during a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pickup {
    pub box_id: ObjectId,
    /// Player hp after this pickup was applied.
    pub hp: i32,
}

/// Result of a position update that passed the handshake gate.
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    /// Player hp after all pickups, echoed on the move broadcast.
    pub hp: i32,
    pub pickups: Vec<Pickup>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnedHealthBox {
    pub id: ObjectId,
    pub x: f32,
    pub z: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnedPowerUp {
    pub id: ObjectId,
    pub x: f32,
    pub z: f32,
    pub kind: PowerUpKind,
}

pub struct WorldState {
    pub(crate) players: HashMap<SessionId, PlayerState>,
    health_boxes: HashMap<ObjectId, HealthBox>,
    power_ups: HashMap<ObjectId, PowerUp>,
    next_object_id: ObjectId,
}

impl WorldState {
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
            health_boxes: HashMap::new(),
            power_ups: HashMap::new(),
            next_object_id: 0,
        }
    }

    /// Opens a placeholder record for a freshly accepted session. The player
    /// gets a spawn position immediately but stays out of combat and
    /// broadcasts until `apply_handshake` fills in the archetype.
    pub fn add_player(&mut self, id: SessionId, rng: &mut impl Rng) -> (f32, f32) {
        let x = random_spawn_coord(rng);
        let z = random_spawn_coord(rng);
        self.players.insert(id, PlayerState::placeholder(x, z));
        (x, z)
    }

    pub fn remove_player(&mut self, id: SessionId) -> bool {
        self.players.remove(&id).is_some()
    }

    pub fn player(&self, id: SessionId) -> Option<&PlayerState> {
        self.players.get(&id)
    }

    pub fn tank_type(&self, id: SessionId) -> Option<TankType> {
        self.players.get(&id).and_then(|p| p.tank_type)
    }

    /// Completes the handshake for `id`, deriving hp/damage from the chosen
    /// archetype. Unknown ids are silently ignored. Returns the resulting
    /// state for announcement broadcasts.
    pub fn apply_handshake(
        &mut self,
        id: SessionId,
        name: String,
        tank_type: TankType,
    ) -> Option<PlayerState> {
        let player = self.players.get_mut(&id)?;
        let stats = tank_type.stats();
        player.name = name;
        player.tank_type = Some(tank_type);
        player.max_hp = stats.max_hp;
        player.hp = stats.max_hp;
        player.damage = stats.damage;
        info!(
            "player {} completed handshake as {:?} ({:?}, {} hp)",
            id, player.name, tank_type, player.hp
        );
        Some(player.clone())
    }

    /// Records a position update and resolves health-box pickups. Returns
    /// None for unknown sessions and for sessions that have not completed
    /// their handshake; those updates are dropped.
    pub fn apply_move(
        &mut self,
        id: SessionId,
        x: f32,
        y: f32,
        z: f32,
        rot_y: f32,
    ) -> Option<MoveOutcome> {
        let player = self.players.get_mut(&id)?;
        player.tank_type?;
        player.x = x;
        player.y = y;
        player.z = z;
        player.rot_y = rot_y;
        let (px, pz) = (player.x, player.z);

        let in_radius: Vec<ObjectId> = self
            .health_boxes
            .iter()
            .filter(|(_, b)| planar_distance(px, pz, b.x, b.z) < PICKUP_RADIUS)
            .map(|(box_id, _)| *box_id)
            .collect();

        let mut pickups = Vec::with_capacity(in_radius.len());
        for box_id in in_radius {
            // Map removal is the arbiter: a box that is already gone (picked
            // up or expired) cannot be collected a second time.
            if self.health_boxes.remove(&box_id).is_none() {
                continue;
            }
            if let Some(player) = self.players.get_mut(&id) {
                player.hp = (player.hp + HEALTH_BOX_HEAL).min(player.max_hp);
                pickups.push(Pickup {
                    box_id,
                    hp: player.hp,
                });
            }
        }

        let hp = self.players.get(&id).map(|p| p.hp)?;
        Some(MoveOutcome { hp, pickups })
    }

    /// Replaces the player wholesale: fresh spawn position, full hp for the
    /// chosen archetype, kill count reset. The display name survives.
    pub fn apply_respawn(
        &mut self,
        id: SessionId,
        tank_type: TankType,
        rng: &mut impl Rng,
    ) -> Option<PlayerState> {
        let name = self.players.get(&id)?.name.clone();
        let stats = tank_type.stats();
        let state = PlayerState {
            x: random_spawn_coord(rng),
            y: 0.0,
            z: random_spawn_coord(rng),
            rot_y: 0.0,
            hp: stats.max_hp,
            max_hp: stats.max_hp,
            damage: stats.damage,
            kills: 0,
            name,
            tank_type: Some(tank_type),
        };
        self.players.insert(id, state.clone());
        Some(state)
    }

    /// Materializes one health box at a random position, unless the
    /// concurrency cap is already reached.
    pub fn spawn_health_box(&mut self, rng: &mut impl Rng) -> Option<SpawnedHealthBox> {
        if self.health_boxes.len() >= MAX_HEALTH_BOXES {
            return None;
        }
        let id = self.allocate_object_id();
        let x = random_spawn_coord(rng);
        let z = random_spawn_coord(rng);
        self.health_boxes.insert(
            id,
            HealthBox {
                x,
                z,
                spawned_at: Instant::now(),
            },
        );
        Some(SpawnedHealthBox { id, x, z })
    }

    /// Deferred-expiry path. Returns false when the box was already consumed
    /// by a pickup, in which case no despawn event may be emitted.
    pub fn expire_health_box(&mut self, id: ObjectId) -> bool {
        match self.health_boxes.remove(&id) {
            Some(removed) => {
                debug!(
                    "health box {} expired after {:?}",
                    id,
                    removed.spawned_at.elapsed()
                );
                true
            }
            None => false,
        }
    }

    pub fn spawn_power_up(&mut self, rng: &mut impl Rng) -> Option<SpawnedPowerUp> {
        if self.power_ups.len() >= MAX_POWER_UPS {
            return None;
        }
        let id = self.allocate_object_id();
        let x = random_spawn_coord(rng);
        let z = random_spawn_coord(rng);
        let kind = if rng.gen_bool(0.5) {
            PowerUpKind::Health
        } else {
            PowerUpKind::Ammo
        };
        self.power_ups.insert(id, PowerUp { x, z, kind });
        Some(SpawnedPowerUp { id, x, z, kind })
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn health_box_count(&self) -> usize {
        self.health_boxes.len()
    }

    pub fn power_up_count(&self) -> usize {
        self.power_ups.len()
    }

    // Snapshot maps feed the init message; JSON object keys are strings.

    pub fn player_snapshots(&self) -> HashMap<String, PlayerSnapshot> {
        self.players
            .iter()
            .map(|(id, player)| (id.to_string(), player.snapshot()))
            .collect()
    }

    pub fn health_box_snapshots(&self) -> HashMap<String, HealthBoxSnapshot> {
        self.health_boxes
            .iter()
            .map(|(id, b)| (id.to_string(), HealthBoxSnapshot { x: b.x, z: b.z }))
            .collect()
    }

    pub fn power_up_snapshots(&self) -> HashMap<String, PowerUpSnapshot> {
        self.power_ups
            .iter()
            .map(|(id, p)| {
                (
                    id.to_string(),
                    PowerUpSnapshot {
                        x: p.x,
                        z: p.z,
                        kind: p.kind,
                    },
                )
            })
            .collect()
    }

    fn allocate_object_id(&mut self) -> ObjectId {
        self.next_object_id += 1;
        self.next_object_id
    }

    #[cfg(test)]
    pub(crate) fn insert_health_box_at(&mut self, x: f32, z: f32) -> ObjectId {
        let id = self.allocate_object_id();
        self.health_boxes.insert(
            id,
            HealthBox {
                x,
                z,
                spawned_at: Instant::now(),
            },
        );
        id
    }
}

fn random_spawn_coord(rng: &mut impl Rng) -> f32 {
    rng.gen_range(-ARENA_HALF_EXTENT..ARENA_HALF_EXTENT)
}

fn planar_distance(x1: f32, z1: f32, x2: f32, z2: f32) -> f32 {
    let dx = x1 - x2;
    let dz = z1 - z2;
    (dx * dx + dz * dz).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn add_player_spawns_inside_arena() {
        let mut world = WorldState::new();
        let (x, z) = world.add_player(1, &mut rng());

        assert!((-ARENA_HALF_EXTENT..ARENA_HALF_EXTENT).contains(&x));
        assert!((-ARENA_HALF_EXTENT..ARENA_HALF_EXTENT).contains(&z));
        let player = world.player(1).unwrap();
        assert!(player.tank_type.is_none());
        assert_eq!(player.hp, 0);
    }

    #[test]
    fn handshake_sets_archetype_stats() {
        let mut world = WorldState::new();
        world.add_player(1, &mut rng());

        let player = world
            .apply_handshake(1, "Ace".to_string(), TankType::Heavy)
            .unwrap();
        assert_eq!(player.name, "Ace");
        assert_eq!(player.hp, 150);
        assert_eq!(player.max_hp, 150);
        assert_eq!(player.damage, 15);
        assert_eq!(player.tank_type, Some(TankType::Heavy));
    }

    #[test]
    fn handshake_for_unknown_id_is_ignored() {
        let mut world = WorldState::new();
        assert!(world
            .apply_handshake(99, "Ghost".to_string(), TankType::Starter)
            .is_none());
        assert_eq!(world.player_count(), 0);
    }

    #[test]
    fn move_before_handshake_is_dropped() {
        let mut world = WorldState::new();
        world.add_player(1, &mut rng());
        let (x_before, _) = {
            let p = world.player(1).unwrap();
            (p.x, p.z)
        };

        assert!(world.apply_move(1, 5.0, 0.0, 5.0, 1.0).is_none());
        assert_approx_eq!(world.player(1).unwrap().x, x_before);
    }

    #[test]
    fn move_records_position() {
        let mut world = WorldState::new();
        world.add_player(1, &mut rng());
        world.apply_handshake(1, "Ace".to_string(), TankType::Starter);

        let outcome = world.apply_move(1, 5.0, 0.0, -7.5, 1.25).unwrap();
        assert_eq!(outcome.hp, 100);
        assert!(outcome.pickups.is_empty());

        let player = world.player(1).unwrap();
        assert_approx_eq!(player.x, 5.0);
        assert_approx_eq!(player.z, -7.5);
        assert_approx_eq!(player.rot_y, 1.25);
    }

    #[test]
    fn pickup_heals_capped_and_removes_box() {
        let mut world = WorldState::new();
        world.add_player(1, &mut rng());
        world.apply_handshake(1, "Ace".to_string(), TankType::Starter);
        world.players.get_mut(&1).unwrap().hp = 70;
        let box_id = world.insert_health_box_at(10.0, 10.0);

        // Just inside the pickup radius.
        let outcome = world.apply_move(1, 10.0, 0.0, 11.0, 0.0).unwrap();
        assert_eq!(outcome.pickups, vec![Pickup { box_id, hp: 100 }]);
        assert_eq!(outcome.hp, 100);
        assert_eq!(world.health_box_count(), 0);
    }

    #[test]
    fn box_outside_radius_is_not_collected() {
        let mut world = WorldState::new();
        world.add_player(1, &mut rng());
        world.apply_handshake(1, "Ace".to_string(), TankType::Starter);
        world.insert_health_box_at(10.0, 10.0);

        let outcome = world.apply_move(1, 10.0, 0.0, 12.0, 0.0).unwrap();
        assert!(outcome.pickups.is_empty());
        assert_eq!(world.health_box_count(), 1);
    }

    #[test]
    fn expiry_after_pickup_is_a_noop() {
        let mut world = WorldState::new();
        world.add_player(1, &mut rng());
        world.apply_handshake(1, "Ace".to_string(), TankType::Starter);
        world.players.get_mut(&1).unwrap().hp = 70;
        let box_id = world.insert_health_box_at(10.0, 10.0);

        let outcome = world.apply_move(1, 10.0, 0.0, 10.5, 0.0).unwrap();
        assert_eq!(outcome.pickups.len(), 1);

        // The deferred timer fires later and must not produce a second event.
        assert!(!world.expire_health_box(box_id));
    }

    #[test]
    fn pickup_after_expiry_is_a_noop() {
        let mut world = WorldState::new();
        world.add_player(1, &mut rng());
        world.apply_handshake(1, "Ace".to_string(), TankType::Starter);
        let box_id = world.insert_health_box_at(10.0, 10.0);

        assert!(world.expire_health_box(box_id));
        let outcome = world.apply_move(1, 10.0, 0.0, 10.5, 0.0).unwrap();
        assert!(outcome.pickups.is_empty());
    }

    #[test]
    fn multiple_boxes_in_radius_collected_in_one_move() {
        let mut world = WorldState::new();
        world.add_player(1, &mut rng());
        world.apply_handshake(1, "Ace".to_string(), TankType::Starter);
        world.players.get_mut(&1).unwrap().hp = 10;
        world.insert_health_box_at(10.0, 10.0);
        world.insert_health_box_at(10.5, 10.0);

        let outcome = world.apply_move(1, 10.2, 0.0, 10.0, 0.0).unwrap();
        assert_eq!(outcome.pickups.len(), 2);
        // 10 + 30 + 30, still below the cap.
        assert_eq!(outcome.hp, 70);
        assert_eq!(world.health_box_count(), 0);
    }

    #[test]
    fn health_box_cap_holds() {
        let mut world = WorldState::new();
        let mut r = rng();
        for _ in 0..50 {
            world.spawn_health_box(&mut r);
        }
        assert_eq!(world.health_box_count(), MAX_HEALTH_BOXES);
    }

    #[test]
    fn power_up_cap_holds() {
        let mut world = WorldState::new();
        let mut r = rng();
        for _ in 0..50 {
            world.spawn_power_up(&mut r);
        }
        assert_eq!(world.power_up_count(), MAX_POWER_UPS);
    }

    #[test]
    fn spawn_at_cap_returns_none() {
        let mut world = WorldState::new();
        let mut r = rng();
        for _ in 0..MAX_HEALTH_BOXES {
            assert!(world.spawn_health_box(&mut r).is_some());
        }
        assert!(world.spawn_health_box(&mut r).is_none());
    }

    #[test]
    fn respawn_resets_everything_but_name() {
        let mut world = WorldState::new();
        let mut r = rng();
        world.add_player(1, &mut r);
        world.apply_handshake(1, "Ace".to_string(), TankType::Starter);
        {
            let player = world.players.get_mut(&1).unwrap();
            player.hp = -5;
            player.kills = 3;
        }

        let state = world.apply_respawn(1, TankType::Sniper, &mut r).unwrap();
        assert_eq!(state.name, "Ace");
        assert_eq!(state.hp, 80);
        assert_eq!(state.max_hp, 80);
        assert_eq!(state.damage, 20);
        assert_eq!(state.kills, 0);
        assert_eq!(state.tank_type, Some(TankType::Sniper));
        assert!((-ARENA_HALF_EXTENT..ARENA_HALF_EXTENT).contains(&state.x));
    }

    #[test]
    fn respawn_for_unknown_id_is_ignored() {
        let mut world = WorldState::new();
        assert!(world.apply_respawn(7, TankType::Starter, &mut rng()).is_none());
    }

    #[test]
    fn snapshot_nulls_archetype_fields_before_handshake() {
        let mut world = WorldState::new();
        let mut r = rng();
        world.add_player(1, &mut r);
        world.add_player(2, &mut r);
        world.apply_handshake(2, "Ace".to_string(), TankType::Merkava);

        let snapshots = world.player_snapshots();
        assert!(snapshots["1"].tank_type.is_none());
        assert!(snapshots["1"].hp.is_none());
        assert!(snapshots["1"].max_hp.is_none());
        assert!(snapshots["1"].damage.is_none());
        assert_eq!(snapshots["2"].hp, Some(200));
        assert_eq!(snapshots["2"].tank_type, Some(TankType::Merkava));
    }

    #[test]
    fn remove_player_is_idempotent() {
        let mut world = WorldState::new();
        world.add_player(1, &mut rng());
        assert!(world.remove_player(1));
        assert!(!world.remove_player(1));
    }

    #[test]
    fn object_ids_are_unique_across_kinds() {
        let mut world = WorldState::new();
        let mut r = rng();
        let b = world.spawn_health_box(&mut r).unwrap();
        let p = world.spawn_power_up(&mut r).unwrap();
        assert_ne!(b.id, p.id);
    }
}
