//! Combat resolution: damage application, death detection, kill tallies.
//!
//! A player is alive while hp > 0 and dead at hp <= 0; the only way back to
//! alive is an explicit respawn request. Damage always comes from the
//! shooter's stored archetype, never from the hit message itself.

use crate::world::WorldState;
use log::{debug, info};
use shared::SessionId;

/// A confirmed kill, carrying everything the kill broadcast needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillRecord {
    pub killer_id: SessionId,
    pub victim_id: SessionId,
    pub killer_name: String,
    pub killer_kills: u32,
    pub victim_kills: u32,
}

/// Outcome of a hit that actually landed. `hp` is the target's hp after the
/// damage (negative values are reported as-is); `kill` is present only when
/// the hit was lethal and not self-inflicted.
#[derive(Debug, Clone)]
pub struct HitApplied {
    pub hp: i32,
    pub kill: Option<KillRecord>,
}

/// Applies one hit. Returns None, without touching any state, when the
/// shooter is unknown or has not completed its handshake, or when the target
/// is unknown or already dead. A corpse therefore never takes damage and a
/// single death never yields a second kill event.
///
/// A self-inflicted lethal hit updates hp but deliberately emits no kill
/// record and forces no respawn, matching the original rules.
pub fn apply_hit(
    world: &mut WorldState,
    shooter_id: SessionId,
    target_id: SessionId,
) -> Option<HitApplied> {
    let damage = {
        let shooter = world.players.get(&shooter_id)?;
        shooter.tank_type?;
        shooter.damage
    };

    let target = world.players.get_mut(&target_id)?;
    if target.hp <= 0 {
        return None;
    }

    target.hp -= damage;
    let hp = target.hp;
    debug!(
        "player {} hit player {} for {}, hp now {}",
        shooter_id, target_id, damage, hp
    );

    let lethal = hp <= 0 && shooter_id != target_id;
    if lethal {
        target.kills = 0;
    }

    let mut kill = None;
    if lethal {
        if let Some(shooter) = world.players.get_mut(&shooter_id) {
            shooter.kills += 1;
            info!(
                "player {} killed player {}, kills now {}",
                shooter_id, target_id, shooter.kills
            );
            kill = Some(KillRecord {
                killer_id: shooter_id,
                victim_id: target_id,
                killer_name: shooter.name.clone(),
                killer_kills: shooter.kills,
                victim_kills: 0,
            });
        }
    }

    Some(HitApplied { hp, kill })
}
