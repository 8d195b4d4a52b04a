// Guest-side reconciliation: discrete events materialize foreign entities
// immediately; periodic snapshots are the authoritative upsert-and-prune
// pass. Absence from a snapshot is the only way a foreign entity dies
// locally.

use crate::world::{LocalBuilding, LocalUnit, LocalWorld};
use protocol::{BuildingKind, BuildingPlacedDto, GameSnapshotDto, UnitSpawnedDto};
use std::collections::HashSet;
use tracing::debug;

/// Materializes a building announced by the other side. Already marked
/// fully constructed; movement/combat for it is never simulated locally.
pub fn apply_building_event(world: &mut LocalWorld, dto: &BuildingPlacedDto) {
    if dto.kind == BuildingKind::Castle || world.building(&dto.id).is_some() {
        return;
    }
    let x = world.mirror_x(dto.x);
    world.buildings.push(LocalBuilding {
        sync_id: dto.id.clone(),
        kind: dto.kind,
        x,
        y: dto.y,
        hp: dto.hp,
        max_hp: dto.max_hp,
        alive: true,
        team: dto.sender_team,
        controlled: false,
    });
}

/// Materializes a unit announced by the other side.
pub fn apply_unit_event(world: &mut LocalWorld, dto: &UnitSpawnedDto) {
    if world.unit(&dto.id).is_some() {
        return;
    }
    let x = world.mirror_x(dto.x);
    world.units.push(LocalUnit {
        sync_id: dto.id.clone(),
        kind: dto.kind,
        x,
        y: dto.y,
        hp: dto.hp,
        max_hp: dto.max_hp,
        alive: true,
        team: dto.sender_team,
        controlled: false,
    });
}

/// Applies a periodic snapshot. Returns false when the snapshot is not
/// newer than `last_applied` and was discarded.
pub fn apply_snapshot(world: &mut LocalWorld, snapshot: &GameSnapshotDto, last_applied: u64) -> bool {
    if snapshot.tick <= last_applied {
        debug!(tick = snapshot.tick, last_applied, "stale snapshot discarded");
        return false;
    }

    let mut unit_ids: HashSet<&str> = HashSet::with_capacity(snapshot.units.len());
    for su in &snapshot.units {
        unit_ids.insert(su.id.as_str());
        let x = world.mirror_x(su.x);
        if let Some(unit) = world.unit_mut(&su.id) {
            unit.x = x;
            unit.y = su.y;
            unit.hp = su.hp;
            unit.alive = su.alive;
        } else if su.alive {
            // Covers a dropped discrete event: create from the snapshot.
            world.units.push(LocalUnit {
                sync_id: su.id.clone(),
                kind: su.kind,
                x,
                y: su.y,
                hp: su.hp,
                max_hp: su.hp,
                alive: true,
                team: su.team,
                controlled: false,
            });
        }
    }

    let mut building_ids: HashSet<&str> = HashSet::with_capacity(snapshot.buildings.len());
    for sb in &snapshot.buildings {
        building_ids.insert(sb.id.as_str());
        if sb.kind == BuildingKind::Castle {
            // Castles are carried by the snapshot's castles field.
            continue;
        }
        let x = world.mirror_x(sb.x);
        if let Some(building) = world.building_mut(&sb.id) {
            building.x = x;
            building.y = sb.y;
            building.hp = sb.hp;
            building.alive = sb.alive;
        } else if sb.alive {
            world.buildings.push(LocalBuilding {
                sync_id: sb.id.clone(),
                kind: sb.kind,
                x,
                y: sb.y,
                hp: sb.hp,
                max_hp: sb.hp,
                alive: true,
                team: sb.team,
                controlled: false,
            });
        }
    }

    // Snapshot-driven removal: a foreign entity absent upstream is gone.
    world
        .units
        .retain(|u| u.controlled || unit_ids.contains(u.sync_id.as_str()));
    world
        .buildings
        .retain(|b| b.controlled || building_ids.contains(b.sync_id.as_str()));

    // Castle HP/alive mapped from team number onto player/enemy labels.
    let (own, other) = if world.team == 1 {
        (snapshot.castles.team1, snapshot.castles.team2)
    } else {
        (snapshot.castles.team2, snapshot.castles.team1)
    };
    world.player_castle.hp = own.hp;
    world.player_castle.alive = own.alive;
    world.enemy_castle.hp = other.hp;
    world.enemy_castle.alive = other.alive;

    true
}
