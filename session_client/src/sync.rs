// Host-side synchronization: a fixed-interval task that serializes the
// whole live world into the shared frame and transmits it unconditionally.
// The snapshot is also where terminal win conditions are detected.

use crate::client::Shared;
use crate::util::{lock, now_epoch_millis};
use crate::world::{LocalWorld, opposing};
use protocol::{
    BuildingStateDto, CastleStateDto, CastlesDto, ClientMessage, GameSnapshotDto, UnitStateDto,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Serializes the world into a wire snapshot. Entities and castles are
/// tagged with world-frame coordinates and team numbers, independent of
/// the host's own orientation.
pub fn build_snapshot(world: &LocalWorld, tick: u64, timestamp: u64) -> GameSnapshotDto {
    let units = world
        .units
        .iter()
        .filter(|u| u.alive)
        .map(|u| UnitStateDto {
            id: u.sync_id.clone(),
            kind: u.kind,
            x: world.mirror_x(u.x),
            y: u.y,
            hp: u.hp,
            alive: u.alive,
            team: u.team,
        })
        .collect();

    let buildings = world
        .buildings
        .iter()
        .filter(|b| b.alive)
        .map(|b| BuildingStateDto {
            id: b.sync_id.clone(),
            kind: b.kind,
            x: world.mirror_x(b.x),
            y: b.y,
            hp: b.hp,
            alive: b.alive,
            team: b.team,
        })
        .collect();

    let own = CastleStateDto {
        hp: world.player_castle.hp,
        alive: world.player_castle.alive,
    };
    let other = CastleStateDto {
        hp: world.enemy_castle.hp,
        alive: world.enemy_castle.alive,
    };
    let castles = if world.team == 1 {
        CastlesDto {
            team1: own,
            team2: other,
        }
    } else {
        CastlesDto {
            team1: other,
            team2: own,
        }
    };

    GameSnapshotDto {
        tick,
        units,
        buildings,
        castles,
        timestamp,
    }
}

/// A dead castle decides the match: the surviving side's team wins.
pub fn detect_winner(world: &LocalWorld) -> Option<u8> {
    if !world.player_castle.alive {
        Some(opposing(world.team))
    } else if !world.enemy_castle.alive {
        Some(world.team)
    } else {
        None
    }
}

pub(crate) async fn run_host_sync(shared: Arc<Shared>, stop: Arc<Notify>) {
    let mut ticker = tokio::time::interval(shared.config.sync_interval);
    debug!("host sync armed");

    loop {
        tokio::select! {
            _ = stop.notified() => break,
            _ = ticker.tick() => {}
        }

        let tick = shared.snapshot_tick.fetch_add(1, Ordering::Relaxed) + 1;
        // Read the world only for the instant of serialization; the
        // simulation mutates it between ticks.
        let (snapshot, winner) = {
            let world = lock(&shared.world);
            (
                build_snapshot(&world, tick, now_epoch_millis()),
                detect_winner(&world),
            )
        };

        if shared
            .send_raw(&ClientMessage::GameStateSync(snapshot))
            .is_err()
        {
            debug!("connection gone; host sync exiting");
            break;
        }

        if let Some(winner) = winner {
            // One-shot terminal event; the relay flips the room to
            // finished and echoes GameOver back to everyone.
            info!(winner, "castle down; announcing game over");
            let _ = shared.send_raw(&ClientMessage::GameOver { winner });
            break;
        }
    }

    // Free the slot so a later become_host can re-arm.
    let mut guard = lock(&shared.sync_stop);
    if guard.as_ref().is_some_and(|n| Arc::ptr_eq(n, &stop)) {
        *guard = None;
    }
    debug!("host sync stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{CASTLE_MAX_HP, LocalUnit};
    use protocol::UnitKind;

    fn host_world(team: u8) -> LocalWorld {
        let mut world = LocalWorld::new(30);
        world.reset(team);
        world
    }

    fn unit(id: &str, x: f32, team: u8, alive: bool) -> LocalUnit {
        LocalUnit {
            sync_id: id.to_string(),
            kind: UnitKind::Knight,
            x,
            y: 4.0,
            hp: 100,
            max_hp: 100,
            alive,
            team,
            controlled: true,
        }
    }

    #[test]
    fn when_a_team_two_host_serializes_then_coordinates_enter_the_world_frame() {
        let mut world = host_world(2);
        world.units.push(unit("2-1", 4.0, 2, true));

        let snap = build_snapshot(&world, 1, 0);
        assert_eq!(snap.units.len(), 1);
        assert_eq!(snap.units[0].x, 25.0);
        assert_eq!(snap.units[0].team, 2);
    }

    #[test]
    fn when_entities_are_dead_then_they_are_absent_from_the_snapshot() {
        let mut world = host_world(1);
        world.units.push(unit("1-1", 3.0, 1, true));
        world.units.push(unit("1-2", 5.0, 2, false));

        let snap = build_snapshot(&world, 1, 0);
        let ids: Vec<&str> = snap.units.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["1-1"]);
    }

    #[test]
    fn when_a_team_two_host_serializes_castles_then_labels_map_by_team() {
        let mut world = host_world(2);
        world.player_castle.hp = 250;
        world.enemy_castle.hp = 900;

        let snap = build_snapshot(&world, 1, 0);
        // Host is team 2: its own castle is team2 on the wire.
        assert_eq!(snap.castles.team2.hp, 250);
        assert_eq!(snap.castles.team1.hp, 900);
    }

    #[test]
    fn when_the_hosts_castle_falls_then_the_other_team_wins() {
        let mut world = host_world(1);
        world.player_castle.alive = false;
        world.player_castle.hp = 0;
        assert_eq!(detect_winner(&world), Some(2));
    }

    #[test]
    fn when_the_enemy_castle_falls_then_the_host_team_wins() {
        let mut world = host_world(2);
        world.enemy_castle.alive = false;
        assert_eq!(detect_winner(&world), Some(2));
    }

    #[test]
    fn when_both_castles_stand_then_there_is_no_winner() {
        let world = host_world(1);
        assert_eq!(world.player_castle.hp, CASTLE_MAX_HP);
        assert_eq!(detect_winner(&world), None);
    }
}
