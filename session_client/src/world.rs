// The serializable simulation container shared between the surrounding
// game, the host synchronizer and the guest reconciler. Everything here is
// in the owner's local frame (own side on the left); the world frame is
// team 1's local frame.

use protocol::{BuildingKind, UnitKind};

/// Grid width of the battlefield.
pub const DEFAULT_COLS: u32 = 30;
/// Starting castle hit points.
pub const CASTLE_MAX_HP: i32 = 1000;

pub fn opposing(team: u8) -> u8 {
    if team == 1 { 2 } else { 1 }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CastleStatus {
    pub hp: i32,
    pub alive: bool,
}

impl Default for CastleStatus {
    fn default() -> Self {
        Self {
            hp: CASTLE_MAX_HP,
            alive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalUnit {
    pub sync_id: String,
    pub kind: UnitKind,
    pub x: f32,
    pub y: f32,
    pub hp: i32,
    pub max_hp: i32,
    pub alive: bool,
    /// World-frame team the unit fights for.
    pub team: u8,
    /// Locally simulated (spawned on this side) vs mirrored from the host.
    pub controlled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalBuilding {
    pub sync_id: String,
    pub kind: BuildingKind,
    pub x: f32,
    pub y: f32,
    pub hp: i32,
    pub max_hp: i32,
    pub alive: bool,
    pub team: u8,
    pub controlled: bool,
}

#[derive(Debug)]
pub struct LocalWorld {
    pub cols: u32,
    /// This side's world-frame team.
    pub team: u8,
    pub units: Vec<LocalUnit>,
    pub buildings: Vec<LocalBuilding>,
    pub player_castle: CastleStatus,
    pub enemy_castle: CastleStatus,
}

impl LocalWorld {
    pub fn new(cols: u32) -> Self {
        Self {
            cols,
            team: 1,
            units: Vec::new(),
            buildings: Vec::new(),
            player_castle: CastleStatus::default(),
            enemy_castle: CastleStatus::default(),
        }
    }

    /// Fresh match state: empty entity lists, full castles, this side's
    /// team stamped for frame conversion.
    pub fn reset(&mut self, team: u8) {
        self.team = team;
        self.units.clear();
        self.buildings.clear();
        self.player_castle = CastleStatus::default();
        self.enemy_castle = CastleStatus::default();
    }

    /// Maps an X coordinate between the world frame and this side's local
    /// frame. Team 1's local frame is the world frame; for team 2 the axis
    /// is mirrored. The mapping is its own inverse, so the same call
    /// serves both directions.
    pub fn mirror_x(&self, x: f32) -> f32 {
        if self.team == 1 {
            x
        } else {
            (self.cols - 1) as f32 - x
        }
    }

    pub fn unit(&self, sync_id: &str) -> Option<&LocalUnit> {
        self.units.iter().find(|u| u.sync_id == sync_id)
    }

    pub fn unit_mut(&mut self, sync_id: &str) -> Option<&mut LocalUnit> {
        self.units.iter_mut().find(|u| u.sync_id == sync_id)
    }

    pub fn building(&self, sync_id: &str) -> Option<&LocalBuilding> {
        self.buildings.iter().find(|b| b.sync_id == sync_id)
    }

    pub fn building_mut(&mut self, sync_id: &str) -> Option<&mut LocalBuilding> {
        self.buildings.iter_mut().find(|b| b.sync_id == sync_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_the_viewer_is_team_one_then_world_x_is_unchanged() {
        let world = LocalWorld::new(30);
        assert_eq!(world.mirror_x(4.0), 4.0);
    }

    #[test]
    fn when_the_viewer_is_team_two_then_world_x_is_mirrored() {
        let mut world = LocalWorld::new(30);
        world.reset(2);
        assert_eq!(world.mirror_x(4.0), 25.0);
    }

    #[test]
    fn when_mirroring_twice_then_the_coordinate_round_trips() {
        let mut world = LocalWorld::new(30);
        world.reset(2);
        let x = 7.0;
        assert_eq!(world.mirror_x(world.mirror_x(x)), x);
    }

    #[test]
    fn when_the_world_is_reset_then_castles_are_fresh_and_lists_empty() {
        let mut world = LocalWorld::new(30);
        world.enemy_castle.hp = 12;
        world.enemy_castle.alive = false;
        world.units.push(LocalUnit {
            sync_id: "1-1".to_string(),
            kind: protocol::UnitKind::Knight,
            x: 0.0,
            y: 0.0,
            hp: 100,
            max_hp: 100,
            alive: true,
            team: 1,
            controlled: true,
        });

        world.reset(2);
        assert_eq!(world.team, 2);
        assert!(world.units.is_empty());
        assert_eq!(world.enemy_castle, CastleStatus::default());
    }
}
