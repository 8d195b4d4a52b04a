// Gameplay payloads relayed opaquely by the server. Coordinates are always
// in the shared world frame (team 1 attacks left-to-right); each receiver
// mirrors into its own local frame.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Knight,
    Archer,
    Cavalry,
    Catapult,
    Mage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildingKind {
    Mine,
    Farm,
    Barracks,
    Archery,
    Stable,
    Siege,
    Mage,
    Tower,
    Wall,
    Forge,
    Hospital,
    Research,
    Castle,
}

/// Discrete building placement, sent the moment the action happens so the
/// other side can materialize it without waiting for the next snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingPlacedDto {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BuildingKind,
    pub x: f32,
    pub y: f32,
    pub hp: i32,
    pub max_hp: i32,
    /// Stamped by the server from the sender's roster entry.
    #[serde(default)]
    pub sender_team: u8,
}

/// Discrete unit spawn; same contract as [`BuildingPlacedDto`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSpawnedDto {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: UnitKind,
    pub x: f32,
    pub y: f32,
    pub hp: i32,
    pub max_hp: i32,
    #[serde(default)]
    pub sender_team: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitStateDto {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: UnitKind,
    pub x: f32,
    pub y: f32,
    pub hp: i32,
    pub alive: bool,
    pub team: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingStateDto {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BuildingKind,
    pub x: f32,
    pub y: f32,
    pub hp: i32,
    pub alive: bool,
    pub team: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CastleStateDto {
    pub hp: i32,
    pub alive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CastlesDto {
    pub team1: CastleStateDto,
    pub team2: CastleStateDto,
}

/// Full-state snapshot the host emits on a fixed interval.
///
/// `tick` increments once per emission; guests discard any snapshot whose
/// tick is not newer than the last one they applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshotDto {
    pub tick: u64,
    pub units: Vec<UnitStateDto>,
    pub buildings: Vec<BuildingStateDto>,
    pub castles: CastlesDto,
    pub timestamp: u64,
}

/// Castle damage notice, relayed to every member including the sender.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CastleDamageDto {
    pub team: u8,
    pub amount: i32,
}
