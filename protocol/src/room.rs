use serde::{Deserialize, Serialize};

/// Match size selected at room creation. Always two teams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomMode {
    #[default]
    #[serde(rename = "1v1")]
    OneVsOne,
    #[serde(rename = "2v2")]
    TwoVsTwo,
    #[serde(rename = "3v3")]
    ThreeVsThree,
    #[serde(rename = "ffa")]
    FreeForAll,
}

impl RoomMode {
    pub fn max_players(self) -> usize {
        match self {
            RoomMode::OneVsOne => 2,
            RoomMode::TwoVsTwo => 4,
            RoomMode::ThreeVsThree => 6,
            RoomMode::FreeForAll => 4,
        }
    }
}

/// Room lifecycle; moves forward only (a room never re-enters `waiting`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
}

/// Roster entry as broadcast to room members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerDto {
    pub id: u64,
    pub name: String,
    pub team: u8,
    pub ready: bool,
    pub is_host: bool,
}

/// Room snapshot carried by acks, `RoomUpdate` and `GameStart`.
///
/// Players appear in join order; the server relies on that order for
/// host-migration tie-breaks, clients only for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDto {
    pub code: String,
    pub mode: RoomMode,
    pub status: RoomStatus,
    pub players: Vec<PlayerDto>,
    pub max_players: usize,
}

/// One entry of the public lobby listing (`GetLobbies`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbySummaryDto {
    pub code: String,
    pub room_name: String,
    pub host_name: String,
    pub players: usize,
    pub max_players: usize,
    pub has_password: bool,
    pub created_at: u64,
}
