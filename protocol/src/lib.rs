// Shared wire protocol for the relay server and the session client.
// Everything crossing the WebSocket is defined here as closed tagged unions
// so both ends decode into statically-known shapes at the boundary.

pub mod error;
pub mod messages;
pub mod room;
pub mod snapshot;

pub use error::RoomError;
pub use messages::{
    AckResult, ClientMessage, LobbyCreatedOk, LobbyListOk, PlayerCountOk, ReadyOk, RoomCreatedOk,
    RoomJoinedOk, ServerMessage, TeamOk,
};
pub use room::{LobbySummaryDto, PlayerDto, RoomDto, RoomMode, RoomStatus};
pub use snapshot::{
    BuildingKind, BuildingPlacedDto, BuildingStateDto, CastleDamageDto, CastleStateDto,
    CastlesDto, GameSnapshotDto, UnitKind, UnitSpawnedDto, UnitStateDto,
};
