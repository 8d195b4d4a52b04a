// Embeddable session layer for the relay: one connection, request/response
// room operations, and the host/guest state-synchronization machinery the
// surrounding game drives through `LocalWorld`.

pub mod callbacks;
pub mod client;
pub mod error;
pub mod reconcile;
pub mod sync;
pub mod world;

mod util;

pub use callbacks::GameOverNotice;
pub use client::{SessionClient, SessionConfig};
pub use error::ClientError;
pub use world::{
    CASTLE_MAX_HP, CastleStatus, DEFAULT_COLS, LocalBuilding, LocalUnit, LocalWorld, opposing,
};
