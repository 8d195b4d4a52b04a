// Domain layer: room state and rules, no I/O.

pub mod room;
pub mod room_code;

pub use room::{MIN_PLAYERS_TO_START, Player, Room, Visibility};
pub use room_code::{CODE_ALPHABET, CODE_LEN, generate_room_code, normalize_code};
