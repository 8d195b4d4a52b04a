// Use cases layer: application workflows for the relay.

pub mod registry;

pub use registry::{
    CreateOutcome, JoinOutcome, LeaveOutcome, RegistrySettings, RoomOptions, RoomRegistry,
    RosterBroadcast, StartOutcome,
};
