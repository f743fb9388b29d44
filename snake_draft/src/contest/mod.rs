//! Contest entry: admission, withdrawal and room matchmaking.
//!
//! Admission holds a short (contest, user) lock, then runs one serializable
//! transaction that re-validates the contest, debits the fee, assigns a room
//! seat through [`RoomMatchmaker`] and records the entry. Launching a filled
//! room happens after commit through a [`RoomLauncher`].

pub mod admission;
pub mod config;
pub mod errors;
pub mod matchmaker;
pub mod memory;
pub mod models;
pub mod repository;

pub use admission::{AdmissionController, RoomLauncher};
pub use config::AdmissionConfig;
pub use errors::{ContestError, ContestResult};
pub use matchmaker::{RoomAssignment, RoomMatchmaker};
pub use memory::MemoryContestRepository;
pub use models::{
    Admission, Contest, ContestRoom, ContestStatus, ContestType, Entry, EntryStatus, Lineup,
    NewContest, RoomStatus, Withdrawal,
};
pub use repository::{ContestRepository, ContestTx, PgContestRepository, RoomParticipants};
