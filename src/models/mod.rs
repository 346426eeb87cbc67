pub mod bar;
pub mod group;

pub use bar::{BarAssignment, BarCandidate};
pub use group::{
    Group, GroupStatus, JoinOutcome, LeaveOutcome, MAX_GROUP_SIZE, NewGroup, Participant,
    ParticipantStatus,
};
