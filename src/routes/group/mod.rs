pub mod handler;
pub mod model;

pub use handler::{assign_bar, create_or_join, current_group, heartbeat, leave_group, reap_stale};
