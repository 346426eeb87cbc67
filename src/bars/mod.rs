pub mod assigner;
pub mod places;
pub mod ranker;
