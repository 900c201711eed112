pub mod matching_world;
pub mod setups;
pub mod steps;

pub use matching_world::MatchingWorld;
