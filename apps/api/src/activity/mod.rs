pub mod analysis;
pub mod handlers;
pub mod tracker;

pub use tracker::{record, ActivityType};
