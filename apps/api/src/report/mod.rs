pub mod export;
pub mod generator;
pub mod handlers;
