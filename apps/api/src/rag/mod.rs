pub mod embedding;
pub mod handlers;
pub mod ingest;
pub mod loader;
pub mod ranking;
pub mod retrieve;
pub mod splitter;
pub mod store;
