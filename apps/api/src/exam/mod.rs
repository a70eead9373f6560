pub mod agent;
pub mod catalog;
pub mod grading;
pub mod handlers;
pub mod models;
pub mod parser;
pub mod prompts;
