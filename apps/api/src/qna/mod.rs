pub mod agent;
pub mod handlers;
pub mod history;
pub mod parser;
pub mod prompts;
