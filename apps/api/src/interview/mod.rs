pub mod agent;
pub mod handlers;
pub mod prompts;
pub mod scene;
pub mod session;
