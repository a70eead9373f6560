pub mod interview;
pub mod knowledge;
