pub mod candy_machine;
pub mod generation;
