pub mod prelude;

pub mod candy_machine;
