#![allow(unused_imports)]

pub use super::candy_machine::Entity as CandyMachine;
