pub mod assignments;
pub mod catalog;
pub mod core;
pub mod setup;
