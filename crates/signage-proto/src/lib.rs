pub mod catalog;
pub mod config;
pub mod counter;
pub mod platform;
pub mod queue;
