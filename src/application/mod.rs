pub mod aggregator;
pub mod bootstrap;
pub mod commands;
pub mod connections;
pub mod fetch;
