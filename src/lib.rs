pub mod analysis;
pub mod browser;
pub mod cli;
pub mod commands;
pub mod config;
pub mod entropy;
pub mod error;
pub mod experiment;
pub mod probe;
pub mod results;
