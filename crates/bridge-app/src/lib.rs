pub mod config;
pub mod points;
