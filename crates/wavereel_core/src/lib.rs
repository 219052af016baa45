pub mod assets;
pub mod compose;
pub mod config;
pub mod error;
pub mod graph;
pub mod presets;
pub mod types;
