pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod recommendation;
pub mod simulation;
pub mod state;
pub mod status;
pub mod sync;
