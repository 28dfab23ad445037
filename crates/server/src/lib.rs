//! Arena simulation server: geometry and tunables, entities, the
//! world/tick pipeline, bot AI, and the session layer that exposes it
//! over a WebSocket.

pub mod ai;
pub mod collision;
pub mod config;
pub mod entity;
pub mod geometry;
pub mod player;
pub mod session;
pub mod spatial;
pub mod world;

pub use config::Config;
pub use session::run;
