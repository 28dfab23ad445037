//! Shared protocol crate for the arena server.
//!
//! This crate contains the JSON wire messages exchanged between a
//! client and the server, and the shared value types (`Color`) used
//! throughout the simulation.

mod error;
mod messages;

pub use error::ProtocolError;
pub use messages::*;

use serde::{Deserialize, Serialize};

/// RGB color used for cells, pellets and viruses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}
