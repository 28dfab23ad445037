//! Stationary food pellet.

use protocol::Color;

#[derive(Debug, Clone)]
pub struct Pellet {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub mass: f32,
    pub color: Color,
}
