//! Simulated bodies: the player cell and the three passive entity kinds.

mod cell;
mod feed_pellet;
mod pellet;
mod virus;
mod virus_projectile;

pub use cell::{direction_to, split_cell, Cell, CellState};
pub use feed_pellet::FeedPellet;
pub use pellet::Pellet;
pub use virus::{Virus, VIRUS_COLOR};
pub use virus_projectile::VirusProjectile;
