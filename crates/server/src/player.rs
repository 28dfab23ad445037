//! Player: an input source that owns a set of cells in the world.
//!
//! The world is the only owner of cells (spec §3) — a `Player` holds
//! non-owning `u32` ids into `World`'s cell collection, never a
//! reference. A bot is just a `Player` with `is_bot = true`; its inputs
//! are written by [`crate::ai`] instead of a connection (spec §9).

use protocol::Color;

use crate::geometry;

#[derive(Debug, Clone)]
pub struct Player {
    pub id: u32,
    pub name: String,
    pub color: Color,
    pub cell_ids: Vec<u32>,
    pub input_dir_x: f32,
    pub input_dir_y: f32,
    pub cursor_x: f32,
    pub cursor_y: f32,
    pub last_split_time: i64,
    pub split_sequence: u32,
    pub is_bot: bool,
    pub connected: bool,
}

impl Player {
    pub fn new(id: u32, name: String, color: Color, is_bot: bool) -> Self {
        Self {
            id,
            name,
            color,
            cell_ids: Vec::new(),
            input_dir_x: 0.0,
            input_dir_y: 0.0,
            cursor_x: 0.0,
            cursor_y: 0.0,
            last_split_time: 0,
            split_sequence: 0,
            is_bot,
            connected: true,
        }
    }

    /// `max_cells(p) = clamp(floor(total_mass/MIN_MASS), 1, 32)` (spec
    /// §3). `total_mass` is supplied by the caller since `Player` holds
    /// no cell data of its own.
    pub fn max_cells(total_mass: f32, tuning_min_mass: f32) -> usize {
        ((total_mass / tuning_min_mass).floor() as i64).clamp(1, geometry::MAX_CELLS as i64) as usize
    }

    /// Replace the buffered movement input, rejecting non-finite values
    /// (spec §7: "invariant-violating input ... dropped for that tick;
    /// the last valid input is retained").
    pub fn apply_input(&mut self, dir_x: f32, dir_y: f32, cursor_x: f32, cursor_y: f32) {
        if [dir_x, dir_y, cursor_x, cursor_y].iter().all(|v| v.is_finite()) {
            self.input_dir_x = dir_x;
            self.input_dir_y = dir_y;
            self.cursor_x = cursor_x;
            self.cursor_y = cursor_y;
        }
    }

    /// Truncate and trim a client-supplied name to at most 20 code
    /// points (spec §6).
    pub fn sanitize_name(raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return "unnamed".to_string();
        }
        trimmed.chars().take(20).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_cells_is_clamped_between_one_and_thirty_two() {
        assert_eq!(Player::max_cells(0.0, 200.0), 1);
        assert_eq!(Player::max_cells(1500.0, 200.0), 7);
        assert_eq!(Player::max_cells(1_000_000.0, 200.0), 32);
    }

    #[test]
    fn apply_input_rejects_non_finite_values() {
        let mut p = Player::new(1, "a".to_string(), Color::new(1, 2, 3), false);
        p.apply_input(1.0, 0.0, 10.0, 20.0);
        p.apply_input(f32::NAN, 0.0, 99.0, 99.0);
        assert_eq!(p.input_dir_x, 1.0);
        assert_eq!(p.cursor_x, 10.0);
    }

    #[test]
    fn sanitize_name_truncates_and_trims() {
        assert_eq!(Player::sanitize_name("  hi  "), "hi");
        assert_eq!(Player::sanitize_name(&"x".repeat(30)).chars().count(), 20);
        assert_eq!(Player::sanitize_name("   "), "unnamed");
    }
}
