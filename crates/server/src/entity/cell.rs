//! The player-owned cell: the fundamental simulated body.

use glam::Vec2;

use crate::config::TuningConfig;
use crate::geometry;
use crate::world::WorldBorder;

/// Lifecycle state of a cell. Mostly bookkeeping for merge/split timing
/// logic; eating/push-out eligibility is driven by the explicit
/// timestamp fields rather than by matching on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Idle,
    Moving,
    SplitTravel,
    MergeReady,
    Merging,
    Dead,
}

#[derive(Debug, Clone)]
pub struct Cell {
    pub id: u32,
    pub owner_id: u32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub mass: f32,
    pub state: CellState,
    pub last_split_time: i64,
    pub split_time: i64,
    pub split_immunity_until: i64,
    pub split_direction_lock_until: i64,
    pub split_dir_x: f32,
    pub split_dir_y: f32,
    pub merge_target_id: Option<u32>,
    pub merge_start_time: i64,
    pub auto_split_time: i64,
    pub is_alive: bool,
}

impl Cell {
    pub fn new(id: u32, owner_id: u32, x: f32, y: f32, mass: f32, _now: i64) -> Self {
        Self {
            id,
            owner_id,
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            mass: mass.max(geometry::MIN_MASS),
            state: CellState::Idle,
            last_split_time: 0,
            split_time: 0,
            split_immunity_until: 0,
            split_direction_lock_until: 0,
            split_dir_x: 0.0,
            split_dir_y: 0.0,
            merge_target_id: None,
            merge_start_time: 0,
            auto_split_time: 0,
            is_alive: true,
        }
    }

    #[inline]
    pub fn pos(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    #[inline]
    pub fn render_radius(&self) -> f32 {
        geometry::render_radius(self.mass)
    }

    #[inline]
    pub fn base_radius(&self) -> f32 {
        geometry::base_radius(self.mass)
    }

    #[inline]
    pub fn has_split_immunity(&self, now: i64) -> bool {
        now < self.split_immunity_until
    }

    #[inline]
    pub fn is_direction_locked(&self, now: i64) -> bool {
        now < self.split_direction_lock_until
    }

    /// Per-tick movement integration (spec §4.2, steps 1-7).
    pub fn integrate_movement(&mut self, input_dir: Vec2, now: i64, border: &WorldBorder, tuning: &TuningConfig) {
        if self.is_direction_locked(now) {
            self.vx *= geometry::FRICTION_SPLIT;
            self.vy *= geometry::FRICTION_SPLIT;
        } else {
            let has_input = input_dir.x != 0.0 || input_dir.y != 0.0;
            if has_input {
                let over = (self.mass / tuning.min_mass - 1.0).max(0.0);
                let target_speed = tuning.base_speed / (1.0 + over.sqrt() * tuning.mass_factor * 50.0);
                let target_vx = input_dir.x * target_speed;
                let target_vy = input_dir.y * target_speed;
                let dvx = target_vx - self.vx;
                let dvy = target_vy - self.vy;
                let remaining = (dvx * dvx + dvy * dvy).sqrt();

                // Cells still inside the post-split window blend more
                // slowly, so a split's impulse isn't instantly cancelled
                // by steering input.
                let recently_split = now - self.split_time < 500;
                let mut blend = if recently_split { 0.1 } else { 0.2 };
                if remaining < 0.5 {
                    blend *= 0.5;
                }
                self.vx += dvx * blend;
                self.vy += dvy * blend;
            } else {
                let friction = if self.state == CellState::SplitTravel {
                    geometry::FRICTION_SPLIT
                } else {
                    tuning.friction
                };
                self.vx *= friction;
                self.vy *= friction;
            }
        }

        self.x += self.vx;
        self.y += self.vy;

        if self.mass > tuning.min_mass {
            let decayed = self.mass - self.mass * tuning.mass_decay_rate * (1.0 + self.mass / 5000.0);
            self.mass = decayed.max(tuning.min_mass);
        }

        let r = self.render_radius();
        self.x = self.x.clamp(border.min_x + r, border.max_x - r);
        self.y = self.y.clamp(border.min_y + r, border.max_y - r);

        if self.state == CellState::SplitTravel && !self.is_direction_locked(now) {
            self.state = if self.vx.abs() > 0.01 || self.vy.abs() > 0.01 {
                CellState::Moving
            } else {
                CellState::Idle
            };
        }
    }

    fn begin_split_travel(&mut self, dir: Vec2, now: i64, tuning: &TuningConfig) {
        self.state = CellState::SplitTravel;
        self.split_time = now;
        self.last_split_time = now;
        self.split_immunity_until = now + tuning.split_immunity_ms;
        self.split_direction_lock_until = now + tuning.split_dir_lock_ms;
        self.split_dir_x = dir.x;
        self.split_dir_y = dir.y;
    }
}

/// Split a cell in two along `dir` with impulse multiplier `k` (spec
/// §4.3). `parent` is mutated in place (it keeps half the mass and
/// records a backward kick); the new cell is returned for the caller to
/// insert into the world.
pub fn split_cell(parent: &mut Cell, dir: Vec2, k: f32, now: i64, new_id: u32, tuning: &TuningConfig) -> Cell {
    let old_mass = parent.mass;
    let new_mass = (old_mass / 2.0).max(tuning.min_mass);
    let remaining = old_mass - new_mass;
    parent.mass = remaining;

    let r_old = geometry::render_radius(remaining);
    let r_new = geometry::render_radius(new_mass);
    let offset = ((r_old + r_new) * tuning.split_ejection_gap).max((r_old + r_new) * 1.1);

    let base_impulse = tuning.split_base_impulse + (r_old * 0.12).clamp(0.0, 6.0) + (remaining * 0.0015).clamp(0.0, 3.0);
    let impulse = base_impulse * k;

    let mut child = Cell::new(new_id, parent.owner_id, parent.x + dir.x * offset, parent.y + dir.y * offset, new_mass, now);
    child.vx = dir.x * impulse * tuning.split_forward_mult;
    child.vy = dir.y * impulse * tuning.split_forward_mult;
    child.begin_split_travel(dir, now, tuning);

    parent.vx += -dir.x * impulse * tuning.split_backward_mult;
    parent.vy += -dir.y * impulse * tuning.split_backward_mult;
    parent.begin_split_travel(Vec2::new(-dir.x, -dir.y), now, tuning);

    child
}

/// Unit vector from `from` toward `to`; falls back to `(1,0)` when the
/// two points coincide so callers never propagate a NaN direction.
#[inline]
pub fn direction_to(from: Vec2, to: Vec2) -> Vec2 {
    let delta = to - from;
    let len = delta.length();
    if len > 1e-4 {
        delta / len
    } else {
        Vec2::new(1.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TuningConfig;

    #[test]
    fn split_conserves_mass_and_produces_two_equal_halves() {
        let tuning = TuningConfig::default();
        let mut parent = Cell::new(1, 7, 0.0, 0.0, 1500.0, 0);
        let child = split_cell(&mut parent, Vec2::new(1.0, 0.0), 1.0, 0, 2, &tuning);

        assert!((parent.mass - 750.0).abs() < 0.01);
        assert!((child.mass - 750.0).abs() < 0.01);
        assert!((parent.mass + child.mass - 1500.0).abs() < 0.01);
        assert_eq!(parent.state, CellState::SplitTravel);
        assert_eq!(child.state, CellState::SplitTravel);
        assert!(child.vx > 0.0);
        assert!(parent.vx < 0.0);
    }

    #[test]
    fn split_immunity_and_direction_lock_expire() {
        let tuning = TuningConfig::default();
        let mut parent = Cell::new(1, 7, 0.0, 0.0, 1500.0, 1_000);
        let child = split_cell(&mut parent, Vec2::new(1.0, 0.0), 1.0, 1_000, 2, &tuning);

        assert!(child.has_split_immunity(1_100));
        assert!(!child.has_split_immunity(1_100 + tuning.split_immunity_ms));
        assert!(child.is_direction_locked(1_100));
        assert!(!child.is_direction_locked(1_000 + tuning.split_dir_lock_ms + 1));
    }

    #[test]
    fn direction_to_falls_back_when_points_coincide() {
        let dir = direction_to(Vec2::new(5.0, 5.0), Vec2::new(5.0, 5.0));
        assert_eq!(dir, Vec2::new(1.0, 0.0));
    }
}
