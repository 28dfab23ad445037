//! Pure geometry helpers and the frozen physics constants.
//!
//! The two radius formulas below are invariants, not tunables: render
//! radius drives rendering, push-out and merge distance; base radius is
//! used nowhere except the eating dominance check (`collision::can_eat`).
//! Everything else in this module is a default value mirrored into
//! [`crate::config::TuningConfig`] — the simulation reads the config
//! copy at runtime, these constants exist for tests and for serde's
//! `#[serde(default = ...)]` wiring.

use std::f32::consts::PI;

pub const MIN_MASS: f32 = 200.0;
pub const BASE_SPEED: f32 = 4.5;
pub const MASS_FACTOR: f32 = 0.0012;
pub const FRICTION: f32 = 0.985;
pub const FRICTION_SPLIT: f32 = 0.995;
pub const SPLIT_MIN_MASS: f32 = 300.0;
pub const SPLIT_IMMUNITY_MS: i64 = 500;
pub const SPLIT_DIR_LOCK_MS: i64 = 120;
pub const SPLIT_BASE_IMPULSE: f32 = 10.0;
pub const SPLIT_FORWARD_MULT: f32 = 4.5;
pub const SPLIT_BACKWARD_MULT: f32 = 0.85;
pub const SPLIT_EJECTION_GAP: f32 = 1.25;
pub const EAT_RADIUS_RATIO: f32 = 1.15;
pub const EAT_DISTANCE_FACTOR: f32 = 0.4;
pub const MERGE_COOLDOWN_MS: i64 = 300;
pub const MERGE_DELAY_MIN_MS: i64 = 450;
pub const MERGE_OVERLAP_RATIO: f32 = 0.9;
/// Stricter overlap ratio required to merge while either cell is still
/// within `AUTO_SPLIT_MERGE_GRACE_MS` of its `auto_split_time` (spec
/// §4.9: auto-split "imposes a higher overlap ratio before they are
/// again merge-eligible"). Smaller than `MERGE_OVERLAP_RATIO` since the
/// merge precondition is `distance < ratio * (r_a + r_b)` — the two
/// cells must sit closer together, not just within the looser radius.
pub const AUTO_SPLIT_MERGE_OVERLAP_RATIO: f32 = 0.5;
/// How long after an auto-split the stricter overlap ratio applies.
pub const AUTO_SPLIT_MERGE_GRACE_MS: i64 = 5_000;
pub const AUTO_SPLIT_MASS: f32 = 22500.0;
pub const VIRUS_MASS_THRESHOLD: f32 = 2000.0;
pub const VIRUS_MAX_MASS: f32 = 2000.0;
pub const VIRUS_START_MASS: f32 = 1000.0;
pub const VIRUS_SPLIT_MAX_PIECES: usize = 16;
pub const VIRUS_SPLIT_IMPULSE: f32 = 12.0;
pub const MASS_DECAY_RATE: f32 = 2e-5;

/// Not a tunable: the hard per-player cell cap from the data model.
pub const MAX_CELLS: usize = 32;
/// Starting/respawn mass for a fresh cell.
pub const RESPAWN_MASS: f32 = 1500.0;
/// Feed pellet mass cap and initial ejection speed.
pub const FEED_MASS_CAP: f32 = 20.0;
pub const FEED_EJECT_SPEED: f32 = 20.0;
pub const FEED_PELLET_LIFETIME_MS: i64 = 5_000;
pub const FEED_PELLET_DAMPING: f32 = 0.98;
pub const VIRUS_PROJECTILE_LIFETIME_MS: i64 = 3_000;
pub const VIRUS_PROJECTILE_DAMPING: f32 = 0.99;
pub const VIRUS_POP_EJECT_SPEED: f32 = 30.0;
/// Mass given to a projectile spawned by a popping virus; not pinned by
/// the data model, chosen to be absorbable by a just-grown cell.
pub const VIRUS_PROJECTILE_MASS: f32 = 100.0;

/// `radius(mass) = sqrt(mass/pi) * (4.5 + min(mass/5000, 2.5))`
#[inline]
pub fn render_radius(mass: f32) -> f32 {
    (mass / PI).sqrt() * (4.5 + (mass / 5000.0).min(2.5))
}

/// `base_radius = sqrt(mass)`, used only by the eating dominance check.
#[inline]
pub fn base_radius(mass: f32) -> f32 {
    mass.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_radius_matches_scenario_eat_by_margin() {
        assert!((base_radius(900.0) - 30.0).abs() < 0.01);
        assert!((base_radius(400.0) - 20.0).abs() < 0.01);
    }

    #[test]
    fn render_radius_is_monotonic_in_mass() {
        assert!(render_radius(2000.0) > render_radius(1000.0));
        assert!(render_radius(200.0) > 0.0);
    }
}
