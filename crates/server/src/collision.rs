//! Pure collision-resolution math used by the tick pipeline: same-owner
//! push-out, the eating dominance check, and merge-overlap detection.
//!
//! None of these functions mutate anything — `world.rs` owns all state
//! transitions; this module only answers "do these two cells interact,
//! and by how much".

use glam::Vec2;

use crate::config::TuningConfig;
use crate::entity::Cell;

/// Push-apart vector for two overlapping same-owner cells (spec §4.6
/// step 2): along the connecting axis, scaled by half the overlap and
/// weighted so the heavier cell moves less. Returns `(push_a, push_b)`
/// with `push_a` applied to `a` and `push_b` to `b`. Zero if they don't
/// overlap or sit exactly on top of each other.
pub fn push_out(a: &Cell, b: &Cell) -> (Vec2, Vec2) {
    let delta = b.pos() - a.pos();
    let dist = delta.length();
    let overlap = a.render_radius() + b.render_radius() - dist;
    if overlap <= 0.0 || dist < 1e-4 {
        return (Vec2::ZERO, Vec2::ZERO);
    }
    let axis = delta / dist;
    let total_mass = a.mass + b.mass;
    let a_share = b.mass / total_mass;
    let b_share = a.mass / total_mass;
    let magnitude = overlap * 0.5;
    (-axis * magnitude * a_share, axis * magnitude * b_share)
}

/// Eating dominance check (spec §4.8). `e` eats `v` when the base-radius
/// ratio and distance-inset rule both hold; victim-side checks (owner,
/// alive, immunity) are the caller's responsibility since they need
/// world-level context this function doesn't have.
pub fn can_eat(e: &Cell, v: &Cell, tuning: &TuningConfig) -> bool {
    if e.mass <= v.mass {
        return false;
    }
    let rb_e = e.base_radius();
    let rb_v = v.base_radius();
    if rb_e < rb_v * tuning.eat_radius_ratio {
        return false;
    }
    let dist = e.pos().distance(v.pos());
    dist < rb_e - rb_v * tuning.eat_distance_factor
}

/// Merge-eligibility overlap check (spec §4.9): `distance(A,B) <
/// merge_radius`, where `merge_radius = ratio * (radius(A) +
/// radius(B))`. `ratio` is normally [`crate::geometry::MERGE_OVERLAP_RATIO`]
/// (0.9), but callers tighten it to
/// [`crate::geometry::AUTO_SPLIT_MERGE_OVERLAP_RATIO`] while either cell
/// is within its post-auto-split grace window.
pub fn merge_overlaps(a: &Cell, b: &Cell, ratio: f32) -> bool {
    let merge_radius = ratio * (a.render_radius() + b.render_radius());
    a.pos().distance(b.pos()) < merge_radius
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::CellState;

    fn cell_at(id: u32, owner: u32, x: f32, y: f32, mass: f32) -> Cell {
        Cell::new(id, owner, x, y, mass, 0)
    }

    #[test]
    fn push_out_is_zero_when_not_overlapping() {
        let a = cell_at(1, 1, 0.0, 0.0, 1000.0);
        let b = cell_at(2, 1, 10_000.0, 0.0, 1000.0);
        let (pa, pb) = push_out(&a, &b);
        assert_eq!(pa, Vec2::ZERO);
        assert_eq!(pb, Vec2::ZERO);
    }

    #[test]
    fn push_out_moves_lighter_cell_more() {
        let a = cell_at(1, 1, 0.0, 0.0, 2000.0);
        let b = cell_at(2, 1, 5.0, 0.0, 500.0);
        let (pa, pb) = push_out(&a, &b);
        assert!(pa.length() < pb.length());
    }

    #[test]
    fn eat_by_margin_scenario() {
        // Scenario 2 from spec §8: E mass=900 (base r=30) at origin, V
        // mass=400 (base r=20) at distance 10. 30 >= 20*1.15=23 and
        // 10 < 30-8=22, so E eats V.
        let e = cell_at(1, 1, 0.0, 0.0, 900.0);
        let v = cell_at(2, 2, 10.0, 0.0, 400.0);
        let tuning = TuningConfig::default();
        assert!(can_eat(&e, &v, &tuning));
    }

    #[test]
    fn no_eat_when_margin_insufficient() {
        let e = cell_at(1, 1, 0.0, 0.0, 900.0);
        let v = cell_at(2, 2, 21.5, 0.0, 400.0);
        let tuning = TuningConfig::default();
        assert!(!can_eat(&e, &v, &tuning));
    }

    #[test]
    fn merge_snap_scenario() {
        // Scenario 6: masses 500 and 300, distance under 0.9*(r1+r2).
        let a = cell_at(1, 1, 0.0, 0.0, 500.0);
        let mut b = cell_at(2, 1, 1.0, 0.0, 300.0);
        b.state = CellState::Idle;
        assert!(merge_overlaps(&a, &b, crate::geometry::MERGE_OVERLAP_RATIO));
    }
}
