//! Bot AI: an in-process controller that reads the world and writes
//! `(input_dir, cursor)` for bot-owned players once per tick.
//!
//! A bot is composition, not inheritance (spec §9): it is an ordinary
//! `Player` with `is_bot = true`; this module is simply the thing that
//! writes its input instead of a connection task doing so. Bots never
//! call world mutators other than [`World::apply_input`] and
//! [`World::handle_action`] — from the tick pipeline's point of view a
//! bot's input is indistinguishable from a client's.

use glam::Vec2;

use crate::world::World;

/// Cells within this distance of a larger enemy cell flee it instead of
/// seeking food.
const THREAT_RANGE: f32 = 400.0;
/// A threat must be at least this much bigger (base-radius eat ratio,
/// spec §4.8) before a bot treats it as dangerous rather than prey.
const THREAT_MASS_RATIO: f32 = 1.15;
/// How far ahead of the steering direction the synthetic cursor sits.
const CURSOR_LEAD: f32 = 200.0;

/// Steer every bot-owned player for this tick: flee the nearest
/// meaningfully larger enemy cell if one is close, otherwise seek the
/// nearest food pellet. Bots with no cells (mid-respawn) are skipped.
pub fn update_bots(world: &mut World) {
    let bot_ids: Vec<u32> = world.players.values().filter(|p| p.is_bot).map(|p| p.id).collect();

    for player_id in bot_ids {
        let Some((pos, mass)) = world
            .players
            .get(&player_id)
            .and_then(|p| p.cell_ids.first().copied())
            .and_then(|id| world.cells.get(&id))
            .map(|c| (c.pos(), c.mass))
        else {
            continue;
        };

        let dir = nearest_threat_direction(world, player_id, pos, mass)
            .or_else(|| nearest_pellet_direction(world, pos))
            .unwrap_or(Vec2::ZERO);

        let cursor = pos + dir * CURSOR_LEAD;
        world.apply_input(player_id, dir.x, dir.y, cursor.x, cursor.y);
    }
}

/// Direction away from the closest enemy cell within [`THREAT_RANGE`]
/// that could eat this bot's cell, or `None` if no such cell exists.
fn nearest_threat_direction(world: &World, owner_id: u32, pos: Vec2, mass: f32) -> Option<Vec2> {
    let mut nearest_dist = f32::MAX;
    let mut flee_dir = None;
    for cell in world.cells.values() {
        if cell.owner_id == owner_id || cell.mass <= mass * THREAT_MASS_RATIO {
            continue;
        }
        let dist = pos.distance(cell.pos());
        if dist < THREAT_RANGE && dist < nearest_dist {
            nearest_dist = dist;
            flee_dir = Some((pos - cell.pos()).normalize_or_zero());
        }
    }
    flee_dir
}

/// Direction toward the closest food pellet, or `None` if there is
/// none in the world yet (only possible immediately at startup).
fn nearest_pellet_direction(world: &World, pos: Vec2) -> Option<Vec2> {
    let mut nearest_dist = f32::MAX;
    let mut nearest_pos = None;
    for pellet in world.pellets.values() {
        let p = Vec2::new(pellet.x, pellet.y);
        let dist = pos.distance(p);
        if dist < nearest_dist {
            nearest_dist = dist;
            nearest_pos = Some(p);
        }
    }
    nearest_pos.map(|target| (target - pos).normalize_or_zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TuningConfig;
    use crate::entity::Cell;

    #[test]
    fn bot_seeks_nearest_pellet_when_no_threat_nearby() {
        let mut world = World::new(5000.0, 5000.0, false, TuningConfig::default());
        let bot_id = world.join_player(String::new(), true, 0);
        for id in world.players[&bot_id].cell_ids.clone() {
            world.remove_cell(id);
        }
        let cell_id = world.next_id();
        world.cells.insert(cell_id, Cell::new(cell_id, bot_id, 0.0, 0.0, 1000.0, 0));
        world.players.get_mut(&bot_id).unwrap().cell_ids = vec![cell_id];

        let pellet_id = world.next_id();
        world.pellets.insert(
            pellet_id,
            crate::entity::Pellet { id: pellet_id, x: 100.0, y: 0.0, mass: 10.0, color: protocol::Color::new(1, 2, 3) },
        );

        update_bots(&mut world);

        let p = &world.players[&bot_id];
        assert!(p.input_dir_x > 0.9);
        assert!(p.input_dir_y.abs() < 0.1);
    }

    #[test]
    fn bot_flees_a_much_larger_nearby_cell() {
        let mut world = World::new(5000.0, 5000.0, false, TuningConfig::default());
        let bot_id = world.join_player(String::new(), true, 0);
        for id in world.players[&bot_id].cell_ids.clone() {
            world.remove_cell(id);
        }
        let predator_id = world.join_player(String::new(), false, 0);
        for id in world.players[&predator_id].cell_ids.clone() {
            world.remove_cell(id);
        }

        let cell_id = world.next_id();
        world.cells.insert(cell_id, Cell::new(cell_id, bot_id, 0.0, 0.0, 1000.0, 0));
        world.players.get_mut(&bot_id).unwrap().cell_ids = vec![cell_id];

        let threat_id = world.next_id();
        world.cells.insert(threat_id, Cell::new(threat_id, predator_id, 100.0, 0.0, 5000.0, 0));
        world.players.get_mut(&predator_id).unwrap().cell_ids = vec![threat_id];

        update_bots(&mut world);

        let p = &world.players[&bot_id];
        assert!(p.input_dir_x < -0.9, "bot should flee in -x direction, got {}", p.input_dir_x);
    }
}
