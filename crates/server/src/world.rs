//! World: owns every entity and runs the fixed-order tick pipeline.
//!
//! The World is a single-writer structure (spec §5) — everything here
//! is meant to be called from one tick-loop task. Players hold only
//! non-owning cell ids; every cell, pellet, virus, feed pellet and
//! virus projectile lives in one of the maps below, all sharing one
//! id space handed out by `next_id`.

use std::collections::{HashMap, HashSet};

use fixedbitset::FixedBitSet;
use glam::Vec2;
use protocol::Color;
use rand::Rng;

use tracing::{debug, error};

use crate::ai;
use crate::collision;
use crate::config::{PopulationConfig, TuningConfig};
use crate::entity::{direction_to, split_cell, Cell, CellState, FeedPellet, Pellet, Virus, VirusProjectile};
use crate::geometry;
use crate::player::Player;
use crate::spatial::{QuadItem, QuadTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityKind {
    Cell,
    Pellet,
    Virus,
    FeedPellet,
    VirusProjectile,
}

/// World border bounds, centered on the origin.
#[derive(Debug, Clone, Copy)]
pub struct WorldBorder {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
    pub width: f32,
    pub height: f32,
}

impl WorldBorder {
    pub fn new(width: f32, height: f32) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Self {
            min_x: -half_w,
            min_y: -half_h,
            max_x: half_w,
            max_y: half_h,
            width,
            height,
        }
    }

    #[inline]
    pub fn random_position(&self) -> Vec2 {
        let mut rng = rand::rng();
        Vec2::new(
            rng.random_range(self.min_x..self.max_x),
            rng.random_range(self.min_y..self.max_y),
        )
    }
}

pub struct World {
    next_entity_id: u32,
    pub(crate) border: WorldBorder,
    pub(crate) cells: HashMap<u32, Cell>,
    pub(crate) players: HashMap<u32, Player>,
    pub(crate) pellets: HashMap<u32, Pellet>,
    pub(crate) viruses: HashMap<u32, Virus>,
    pub(crate) feed_pellets: HashMap<u32, FeedPellet>,
    pub(crate) virus_projectiles: HashMap<u32, VirusProjectile>,
    id_kind: HashMap<u32, EntityKind>,
    quad_tree: QuadTree,
    pub(crate) tuning: TuningConfig,
    pub instant_merge: bool,
    tick_count: u64,
}

impl World {
    pub fn new(width: f32, height: f32, instant_merge: bool, tuning: TuningConfig) -> Self {
        let border = WorldBorder::new(width, height);
        Self {
            next_entity_id: 1,
            quad_tree: QuadTree::for_world(border.min_x, border.min_y, border.max_x, border.max_y),
            border,
            cells: HashMap::new(),
            players: HashMap::new(),
            pellets: HashMap::new(),
            viruses: HashMap::new(),
            feed_pellets: HashMap::new(),
            virus_projectiles: HashMap::new(),
            id_kind: HashMap::new(),
            tuning,
            instant_merge,
            tick_count: 0,
        }
    }

    pub(crate) fn next_id(&mut self) -> u32 {
        let id = self.next_entity_id;
        self.next_entity_id = self.next_entity_id.wrapping_add(1);
        if self.next_entity_id == 0 {
            self.next_entity_id = 1;
        }
        id
    }

    #[inline]
    pub fn random_color() -> Color {
        let mut rng = rand::rng();
        Color::new(
            rng.random_range(50..=255),
            rng.random_range(50..=255),
            rng.random_range(50..=255),
        )
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn init_config(&self) -> protocol::InitConfig {
        protocol::InitConfig {
            map_width: self.border.width,
            map_height: self.border.height,
            instant_merge: self.instant_merge,
        }
    }

    // ---- player lifecycle -------------------------------------------------

    pub fn join_player(&mut self, name: String, is_bot: bool, now: i64) -> u32 {
        let id = self.next_id();
        let color = Self::random_color();
        let player = Player::new(id, Player::sanitize_name(&name), color, is_bot);
        self.players.insert(id, player);
        self.respawn_player(id, now);
        id
    }

    pub fn remove_player(&mut self, player_id: u32) {
        if let Some(player) = self.players.remove(&player_id) {
            for id in player.cell_ids {
                self.remove_cell(id);
            }
        }
    }

    pub fn respawn_player(&mut self, player_id: u32, now: i64) {
        let Some(existing) = self.players.get(&player_id).map(|p| p.cell_ids.clone()) else {
            return;
        };
        for id in existing {
            self.remove_cell(id);
        }
        let pos = self.border.random_position();
        let id = self.next_id();
        let cell = Cell::new(id, player_id, pos.x, pos.y, geometry::RESPAWN_MASS, now);
        self.cells.insert(id, cell);
        self.id_kind.insert(id, EntityKind::Cell);
        if let Some(p) = self.players.get_mut(&player_id) {
            p.cell_ids.push(id);
        }
        self.resync_quadtree();
    }

    pub fn set_name(&mut self, player_id: u32, name: &str) {
        if let Some(p) = self.players.get_mut(&player_id) {
            p.name = Player::sanitize_name(name);
        }
    }

    pub fn apply_input(&mut self, player_id: u32, dir_x: f32, dir_y: f32, cursor_x: f32, cursor_y: f32) {
        if let Some(p) = self.players.get_mut(&player_id) {
            p.apply_input(dir_x, dir_y, cursor_x, cursor_y);
        }
    }

    pub fn handle_action(&mut self, player_id: u32, action: protocol::ActionKind, now: i64) {
        use protocol::ActionKind::*;
        match action {
            Split => self.split_player(player_id, 2, now),
            DoubleSplit => self.double_split_player(player_id, now),
            TripleSplit => self.split_player(player_id, 8, now),
            Split16 => self.split_player(player_id, 16, now),
            Split32 => self.split_player(player_id, 32, now),
            Feed => self.feed_player(player_id, now, 1),
            MacroFeed => self.feed_player(player_id, now, 5),
            Stop => {
                if let Some(p) = self.players.get_mut(&player_id) {
                    p.input_dir_x = 0.0;
                    p.input_dir_y = 0.0;
                }
            }
            Respawn => self.respawn_player(player_id, now),
        }
    }

    // ---- split / feed orchestration (spec §4.4, §4.5) ---------------------

    fn split_player(&mut self, player_id: u32, target_count: usize, now: i64) {
        let Some(player) = self.players.get(&player_id) else { return };
        let cursor = Vec2::new(player.cursor_x, player.cursor_y);
        let mut cell_ids = player.cell_ids.clone();
        let total_mass: f32 = cell_ids.iter().filter_map(|id| self.cells.get(id)).map(|c| c.mass).sum();
        let max_cells = Player::max_cells(total_mass, self.tuning.min_mass);
        let target_final = target_count.min(max_cells);

        loop {
            if cell_ids.len() >= target_final || cell_ids.len() * 2 > max_cells {
                break;
            }
            cell_ids.sort_by(|a, b| {
                let ma = self.cells.get(a).map(|c| c.mass).unwrap_or(0.0);
                let mb = self.cells.get(b).map(|c| c.mass).unwrap_or(0.0);
                mb.partial_cmp(&ma).unwrap()
            });
            let round_ids = cell_ids.clone();
            let mut new_ids = Vec::new();
            for id in round_ids {
                if cell_ids.len() + new_ids.len() >= max_cells {
                    break;
                }
                let Some(mut parent) = self.cells.get(&id).cloned() else { continue };
                if parent.mass < self.tuning.split_min_mass {
                    continue;
                }
                let dir = direction_to(parent.pos(), cursor);
                let new_id = self.next_id();
                let child = split_cell(&mut parent, dir, 1.0, now, new_id, &self.tuning);
                self.cells.insert(id, parent);
                self.cells.insert(new_id, child);
                self.id_kind.insert(new_id, EntityKind::Cell);
                new_ids.push(new_id);
            }
            if new_ids.is_empty() {
                break;
            }
            cell_ids.extend(new_ids);
        }

        if let Some(p) = self.players.get_mut(&player_id) {
            p.cell_ids = cell_ids.clone();
        }
        debug!(player_id, target_count, cell_count = cell_ids.len(), "player split");
        self.redistribute_mass(&cell_ids, total_mass);
        self.resync_quadtree();
    }

    fn redistribute_mass(&mut self, ids: &[u32], total_mass: f32) {
        if ids.is_empty() {
            return;
        }
        let share = total_mass / ids.len() as f32;
        for id in ids {
            if let Some(c) = self.cells.get_mut(id) {
                c.mass = share;
            }
        }
    }

    fn double_split_player(&mut self, player_id: u32, now: i64) {
        let Some(player) = self.players.get(&player_id) else { return };
        let cursor = Vec2::new(player.cursor_x, player.cursor_y);
        let cell_ids = player.cell_ids.clone();
        let total_mass: f32 = cell_ids.iter().filter_map(|id| self.cells.get(id)).map(|c| c.mass).sum();
        let max_cells = Player::max_cells(total_mass, self.tuning.min_mass);
        if cell_ids.len() + 3 > max_cells {
            return;
        }

        let Some(parent_id) = cell_ids
            .iter()
            .copied()
            .max_by(|a, b| {
                let ma = self.cells.get(a).map(|c| c.mass).unwrap_or(0.0);
                let mb = self.cells.get(b).map(|c| c.mass).unwrap_or(0.0);
                ma.partial_cmp(&mb).unwrap()
            })
        else {
            return;
        };
        let Some(parent) = self.cells.get(&parent_id).cloned() else { return };
        if parent.mass < self.tuning.min_mass * 4.0 {
            return;
        }

        let dir1 = direction_to(parent.pos(), cursor);
        let dir2 = Vec2::new(-dir1.y, dir1.x);
        let dir3 = Vec2::new(dir1.y, -dir1.x);
        let dir4 = -dir1;
        let piece_mass = parent.mass / 4.0;
        let impulse = (self.tuning.split_base_impulse + (parent.render_radius() * 0.12).clamp(0.0, 6.0))
            * self.tuning.split_forward_mult;
        let offset = geometry::render_radius(piece_mass) * 2.0 * self.tuning.split_ejection_gap;

        let mut new_ids = Vec::with_capacity(4);
        for dir in [dir1, dir2, dir3, dir4] {
            let id = self.next_id();
            let mut piece = Cell::new(id, parent.owner_id, parent.x + dir.x * offset, parent.y + dir.y * offset, piece_mass, now);
            piece.vx = dir.x * impulse;
            piece.vy = dir.y * impulse;
            piece.state = CellState::SplitTravel;
            piece.split_time = now;
            piece.last_split_time = now;
            piece.split_immunity_until = now + self.tuning.split_immunity_ms;
            piece.split_direction_lock_until = now + self.tuning.split_dir_lock_ms;
            piece.split_dir_x = dir.x;
            piece.split_dir_y = dir.y;
            self.cells.insert(id, piece);
            self.id_kind.insert(id, EntityKind::Cell);
            new_ids.push(id);
        }

        self.remove_cell(parent_id);
        if let Some(p) = self.players.get_mut(&player_id) {
            p.cell_ids.extend(new_ids);
        }
        debug!(player_id, "double split into 4 pieces");
        self.resync_quadtree();
    }

    fn feed_player(&mut self, player_id: u32, now: i64, count: usize) {
        let Some(player) = self.players.get(&player_id) else { return };
        let cursor = Vec2::new(player.cursor_x, player.cursor_y);
        let cell_ids = player.cell_ids.clone();
        let Some(cell_id) = cell_ids
            .iter()
            .copied()
            .max_by(|a, b| {
                let ma = self.cells.get(a).map(|c| c.mass).unwrap_or(0.0);
                let mb = self.cells.get(b).map(|c| c.mass).unwrap_or(0.0);
                ma.partial_cmp(&mb).unwrap()
            })
        else {
            return;
        };

        for _ in 0..count {
            let Some(cell) = self.cells.get(&cell_id) else { break };
            if cell.mass <= self.tuning.min_mass {
                break;
            }
            let dir = direction_to(cell.pos(), cursor);
            let feed_mass = geometry::FEED_MASS_CAP.min(0.05 * cell.mass);
            let origin = cell.pos();
            if let Some(c) = self.cells.get_mut(&cell_id) {
                c.mass -= feed_mass;
            }
            let id = self.next_id();
            let pellet = FeedPellet {
                id,
                x: origin.x,
                y: origin.y,
                vx: dir.x * geometry::FEED_EJECT_SPEED,
                vy: dir.y * geometry::FEED_EJECT_SPEED,
                mass: feed_mass,
                created_at: now,
            };
            self.feed_pellets.insert(id, pellet);
            self.id_kind.insert(id, EntityKind::FeedPellet);
        }
        self.resync_quadtree();
    }

    // ---- entity removal -----------------------------------------------

    pub(crate) fn remove_cell(&mut self, id: u32) {
        if let Some(cell) = self.cells.remove(&id) {
            self.quad_tree.remove(id);
            self.id_kind.remove(&id);
            if let Some(p) = self.players.get_mut(&cell.owner_id) {
                p.cell_ids.retain(|&c| c != id);
            }
        }
    }

    fn spawn_pellet_at_random(&mut self) {
        let pos = self.border.random_position();
        let id = self.next_id();
        let mass = rand::rng().random_range(10.0..=15.0);
        self.pellets.insert(id, Pellet { id, x: pos.x, y: pos.y, mass, color: Self::random_color() });
        self.id_kind.insert(id, EntityKind::Pellet);
    }

    fn spawn_virus_at_random(&mut self) {
        let pos = self.border.random_position();
        let id = self.next_id();
        self.viruses.insert(id, Virus::new(id, pos.x, pos.y, geometry::VIRUS_START_MASS));
        self.id_kind.insert(id, EntityKind::Virus);
    }

    // ---- spatial index --------------------------------------------------

    fn resync_quadtree(&mut self) {
        self.quad_tree.clear();
        for (&id, c) in &self.cells {
            self.quad_tree.insert(QuadItem::new(id, c.x, c.y, c.render_radius()));
        }
        for (&id, p) in &self.pellets {
            self.quad_tree.insert(QuadItem::new(id, p.x, p.y, geometry::render_radius(p.mass)));
        }
        for (&id, v) in &self.viruses {
            self.quad_tree.insert(QuadItem::new(id, v.x, v.y, geometry::render_radius(v.mass)));
        }
        for (&id, f) in &self.feed_pellets {
            self.quad_tree.insert(QuadItem::new(id, f.x, f.y, geometry::render_radius(f.mass)));
        }
        for (&id, vp) in &self.virus_projectiles {
            self.quad_tree.insert(QuadItem::new(id, vp.x, vp.y, geometry::render_radius(vp.mass)));
        }
    }

    // ---- tick pipeline (spec §4.6) --------------------------------------

    pub fn tick(&mut self, now: i64, population: &PopulationConfig) {
        self.tick_count += 1;
        ai::update_bots(self);
        self.movement_pass(now);
        self.push_out_pass(now);
        self.resync_quadtree();
        self.eating_pass(now);
        self.merge_pass(now);
        self.auto_split_pass(now);
        self.update_feed_and_projectiles(now);
        self.resync_quadtree();
        self.other_collisions_pass(now);
        self.maintain_population(population, now);
    }

    fn movement_pass(&mut self, now: i64) {
        let inputs: HashMap<u32, Vec2> = self
            .players
            .iter()
            .map(|(&id, p)| (id, Vec2::new(p.input_dir_x, p.input_dir_y)))
            .collect();
        let border = self.border;
        for cell in self.cells.values_mut() {
            let dir = inputs.get(&cell.owner_id).copied().unwrap_or(Vec2::ZERO);
            cell.integrate_movement(dir, now, &border, &self.tuning);
        }
    }

    fn push_out_pass(&mut self, now: i64) {
        let groups: Vec<Vec<u32>> = self.players.values().map(|p| p.cell_ids.clone()).collect();
        for group in groups {
            for i in 0..group.len() {
                for j in (i + 1)..group.len() {
                    let (id_a, id_b) = (group[i], group[j]);
                    let (Some(a), Some(b)) = (self.cells.get(&id_a).cloned(), self.cells.get(&id_b).cloned()) else {
                        continue;
                    };
                    if a.has_split_immunity(now) || b.has_split_immunity(now) {
                        continue;
                    }
                    let (pa, pb) = collision::push_out(&a, &b);
                    if pa != Vec2::ZERO || pb != Vec2::ZERO {
                        if let Some(ca) = self.cells.get_mut(&id_a) {
                            ca.x += pa.x;
                            ca.y += pa.y;
                        }
                        if let Some(cb) = self.cells.get_mut(&id_b) {
                            cb.x += pb.x;
                            cb.y += pb.y;
                        }
                    }
                }
            }
        }
    }

    fn eating_pass(&mut self, now: i64) {
        let mut eaten = FixedBitSet::with_capacity(self.next_entity_id as usize + 1);
        let mut eater_ids: Vec<u32> = self.cells.keys().copied().collect();
        eater_ids.sort_unstable();

        for eater_id in eater_ids {
            if eaten.contains(eater_id as usize) {
                continue;
            }
            let Some(eater) = self.cells.get(&eater_id).cloned() else { continue };
            if !eater.is_alive {
                continue;
            }
            let radius = eater.base_radius() * 2.0 + 50.0;
            let nearby = self.quad_tree.find_in_radius(eater.x, eater.y, radius);

            let mut best: Option<(u32, f32)> = None;
            for id in nearby {
                if id == eater_id || eaten.contains(id as usize) {
                    continue;
                }
                let Some(victim) = self.cells.get(&id) else { continue };
                if !victim.is_alive || victim.owner_id == eater.owner_id || victim.has_split_immunity(now) {
                    continue;
                }
                if !collision::can_eat(&eater, victim, &self.tuning) {
                    continue;
                }
                let dist = eater.pos().distance(victim.pos());
                if best.map_or(true, |(_, d)| dist < d) {
                    best = Some((id, dist));
                }
            }

            if let Some((victim_id, _)) = best {
                let victim_mass = self.cells.get(&victim_id).map(|v| v.mass).unwrap_or(0.0);
                if let Some(e) = self.cells.get_mut(&eater_id) {
                    e.mass += victim_mass;
                    e.vx = 0.0;
                    e.vy = 0.0;
                }
                if let Some(v) = self.cells.get_mut(&victim_id) {
                    v.is_alive = false;
                }
                self.remove_cell(victim_id);
                eaten.insert(victim_id as usize);
            }
        }
    }

    fn merge_pass(&mut self, now: i64) {
        let groups: Vec<Vec<u32>> = self.players.values().map(|p| p.cell_ids.clone()).collect();
        let mut merged = HashSet::new();

        for group in groups {
            let mut alive: Vec<u32> = group.into_iter().filter(|id| !merged.contains(id)).collect();
            let mut i = 0;
            while i < alive.len() {
                let mut j = i + 1;
                let mut collapsed_any = false;
                while j < alive.len() {
                    let id_a = alive[i];
                    let id_b = alive[j];
                    let (Some(a), Some(b)) = (self.cells.get(&id_a).cloned(), self.cells.get(&id_b).cloned()) else {
                        j += 1;
                        continue;
                    };
                    if a.has_split_immunity(now) || b.has_split_immunity(now) {
                        j += 1;
                        continue;
                    }
                    if now - a.split_time < self.tuning.merge_cooldown_ms || now - b.split_time < self.tuning.merge_cooldown_ms {
                        j += 1;
                        continue;
                    }
                    let recently_auto_split = now - a.auto_split_time < self.tuning.auto_split_merge_grace_ms
                        || now - b.auto_split_time < self.tuning.auto_split_merge_grace_ms;
                    let overlap_ratio = if recently_auto_split {
                        self.tuning.auto_split_merge_overlap_ratio
                    } else {
                        geometry::MERGE_OVERLAP_RATIO
                    };
                    if !collision::merge_overlaps(&a, &b, overlap_ratio) {
                        if a.state == CellState::Merging {
                            if let Some(ca) = self.cells.get_mut(&id_a) {
                                ca.state = CellState::Idle;
                            }
                        }
                        if b.state == CellState::Merging {
                            if let Some(cb) = self.cells.get_mut(&id_b) {
                                cb.state = CellState::Idle;
                            }
                        }
                        j += 1;
                        continue;
                    }

                    if self.instant_merge {
                        self.collapse_merge(id_a, id_b);
                        alive.remove(j);
                        merged.insert(id_b);
                        collapsed_any = true;
                        continue;
                    }

                    let both_merging = a.state == CellState::Merging && b.state == CellState::Merging;
                    if !both_merging {
                        if let Some(ca) = self.cells.get_mut(&id_a) {
                            ca.state = CellState::Merging;
                            ca.merge_start_time = now;
                        }
                        if let Some(cb) = self.cells.get_mut(&id_b) {
                            cb.state = CellState::Merging;
                            cb.merge_start_time = now;
                        }
                        j += 1;
                    } else {
                        let since = now - a.merge_start_time.max(b.merge_start_time);
                        if since >= self.tuning.merge_delay_min_ms {
                            self.collapse_merge(id_a, id_b);
                            alive.remove(j);
                            merged.insert(id_b);
                            collapsed_any = true;
                            continue;
                        }
                        j += 1;
                    }
                }
                if !collapsed_any {
                    i += 1;
                }
            }
        }
    }

    fn collapse_merge(&mut self, survivor_id: u32, absorbed_id: u32) {
        let (Some(a), Some(b)) = (self.cells.get(&survivor_id).cloned(), self.cells.get(&absorbed_id).cloned()) else {
            return;
        };
        let total = a.mass + b.mass;
        if !total.is_finite() || total <= 0.0 {
            // Internal invariant violation (spec §7): fatal for this merge
            // only, never the whole tick. A fuzz-tested implementation
            // should never actually reach this branch.
            error!(survivor_id, absorbed_id, a_mass = a.mass, b_mass = b.mass, "merge produced non-finite mass, skipping collapse");
            return;
        }
        let x = (a.x * a.mass + b.x * b.mass) / total;
        let y = (a.y * a.mass + b.y * b.mass) / total;
        if let Some(ca) = self.cells.get_mut(&survivor_id) {
            ca.mass = total;
            ca.x = x;
            ca.y = y;
            ca.vx = 0.0;
            ca.vy = 0.0;
            ca.state = CellState::Idle;
        }
        self.remove_cell(absorbed_id);
    }

    fn auto_split_pass(&mut self, now: i64) {
        let groups: Vec<(u32, Vec<u32>)> = self.players.iter().map(|(&id, p)| (id, p.cell_ids.clone())).collect();
        for (player_id, cell_ids) in groups {
            let cursor = self.players.get(&player_id).map(|p| Vec2::new(p.cursor_x, p.cursor_y)).unwrap_or(Vec2::ZERO);
            let total_mass: f32 = cell_ids.iter().filter_map(|id| self.cells.get(id)).map(|c| c.mass).sum();
            let max_cells = Player::max_cells(total_mass, self.tuning.min_mass);
            for id in cell_ids {
                let current_count = self.players.get(&player_id).map(|p| p.cell_ids.len()).unwrap_or(0);
                if current_count >= max_cells {
                    break;
                }
                let Some(mut parent) = self.cells.get(&id).cloned() else { continue };
                if parent.mass < self.tuning.auto_split_mass {
                    continue;
                }
                let dir = direction_to(parent.pos(), cursor);
                let new_id = self.next_id();
                let mut child = split_cell(&mut parent, dir, 1.0, now, new_id, &self.tuning);
                parent.auto_split_time = now;
                child.auto_split_time = now;
                self.cells.insert(id, parent);
                self.cells.insert(new_id, child);
                self.id_kind.insert(new_id, EntityKind::Cell);
                if let Some(p) = self.players.get_mut(&player_id) {
                    p.cell_ids.push(new_id);
                }
            }
        }
    }

    fn update_feed_and_projectiles(&mut self, now: i64) {
        let mut expired = Vec::new();
        for (&id, f) in self.feed_pellets.iter_mut() {
            f.tick();
            if f.is_expired(now) {
                expired.push(id);
            }
        }
        for id in expired {
            self.feed_pellets.remove(&id);
            self.id_kind.remove(&id);
            self.quad_tree.remove(id);
        }

        let mut expired = Vec::new();
        for (&id, p) in self.virus_projectiles.iter_mut() {
            p.tick();
            if p.is_expired(now) {
                expired.push(id);
            }
        }
        for id in expired {
            self.virus_projectiles.remove(&id);
            self.id_kind.remove(&id);
            self.quad_tree.remove(id);
        }
    }

    fn other_collisions_pass(&mut self, now: i64) {
        let mut consumed_pellets = HashSet::new();
        let mut consumed_feed = HashSet::new();
        let mut consumed_projectiles = HashSet::new();
        let mut popped_viruses = HashSet::new();

        let mut cell_ids: Vec<u32> = self.cells.keys().copied().collect();
        cell_ids.sort_unstable();

        for cell_id in cell_ids {
            let Some(cell) = self.cells.get(&cell_id).cloned() else { continue };
            if !cell.is_alive {
                continue;
            }
            let radius = cell.render_radius() + 40.0;
            let nearby = self.quad_tree.find_in_radius(cell.x, cell.y, radius);
            let mut cell_alive = true;

            for id in nearby {
                if !cell_alive || id == cell_id {
                    continue;
                }
                match self.id_kind.get(&id).copied() {
                    Some(EntityKind::Pellet) => {
                        if consumed_pellets.contains(&id) {
                            continue;
                        }
                        let Some(pellet) = self.pellets.get(&id) else { continue };
                        let dist = cell.pos().distance(Vec2::new(pellet.x, pellet.y));
                        if dist < cell.render_radius() {
                            let mass = pellet.mass;
                            if let Some(c) = self.cells.get_mut(&cell_id) {
                                c.mass += mass;
                            }
                            consumed_pellets.insert(id);
                        }
                    }
                    Some(EntityKind::FeedPellet) => {
                        if consumed_feed.contains(&id) {
                            continue;
                        }
                        let Some(fp) = self.feed_pellets.get(&id) else { continue };
                        let dist = cell.pos().distance(Vec2::new(fp.x, fp.y));
                        if dist < cell.render_radius() {
                            let mass = fp.mass * 2.5;
                            if let Some(c) = self.cells.get_mut(&cell_id) {
                                c.mass += mass;
                            }
                            consumed_feed.insert(id);
                        }
                    }
                    Some(EntityKind::Virus) => {
                        if popped_viruses.contains(&id) {
                            continue;
                        }
                        let Some(virus) = self.viruses.get(&id) else { continue };
                        let dist = cell.pos().distance(Vec2::new(virus.x, virus.y));
                        if dist < cell.render_radius() && cell.mass >= self.tuning.virus_mass_threshold {
                            let contact = Vec2::new(virus.x, virus.y);
                            self.burst_split_cell(cell_id, contact, now);
                            popped_viruses.insert(id);
                            cell_alive = false;
                        }
                    }
                    Some(EntityKind::VirusProjectile) => {
                        if consumed_projectiles.contains(&id) {
                            continue;
                        }
                        let Some(proj) = self.virus_projectiles.get(&id) else { continue };
                        let dist = cell.pos().distance(Vec2::new(proj.x, proj.y));
                        if dist < cell.render_radius() {
                            if cell.mass >= self.tuning.virus_mass_threshold {
                                let contact = Vec2::new(proj.x, proj.y);
                                self.burst_split_cell(cell_id, contact, now);
                                cell_alive = false;
                            } else {
                                let mass = proj.mass;
                                if let Some(c) = self.cells.get_mut(&cell_id) {
                                    c.mass += mass;
                                }
                            }
                            consumed_projectiles.insert(id);
                        }
                    }
                    _ => {}
                }
            }
        }

        for id in consumed_pellets {
            self.pellets.remove(&id);
            self.id_kind.remove(&id);
            self.quad_tree.remove(id);
        }
        for id in consumed_feed {
            self.feed_pellets.remove(&id);
            self.id_kind.remove(&id);
            self.quad_tree.remove(id);
        }
        for id in popped_viruses {
            self.viruses.remove(&id);
            self.id_kind.remove(&id);
            self.quad_tree.remove(id);
            self.spawn_virus_at_random();
        }
        for id in consumed_projectiles {
            self.virus_projectiles.remove(&id);
            self.id_kind.remove(&id);
            self.quad_tree.remove(id);
        }

        self.feed_pellet_virus_pass(now);
    }

    /// Burst-split a cell into a radial ring of equal-mass pieces (spec
    /// §4.7). No-op if there's no room under the owner's `max_cells`.
    fn burst_split_cell(&mut self, cell_id: u32, contact: Vec2, now: i64) {
        let Some(parent) = self.cells.get(&cell_id).cloned() else { return };
        let owner_id = parent.owner_id;
        let current_count = self.players.get(&owner_id).map(|p| p.cell_ids.len()).unwrap_or(1);
        let total_mass: f32 = self
            .players
            .get(&owner_id)
            .map(|p| p.cell_ids.iter().filter_map(|id| self.cells.get(id)).map(|c| c.mass).sum())
            .unwrap_or(parent.mass);
        let max_cells = Player::max_cells(total_mass, self.tuning.min_mass);
        let room = max_cells.saturating_sub(current_count);
        if room == 0 {
            return;
        }

        let pieces = self
            .tuning
            .virus_split_max_pieces
            .min((parent.mass / self.tuning.min_mass).floor() as usize)
            .min(room)
            .max(1);
        let piece_mass = parent.mass / pieces as f32;

        let mut new_ids = Vec::with_capacity(pieces);
        for i in 0..pieces {
            let angle = i as f32 * std::f32::consts::TAU / pieces as f32;
            let dir = Vec2::new(angle.cos(), angle.sin());
            let id = self.next_id();
            let mut piece = Cell::new(id, owner_id, contact.x, contact.y, piece_mass, now);
            piece.vx = dir.x * self.tuning.virus_split_impulse + parent.vx * 0.2;
            piece.vy = dir.y * self.tuning.virus_split_impulse + parent.vy * 0.2;
            piece.state = CellState::SplitTravel;
            piece.split_time = now;
            piece.last_split_time = now;
            piece.split_immunity_until = now + self.tuning.split_immunity_ms;
            piece.split_direction_lock_until = now + self.tuning.split_dir_lock_ms;
            piece.split_dir_x = dir.x;
            piece.split_dir_y = dir.y;
            self.cells.insert(id, piece);
            self.id_kind.insert(id, EntityKind::Cell);
            new_ids.push(id);
        }

        self.remove_cell(cell_id);
        if let Some(p) = self.players.get_mut(&owner_id) {
            p.cell_ids.extend(new_ids);
        }
    }

    /// A fed virus that reaches `virus_max_mass` pops into a projectile
    /// travelling along the feeding direction (spec §4.7, Design Notes).
    fn feed_pellet_virus_pass(&mut self, now: i64) {
        let mut consumed = Vec::new();
        let feed_ids: Vec<u32> = self.feed_pellets.keys().copied().collect();

        for feed_id in feed_ids {
            let Some(fp) = self.feed_pellets.get(&feed_id).cloned() else { continue };
            let nearby = self.quad_tree.find_in_radius(fp.x, fp.y, 60.0);
            for id in nearby {
                if self.id_kind.get(&id) != Some(&EntityKind::Virus) {
                    continue;
                }
                let Some(virus) = self.viruses.get_mut(&id) else { continue };
                let dist = Vec2::new(fp.x, fp.y).distance(Vec2::new(virus.x, virus.y));
                if dist >= geometry::render_radius(virus.mass) {
                    continue;
                }
                virus.mass += fp.mass;
                consumed.push(feed_id);
                let popped = virus.mass >= self.tuning.virus_max_mass;
                let (vx, vy) = (virus.x, virus.y);

                if popped {
                    let dir = direction_to(Vec2::ZERO, Vec2::new(fp.vx, fp.vy));
                    let proj_id = self.next_id();
                    self.virus_projectiles.insert(
                        proj_id,
                        VirusProjectile {
                            id: proj_id,
                            x: vx,
                            y: vy,
                            vx: dir.x * geometry::VIRUS_POP_EJECT_SPEED,
                            vy: dir.y * geometry::VIRUS_POP_EJECT_SPEED,
                            mass: geometry::VIRUS_PROJECTILE_MASS,
                            created_at: now,
                        },
                    );
                    self.id_kind.insert(proj_id, EntityKind::VirusProjectile);
                    let pos = self.border.random_position();
                    let virus = self.viruses.get_mut(&id).unwrap();
                    virus.x = pos.x;
                    virus.y = pos.y;
                    virus.mass = geometry::VIRUS_START_MASS;
                }
                break;
            }
        }

        for id in consumed {
            self.feed_pellets.remove(&id);
            self.id_kind.remove(&id);
            self.quad_tree.remove(id);
        }
    }

    fn maintain_population(&mut self, population: &PopulationConfig, now: i64) {
        while self.pellets.len() < population.pellet_target {
            self.spawn_pellet_at_random();
        }
        while self.viruses.len() < population.virus_target {
            self.spawn_virus_at_random();
        }
        let bot_count = self.players.values().filter(|p| p.is_bot).count();
        for _ in bot_count..population.bot_target {
            let id = self.join_player(String::new(), true, now);
            if let Some(p) = self.players.get_mut(&id) {
                p.name = format!("Bot {id}");
            }
            debug!(bot_id = id, "added bot");
        }
        self.resync_quadtree();
    }

    // ---- snapshot building (spec §6) --------------------------------------

    pub fn players_snapshot(&self) -> Vec<protocol::PlayerSnapshot> {
        self.players
            .values()
            .map(|p| {
                let cells: Vec<protocol::CellSnapshot> = p
                    .cell_ids
                    .iter()
                    .filter_map(|id| self.cells.get(id))
                    .map(|c| protocol::CellSnapshot {
                        id: c.id,
                        x: protocol::round_coord(c.x),
                        y: protocol::round_coord(c.y),
                        mass: c.mass.round(),
                        owner_id: c.owner_id,
                    })
                    .collect();
                let score = cells.iter().map(|c| c.mass as u32).sum();
                protocol::PlayerSnapshot {
                    id: p.id,
                    name: p.name.clone(),
                    score,
                    color: p.color,
                    is_bot: p.is_bot,
                    cells,
                }
            })
            .collect()
    }

    pub fn pellets_snapshot(&self) -> Vec<protocol::PelletSnapshot> {
        self.pellets
            .values()
            .map(|p| protocol::PelletSnapshot {
                id: p.id,
                x: protocol::round_coord(p.x),
                y: protocol::round_coord(p.y),
                mass: p.mass.round(),
                color: p.color,
            })
            .collect()
    }

    pub fn viruses_snapshot(&self) -> Vec<protocol::VirusSnapshot> {
        self.viruses
            .values()
            .map(|v| protocol::VirusSnapshot {
                id: v.id,
                x: protocol::round_coord(v.x),
                y: protocol::round_coord(v.y),
                mass: v.mass.round(),
                color: v.color,
            })
            .collect()
    }

    pub fn feed_pellets_snapshot(&self) -> Vec<protocol::FeedPelletSnapshot> {
        self.feed_pellets
            .values()
            .map(|f| protocol::FeedPelletSnapshot {
                id: f.id,
                x: protocol::round_coord(f.x),
                y: protocol::round_coord(f.y),
                mass: f.mass.round(),
            })
            .collect()
    }

    pub fn virus_projectiles_snapshot(&self) -> Vec<protocol::VirusProjectileSnapshot> {
        self.virus_projectiles
            .values()
            .map(|vp| protocol::VirusProjectileSnapshot {
                id: vp.id,
                x: protocol::round_coord(vp.x),
                y: protocol::round_coord(vp.y),
                mass: vp.mass.round(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_world() -> World {
        World::new(5000.0, 5000.0, false, TuningConfig::default())
    }

    #[test]
    fn split_conserves_total_mass_scenario() {
        let mut world = test_world();
        let player_id = world.join_player("p".to_string(), false, 0);
        for id in world.players[&player_id].cell_ids.clone() {
            world.remove_cell(id);
        }
        let cell_id = world.next_id();
        world.cells.insert(cell_id, Cell::new(cell_id, player_id, 0.0, 0.0, 1500.0, 0));
        world.id_kind.insert(cell_id, EntityKind::Cell);
        world.players.get_mut(&player_id).unwrap().cell_ids = vec![cell_id];
        world.apply_input(player_id, 0.0, 0.0, 1000.0, 0.0);

        world.handle_action(player_id, protocol::ActionKind::Split, 0);

        let ids = world.players[&player_id].cell_ids.clone();
        assert_eq!(ids.len(), 2);
        let total: f32 = ids.iter().map(|id| world.cells[id].mass).sum();
        assert!((total - 1500.0).abs() < 0.01);
        for id in &ids {
            assert!((world.cells[id].mass - 750.0).abs() < 0.01);
        }
    }

    #[test]
    fn double_split_produces_four_equal_pieces() {
        let mut world = test_world();
        let player_id = world.join_player("p".to_string(), false, 0);
        for id in world.players[&player_id].cell_ids.clone() {
            world.remove_cell(id);
        }
        let cell_id = world.next_id();
        world.cells.insert(cell_id, Cell::new(cell_id, player_id, 0.0, 0.0, 4000.0, 0));
        world.id_kind.insert(cell_id, EntityKind::Cell);
        world.players.get_mut(&player_id).unwrap().cell_ids = vec![cell_id];
        world.apply_input(player_id, 0.0, 0.0, 1000.0, 0.0);

        world.handle_action(player_id, protocol::ActionKind::DoubleSplit, 0);

        let ids = world.players[&player_id].cell_ids.clone();
        assert_eq!(ids.len(), 4);
        for id in &ids {
            assert!((world.cells[id].mass - 1000.0).abs() < 0.01);
        }
    }

    #[test]
    fn merge_pass_collapses_overlapping_cooled_down_cells() {
        let mut world = test_world();
        let player_id = world.join_player("p".to_string(), false, 0);
        for id in world.players[&player_id].cell_ids.clone() {
            world.remove_cell(id);
        }
        let a_id = world.next_id();
        let b_id = world.next_id();
        let mut a = Cell::new(a_id, player_id, 0.0, 0.0, 500.0, 0);
        a.split_time = -10_000;
        a.auto_split_time = -10_000;
        let mut b = Cell::new(b_id, player_id, 1.0, 0.0, 300.0, 0);
        b.split_time = -10_000;
        b.auto_split_time = -10_000;
        world.cells.insert(a_id, a);
        world.cells.insert(b_id, b);
        world.id_kind.insert(a_id, EntityKind::Cell);
        world.id_kind.insert(b_id, EntityKind::Cell);
        world.players.get_mut(&player_id).unwrap().cell_ids = vec![a_id, b_id];

        world.merge_pass(0);

        let ids = world.players[&player_id].cell_ids.clone();
        assert_eq!(ids.len(), 1);
        assert!((world.cells[&ids[0]].mass - 800.0).abs() < 0.01);
    }

    #[test]
    fn recently_auto_split_cells_need_tighter_overlap_to_merge() {
        // Same masses/positions as the cooled-down scenario above, but
        // both cells auto-split moments ago: the loose 0.9 ratio would
        // call this an overlap, the stricter 0.5 ratio (spec §4.9) must
        // not, so the pair stays two cells.
        let mut world = test_world();
        let player_id = world.join_player("p".to_string(), false, 0);
        for id in world.players[&player_id].cell_ids.clone() {
            world.remove_cell(id);
        }
        let a_id = world.next_id();
        let b_id = world.next_id();
        let mut a = Cell::new(a_id, player_id, 0.0, 0.0, 500.0, 0);
        a.split_time = -10_000;
        a.auto_split_time = 0;
        let mut b = Cell::new(b_id, player_id, 60.0, 0.0, 300.0, 0);
        b.split_time = -10_000;
        b.auto_split_time = 0;
        world.cells.insert(a_id, a);
        world.cells.insert(b_id, b);
        world.id_kind.insert(a_id, EntityKind::Cell);
        world.id_kind.insert(b_id, EntityKind::Cell);
        world.players.get_mut(&player_id).unwrap().cell_ids = vec![a_id, b_id];

        world.merge_pass(0);

        let ids = world.players[&player_id].cell_ids.clone();
        assert_eq!(ids.len(), 2, "auto-split cells 60 units apart must not merge under the tighter ratio");
    }

    #[test]
    fn eating_pass_transfers_mass_and_removes_victim() {
        let mut world = test_world();
        let eater_owner = world.join_player("e".to_string(), false, 0);
        let victim_owner = world.join_player("v".to_string(), false, 0);
        for id in world.players[&eater_owner].cell_ids.clone() {
            world.remove_cell(id);
        }
        for id in world.players[&victim_owner].cell_ids.clone() {
            world.remove_cell(id);
        }
        let e_id = world.next_id();
        let v_id = world.next_id();
        world.cells.insert(e_id, Cell::new(e_id, eater_owner, 0.0, 0.0, 900.0, 0));
        world.cells.insert(v_id, Cell::new(v_id, victim_owner, 10.0, 0.0, 400.0, 0));
        world.id_kind.insert(e_id, EntityKind::Cell);
        world.id_kind.insert(v_id, EntityKind::Cell);
        world.players.get_mut(&eater_owner).unwrap().cell_ids = vec![e_id];
        world.players.get_mut(&victim_owner).unwrap().cell_ids = vec![v_id];
        world.resync_quadtree();

        world.eating_pass(0);

        assert!(!world.cells.contains_key(&v_id));
        assert!((world.cells[&e_id].mass - 1300.0).abs() < 0.01);
        assert_eq!(world.cells[&e_id].vx, 0.0);
    }
}
