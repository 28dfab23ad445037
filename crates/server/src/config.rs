//! Server configuration: `config.toml` is read if present, otherwise a
//! default is generated and written back.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub population: PopulationConfig,
    #[serde(default)]
    pub tuning: TuningConfig,
}

impl Config {
    /// Load configuration from `config.toml`, or write out a default.
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new("config.toml");
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            info!("no config.toml found, writing default configuration");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }
}

/// Networking and scheduler settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Simulation rate; the tick pipeline runs once every `1/tick_hz` s.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    #[serde(default = "default_name")]
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            tick_hz: default_tick_hz(),
            name: default_name(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    11443
}
fn default_tick_hz() -> u32 {
    60
}
fn default_name() -> String {
    "Arena Server".to_string()
}

/// Map dimensions and the merge mode switch.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorldConfig {
    #[serde(default = "default_world_size")]
    pub width: f32,
    #[serde(default = "default_world_size")]
    pub height: f32,
    /// When true, overlapping same-owner cells merge immediately
    /// instead of going through the cooldown+overlap rule. Off by
    /// default — the cooldown rule is canonical (spec §9).
    #[serde(default)]
    pub instant_merge: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: default_world_size(),
            height: default_world_size(),
            instant_merge: false,
        }
    }
}

fn default_world_size() -> f32 {
    5000.0
}

/// Target populations the tick pipeline replenishes toward.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PopulationConfig {
    #[serde(default = "default_pellet_target")]
    pub pellet_target: usize,
    #[serde(default = "default_virus_target")]
    pub virus_target: usize,
    #[serde(default = "default_bot_target")]
    pub bot_target: usize,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            pellet_target: default_pellet_target(),
            virus_target: default_virus_target(),
            bot_target: default_bot_target(),
        }
    }
}

fn default_pellet_target() -> usize {
    1000
}
fn default_virus_target() -> usize {
    20
}
fn default_bot_target() -> usize {
    10
}

/// Physics tunables. Each mirrors a constant in [`crate::geometry`];
/// the geometry module's values are the defaults below, but the
/// simulation reads these fields at runtime so the table is
/// overridable without a rebuild.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TuningConfig {
    #[serde(default = "default_min_mass")]
    pub min_mass: f32,
    #[serde(default = "default_base_speed")]
    pub base_speed: f32,
    #[serde(default = "default_mass_factor")]
    pub mass_factor: f32,
    #[serde(default = "default_friction")]
    pub friction: f32,
    #[serde(default = "default_split_min_mass")]
    pub split_min_mass: f32,
    #[serde(default = "default_split_immunity_ms")]
    pub split_immunity_ms: i64,
    #[serde(default = "default_split_dir_lock_ms")]
    pub split_dir_lock_ms: i64,
    #[serde(default = "default_split_base_impulse")]
    pub split_base_impulse: f32,
    #[serde(default = "default_split_forward_mult")]
    pub split_forward_mult: f32,
    #[serde(default = "default_split_backward_mult")]
    pub split_backward_mult: f32,
    #[serde(default = "default_split_ejection_gap")]
    pub split_ejection_gap: f32,
    #[serde(default = "default_eat_radius_ratio")]
    pub eat_radius_ratio: f32,
    #[serde(default = "default_eat_distance_factor")]
    pub eat_distance_factor: f32,
    #[serde(default = "default_merge_cooldown_ms")]
    pub merge_cooldown_ms: i64,
    #[serde(default = "default_merge_delay_min_ms")]
    pub merge_delay_min_ms: i64,
    #[serde(default = "default_auto_split_merge_overlap_ratio")]
    pub auto_split_merge_overlap_ratio: f32,
    #[serde(default = "default_auto_split_merge_grace_ms")]
    pub auto_split_merge_grace_ms: i64,
    #[serde(default = "default_auto_split_mass")]
    pub auto_split_mass: f32,
    #[serde(default = "default_virus_mass_threshold")]
    pub virus_mass_threshold: f32,
    #[serde(default = "default_virus_max_mass")]
    pub virus_max_mass: f32,
    #[serde(default = "default_virus_split_max_pieces")]
    pub virus_split_max_pieces: usize,
    #[serde(default = "default_virus_split_impulse")]
    pub virus_split_impulse: f32,
    #[serde(default = "default_mass_decay_rate")]
    pub mass_decay_rate: f32,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            min_mass: default_min_mass(),
            base_speed: default_base_speed(),
            mass_factor: default_mass_factor(),
            friction: default_friction(),
            split_min_mass: default_split_min_mass(),
            split_immunity_ms: default_split_immunity_ms(),
            split_dir_lock_ms: default_split_dir_lock_ms(),
            split_base_impulse: default_split_base_impulse(),
            split_forward_mult: default_split_forward_mult(),
            split_backward_mult: default_split_backward_mult(),
            split_ejection_gap: default_split_ejection_gap(),
            eat_radius_ratio: default_eat_radius_ratio(),
            eat_distance_factor: default_eat_distance_factor(),
            merge_cooldown_ms: default_merge_cooldown_ms(),
            merge_delay_min_ms: default_merge_delay_min_ms(),
            auto_split_merge_overlap_ratio: default_auto_split_merge_overlap_ratio(),
            auto_split_merge_grace_ms: default_auto_split_merge_grace_ms(),
            auto_split_mass: default_auto_split_mass(),
            virus_mass_threshold: default_virus_mass_threshold(),
            virus_max_mass: default_virus_max_mass(),
            virus_split_max_pieces: default_virus_split_max_pieces(),
            virus_split_impulse: default_virus_split_impulse(),
            mass_decay_rate: default_mass_decay_rate(),
        }
    }
}

fn default_min_mass() -> f32 {
    200.0
}
fn default_base_speed() -> f32 {
    4.5
}
fn default_mass_factor() -> f32 {
    0.0012
}
fn default_friction() -> f32 {
    0.985
}
fn default_split_min_mass() -> f32 {
    300.0
}
fn default_split_immunity_ms() -> i64 {
    500
}
fn default_split_dir_lock_ms() -> i64 {
    120
}
fn default_split_base_impulse() -> f32 {
    10.0
}
fn default_split_forward_mult() -> f32 {
    4.5
}
fn default_split_backward_mult() -> f32 {
    0.85
}
fn default_split_ejection_gap() -> f32 {
    1.25
}
fn default_eat_radius_ratio() -> f32 {
    1.15
}
fn default_eat_distance_factor() -> f32 {
    0.4
}
fn default_merge_cooldown_ms() -> i64 {
    300
}
fn default_merge_delay_min_ms() -> i64 {
    450
}
fn default_auto_split_merge_overlap_ratio() -> f32 {
    0.5
}
fn default_auto_split_merge_grace_ms() -> i64 {
    5_000
}
fn default_auto_split_mass() -> f32 {
    22500.0
}
fn default_virus_mass_threshold() -> f32 {
    2000.0
}
fn default_virus_max_mass() -> f32 {
    2000.0
}
fn default_virus_split_max_pieces() -> usize {
    16
}
fn default_virus_split_impulse() -> f32 {
    12.0
}
fn default_mass_decay_rate() -> f32 {
    2e-5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tuning_matches_frozen_table() {
        let t = TuningConfig::default();
        assert_eq!(t.min_mass, 200.0);
        assert_eq!(t.split_min_mass, 300.0);
        assert_eq!(t.virus_split_max_pieces, 16);
        assert!((t.mass_decay_rate - 2e-5).abs() < 1e-9);
    }
}
