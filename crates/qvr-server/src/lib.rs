#![allow(clippy::too_many_arguments, clippy::float_cmp, clippy::needless_range_loop,
         clippy::manual_range_contains, clippy::comparison_chain)]
// Server world core: entity area linking, movement traces and physics.

pub mod edict;
pub mod server;
pub mod sv_game;
pub mod sv_world;
pub mod sv_phys;
pub mod sv_move;

#[cfg(test)]
mod testmaps;
