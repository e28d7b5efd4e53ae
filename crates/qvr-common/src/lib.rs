#![allow(clippy::too_many_arguments, clippy::float_cmp, clippy::needless_range_loop,
         clippy::manual_range_contains, clippy::comparison_chain)]
// Shared collision core: math, hulls, link lists, console and cvars.

pub mod q_shared;
pub mod common;
pub mod cvar;
pub mod link;
pub mod cmodel;
