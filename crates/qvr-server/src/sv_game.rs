// sv_game.rs -- gameplay callbacks invoked by the world and physics code
//
// The collision core only reports contacts. What a touch, a block or a
// think does is decided by whoever implements `GameCallbacks`.

use qvr_common::q_shared::EntityId;

use crate::server::World;

/// Hooks into gameplay code. Every method has an empty default.
pub trait GameCallbacks {
    /// `toucher` ran into `touched`, or moved into its trigger volume.
    fn touch(&mut self, _world: &mut World, _touched: EntityId, _toucher: EntityId) {}

    /// A push mover was stopped by `obstacle` and has been moved back.
    fn blocked(&mut self, _world: &mut World, _pusher: EntityId, _obstacle: EntityId) {}

    /// `nextthink` came due.
    fn think(&mut self, _world: &mut World, _ent: EntityId) {}

    /// A tossed entity crossed a liquid surface.
    fn water_transition(&mut self, _world: &mut World, _ent: EntityId, _entered: bool) {}
}

/// Callbacks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGame;

impl GameCallbacks for NullGame {}
