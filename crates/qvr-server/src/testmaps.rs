// testmaps.rs -- small maps and entity helpers shared by the unit tests

use qvr_common::cmodel::{BrushModel, Hull, RawClipNode, HULL_CLIP_SIZES};
use qvr_common::q_shared::*;

use crate::edict::{MoveType, Solid, FL_CLIENT};
use crate::server::World;
use crate::sv_game::GameCallbacks;

pub const PLAYER_MINS: Vec3 = [-16.0, -16.0, -24.0];
pub const PLAYER_MAXS: Vec3 = [16.0, 16.0, 32.0];

const FLOOR: (Vec3, Vec3) = ([-1024.0, -1024.0, -64.0], [1024.0, 1024.0, 0.0]);

/// A single slab whose top face is z = 0.
pub fn flat_world() -> World {
    World::new(BrushModel::from_boxes(&[FLOOR]))
}

/// Flat floor plus a 16 unit step covering x >= 64.
pub fn stair_world() -> World {
    World::new(BrushModel::from_boxes(&[
        FLOOR,
        ([64.0, -1024.0, 0.0], [1024.0, 1024.0, 16.0]),
    ]))
}

/// Floor for x < 0, then a drop to a pit floor at z = -960.
pub fn ledge_world() -> World {
    World::new(BrushModel::from_boxes(&[
        ([-1024.0, -1024.0, -64.0], [0.0, 1024.0, 0.0]),
        ([0.0, -1024.0, -1024.0], [1024.0, 1024.0, -960.0]),
    ]))
}

/// Open air above z = 0, a current down to z = -512, rock below.
pub fn water_world() -> World {
    let mut model = BrushModel::from_boxes(&[([-1024.0, -1024.0, -1024.0], [1024.0, 1024.0, -512.0])]);
    let (clip_mins, clip_maxs) = HULL_CLIP_SIZES[0];
    let raw = [
        RawClipNode { planenum: 0, children: [-1, 1] },
        RawClipNode { planenum: 1, children: [-10, -2] },
    ];
    let planes = vec![Plane::axial(2, 0.0), Plane::axial(2, -512.0)];
    if let Ok(hull) = Hull::from_raw(&raw, planes, 0, clip_mins, clip_maxs) {
        model.hulls[0] = hull;
    }
    model.mins[2] = -1024.0;
    model.maxs[2] = 512.0;
    World::new(model)
}

/// A linked box entity; `solid` decides which list it lands on.
pub fn spawn_box(world: &mut World, origin: Vec3, mins: Vec3, maxs: Vec3, solid: Solid) -> EntityId {
    let e = world.spawn().unwrap();
    world[e].origin = origin;
    world[e].solid = solid;
    world.set_size(e, mins, maxs);
    e
}

/// A player-sized walker, linked without touches.
pub fn spawn_player(world: &mut World, origin: Vec3) -> EntityId {
    let e = spawn_box(world, origin, PLAYER_MINS, PLAYER_MAXS, Solid::SlideBox);
    world[e].movetype = MoveType::Walk;
    world[e].flags = FL_CLIENT;
    world[e].view_ofs = [0.0, 0.0, 22.0];
    e
}

/// Callbacks that remember everything they were told.
#[derive(Debug, Default)]
pub struct Recorder {
    /// (touched, toucher)
    pub touches: Vec<(EntityId, EntityId)>,
    /// (pusher, obstacle)
    pub blocked: Vec<(EntityId, EntityId)>,
    pub thinks: Vec<(EntityId, f32)>,
    /// (entity, entered)
    pub water: Vec<(EntityId, bool)>,
}

impl GameCallbacks for Recorder {
    fn touch(&mut self, _world: &mut World, touched: EntityId, toucher: EntityId) {
        self.touches.push((touched, toucher));
    }

    fn blocked(&mut self, _world: &mut World, pusher: EntityId, obstacle: EntityId) {
        self.blocked.push((pusher, obstacle));
    }

    fn think(&mut self, world: &mut World, ent: EntityId) {
        self.thinks.push((ent, world.time));
    }

    fn water_transition(&mut self, _world: &mut World, ent: EntityId, entered: bool) {
        self.water.push((ent, entered));
    }
}
