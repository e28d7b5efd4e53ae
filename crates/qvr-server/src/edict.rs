// edict.rs -- server-side entity state

use qvr_common::q_shared::{Contents, EntityId, Vec3, VEC3_ORIGIN};

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EntityFlags: i32 {
        const FLY           = 0x00000001;
        const SWIM          = 0x00000002;
        const CLIENT        = 0x00000008;
        const MONSTER       = 0x00000020;
        const ITEM          = 0x00000100;
        const ONGROUND      = 0x00000200;
        const PARTIALGROUND = 0x00000400; // not all corners are valid
        const WATERJUMP     = 0x00000800; // player jumping out of water
    }
}

pub const FL_FLY: EntityFlags = EntityFlags::FLY;
pub const FL_SWIM: EntityFlags = EntityFlags::SWIM;
pub const FL_CLIENT: EntityFlags = EntityFlags::CLIENT;
pub const FL_MONSTER: EntityFlags = EntityFlags::MONSTER;
pub const FL_ITEM: EntityFlags = EntityFlags::ITEM;
pub const FL_ONGROUND: EntityFlags = EntityFlags::ONGROUND;
pub const FL_PARTIALGROUND: EntityFlags = EntityFlags::PARTIALGROUND;
pub const FL_WATERJUMP: EntityFlags = EntityFlags::WATERJUMP;

/// How an entity collides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Solid {
    /// No interaction with other objects.
    #[default]
    Not,
    /// Touch on edge, but not blocking.
    Trigger,
    /// Touch on edge, block.
    Bbox,
    /// Touch on edge, but not an onground.
    SlideBox,
    /// Bsp clip, touch on edge, block.
    Bsp,
    /// Fires touches like a trigger but blocks nothing.
    NotSolidButTouchable,
    /// Blocks like a box, except for monsters and line-of-fire traces.
    Corpse,
}

impl Solid {
    /// Lives on the trigger lists of the area tree.
    #[inline]
    pub fn is_trigger_class(self) -> bool {
        matches!(self, Solid::Trigger | Solid::NotSolidButTouchable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveType {
    /// Never moves.
    #[default]
    None,
    /// Moves without clipping.
    Noclip,
    /// No clip to world, push and crush.
    Push,
    /// Gravity, stepping and sliding.
    Walk,
    /// Gravity, special edge handling; monsters use this.
    Step,
    Fly,
    /// Gravity.
    Toss,
    Bounce,
    /// Extra size to monsters.
    FlyMissile,
}

/// Server-side entity.
#[derive(Debug, Clone)]
pub struct Edict {
    pub free: bool,
    /// World time the slot was freed, for reuse.
    pub freetime: f32,

    pub origin: Vec3,
    pub oldorigin: Vec3,
    pub angles: Vec3,
    pub velocity: Vec3,
    pub avelocity: Vec3,
    pub view_ofs: Vec3,
    pub v_angle: Vec3,
    /// Horizontal speed kept while jumping out of water.
    pub movedir: Vec3,

    pub mins: Vec3,
    pub maxs: Vec3,
    pub size: Vec3,
    pub absmin: Vec3,
    pub absmax: Vec3,

    pub solid: Solid,
    pub movetype: MoveType,
    pub flags: EntityFlags,

    pub owner: Option<EntityId>,
    pub enemy: Option<EntityId>,
    pub groundentity: Option<EntityId>,

    /// Index into the world's model table; 0 is no model.
    pub modelindex: usize,
    /// Gravity scale, 1 is normal.
    pub gravity: f32,

    pub nextthink: f32,
    /// Local time for push movers.
    pub ltime: f32,
    pub teleport_time: f32,

    pub waterlevel: i32,
    /// None until first classified.
    pub watertype: Option<Contents>,
}

impl Default for Edict {
    fn default() -> Self {
        Self {
            free: false,
            freetime: 0.0,
            origin: VEC3_ORIGIN,
            oldorigin: VEC3_ORIGIN,
            angles: VEC3_ORIGIN,
            velocity: VEC3_ORIGIN,
            avelocity: VEC3_ORIGIN,
            view_ofs: VEC3_ORIGIN,
            v_angle: VEC3_ORIGIN,
            movedir: VEC3_ORIGIN,
            mins: VEC3_ORIGIN,
            maxs: VEC3_ORIGIN,
            size: VEC3_ORIGIN,
            absmin: VEC3_ORIGIN,
            absmax: VEC3_ORIGIN,
            solid: Solid::Not,
            movetype: MoveType::None,
            flags: EntityFlags::empty(),
            owner: None,
            enemy: None,
            groundentity: None,
            modelindex: 0,
            gravity: 1.0,
            nextthink: 0.0,
            ltime: 0.0,
            teleport_time: 0.0,
            waterlevel: 0,
            watertype: None,
        }
    }
}

impl Edict {
    /// True when `self` and `other` are owner and owned in either direction.
    pub fn owner_pair(&self, self_id: EntityId, other: &Edict, other_id: EntityId) -> bool {
        self.owner == Some(other_id) || other.owner == Some(self_id)
    }
}
