// server.rs -- world context: entities, models, area tree and tuning cvars
//
// Everything the collision and physics code reads or writes lives in one
// `World`, passed explicitly. Hulls are shared read-only, so a `&World` can
// be traced from several threads at once.

use qvr_common::cmodel::BrushModel;
use qvr_common::common::{com_set_developer, com_warning};
use qvr_common::cvar::{CvarContext, CvarFlags};
use qvr_common::q_shared::*;

use crate::edict::{Edict, MoveType, Solid};
use crate::sv_world::{AreaTree, AREA_DEPTH};

use std::ops::{Index, IndexMut};

// ============================================================
// Constants
// ============================================================

pub const MAX_EDICTS: usize = 1024;

/// Seconds per physics tick.
pub const DEFAULT_FRAMETIME: f32 = 0.1;

/// A freed slot is not reused until it has been free this long, so late
/// references do not see a new entity.
const EDICT_REUSE_DELAY: f32 = 0.5;

/// Model index of the world brush model.
pub const WORLD_MODEL: usize = 1;

// ============================================================
// World
// ============================================================

pub struct World {
    /// Entity 0 is the world itself.
    pub edicts: Vec<Edict>,
    /// Index 0 is unused so that modelindex 0 means "no model".
    models: Vec<Option<BrushModel>>,
    pub(crate) area: AreaTree,
    pub cvars: CvarContext,
    pub time: f32,
    pub frametime: f32,
    /// While nonzero, every entity is relinked with touches each tick.
    pub force_retouch: i32,
}

impl World {
    /// Set up a world around the given map model.
    pub fn new(world_model: BrushModel) -> Self {
        let mut cvars = CvarContext::new();
        cvars.get("sv_gravity", "800", CvarFlags::SERVERINFO);
        cvars.get("sv_maxvelocity", "2000", CvarFlags::empty());
        cvars.get("sv_nostep", "0", CvarFlags::empty());
        cvars.get("developer", "0", CvarFlags::empty());

        let mins = world_model.mins;
        let maxs = world_model.maxs;
        let mut world = Self {
            edicts: Vec::new(),
            models: vec![None, Some(world_model)],
            area: AreaTree::new(&mins, &maxs, AREA_DEPTH),
            cvars,
            time: 0.0,
            frametime: DEFAULT_FRAMETIME,
            force_retouch: 0,
        };
        world.edicts.push(Edict {
            solid: Solid::Bsp,
            movetype: MoveType::Push,
            modelindex: WORLD_MODEL,
            mins,
            maxs,
            size: vector_subtract(&maxs, &mins),
            ..Edict::default()
        });
        // defaults match the console layer already
        world.cvars.take_modified("developer");
        world
    }

    /// Push cvar changes that other layers cache.
    pub fn apply_cvars(&mut self) {
        if self.cvars.take_modified("developer") {
            com_set_developer(self.cvars.variable_value("developer") != 0.0);
        }
    }

    pub fn sv_gravity(&self) -> f32 {
        self.cvars.variable_value("sv_gravity")
    }

    pub fn sv_maxvelocity(&self) -> f32 {
        self.cvars.variable_value("sv_maxvelocity")
    }

    pub fn sv_nostep(&self) -> bool {
        self.cvars.variable_value("sv_nostep") != 0.0
    }

    // ============================================================
    // Models
    // ============================================================

    /// Register a brush model; returns its model index.
    pub fn add_model(&mut self, model: BrushModel) -> usize {
        self.models.push(Some(model));
        self.models.len() - 1
    }

    pub fn model(&self, index: usize) -> Option<&BrushModel> {
        self.models.get(index).and_then(|m| m.as_ref())
    }

    pub fn world_model(&self) -> Option<&BrushModel> {
        self.model(WORLD_MODEL)
    }

    // ============================================================
    // Entities
    // ============================================================

    pub fn num_edicts(&self) -> usize {
        self.edicts.len()
    }

    /// True for an in-range, in-use entity.
    pub fn is_active(&self, e: EntityId) -> bool {
        self.edicts.get(e.index()).is_some_and(|ent| !ent.free)
    }

    /// Allocate an entity, reusing a slot that has been free long enough.
    pub fn spawn(&mut self) -> Option<EntityId> {
        let time = self.time;
        let reusable = self.edicts.iter().enumerate().skip(1).find(|(_, e)| {
            e.free && (e.freetime < 2.0 || time - e.freetime > EDICT_REUSE_DELAY)
        });
        if let Some((i, _)) = reusable {
            self.edicts[i] = Edict::default();
            return Some(EntityId(i));
        }
        if self.edicts.len() >= MAX_EDICTS {
            com_warning("spawn: no free edicts\n");
            return None;
        }
        self.edicts.push(Edict::default());
        Some(EntityId(self.edicts.len() - 1))
    }

    /// Unlink and mark an entity free. The world entity is never freed.
    pub fn free_edict(&mut self, e: EntityId) {
        if e.is_world() || !self.is_active(e) {
            return;
        }
        self.unlink_edict(e);
        self.edicts[e.index()] = Edict {
            free: true,
            freetime: self.time,
            ..Edict::default()
        };
    }

    /// Set the bounding box and relink without firing touches.
    pub fn set_size(&mut self, e: EntityId, mins: Vec3, maxs: Vec3) {
        let ent = &mut self.edicts[e.index()];
        ent.mins = mins;
        ent.maxs = maxs;
        ent.size = vector_subtract(&maxs, &mins);
        self.link_edict(e, None);
    }

    /// Attach a brush model and take its bounds.
    pub fn set_model(&mut self, e: EntityId, modelindex: usize) {
        let bounds = self.model(modelindex).map(|m| (m.mins, m.maxs));
        self.edicts[e.index()].modelindex = modelindex;
        match bounds {
            Some((mins, maxs)) => self.set_size(e, mins, maxs),
            None => com_warning(&format!("set_model: no model {}\n", modelindex)),
        }
    }
}

impl Index<EntityId> for World {
    type Output = Edict;

    fn index(&self, e: EntityId) -> &Edict {
        &self.edicts[e.index()]
    }
}

impl IndexMut<EntityId> for World {
    fn index_mut(&mut self, e: EntityId) -> &mut Edict {
        &mut self.edicts[e.index()]
    }
}
