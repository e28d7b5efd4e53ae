// sv_world.rs -- world query functions
//
// Entity area checking: spatial partitioning via area nodes,
// linking/unlinking entities, box queries, point contents, and tracing.

use qvr_common::cmodel::{BoxHull, Hull, HullView};
use qvr_common::common::{com_dprintf, com_warning};
use qvr_common::link::{LinkArena, LinkId};
use qvr_common::q_shared::*;

use crate::edict::{Edict, Solid, FL_ITEM, FL_MONSTER};
use crate::server::World;
use crate::sv_game::GameCallbacks;

use rayon::prelude::*;
use std::ops::ControlFlow;

// ===============================================================================
// ENTITY AREA CHECKING
// ===============================================================================

pub const AREA_DEPTH: usize = 4;
pub const AREA_NODES: usize = 32;

/// Batches at least this large are traced on the rayon pool.
const PARALLEL_TRACE_THRESHOLD: usize = 64;

/// Which list of an area node to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaKind {
    Solid,
    Triggers,
}

#[derive(Debug, Clone)]
pub struct AreaNode {
    /// None for leaves.
    pub axis: Option<usize>,
    pub dist: f32,
    /// Above `dist`, below `dist`.
    pub children: [usize; 2],
    pub trigger_edicts: LinkId,
    pub solid_edicts: LinkId,
}

/// Uniformly subdivided tree over the map's horizontal extent. Each
/// linked entity sits in the deepest node whose split it straddles.
#[derive(Debug, Clone)]
pub struct AreaTree {
    nodes: Vec<AreaNode>,
    links: LinkArena<EntityId>,
    /// Per-entity list node, allocated on first link.
    edict_links: Vec<Option<LinkId>>,
    edict_nodes: Vec<Option<usize>>,
    mins: Vec3,
    maxs: Vec3,
}

impl AreaTree {
    pub fn new(mins: &Vec3, maxs: &Vec3, depth: usize) -> Self {
        let mut tree = Self {
            nodes: Vec::with_capacity(AREA_NODES),
            links: LinkArena::new(),
            edict_links: Vec::new(),
            edict_nodes: Vec::new(),
            mins: *mins,
            maxs: *maxs,
        };
        tree.create_area_node(0, depth, mins, maxs);
        tree
    }

    // ================================================================
    // SV_CreateAreaNode
    //
    // Builds a uniformly subdivided tree for the given world size.
    // Returns the index of the created node.
    // ================================================================
    fn create_area_node(&mut self, depth: usize, max_depth: usize, mins: &Vec3, maxs: &Vec3) -> usize {
        let anode_idx = self.nodes.len();
        let trigger_edicts = self.links.alloc_head();
        let solid_edicts = self.links.alloc_head();
        self.nodes.push(AreaNode {
            axis: None,
            dist: 0.0,
            children: [anode_idx; 2],
            trigger_edicts,
            solid_edicts,
        });

        if depth == max_depth {
            return anode_idx;
        }

        let size = vector_subtract(maxs, mins);
        let axis = if size[0] > size[1] { 0 } else { 1 };
        let dist = 0.5 * (maxs[axis] + mins[axis]);

        let mut mins2 = *mins;
        let mut maxs1 = *maxs;
        maxs1[axis] = dist;
        mins2[axis] = dist;

        let child0 = self.create_area_node(depth + 1, max_depth, &mins2, maxs);
        let child1 = self.create_area_node(depth + 1, max_depth, mins, &maxs1);

        let node = &mut self.nodes[anode_idx];
        node.axis = Some(axis);
        node.dist = dist;
        node.children = [child0, child1];
        anode_idx
    }

    pub fn nodes(&self) -> &[AreaNode] {
        &self.nodes
    }

    fn link_for(&mut self, e: EntityId) -> LinkId {
        let i = e.index();
        if self.edict_links.len() <= i {
            self.edict_links.resize(i + 1, None);
            self.edict_nodes.resize(i + 1, None);
        }
        match self.edict_links[i] {
            Some(l) => l,
            None => {
                let l = self.links.alloc(e);
                self.edict_links[i] = Some(l);
                l
            }
        }
    }

    /// Remove an entity from whichever list holds it.
    pub fn unlink(&mut self, e: EntityId) {
        let i = e.index();
        if let Some(&Some(l)) = self.edict_links.get(i) {
            if !self.links.is_linked(l) {
                return; // not linked in anywhere
            }
            self.links.remove(l);
            self.edict_nodes[i] = None;
        }
    }

    /// Find the node an absolute box belongs in. Boxes reaching outside the
    /// tree's horizontal bounds stay at the root.
    pub fn find_node(&self, absmin: &Vec3, absmax: &Vec3) -> usize {
        for i in 0..2 {
            if absmin[i] < self.mins[i] || absmax[i] > self.maxs[i] {
                return 0;
            }
        }

        let mut n = 0;
        loop {
            let node = &self.nodes[n];
            let axis = match node.axis {
                Some(axis) => axis,
                None => return n,
            };
            if absmin[axis] > node.dist {
                n = node.children[0];
            } else if absmax[axis] < node.dist {
                n = node.children[1];
            } else {
                return n; // crosses the node
            }
        }
    }

    /// Link an entity into the node holding its box. Returns the node.
    pub fn insert(&mut self, e: EntityId, absmin: &Vec3, absmax: &Vec3, kind: AreaKind) -> usize {
        let l = self.link_for(e);
        let n = self.find_node(absmin, absmax);
        let head = match kind {
            AreaKind::Triggers => self.nodes[n].trigger_edicts,
            AreaKind::Solid => self.nodes[n].solid_edicts,
        };
        self.links.insert_before(l, head);
        self.edict_nodes[e.index()] = Some(n);
        n
    }

    pub fn linked_node(&self, e: EntityId) -> Option<usize> {
        self.edict_nodes.get(e.index()).copied().flatten()
    }

    /// Visit every entity on the given lists of all nodes a box reaches, in
    /// node order. Entity boxes are not checked here.
    pub fn walk<F>(&self, mins: &Vec3, maxs: &Vec3, kind: AreaKind, f: &mut F) -> ControlFlow<()>
    where
        F: FnMut(EntityId) -> ControlFlow<()>,
    {
        self.walk_node(0, mins, maxs, kind, f)
    }

    fn walk_node<F>(&self, n: usize, mins: &Vec3, maxs: &Vec3, kind: AreaKind, f: &mut F) -> ControlFlow<()>
    where
        F: FnMut(EntityId) -> ControlFlow<()>,
    {
        let node = &self.nodes[n];
        let head = match kind {
            AreaKind::Triggers => node.trigger_edicts,
            AreaKind::Solid => node.solid_edicts,
        };
        for e in self.links.iter(head) {
            f(e)?;
        }

        if let Some(axis) = node.axis {
            // recurse down both sides
            if maxs[axis] > node.dist {
                self.walk_node(node.children[0], mins, maxs, kind, f)?;
            }
            if mins[axis] < node.dist {
                self.walk_node(node.children[1], mins, maxs, kind, f)?;
            }
        }
        ControlFlow::Continue(())
    }
}

// ============================================================
// Movement trace types
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveKind {
    #[default]
    Normal,
    /// Only clip against bsp entities.
    NoMonsters,
    /// Extra size against monsters.
    Missile,
}

/// One trace of a batch.
#[derive(Debug, Clone, Copy)]
pub struct TraceRequest {
    pub start: Vec3,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub end: Vec3,
    pub kind: MoveKind,
    pub passedict: Option<EntityId>,
}

struct MoveClip {
    boxmins: Vec3,
    boxmaxs: Vec3,
    mins: Vec3,
    maxs: Vec3,
    /// Size when clipping against monsters.
    mins2: Vec3,
    maxs2: Vec3,
    start: Vec3,
    end: Vec3,
    trace: Trace,
    kind: MoveKind,
    passedict: Option<EntityId>,
}

/// Hull an entity is clipped with: a model hull or a box built per call.
enum EntityHull<'a> {
    Model(&'a Hull),
    Box(BoxHull),
}

impl EntityHull<'_> {
    fn view(&self) -> HullView<'_> {
        match self {
            EntityHull::Model(hull) => hull.view(),
            EntityHull::Box(hull) => hull.view(),
        }
    }
}

#[inline]
fn rotate_into(v: &Vec3, forward: &Vec3, right: &Vec3, up: &Vec3) -> Vec3 {
    [dot_product(v, forward), -dot_product(v, right), dot_product(v, up)]
}

/// Bounds of the whole move, with a unit of slack on every side.
fn move_bounds(start: &Vec3, mins: &Vec3, maxs: &Vec3, end: &Vec3) -> (Vec3, Vec3) {
    let mut boxmins = [0.0; 3];
    let mut boxmaxs = [0.0; 3];
    for i in 0..3 {
        if end[i] > start[i] {
            boxmins[i] = start[i] + mins[i] - 1.0;
            boxmaxs[i] = end[i] + maxs[i] + 1.0;
        } else {
            boxmins[i] = end[i] + mins[i] - 1.0;
            boxmaxs[i] = start[i] + maxs[i] + 1.0;
        }
    }
    (boxmins, boxmaxs)
}

impl World {
    // ================================================================
    // SV_ClearWorld
    // ================================================================

    /// Rebuild the area tree; every entity ends up unlinked.
    pub fn clear_world(&mut self, mins: &Vec3, maxs: &Vec3) {
        self.area = AreaTree::new(mins, maxs, AREA_DEPTH);
    }

    // ================================================================
    // SV_UnlinkEdict
    // ================================================================
    pub fn unlink_edict(&mut self, e: EntityId) {
        self.area.unlink(e);
    }

    // ================================================================
    // SV_LinkEdict
    // ================================================================

    /// Recompute the entity's absolute box and file it in the area tree.
    /// Always unlinks first, so linking twice leaves one membership. With a
    /// callback, trigger touches fire afterwards.
    pub fn link_edict(&mut self, e: EntityId, touch_triggers: Option<&mut dyn GameCallbacks>) {
        self.area.unlink(e); // unlink from old position

        if e.is_world() {
            return; // don't add the world
        }
        if !self.is_active(e) {
            return;
        }

        let ent = &mut self.edicts[e.index()];
        ent.size = vector_subtract(&ent.maxs, &ent.mins);

        // set the abs box
        if ent.solid == Solid::Bsp && !vec3_is_zero(&ent.angles) {
            // expand for rotation
            let mut max = 0.0f32;
            for i in 0..3 {
                max = max.max(ent.mins[i].abs()).max(ent.maxs[i].abs());
            }
            for i in 0..3 {
                ent.absmin[i] = ent.origin[i] - max;
                ent.absmax[i] = ent.origin[i] + max;
            }
        } else {
            ent.absmin = vector_add(&ent.origin, &ent.mins);
            ent.absmax = vector_add(&ent.origin, &ent.maxs);
        }

        // to make items easier to pick up and allow them to be grabbed off
        // of shelves, the abs sizes are expanded
        if ent.flags.contains(FL_ITEM) {
            ent.absmin[0] -= 15.0;
            ent.absmin[1] -= 15.0;
            ent.absmax[0] += 15.0;
            ent.absmax[1] += 15.0;
        } else {
            // movement is clipped an epsilon away from an actual edge,
            // so we need to expand the box by one unit
            for i in 0..3 {
                ent.absmin[i] -= 1.0;
                ent.absmax[i] += 1.0;
            }
        }

        if ent.solid == Solid::Not {
            return;
        }

        let kind = if ent.solid.is_trigger_class() {
            AreaKind::Triggers
        } else {
            AreaKind::Solid
        };
        let (absmin, absmax) = (ent.absmin, ent.absmax);
        self.area.insert(e, &absmin, &absmax, kind);

        if let Some(game) = touch_triggers {
            self.touch_links(e, game);
        }
    }

    // ================================================================
    // SV_TouchLinks
    // ================================================================

    /// Fire `touch` for every trigger overlapping the entity. The candidate
    /// list is gathered before any callback runs, since callbacks may link,
    /// unlink or free entities.
    pub fn touch_links(&mut self, e: EntityId, game: &mut dyn GameCallbacks) {
        if !self.is_active(e) {
            return;
        }
        let absmin = self[e].absmin;
        let absmax = self[e].absmax;

        let mut candidates = Vec::new();
        let _ = self.area.walk(&absmin, &absmax, AreaKind::Triggers, &mut |t| {
            candidates.push(t);
            ControlFlow::Continue(())
        });

        for t in candidates {
            if !self.is_active(e) {
                break;
            }
            if t == e || !self.is_active(t) {
                continue;
            }
            let ent = &self[e];
            let touch = &self[t];
            if !touch.solid.is_trigger_class() {
                continue;
            }
            if ent.owner_pair(e, touch, t) {
                continue;
            }
            if !boxes_overlap(&ent.absmin, &ent.absmax, &touch.absmin, &touch.absmax) {
                continue;
            }
            game.touch(self, t, e);
        }
    }

    // ================================================================
    // SV_AreaEdicts
    // ================================================================

    /// Linked entities of one list class whose boxes overlap `mins..maxs`.
    pub fn area_edicts(&self, mins: &Vec3, maxs: &Vec3, kind: AreaKind) -> Vec<EntityId> {
        let mut list = Vec::new();
        let _ = self.area.walk(mins, maxs, kind, &mut |e| {
            let ent = &self.edicts[e.index()];
            if boxes_overlap(mins, maxs, &ent.absmin, &ent.absmax) {
                list.push(e);
            }
            ControlFlow::Continue(())
        });
        list
    }

    /// Area node currently holding the entity, if linked.
    pub fn linked_node(&self, e: EntityId) -> Option<usize> {
        self.area.linked_node(e)
    }

    /// Area node a box with these absolute bounds would be linked into.
    pub fn find_area_node(&self, absmin: &Vec3, absmax: &Vec3) -> usize {
        self.area.find_node(absmin, absmax)
    }

    pub fn area_tree(&self) -> &AreaTree {
        &self.area
    }

    // ================================================================
    // POINT TESTING IN HULLS
    // ================================================================

    /// World contents at a point, with currents reported as water.
    pub fn point_contents(&self, p: &Vec3) -> Contents {
        let cont = self.true_point_contents(p);
        if cont.is_current() {
            Contents::Water
        } else {
            cont
        }
    }

    /// World contents at a point as stored in the map.
    pub fn true_point_contents(&self, p: &Vec3) -> Contents {
        match self.world_model() {
            Some(model) => model.hulls[0].view().point_contents(p),
            None => Contents::Empty,
        }
    }

    // ================================================================
    // SV_HullForEntity
    //
    // Returns a hull that can be used for testing or clipping an object of
    // mins/maxs size, and the offset to subtract from positions first.
    // ================================================================
    fn hull_for_entity(&self, ent: &Edict, mins: &Vec3, maxs: &Vec3) -> (EntityHull<'_>, Vec3) {
        // decide which clipping hull to use, based on the size
        if ent.solid == Solid::Bsp {
            if let Some(model) = self.model(ent.modelindex) {
                let size = vector_subtract(maxs, mins);
                let hull = model.hull_for_size(&size);

                // calculate an offset value to center the origin
                let offset = vector_add(&vector_subtract(&hull.clip_mins(), mins), &ent.origin);
                return (EntityHull::Model(hull), offset);
            }
            com_dprintf(&format!("bsp entity with no model {}\n", ent.modelindex));
        }

        // create a temp hull from bounding box sizes
        let hullmins = vector_subtract(&ent.mins, maxs);
        let hullmaxs = vector_subtract(&ent.maxs, mins);
        (EntityHull::Box(BoxHull::new(&hullmins, &hullmaxs)), ent.origin)
    }

    // ================================================================
    // SV_ClipMoveToEntity
    // ================================================================

    /// Handles selection or creation of a clipping hull, and offsetting (and
    /// eventually rotation) of the end points.
    pub fn clip_move_to_entity(
        &self,
        e: EntityId,
        start: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        end: &Vec3,
    ) -> Trace {
        let ent = &self[e];
        let (hull, offset) = self.hull_for_entity(ent, mins, maxs);

        let mut start_l = vector_subtract(start, &offset);
        let mut end_l = vector_subtract(end, &offset);

        // rotate start and end into the model's frame of reference
        let rotated = ent.solid == Solid::Bsp && !e.is_world() && !vec3_is_zero(&ent.angles);
        if rotated {
            let (forward, right, up) = angle_vectors(&ent.angles);
            start_l = rotate_into(&start_l, &forward, &right, &up);
            end_l = rotate_into(&end_l, &forward, &right, &up);
        }

        let mut trace = hull.view().trace(&start_l, &end_l);

        if trace.fraction != 1.0 {
            if rotated {
                // rotate endpos and plane back to world frame of reference
                let (forward, right, up) = angle_vectors(&vector_negate(&ent.angles));
                trace.endpos = rotate_into(&trace.endpos, &forward, &right, &up);
                let normal = rotate_into(&trace.plane.normal, &forward, &right, &up);
                trace.plane = Plane::new(normal, trace.plane.dist);
            }
            // fix trace up by the offset
            trace.endpos = vector_add(&trace.endpos, &offset);
        } else {
            trace.endpos = *end;
        }

        // did we clip the move?
        if trace.fraction < 1.0 || trace.startsolid {
            trace.ent = e;
        }
        trace
    }

    // ================================================================
    // SV_ClipToLinks
    // ================================================================

    /// Mainly for detecting when something has moved into something else.
    fn clip_to_links(&self, clip: &mut MoveClip) {
        let boxmins = clip.boxmins;
        let boxmaxs = clip.boxmaxs;
        let pass = clip.passedict.and_then(|p| self.edicts.get(p.index()));

        let _ = self.area.walk(&boxmins, &boxmaxs, AreaKind::Solid, &mut |touch_id| {
            let touch = &self.edicts[touch_id.index()];
            if touch.free || touch.solid == Solid::Not || touch.solid.is_trigger_class() {
                return ControlFlow::Continue(());
            }
            if Some(touch_id) == clip.passedict {
                return ControlFlow::Continue(());
            }
            if clip.kind == MoveKind::NoMonsters && touch.solid != Solid::Bsp {
                return ControlFlow::Continue(());
            }
            if touch.solid == Solid::Corpse && pass.is_some_and(|p| p.solid == Solid::SlideBox) {
                return ControlFlow::Continue(()); // monsters walk over corpses
            }
            if !boxes_overlap(&boxmins, &boxmaxs, &touch.absmin, &touch.absmax) {
                return ControlFlow::Continue(());
            }
            if let Some(pass) = pass {
                if pass.size[0] != 0.0 && touch.size[0] == 0.0 {
                    return ControlFlow::Continue(()); // points never interact
                }
            }

            // might intersect, so do an exact clip
            if clip.trace.allsolid {
                return ControlFlow::Break(());
            }
            if let (Some(pass), Some(pass_id)) = (pass, clip.passedict) {
                if touch.owner == Some(pass_id) {
                    return ControlFlow::Continue(()); // don't clip against own missiles
                }
                if pass.owner == Some(touch_id) {
                    return ControlFlow::Continue(()); // don't clip against owner
                }
            }

            let trace = if touch.flags.contains(FL_MONSTER) {
                self.clip_move_to_entity(touch_id, &clip.start, &clip.mins2, &clip.maxs2, &clip.end)
            } else {
                self.clip_move_to_entity(touch_id, &clip.start, &clip.mins, &clip.maxs, &clip.end)
            };

            if trace.allsolid || trace.fraction < clip.trace.fraction {
                let startsolid = clip.trace.startsolid;
                clip.trace = trace;
                clip.trace.ent = touch_id;
                if startsolid {
                    clip.trace.startsolid = true;
                }
            } else if trace.startsolid {
                clip.trace.startsolid = true;
            }
            ControlFlow::Continue(())
        });
    }

    // ================================================================
    // SV_Move
    // ================================================================

    /// Sweep a box from `start` to `end` against the world and every solid
    /// entity except `passedict` and what it owns or is owned by.
    pub fn trace(
        &self,
        start: &Vec3,
        mins: &Vec3,
        maxs: &Vec3,
        end: &Vec3,
        kind: MoveKind,
        passedict: Option<EntityId>,
    ) -> Trace {
        if !vec3_is_finite(start)
            || !vec3_is_finite(end)
            || !vec3_is_finite(mins)
            || !vec3_is_finite(maxs)
            || (0..3).any(|i| mins[i] > maxs[i])
        {
            com_warning("trace: non-finite or inverted bounds\n");
            return Trace::stuck(start);
        }

        // clip to world
        let trace = self.clip_move_to_entity(EntityId::WORLD, start, mins, maxs, end);

        let (mins2, maxs2) = if kind == MoveKind::Missile {
            ([-15.0; 3], [15.0; 3])
        } else {
            (*mins, *maxs)
        };

        // create the bounding box of the entire move
        let (boxmins, boxmaxs) = move_bounds(start, &mins2, &maxs2, end);

        let mut clip = MoveClip {
            boxmins,
            boxmaxs,
            mins: *mins,
            maxs: *maxs,
            mins2,
            maxs2,
            start: *start,
            end: *end,
            trace,
            kind,
            passedict,
        };

        // clip to entities
        self.clip_to_links(&mut clip);
        clip.trace
    }

    /// Run independent traces; large batches go to the rayon pool.
    pub fn trace_many(&self, requests: &[TraceRequest]) -> Vec<Trace> {
        let run = |r: &TraceRequest| self.trace(&r.start, &r.mins, &r.maxs, &r.end, r.kind, r.passedict);
        if requests.len() >= PARALLEL_TRACE_THRESHOLD {
            requests.par_iter().map(run).collect()
        } else {
            requests.iter().map(run).collect()
        }
    }

    // ================================================================
    // SV_TestEntityPosition
    // ================================================================

    /// What the entity is stuck in at its current position, if anything.
    pub fn test_entity_position(&self, e: EntityId) -> Option<EntityId> {
        let ent = &self[e];
        let trace = self.trace(&ent.origin, &ent.mins, &ent.maxs, &ent.origin, MoveKind::Normal, Some(e));
        if trace.startsolid {
            Some(trace.ent)
        } else {
            None
        }
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edict::{MoveType, FL_MONSTER};
    use crate::sv_game::NullGame;
    use crate::testmaps::{self, Recorder, PLAYER_MAXS, PLAYER_MINS};
    use qvr_common::cmodel::BrushModel;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    // =========================================================================
    // Area tree
    // =========================================================================

    #[test]
    fn area_tree_has_full_depth() {
        let tree = AreaTree::new(&[-1024.0, -1024.0, -512.0], &[1024.0, 1024.0, 512.0], AREA_DEPTH);
        assert_eq!(tree.nodes().len(), 31);
        assert!(tree.nodes().len() <= AREA_NODES);

        // with equal X/Y extents the root splits on Y at the midpoint
        let root = &tree.nodes()[0];
        assert_eq!(root.axis, Some(1));
        assert_eq!(root.dist, 0.0);

        let leaves = tree.nodes().iter().filter(|n| n.axis.is_none()).count();
        assert_eq!(leaves, 16);
    }

    #[test]
    fn area_tree_splits_longer_axis() {
        let tree = AreaTree::new(&[0.0, 0.0, 0.0], &[4096.0, 1024.0, 64.0], 1);
        assert_eq!(tree.nodes().len(), 3);
        assert_eq!(tree.nodes()[0].axis, Some(0));
        assert_eq!(tree.nodes()[0].dist, 2048.0);
    }

    #[test]
    fn unlink_is_idempotent() {
        let mut world = testmaps::flat_world();
        let e = testmaps::spawn_box(&mut world, [0.0, 0.0, 100.0], [-8.0; 3], [8.0; 3], Solid::Bbox);
        assert!(world.linked_node(e).is_some());

        world.unlink_edict(e);
        world.unlink_edict(e);
        assert!(world.linked_node(e).is_none());
        assert!(world.area_edicts(&[-2048.0; 3], &[2048.0; 3], AreaKind::Solid).is_empty());

        // never-linked entity
        let f = world.spawn().unwrap();
        world.unlink_edict(f);
        assert!(world.linked_node(f).is_none());
    }

    #[test]
    fn link_is_total() {
        let mut world = testmaps::flat_world();
        let e = testmaps::spawn_box(&mut world, [100.0, 100.0, 100.0], [-8.0; 3], [8.0; 3], Solid::Bbox);
        world.link_edict(e, None);
        world[e].origin = [-300.0, 200.0, 100.0];
        world.link_edict(e, None);
        world.link_edict(e, None);

        let all = world.area_edicts(&[-2048.0; 3], &[2048.0; 3], AreaKind::Solid);
        assert_eq!(all, vec![e]);
        assert_eq!(world[e].absmin, [-309.0, 191.0, 91.0]);
    }

    #[test]
    fn containment_round_trip() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut world = testmaps::flat_world();
        for _ in 0..200 {
            let e = world.spawn().unwrap();
            let half: f32 = rng.gen_range(1.0..200.0);
            world[e].solid = Solid::Bbox;
            world[e].origin = [rng.gen_range(-1000.0..1000.0), rng.gen_range(-1000.0..1000.0), 50.0];
            world.set_size(e, [-half, -half, 0.0], [half, half, 10.0]);

            let ent = &world[e];
            let node = world.find_area_node(&ent.absmin, &ent.absmax);
            assert_eq!(world.linked_node(e), Some(node));

            let tree = world.area_tree();
            let inside = (0..2).all(|i| ent.absmin[i] >= tree.mins[i] && ent.absmax[i] <= tree.maxs[i]);
            if !inside {
                assert_eq!(node, 0);
                continue;
            }

            // the node is the deepest one: its split (if any) cuts the box
            let n = &tree.nodes()[node];
            if let Some(axis) = n.axis {
                assert!(ent.absmin[axis] <= n.dist && ent.absmax[axis] >= n.dist);
            }
        }
    }

    #[test]
    fn boxes_outside_the_tree_link_at_root() {
        let mut world = testmaps::flat_world();
        let e = testmaps::spawn_box(&mut world, [5000.0, 0.0, 0.0], [-8.0; 3], [8.0; 3], Solid::Bbox);
        assert_eq!(world.linked_node(e), Some(0));
        let found = world.area_edicts(&[4900.0, -100.0, -100.0], &[5100.0, 100.0, 100.0], AreaKind::Solid);
        assert_eq!(found, vec![e]);
    }

    #[test]
    fn items_get_wider_pickup_box() {
        let mut world = testmaps::flat_world();
        let e = world.spawn().unwrap();
        world[e].solid = Solid::Trigger;
        world[e].flags = FL_ITEM;
        world.set_size(e, [-16.0, -16.0, 0.0], [16.0, 16.0, 56.0]);
        assert_eq!(world[e].absmin, [-31.0, -31.0, 0.0]);
        assert_eq!(world[e].absmax, [31.0, 31.0, 56.0]);
    }

    #[test]
    fn not_solid_and_free_entities_are_not_linked() {
        let mut world = testmaps::flat_world();
        let e = testmaps::spawn_box(&mut world, [0.0; 3], [-8.0; 3], [8.0; 3], Solid::Not);
        assert!(world.linked_node(e).is_none());
        assert_eq!(world[e].absmin, [-9.0; 3]);

        let f = testmaps::spawn_box(&mut world, [0.0; 3], [-8.0; 3], [8.0; 3], Solid::Bbox);
        world.free_edict(f);
        world.link_edict(f, None);
        assert!(world.linked_node(f).is_none());
    }

    #[test]
    fn trigger_class_goes_to_trigger_lists() {
        let mut world = testmaps::flat_world();
        let t = testmaps::spawn_box(&mut world, [0.0; 3], [-8.0; 3], [8.0; 3], Solid::Trigger);
        let n = testmaps::spawn_box(&mut world, [0.0; 3], [-8.0; 3], [8.0; 3], Solid::NotSolidButTouchable);
        let s = testmaps::spawn_box(&mut world, [0.0; 3], [-8.0; 3], [8.0; 3], Solid::Corpse);
        let big = [-100.0; 3];
        let triggers = world.area_edicts(&big, &[100.0; 3], AreaKind::Triggers);
        let solids = world.area_edicts(&big, &[100.0; 3], AreaKind::Solid);
        assert_eq!(triggers, vec![t, n]);
        assert_eq!(solids, vec![s]);
    }

    // =========================================================================
    // Trigger touches
    // =========================================================================

    #[test]
    fn trigger_touch_fires_exactly_once() {
        let mut world = testmaps::flat_world();
        let trigger = testmaps::spawn_box(&mut world, [0.0, 0.0, 32.0], [-64.0; 3], [64.0; 3], Solid::Trigger);
        let far = testmaps::spawn_box(&mut world, [600.0, 0.0, 32.0], [-64.0; 3], [64.0; 3], Solid::Trigger);
        let player = testmaps::spawn_player(&mut world, [0.0, 0.0, 24.0]);

        let mut game = Recorder::default();
        world.link_edict(player, Some(&mut game));
        assert_eq!(game.touches, vec![(trigger, player)]);
        assert!(!game.touches.iter().any(|&(t, _)| t == far));
    }

    #[test]
    fn trigger_touch_skips_owner() {
        let mut world = testmaps::flat_world();
        let player = testmaps::spawn_player(&mut world, [0.0, 0.0, 24.0]);
        let trigger = testmaps::spawn_box(&mut world, [0.0, 0.0, 32.0], [-64.0; 3], [64.0; 3], Solid::Trigger);
        world[trigger].owner = Some(player);

        let mut game = Recorder::default();
        world.link_edict(player, Some(&mut game));
        assert!(game.touches.is_empty());
    }

    #[test]
    fn touch_stops_when_toucher_is_freed() {
        struct Killer(usize);
        impl GameCallbacks for Killer {
            fn touch(&mut self, world: &mut World, _touched: EntityId, toucher: EntityId) {
                self.0 += 1;
                world.free_edict(toucher);
            }
        }

        let mut world = testmaps::flat_world();
        testmaps::spawn_box(&mut world, [0.0, 0.0, 32.0], [-64.0; 3], [64.0; 3], Solid::Trigger);
        testmaps::spawn_box(&mut world, [0.0, 0.0, 32.0], [-64.0; 3], [64.0; 3], Solid::Trigger);
        let player = testmaps::spawn_player(&mut world, [0.0, 0.0, 24.0]);

        let mut game = Killer(0);
        world.link_edict(player, Some(&mut game));
        assert_eq!(game.0, 1);
        assert!(!world.is_active(player));
    }

    // =========================================================================
    // Point contents
    // =========================================================================

    #[test]
    fn point_contents_folds_currents() {
        let world = testmaps::water_world();
        assert_eq!(world.point_contents(&[0.0, 0.0, 10.0]), Contents::Empty);
        assert_eq!(world.point_contents(&[0.0, 0.0, -10.0]), Contents::Water);
        assert_eq!(world.point_contents(&[0.0, 0.0, -600.0]), Contents::Solid);
        assert_eq!(world.true_point_contents(&[0.0, 0.0, -10.0]), Contents::Current90);
    }

    // =========================================================================
    // Movement traces
    // =========================================================================

    #[test]
    fn open_trace_is_the_baseline() {
        let world = testmaps::flat_world();
        let end = [200.0, 50.0, 100.0];
        let tr = world.trace(&[0.0, 0.0, 100.0], &PLAYER_MINS, &PLAYER_MAXS, &end, MoveKind::Normal, None);
        assert_eq!(tr.fraction, 1.0);
        assert_eq!(tr.endpos, end);
        assert_eq!(tr.ent, EntityId::WORLD);
        assert!(!tr.startsolid && !tr.allsolid);
    }

    #[test]
    fn trace_stops_on_the_floor() {
        let world = testmaps::flat_world();
        let tr = world.trace(
            &[0.0, 0.0, 100.0],
            &PLAYER_MINS,
            &PLAYER_MAXS,
            &[0.0, 0.0, -100.0],
            MoveKind::Normal,
            None,
        );
        assert!(tr.fraction < 1.0);
        assert_eq!(tr.ent, EntityId::WORLD);
        assert_eq!(tr.plane.normal, [0.0, 0.0, 1.0]);
        assert!((tr.endpos[2] - 24.03125).abs() < 1e-3);
    }

    #[test]
    fn zero_length_trace_matches_contents() {
        let world = testmaps::flat_world();
        let inside = [0.0, 0.0, -20.0];
        let tr = world.trace(&inside, &VEC3_ORIGIN, &VEC3_ORIGIN, &inside, MoveKind::Normal, None);
        assert_eq!(world.point_contents(&inside), Contents::Solid);
        assert!(tr.startsolid && tr.allsolid);
        assert_eq!(tr.fraction, 0.0);

        let open = [0.0, 0.0, 20.0];
        let tr = world.trace(&open, &VEC3_ORIGIN, &VEC3_ORIGIN, &open, MoveKind::Normal, None);
        assert!(!tr.startsolid);
        assert_eq!(tr.fraction, 1.0);
    }

    #[test]
    fn trace_hits_bbox_entity() {
        let mut world = testmaps::flat_world();
        let crate_ent = testmaps::spawn_box(&mut world, [100.0, 0.0, 40.0], [-16.0; 3], [16.0; 3], Solid::Bbox);
        let tr = world.trace(&[0.0, 0.0, 40.0], &[-8.0; 3], &[8.0; 3], &[200.0, 0.0, 40.0], MoveKind::Normal, None);
        assert_eq!(tr.ent, crate_ent);
        assert_eq!(tr.plane.normal, [-1.0, 0.0, 0.0]);
        assert!((tr.endpos[0] - (100.0 - 24.0 - 0.03125)).abs() < 1e-3);

        // passedict is never clipped against
        let tr = world.trace(&[0.0, 0.0, 40.0], &[-8.0; 3], &[8.0; 3], &[200.0, 0.0, 40.0], MoveKind::Normal, Some(crate_ent));
        assert_eq!(tr.fraction, 1.0);

        // nomonsters only sees bsp entities
        let tr = world.trace(&[0.0, 0.0, 40.0], &[-8.0; 3], &[8.0; 3], &[200.0, 0.0, 40.0], MoveKind::NoMonsters, None);
        assert_eq!(tr.fraction, 1.0);
    }

    #[test]
    fn owner_pairs_are_excluded() {
        let mut world = testmaps::flat_world();
        let player = testmaps::spawn_player(&mut world, [0.0, 0.0, 24.03125]);
        let missile = testmaps::spawn_box(&mut world, [0.0, 0.0, 40.0], [0.0; 3], [0.0; 3], Solid::Bbox);
        world[missile].owner = Some(player);
        world[missile].movetype = MoveType::FlyMissile;

        // missile leaving its owner's box
        let tr = world.trace(&[0.0, 0.0, 40.0], &VEC3_ORIGIN, &VEC3_ORIGIN, &[300.0, 0.0, 40.0], MoveKind::Missile, Some(missile));
        assert_eq!(tr.fraction, 1.0);
        assert!(!tr.startsolid);

        // owner moving through its own missile
        let tr = world.trace(&[-50.0, 0.0, 24.03125], &PLAYER_MINS, &PLAYER_MAXS, &[50.0, 0.0, 24.03125], MoveKind::Normal, Some(player));
        assert_ne!(tr.ent, missile);

        // a stranger hits the player
        let tr = world.trace(&[-100.0, 0.0, 40.0], &VEC3_ORIGIN, &VEC3_ORIGIN, &[100.0, 0.0, 40.0], MoveKind::Normal, None);
        assert_eq!(tr.ent, player);
    }

    #[test]
    fn missiles_are_fat_against_monsters() {
        let mut world = testmaps::flat_world();
        let monster = testmaps::spawn_box(&mut world, [0.0, 0.0, 100.0], [-16.0; 3], [16.0; 3], Solid::SlideBox);
        world[monster].flags = FL_MONSTER;
        world.link_edict(monster, None);

        // passes 10 units beside the monster
        let start = [-200.0, 26.0, 100.0];
        let end = [200.0, 26.0, 100.0];
        let tr = world.trace(&start, &VEC3_ORIGIN, &VEC3_ORIGIN, &end, MoveKind::Normal, None);
        assert_eq!(tr.fraction, 1.0);
        let tr = world.trace(&start, &VEC3_ORIGIN, &VEC3_ORIGIN, &end, MoveKind::Missile, None);
        assert_eq!(tr.ent, monster);
    }

    #[test]
    fn slideboxes_walk_over_corpses() {
        let mut world = testmaps::flat_world();
        let corpse = testmaps::spawn_box(&mut world, [100.0, 0.0, 40.0], [-16.0; 3], [16.0; 3], Solid::Corpse);
        let monster = testmaps::spawn_box(&mut world, [0.0, 300.0, 40.0], [-16.0; 3], [16.0; 3], Solid::SlideBox);

        let tr = world.trace(&[0.0, 0.0, 40.0], &[-16.0; 3], &[16.0; 3], &[200.0, 0.0, 40.0], MoveKind::Normal, Some(monster));
        assert_eq!(tr.fraction, 1.0);

        let tr = world.trace(&[0.0, 0.0, 40.0], &[-16.0; 3], &[16.0; 3], &[200.0, 0.0, 40.0], MoveKind::Normal, None);
        assert_eq!(tr.ent, corpse);
    }

    #[test]
    fn point_sized_entities_ignore_sized_movers() {
        let mut world = testmaps::flat_world();
        testmaps::spawn_box(&mut world, [100.0, 0.0, 40.0], [0.0; 3], [0.0; 3], Solid::Bbox);
        let mover = testmaps::spawn_box(&mut world, [0.0, 0.0, 40.0], [-8.0; 3], [8.0; 3], Solid::Bbox);
        let tr = world.trace(&[0.0, 0.0, 40.0], &[-8.0; 3], &[8.0; 3], &[200.0, 0.0, 40.0], MoveKind::Normal, Some(mover));
        assert_eq!(tr.fraction, 1.0);
    }

    #[test]
    fn bad_bounds_give_stuck_trace() {
        let world = testmaps::flat_world();
        let start = [0.0, 0.0, 100.0];
        let tr = world.trace(&start, &[8.0; 3], &[-8.0; 3], &[100.0, 0.0, 100.0], MoveKind::Normal, None);
        assert_eq!(tr.fraction, 0.0);
        assert!(tr.allsolid && tr.startsolid);
        assert_eq!(tr.endpos, start);

        let tr = world.trace(&start, &[f32::NAN; 3], &[8.0; 3], &[100.0, 0.0, 100.0], MoveKind::Normal, None);
        assert_eq!(tr.fraction, 0.0);
        assert_eq!(tr.endpos, start);

        let tr = world.trace(&[f32::INFINITY, 0.0, 0.0], &VEC3_ORIGIN, &VEC3_ORIGIN, &start, MoveKind::Normal, None);
        assert_eq!(tr.endpos, VEC3_ORIGIN);
        assert!(tr.allsolid);
    }

    #[test]
    fn rotated_brush_models_clip_in_their_own_frame() {
        let mut world = testmaps::flat_world();
        let model = world.add_model(BrushModel::from_box([-64.0, -8.0, -8.0], [64.0, 8.0, 8.0]));
        let bar = world.spawn().unwrap();
        world[bar].solid = Solid::Bsp;
        world[bar].movetype = MoveType::Push;
        world[bar].origin = [0.0, 0.0, 200.0];
        world.set_model(bar, model);

        // unrotated, a point at y = 40 passes the bar
        let start = [-100.0, 40.0, 200.0];
        let end = [100.0, 40.0, 200.0];
        let tr = world.trace(&start, &VEC3_ORIGIN, &VEC3_ORIGIN, &end, MoveKind::Normal, None);
        assert_eq!(tr.fraction, 1.0);

        // turned 90 degrees it lies along y and blocks
        world[bar].angles = [0.0, 90.0, 0.0];
        world.link_edict(bar, None);
        let tr = world.trace(&start, &VEC3_ORIGIN, &VEC3_ORIGIN, &end, MoveKind::Normal, None);
        assert_eq!(tr.ent, bar);
        assert!((tr.endpos[0] + 8.03125).abs() < 0.01, "endpos {:?}", tr.endpos);
        assert!((tr.plane.normal[0] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn batch_traces_match_single_traces() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut world = testmaps::stair_world();
        for i in 0..20 {
            let solid = if i % 3 == 0 { Solid::SlideBox } else { Solid::Bbox };
            testmaps::spawn_box(
                &mut world,
                [rng.gen_range(-500.0..500.0), rng.gen_range(-500.0..500.0), rng.gen_range(20.0..200.0)],
                [-16.0; 3],
                [16.0; 3],
                solid,
            );
        }
        let requests: Vec<TraceRequest> = (0..300)
            .map(|_| TraceRequest {
                start: [rng.gen_range(-600.0..600.0), rng.gen_range(-600.0..600.0), rng.gen_range(30.0..300.0)],
                mins: PLAYER_MINS,
                maxs: PLAYER_MAXS,
                end: [rng.gen_range(-600.0..600.0), rng.gen_range(-600.0..600.0), rng.gen_range(-100.0..300.0)],
                kind: MoveKind::Normal,
                passedict: None,
            })
            .collect();

        let batch = world.trace_many(&requests);
        assert_eq!(batch.len(), requests.len());
        for (r, b) in requests.iter().zip(&batch) {
            let single = world.trace(&r.start, &r.mins, &r.maxs, &r.end, r.kind, r.passedict);
            assert_eq!(single.fraction, b.fraction);
            assert_eq!(single.endpos, b.endpos);
            assert_eq!(single.ent, b.ent);
        }
    }

    #[test]
    fn starting_inside_an_entity_keeps_the_nearer_wall() {
        let mut world = testmaps::stair_world();
        let start = [0.0, 0.0, 8.0];
        let end = [200.0, 0.0, 8.0];
        let bare = world.trace(&start, &VEC3_ORIGIN, &VEC3_ORIGIN, &end, MoveKind::Normal, None);
        assert!(bare.fraction < 0.5);

        testmaps::spawn_box(&mut world, start, [-16.0; 3], [16.0; 3], Solid::Bbox);
        let tr = world.trace(&start, &VEC3_ORIGIN, &VEC3_ORIGIN, &end, MoveKind::Normal, None);
        assert!(tr.startsolid);
        assert!(!tr.allsolid);
        assert_eq!(tr.ent, EntityId::WORLD);
        assert_eq!(tr.fraction, bare.fraction);
        assert_eq!(tr.endpos, bare.endpos);
        assert_ne!(world.point_contents(&tr.endpos), Contents::Solid);
    }

    #[test]
    fn missile_passes_owner_but_stops_at_stranger() {
        let mut world = testmaps::flat_world();
        let shooter = testmaps::spawn_player(&mut world, [0.0, 0.0, 24.03125]);
        let stranger = testmaps::spawn_box(&mut world, [100.0, 0.0, 40.0], [-16.0; 3], [16.0; 3], Solid::SlideBox);
        let missile = testmaps::spawn_box(&mut world, [0.0, 0.0, 40.0], [0.0; 3], [0.0; 3], Solid::Bbox);
        world[missile].owner = Some(shooter);
        world[missile].movetype = MoveType::FlyMissile;

        let start = [0.0, 0.0, 40.0];
        let end = [300.0, 0.0, 40.0];
        let tr = world.trace(&start, &VEC3_ORIGIN, &VEC3_ORIGIN, &end, MoveKind::Missile, Some(missile));
        assert_eq!(tr.ent, stranger);
        assert!(!tr.startsolid);
        assert!((tr.endpos[0] - (84.0 - 0.03125)).abs() < 1e-3);

        // the same stranger standing in the shooter's spot is still solid
        world[stranger].origin = [0.0, 0.0, 40.0];
        world.link_edict(stranger, None);
        let tr = world.trace(&start, &VEC3_ORIGIN, &VEC3_ORIGIN, &end, MoveKind::Missile, Some(missile));
        assert!(tr.startsolid);
    }

    #[test]
    fn test_entity_position_reports_blocker() {
        let mut world = testmaps::flat_world();
        let a = testmaps::spawn_box(&mut world, [0.0, 0.0, 100.0], [-16.0; 3], [16.0; 3], Solid::Bbox);
        let b = testmaps::spawn_box(&mut world, [10.0, 0.0, 100.0], [-16.0; 3], [16.0; 3], Solid::Bbox);
        assert_eq!(world.test_entity_position(a), Some(b));

        world[b].origin = [200.0, 0.0, 100.0];
        world.link_edict(b, None);
        assert_eq!(world.test_entity_position(a), None);

        // sunk into the floor
        world[a].origin = [0.0, 0.0, 0.0];
        world.link_edict(a, Some(&mut NullGame));
        assert_eq!(world.test_entity_position(a), Some(EntityId::WORLD));
    }
}
