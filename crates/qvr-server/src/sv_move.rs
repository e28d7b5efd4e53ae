// sv_move.rs -- monster movement

use qvr_common::q_shared::*;

use crate::edict::{FL_FLY, FL_ONGROUND, FL_PARTIALGROUND, FL_SWIM};
use crate::server::World;
use crate::sv_game::GameCallbacks;
use crate::sv_phys::STEPSIZE;
use crate::sv_world::MoveKind;

/// How far drop_to_floor looks down.
const DROP_DISTANCE: f32 = 256.0;

/// Fliers chasing an enemy lower than this many units below drift down.
const FLY_DESCEND_DZ: f32 = 40.0;
/// Fliers closer than this above their enemy drift up.
const FLY_ASCEND_DZ: f32 = 30.0;
const FLY_ADJUST: f32 = 8.0;

impl World {
    // ================================================================
    // SV_CheckBottom
    // ================================================================

    /// Returns false if any part of the bottom of the entity is off an edge
    /// that is not a staircase.
    pub fn check_bottom(&self, e: EntityId) -> bool {
        let ent = &self[e];
        let mins = vector_add(&ent.origin, &ent.mins);
        let maxs = vector_add(&ent.origin, &ent.maxs);

        // if all of the points under the corners are solid world, don't bother
        // with the tougher checks
        let mut start = [0.0, 0.0, mins[2] - 1.0];
        let mut all_solid = true;
        'corners: for x in 0..=1 {
            for y in 0..=1 {
                start[0] = if x != 0 { maxs[0] } else { mins[0] };
                start[1] = if y != 0 { maxs[1] } else { mins[1] };
                if self.point_contents(&start) != Contents::Solid {
                    all_solid = false;
                    break 'corners;
                }
            }
        }
        if all_solid {
            return true; // we got out easy
        }

        // check it for real...
        start[2] = mins[2];

        // the midpoint must be within 16 of the bottom
        start[0] = (mins[0] + maxs[0]) * 0.5;
        start[1] = (mins[1] + maxs[1]) * 0.5;
        let mut stop = start;
        stop[2] = start[2] - 2.0 * STEPSIZE;
        let trace = self.trace(&start, &VEC3_ORIGIN, &VEC3_ORIGIN, &stop, MoveKind::NoMonsters, Some(e));

        if trace.fraction == 1.0 {
            return false;
        }
        let mid = trace.endpos[2];
        let mut bottom = mid;

        // the corners must be within 16 of the midpoint
        for x in 0..=1 {
            for y in 0..=1 {
                start[0] = if x != 0 { maxs[0] } else { mins[0] };
                start[1] = if y != 0 { maxs[1] } else { mins[1] };
                stop[0] = start[0];
                stop[1] = start[1];

                let trace =
                    self.trace(&start, &VEC3_ORIGIN, &VEC3_ORIGIN, &stop, MoveKind::NoMonsters, Some(e));

                if trace.fraction != 1.0 && trace.endpos[2] > bottom {
                    bottom = trace.endpos[2];
                }
                if trace.fraction == 1.0 || mid - trace.endpos[2] > STEPSIZE {
                    return false;
                }
            }
        }

        true
    }

    // ================================================================
    // SV_movestep
    // ================================================================

    /// Called by monster program code.
    /// The move will be adjusted for slopes and stairs, but if the move
    /// isn't possible, no move is done and false is returned. With
    /// `relink`, a successful move is linked and touches triggers.
    pub fn movestep(&mut self, e: EntityId, move_vec: &Vec3, relink: Option<&mut dyn GameCallbacks>) -> bool {
        let oldorg = self[e].origin;
        let flags = self[e].flags;

        // flying monsters don't step up
        if flags.intersects(FL_SWIM | FL_FLY) {
            let enemy = self[e]
                .enemy
                .filter(|&en| !en.is_world() && self.is_active(en));

            // try one move with vertical motion, then one without
            for i in 0..2 {
                let ent = &self[e];
                let mut neworg = vector_add(&ent.origin, move_vec);
                if let (0, Some(enemy)) = (i, enemy) {
                    let dz = ent.origin[2] - self[enemy].origin[2];
                    if dz > FLY_DESCEND_DZ {
                        neworg[2] -= FLY_ADJUST;
                    }
                    if dz < FLY_ASCEND_DZ {
                        neworg[2] += FLY_ADJUST;
                    }
                }
                let trace = self.trace(&ent.origin, &ent.mins, &ent.maxs, &neworg, MoveKind::Normal, Some(e));

                if trace.fraction == 1.0 {
                    if flags.contains(FL_SWIM) && self.point_contents(&trace.endpos) == Contents::Empty {
                        return false; // swim monster left water
                    }

                    self[e].origin = trace.endpos;
                    if let Some(game) = relink {
                        self.link_edict(e, Some(game));
                    }
                    return true;
                }

                if enemy.is_none() {
                    break;
                }
            }

            return false;
        }

        // push down from a step height above the wished position
        let mut neworg = vector_add(&oldorg, move_vec);
        neworg[2] += STEPSIZE;
        let mut end = neworg;
        end[2] -= STEPSIZE * 2.0;

        let ent = &self[e];
        let mut trace = self.trace(&neworg, &ent.mins, &ent.maxs, &end, MoveKind::Normal, Some(e));

        if trace.allsolid {
            return false;
        }

        if trace.startsolid {
            neworg[2] -= STEPSIZE;
            trace = self.trace(&neworg, &ent.mins, &ent.maxs, &end, MoveKind::Normal, Some(e));
            if trace.allsolid || trace.startsolid {
                return false;
            }
        }

        if trace.fraction == 1.0 {
            // if monster had the ground pulled out, go ahead and fall
            if flags.contains(FL_PARTIALGROUND) {
                let ent = &mut self[e];
                ent.origin = vector_add(&ent.origin, move_vec);
                ent.flags.remove(FL_ONGROUND);
                if let Some(game) = relink {
                    self.link_edict(e, Some(game));
                }
                return true;
            }

            return false; // walked off an edge
        }

        // check point traces down for dangling corners
        self[e].origin = trace.endpos;

        if !self.check_bottom(e) {
            if flags.contains(FL_PARTIALGROUND) {
                // entity had floor mostly pulled out from underneath it
                // and is trying to correct
                if let Some(game) = relink {
                    self.link_edict(e, Some(game));
                }
                return true;
            }
            self[e].origin = oldorg;
            return false;
        }

        let ent = &mut self[e];
        ent.flags.remove(FL_PARTIALGROUND);
        ent.groundentity = Some(trace.ent);

        // the move is ok
        if let Some(game) = relink {
            self.link_edict(e, Some(game));
        }
        true
    }

    /// Step a grounded, flying or swimming monster `dist` units along `yaw`
    /// (degrees). Returns false if the move could not be made.
    pub fn walk_move_yaw(&mut self, e: EntityId, yaw: f32, dist: f32, game: &mut dyn GameCallbacks) -> bool {
        if !self[e].flags.intersects(FL_ONGROUND | FL_FLY | FL_SWIM) {
            return false;
        }

        let (sin, cos) = yaw.to_radians().sin_cos();
        let move_vec = [cos * dist, sin * dist, 0.0];
        self.movestep(e, &move_vec, Some(game))
    }

    /// Settle an entity onto whatever is below it, within 256 units.
    pub fn drop_to_floor(&mut self, e: EntityId) -> bool {
        let ent = &self[e];
        let mut end = ent.origin;
        end[2] -= DROP_DISTANCE;

        let trace = self.trace(&ent.origin, &ent.mins, &ent.maxs, &end, MoveKind::Normal, Some(e));

        if trace.fraction == 1.0 || trace.allsolid {
            return false;
        }

        let ent = &mut self[e];
        ent.origin = trace.endpos;
        ent.flags.insert(FL_ONGROUND);
        ent.groundentity = Some(trace.ent);
        self.link_edict(e, None);
        true
    }
}
