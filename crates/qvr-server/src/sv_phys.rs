// sv_phys.rs -- entity physics

/*
pushmove objects do not obey gravity, and do not interact with each other or trigger fields,
but block normal movement and push normal objects when they move.

onground is set for toss objects when they come to a complete rest. it is set for stepping
or walking objects

doors, plats, etc are SOLID_BSP, and MOVETYPE_PUSH
bonus items are SOLID_TRIGGER touch, and MOVETYPE_TOSS
corpses are SOLID_CORPSE and MOVETYPE_TOSS
crates are SOLID_BBOX and MOVETYPE_TOSS
walking monsters are SOLID_SLIDEBOX and MOVETYPE_STEP
flying/floating monsters are SOLID_SLIDEBOX and MOVETYPE_FLY

solid_edge items only clip against bsp models.
*/

use qvr_common::common::com_dprintf;
use qvr_common::q_shared::*;

use crate::edict::{Edict, MoveType, Solid, FL_FLY, FL_ONGROUND, FL_SWIM, FL_WATERJUMP};
use crate::server::World;
use crate::sv_game::GameCallbacks;
use crate::sv_world::MoveKind;

// ============================================================
// Physics constants
// ============================================================

pub const STOP_EPSILON: f32 = 0.1;

/// Tallest ledge a walker climbs without jumping.
pub const STEPSIZE: f32 = 18.0;

const MAX_BUMPS: usize = 4;

/// Overbounce for MOVETYPE_BOUNCE.
const BOUNCE_BACKOFF: f32 = 1.5;

/// Bouncing objects slower than this come to rest on a floor.
const BOUNCE_REST_SPEED: f32 = 60.0;

/// Rounding allowance when a pusher's local time reaches its think time.
const THINK_SLOP: f32 = 0.001;

/// Floors are surfaces whose normal points at least this far up.
const FLOOR_NORMAL_Z: f32 = 0.7;

/// Nudges tried by try_unstick, in order.
const UNSTICK_DIRS: [[f32; 2]; 8] = [
    [2.0, 0.0],
    [0.0, 2.0],
    [-2.0, 0.0],
    [0.0, -2.0],
    [2.0, 2.0],
    [-2.0, 2.0],
    [2.0, -2.0],
    [-2.0, -2.0],
];

// ============================================================
// ClipVelocity
// ============================================================

/// Slide off of the impacting object.
/// Returns the blocked flags:
/// - 1 = floor
/// - 2 = step / wall
pub fn clip_velocity(in_vel: &Vec3, normal: &Vec3, out: &mut Vec3, overbounce: f32) -> i32 {
    let mut blocked = 0;

    if normal[2] > 0.0 {
        blocked |= 1; // floor
    }
    if normal[2] == 0.0 {
        blocked |= 2; // step
    }

    let backoff = dot_product(in_vel, normal) * overbounce;

    for i in 0..3 {
        let change = normal[i] * backoff;
        out[i] = in_vel[i] - change;
        if out[i] > -STOP_EPSILON && out[i] < STOP_EPSILON {
            out[i] = 0.0;
        }
    }

    blocked
}

/// Trace class an entity moves with.
fn move_kind_for(ent: &Edict) -> MoveKind {
    if ent.movetype == MoveType::FlyMissile {
        MoveKind::Missile
    } else if ent.solid == Solid::Trigger || ent.solid == Solid::Not {
        // only clip against bmodels
        MoveKind::NoMonsters
    } else {
        MoveKind::Normal
    }
}

impl World {
    // ============================================================
    // SV_CheckVelocity
    // ============================================================

    /// Scrub NaNs out of origin and velocity and bound velocity to
    /// sv_maxvelocity.
    pub fn check_velocity(&mut self, e: EntityId) {
        let maxvelocity = self.sv_maxvelocity();
        let ent = &mut self.edicts[e.index()];

        for i in 0..3 {
            if ent.velocity[i].is_nan() {
                com_dprintf(&format!("Got a NaN velocity on entity {}\n", e.0));
                ent.velocity[i] = 0.0;
            }
            if ent.origin[i].is_nan() {
                com_dprintf(&format!("Got a NaN origin on entity {}\n", e.0));
                ent.origin[i] = 0.0;
            }
            ent.velocity[i] = ent.velocity[i].clamp(-maxvelocity, maxvelocity);
        }
    }

    // ============================================================
    // SV_RunThink
    // ============================================================

    /// Runs thinking code if time. There is some play in the exact time the
    /// think function will be called, because it is called before any
    /// movement is done in a frame. Not used for pushmove objects, because
    /// they must be exact. Returns false if the entity was removed.
    pub fn run_think(&mut self, e: EntityId, game: &mut dyn GameCallbacks) -> bool {
        let thinktime = self[e].nextthink;
        if thinktime <= 0.0 || thinktime > self.time + self.frametime {
            return true;
        }

        // don't let things stay in the past.
        // it is possible to start that way by a trigger with a local time.
        let thinktime = thinktime.max(self.time);

        self[e].nextthink = 0.0;
        let saved = self.time;
        self.time = thinktime;
        game.think(self, e);
        self.time = saved;

        self.is_active(e)
    }

    // ============================================================
    // SV_Impact
    // ============================================================

    /// Two entities have touched, so run their touch functions.
    pub fn impact(&mut self, e1: EntityId, e2: EntityId, game: &mut dyn GameCallbacks) {
        if self.is_active(e1) && self[e1].solid != Solid::Not {
            game.touch(self, e1, e2);
        }

        if self.is_active(e1) && self.is_active(e2) && self[e2].solid != Solid::Not {
            game.touch(self, e2, e1);
        }
    }

    // ============================================================
    // SV_FlyMove
    // ============================================================

    /// The basic solid body movement clip that slides along multiple planes.
    /// Returns the clipflags if the velocity was modified (hit something
    /// solid), plus the last wall hit:
    /// - 1 = floor
    /// - 2 = wall / step
    /// - 4 = dead stop
    pub fn fly_move(&mut self, e: EntityId, time: f32, game: &mut dyn GameCallbacks) -> (i32, Option<Trace>) {
        let mut blocked = 0;
        let mut steptrace = None;
        let mut original_velocity = self[e].velocity;
        let primal_velocity = self[e].velocity;
        let mut numplanes = 0;
        let mut planes: [Vec3; MAX_CLIP_PLANES] = [VEC3_ORIGIN; MAX_CLIP_PLANES];
        let mut time_left = time;

        for _bumpcount in 0..MAX_BUMPS {
            if vec3_is_zero(&self[e].velocity) {
                break;
            }

            let ent = &self[e];
            let end = vector_ma(&ent.origin, time_left, &ent.velocity);
            let trace = self.trace(&ent.origin, &ent.mins, &ent.maxs, &end, MoveKind::Normal, Some(e));

            if trace.allsolid {
                // entity is trapped in another solid
                self[e].velocity = VEC3_ORIGIN;
                return (3, steptrace);
            }

            if trace.fraction > 0.0 {
                // actually covered some distance
                self[e].origin = trace.endpos;
                original_velocity = self[e].velocity;
                numplanes = 0;
            }

            if trace.fraction == 1.0 {
                break; // moved the entire distance
            }

            if trace.plane.normal[2] > FLOOR_NORMAL_Z {
                blocked |= 1; // floor
                if self[trace.ent].solid == Solid::Bsp {
                    let ent = &mut self[e];
                    ent.flags.insert(FL_ONGROUND);
                    ent.groundentity = Some(trace.ent);
                }
            }
            if trace.plane.normal[2] == 0.0 {
                blocked |= 2; // step
                steptrace = Some(trace);
            }

            // run the impact function
            self.impact(e, trace.ent, game);
            if !self.is_active(e) {
                break; // removed by the impact function
            }

            time_left -= time_left * trace.fraction;

            // cliped to another plane
            if numplanes >= MAX_CLIP_PLANES {
                // this shouldn't really happen
                self[e].velocity = VEC3_ORIGIN;
                return (3, steptrace);
            }

            planes[numplanes] = trace.plane.normal;
            numplanes += 1;

            // modify original_velocity so it parallels all of the clip planes
            let mut new_velocity = VEC3_ORIGIN;
            let mut i = 0;
            while i < numplanes {
                clip_velocity(&original_velocity, &planes[i], &mut new_velocity, 1.0);
                let mut j = 0;
                while j < numplanes {
                    if j != i && dot_product(&new_velocity, &planes[j]) < 0.0 {
                        break; // not ok
                    }
                    j += 1;
                }
                if j == numplanes {
                    break;
                }
                i += 1;
            }

            if i != numplanes {
                // go along this plane
                self[e].velocity = new_velocity;
            } else {
                // go along the crease
                if numplanes != 2 {
                    self[e].velocity = VEC3_ORIGIN;
                    return (7, steptrace);
                }
                let dir = cross_product(&planes[0], &planes[1]);
                let d = dot_product(&dir, &self[e].velocity);
                self[e].velocity = vector_scale(&dir, d);
            }

            // if original velocity is against the original velocity, stop dead
            // to avoid tiny occilations in sloping corners
            if dot_product(&self[e].velocity, &primal_velocity) <= 0.0 {
                self[e].velocity = VEC3_ORIGIN;
                return (blocked, steptrace);
            }
        }

        (blocked, steptrace)
    }

    // ============================================================
    // SV_AddGravity
    // ============================================================

    pub fn add_gravity(&mut self, e: EntityId) {
        let step = self.sv_gravity() * self.frametime;
        let ent = &mut self[e];
        ent.velocity[2] -= ent.gravity * step;
    }

    // ============================================================
    // PUSHMOVE
    // ============================================================

    /// Does not change the entity's velocity at all.
    pub fn push_entity(&mut self, e: EntityId, push: &Vec3, game: &mut dyn GameCallbacks) -> Trace {
        let ent = &self[e];
        let end = vector_add(&ent.origin, push);
        let trace = self.trace(&ent.origin, &ent.mins, &ent.maxs, &end, move_kind_for(ent), Some(e));

        self[e].origin = trace.endpos;
        self.link_edict(e, Some(&mut *game));

        if trace.hit_something() {
            self.impact(e, trace.ent, game);
        }
        trace
    }

    /// Move a pusher and everything riding on or caught in it. A blocked push
    /// is undone, `ltime` is rolled back and the game is told.
    pub fn push_move(&mut self, pusher: EntityId, movetime: f32, game: &mut dyn GameCallbacks) {
        if vec3_is_zero(&self[pusher].velocity) {
            self[pusher].ltime += movetime;
            return;
        }

        let move_vec = vector_scale(&self[pusher].velocity, movetime);
        let mins = vector_add(&self[pusher].absmin, &move_vec);
        let maxs = vector_add(&self[pusher].absmax, &move_vec);

        let pushorig = self[pusher].origin;

        // move the pusher to it's final position
        self[pusher].origin = vector_add(&pushorig, &move_vec);
        self[pusher].ltime += movetime;
        self.link_edict(pusher, None);

        // see if any solid entities are inside the final position
        let mut moved: Vec<(EntityId, Vec3)> = Vec::new();
        for i in 1..self.num_edicts() {
            let check = EntityId(i);
            if check == pusher || !self.is_active(check) {
                continue;
            }
            let ent = &self[check];
            if matches!(ent.movetype, MoveType::Push | MoveType::None | MoveType::Noclip) {
                continue;
            }

            // if the entity is standing on the pusher, it will definately be moved
            let riding = ent.flags.contains(FL_ONGROUND) && ent.groundentity == Some(pusher);
            if !riding {
                if (0..3).any(|k| ent.absmin[k] >= maxs[k] || ent.absmax[k] <= mins[k]) {
                    continue;
                }

                // see if the ent's bbox is inside the pusher's final position
                if self.test_entity_position(check).is_none() {
                    continue;
                }
            }

            // remove the onground flag for non-players
            if self[check].movetype != MoveType::Walk {
                self[check].flags.remove(FL_ONGROUND);
            }

            let entorig = self[check].origin;
            moved.push((check, entorig));

            // try moving the contacted entity
            let pusher_solid = self[pusher].solid;
            self[pusher].solid = Solid::Not;
            self.push_entity(check, &move_vec, game);
            if self.is_active(pusher) {
                self[pusher].solid = pusher_solid;
            }
            if !self.is_active(check) {
                continue;
            }

            // if it is still inside the pusher, block
            if self.test_entity_position(check).is_none() {
                continue;
            }

            // fail the move
            if self[check].mins[0] == self[check].maxs[0] {
                continue;
            }
            if matches!(
                self[check].solid,
                Solid::Not | Solid::Trigger | Solid::NotSolidButTouchable | Solid::Corpse
            ) {
                // corpse
                let ent = &mut self[check];
                ent.mins[0] = 0.0;
                ent.mins[1] = 0.0;
                ent.maxs = ent.mins;
                ent.size = VEC3_ORIGIN;
                self.link_edict(check, None);
                continue;
            }

            self[check].origin = entorig;
            self.link_edict(check, Some(&mut *game));

            self[pusher].origin = pushorig;
            self.link_edict(pusher, None);
            self[pusher].ltime -= movetime;

            // move back any entities we already moved
            for &(ent, org) in &moved {
                if self.is_active(ent) {
                    self[ent].origin = org;
                    self.link_edict(ent, None);
                }
            }

            // if the pusher has a "blocked" function, call it
            // otherwise, just stay in place until the obstacle is gone
            game.blocked(self, pusher, check);
            return;
        }
    }

    // ============================================================
    // SV_Physics_Pusher
    // ============================================================

    fn physics_pusher(&mut self, e: EntityId, game: &mut dyn GameCallbacks) {
        let oldltime = self[e].ltime;
        let thinktime = self[e].nextthink;

        let movetime = if thinktime < oldltime + self.frametime {
            (thinktime - oldltime).max(0.0)
        } else {
            self.frametime
        };

        if movetime != 0.0 {
            self.push_move(e, movetime, game); // advances ltime if not blocked
        }

        if self.is_active(e) && thinktime > oldltime && thinktime <= self[e].ltime + THINK_SLOP {
            self[e].nextthink = 0.0;
            game.think(self, e);
        }
    }

    // ============================================================
    // CLIENT MOVEMENT
    // ============================================================

    /// A walker is trapped in another solid: try the last good position, then
    /// nudge around the current one.
    pub fn check_stuck(&mut self, e: EntityId) {
        if self.test_entity_position(e).is_none() {
            self[e].oldorigin = self[e].origin;
            return;
        }

        let org = self[e].origin;
        self[e].origin = self[e].oldorigin;
        if self.test_entity_position(e).is_none() {
            com_dprintf("Unstuck.\n");
            self.link_edict(e, None);
            return;
        }

        for z in 0..STEPSIZE as i32 {
            for i in -1..=1 {
                for j in -1..=1 {
                    self[e].origin = [org[0] + i as f32, org[1] + j as f32, org[2] + z as f32];
                    if self.test_entity_position(e).is_none() {
                        com_dprintf("Unstuck.\n");
                        self.link_edict(e, None);
                        return;
                    }
                }
            }
        }

        self[e].origin = org;
        com_dprintf("player is stuck.\n");
    }

    /// Classify how deep a walker is in liquid. Returns true when at least
    /// waist deep.
    pub fn check_water(&mut self, e: EntityId) -> bool {
        let ent = &self[e];
        let mut point = [ent.origin[0], ent.origin[1], ent.origin[2] + ent.mins[2] + 1.0];
        let waist = ent.origin[2] + (ent.mins[2] + ent.maxs[2]) * 0.5;
        let eyes = ent.origin[2] + ent.view_ofs[2];

        let mut waterlevel = 0;
        let mut watertype = Contents::Empty;

        let cont = self.point_contents(&point);
        if cont.is_liquid() {
            watertype = cont;
            waterlevel = 1;
            point[2] = waist;
            if self.point_contents(&point).is_liquid() {
                waterlevel = 2;
                point[2] = eyes;
                if self.point_contents(&point).is_liquid() {
                    waterlevel = 3;
                }
            }
        }

        let ent = &mut self[e];
        ent.waterlevel = waterlevel;
        ent.watertype = Some(watertype);
        waterlevel > 1
    }

    /// Keep the horizontal speed of a jump out of water until it times out
    /// or the walker leaves the water.
    fn water_jump(&mut self, e: EntityId) {
        let time = self.time;
        let ent = &mut self[e];
        if time > ent.teleport_time || ent.waterlevel == 0 {
            ent.flags.remove(FL_WATERJUMP);
            ent.teleport_time = 0.0;
        }
        ent.velocity[0] = ent.movedir[0];
        ent.velocity[1] = ent.movedir[1];
    }

    /// Slow a walker that runs into a wall it is facing.
    pub fn wall_friction(&mut self, e: EntityId, trace: &Trace) {
        let ent = &mut self[e];
        let (forward, _, _) = angle_vectors(&ent.v_angle);
        let d = dot_product(&trace.plane.normal, &forward) + 0.5;
        if d >= 0.0 {
            return;
        }

        // cut the tangential velocity
        let i = dot_product(&trace.plane.normal, &ent.velocity);
        let into = vector_scale(&trace.plane.normal, i);
        let side = vector_subtract(&ent.velocity, &into);

        ent.velocity[0] = side[0] * (1.0 + d);
        ent.velocity[1] = side[1] * (1.0 + d);
    }

    /// Player has come to a dead stop, possibly due to the problem with
    /// limited float precision at some angle joins in the BSP hull.
    ///
    /// Try fixing by pushing one pixel in each direction.
    ///
    /// This is a hack, but in the interest of good gameplay...
    pub fn try_unstick(&mut self, e: EntityId, oldvel: &Vec3, game: &mut dyn GameCallbacks) -> i32 {
        let oldorg = self[e].origin;

        for dir in UNSTICK_DIRS {
            self.push_entity(e, &[dir[0], dir[1], 0.0], game);
            if !self.is_active(e) {
                return 7;
            }

            // retry the original move
            self[e].velocity = [oldvel[0], oldvel[1], 0.0];
            let (clip, _) = self.fly_move(e, self.frametime, game);
            if !self.is_active(e) {
                return clip;
            }

            let origin = self[e].origin;
            if (oldorg[1] - origin[1]).abs() > 4.0 || (oldorg[0] - origin[0]).abs() > 4.0 {
                return clip;
            }

            // go back to the original pos and try again
            self[e].origin = oldorg;
        }

        self[e].velocity = VEC3_ORIGIN;
        7 // still not moving
    }

    // ============================================================
    // SV_WalkMove
    // ============================================================

    /// Only used by players and stepping monsters.
    pub fn walk_move(&mut self, e: EntityId, game: &mut dyn GameCallbacks) {
        // do a regular slide move unless it looks like you ran into a step
        let oldonground = self[e].flags.contains(FL_ONGROUND);
        self[e].flags.remove(FL_ONGROUND);

        let oldorg = self[e].origin;
        let oldvel = self[e].velocity;

        let (clip, _) = self.fly_move(e, self.frametime, game);
        if !self.is_active(e) {
            return;
        }

        if clip & 2 == 0 {
            return; // move didn't block on a step
        }

        if !oldonground && self[e].waterlevel == 0 {
            return; // don't stair up while jumping
        }

        if !matches!(self[e].movetype, MoveType::Walk | MoveType::Step) {
            return; // gibbed by a trigger
        }

        if self.sv_nostep() {
            return;
        }

        if self[e].flags.contains(FL_WATERJUMP) {
            return;
        }

        let nosteporg = self[e].origin;
        let nostepvel = self[e].velocity;

        // try moving up and forward to go up a step
        self[e].origin = oldorg; // back to start pos

        let upmove = [0.0, 0.0, STEPSIZE];
        let downmove = [0.0, 0.0, -STEPSIZE + oldvel[2] * self.frametime];

        // move up
        self.push_entity(e, &upmove, game);
        if !self.is_active(e) {
            return;
        }

        // move forward
        self[e].velocity = [oldvel[0], oldvel[1], 0.0];
        let (mut clip, steptrace) = self.fly_move(e, self.frametime, game);
        if !self.is_active(e) {
            return;
        }

        // check for stuckness, possibly due to the limited precision of floats
        // in the clipping hulls
        if clip != 0 {
            let origin = self[e].origin;
            if (oldorg[1] - origin[1]).abs() < 0.03125 && (oldorg[0] - origin[0]).abs() < 0.03125 {
                // stepping up didn't make any progress
                clip = self.try_unstick(e, &oldvel, game);
                if !self.is_active(e) {
                    return;
                }
            }
        }

        // extra friction based on view angle
        if clip & 2 != 0 {
            if let Some(steptrace) = steptrace {
                self.wall_friction(e, &steptrace);
            }
        }

        // move down
        let downtrace = self.push_entity(e, &downmove, game);
        if !self.is_active(e) {
            return;
        }

        if downtrace.plane.normal[2] > FLOOR_NORMAL_Z {
            if self[downtrace.ent].solid == Solid::Bsp {
                let ent = &mut self[e];
                ent.flags.insert(FL_ONGROUND);
                ent.groundentity = Some(downtrace.ent);
            }
        } else {
            // if the push down didn't end up on good ground, use the move
            // without the step up.  This happens near wall / slope
            // combinations, and can cause the player to hop up higher on a
            // slope too steep to climb
            let ent = &mut self[e];
            ent.origin = nosteporg;
            ent.velocity = nostepvel;
        }
    }

    // ============================================================
    // SV_Physics_Client
    // ============================================================

    /// Walker physics with no command input: water, gravity, unsticking and
    /// the stepping slide move.
    fn physics_walk(&mut self, e: EntityId, game: &mut dyn GameCallbacks) {
        if !self.run_think(e, game) {
            return;
        }

        self.check_velocity(e);

        if self[e].flags.contains(FL_WATERJUMP) {
            self.water_jump(e);
        }

        if !self.check_water(e) && !self[e].flags.contains(FL_WATERJUMP) {
            self.add_gravity(e);
        }
        self.check_stuck(e);
        self.walk_move(e, game);

        if self.is_active(e) {
            self.link_edict(e, Some(game));
        }
    }

    // ============================================================
    // SV_Physics_None / SV_Physics_Noclip
    // ============================================================

    /// Non moving objects can only think.
    fn physics_none(&mut self, e: EntityId, game: &mut dyn GameCallbacks) {
        self.run_think(e, game);
    }

    /// A moving object that doesn't obey physics.
    fn physics_noclip(&mut self, e: EntityId, game: &mut dyn GameCallbacks) {
        if !self.run_think(e, game) {
            return;
        }

        let frametime = self.frametime;
        let ent = &mut self[e];
        ent.angles = vector_ma(&ent.angles, frametime, &ent.avelocity);
        ent.origin = vector_ma(&ent.origin, frametime, &ent.velocity);

        self.link_edict(e, None);
    }

    // ============================================================
    // TOSS / BOUNCE
    // ============================================================

    /// Note when a tossed entity crosses a liquid surface.
    pub fn check_water_transition(&mut self, e: EntityId, game: &mut dyn GameCallbacks) {
        let cont = self.point_contents(&self[e].origin);

        let Some(watertype) = self[e].watertype else {
            // just spawned here
            let ent = &mut self[e];
            ent.watertype = Some(cont);
            ent.waterlevel = 1;
            return;
        };

        if cont.is_liquid() {
            let ent = &mut self[e];
            ent.watertype = Some(cont);
            ent.waterlevel = 1;
            if watertype == Contents::Empty {
                // just crossed into water
                game.water_transition(self, e, true);
            }
        } else {
            let ent = &mut self[e];
            ent.watertype = Some(Contents::Empty);
            ent.waterlevel = 0;
            if watertype != Contents::Empty {
                // just crossed out of water
                game.water_transition(self, e, false);
            }
        }
    }

    /// Toss, bounce, and fly movement. When onground, do nothing.
    fn physics_toss(&mut self, e: EntityId, game: &mut dyn GameCallbacks) {
        // regular thinking
        if !self.run_think(e, game) {
            return;
        }

        // if onground, return without moving
        if self[e].flags.contains(FL_ONGROUND) {
            return;
        }

        self.check_velocity(e);

        // add gravity
        let movetype = self[e].movetype;
        if movetype != MoveType::Fly && movetype != MoveType::FlyMissile {
            self.add_gravity(e);
        }

        // move angles
        let frametime = self.frametime;
        let ent = &mut self[e];
        ent.angles = vector_ma(&ent.angles, frametime, &ent.avelocity);

        // move origin
        let move_vec = vector_scale(&ent.velocity, frametime);
        let trace = self.push_entity(e, &move_vec, game);
        if !self.is_active(e) {
            return;
        }

        if trace.fraction < 1.0 {
            let backoff = if movetype == MoveType::Bounce { BOUNCE_BACKOFF } else { 1.0 };

            let ent = &mut self[e];
            let vel = ent.velocity;
            clip_velocity(&vel, &trace.plane.normal, &mut ent.velocity, backoff);

            // stop if on ground
            if trace.plane.normal[2] > FLOOR_NORMAL_Z
                && (ent.velocity[2] < BOUNCE_REST_SPEED || movetype != MoveType::Bounce)
            {
                ent.flags.insert(FL_ONGROUND);
                ent.groundentity = Some(trace.ent);
                ent.velocity = VEC3_ORIGIN;
                ent.avelocity = VEC3_ORIGIN;
            }
        }

        // check for in water
        self.check_water_transition(e, game);
    }

    // ============================================================
    // STEPPING MOVEMENT
    // ============================================================

    /// Monsters freefall when they don't have a ground entity, otherwise all
    /// movement is done with discrete steps. A grounded stepper that has
    /// horizontal velocity slides with stair climbing.
    fn physics_step(&mut self, e: EntityId, game: &mut dyn GameCallbacks) {
        let flags = self[e].flags;

        if !flags.intersects(FL_ONGROUND | FL_FLY | FL_SWIM) {
            // freefall
            self.add_gravity(e);
            self.check_velocity(e);
            self.fly_move(e, self.frametime, game);
            if !self.is_active(e) {
                return;
            }
            self.link_edict(e, Some(&mut *game));
        } else if flags.contains(FL_ONGROUND) && (self[e].velocity[0] != 0.0 || self[e].velocity[1] != 0.0) {
            // gravity keeps the slide pressed to the floor
            self.add_gravity(e);
            self.check_velocity(e);
            self.walk_move(e, game);
            if !self.is_active(e) {
                return;
            }
            self.link_edict(e, Some(&mut *game));
        }

        // regular thinking
        if !self.run_think(e, game) {
            return;
        }

        self.check_water_transition(e, game);
    }

    // ============================================================
    // SV_Physics
    // ============================================================

    /// Run one entity's physics for this frame.
    pub fn run_entity(&mut self, e: EntityId, game: &mut dyn GameCallbacks) {
        if !self.is_active(e) {
            return;
        }

        match self[e].movetype {
            MoveType::Push => self.physics_pusher(e, game),
            MoveType::None => self.physics_none(e, game),
            MoveType::Noclip => self.physics_noclip(e, game),
            MoveType::Step => self.physics_step(e, game),
            MoveType::Walk => self.physics_walk(e, game),
            MoveType::Toss | MoveType::Bounce | MoveType::Fly | MoveType::FlyMissile => {
                self.physics_toss(e, game)
            }
        }
    }

    /// Advance the world one frame. Entities run in index order, so later
    /// ones see what earlier ones did this frame.
    pub fn run_physics(&mut self, game: &mut dyn GameCallbacks) {
        for i in 0..self.num_edicts() {
            let e = EntityId(i);
            if !self.is_active(e) {
                continue;
            }

            if self.force_retouch > 0 {
                self.link_edict(e, Some(&mut *game)); // force retouch even for stationary
            }

            self.run_entity(e, game);
        }

        if self.force_retouch > 0 {
            self.force_retouch -= 1;
        }

        self.time += self.frametime;
    }
}
