// q_shared.rs -- types and math shared by the collision core and its callers

pub type Vec3 = [f32; 3];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

pub const PITCH: usize = 0; // up / down
pub const YAW: usize = 1; // left / right
pub const ROLL: usize = 2; // fall over

/// Most planes a single slide move will clip against before giving up.
pub const MAX_CLIP_PLANES: usize = 5;

/// Clipping hulls per brush model: point, player sized, large monster sized.
pub const MAX_MAP_HULLS: usize = 3;

// ============================================================
// Entity handle
// ============================================================

/// Index of an entity in the world's entity arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EntityId(pub usize);

impl EntityId {
    /// Entity 0 is always the world model.
    pub const WORLD: EntityId = EntityId(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }

    #[inline]
    pub fn is_world(self) -> bool {
        self.0 == 0
    }
}

// ============================================================
// Leaf contents
// ============================================================

/// Classification of a hull leaf.
///
/// Raw map data encodes these as negative numbers (`-1` empty, `-2` solid,
/// ...); [`Contents::from_raw`] and [`Contents::to_raw`] convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Contents {
    Empty,
    Solid,
    Water,
    Slime,
    Lava,
    Sky,
    Current0,
    Current90,
    Current180,
    Current270,
    CurrentUp,
    CurrentDown,
}

impl Contents {
    pub fn from_raw(raw: i32) -> Option<Contents> {
        let c = match raw {
            -1 => Contents::Empty,
            -2 => Contents::Solid,
            -3 => Contents::Water,
            -4 => Contents::Slime,
            -5 => Contents::Lava,
            -6 => Contents::Sky,
            -9 => Contents::Current0,
            -10 => Contents::Current90,
            -11 => Contents::Current180,
            -12 => Contents::Current270,
            -13 => Contents::CurrentUp,
            -14 => Contents::CurrentDown,
            _ => return None,
        };
        Some(c)
    }

    pub fn to_raw(self) -> i32 {
        match self {
            Contents::Empty => -1,
            Contents::Solid => -2,
            Contents::Water => -3,
            Contents::Slime => -4,
            Contents::Lava => -5,
            Contents::Sky => -6,
            Contents::Current0 => -9,
            Contents::Current90 => -10,
            Contents::Current180 => -11,
            Contents::Current270 => -12,
            Contents::CurrentUp => -13,
            Contents::CurrentDown => -14,
        }
    }

    #[inline]
    pub fn is_current(self) -> bool {
        matches!(
            self,
            Contents::Current0
                | Contents::Current90
                | Contents::Current180
                | Contents::Current270
                | Contents::CurrentUp
                | Contents::CurrentDown
        )
    }

    /// Water, slime, lava and currents.
    #[inline]
    pub fn is_liquid(self) -> bool {
        matches!(self, Contents::Water | Contents::Slime | Contents::Lava) || self.is_current()
    }
}

// ============================================================
// Plane
// ============================================================

pub const PLANE_X: u8 = 0;
pub const PLANE_Y: u8 = 1;
pub const PLANE_Z: u8 = 2;
pub const PLANE_ANYX: u8 = 3;
pub const PLANE_ANYY: u8 = 4;
pub const PLANE_ANYZ: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
    /// `PLANE_X..PLANE_Z` for axial planes (fast path), otherwise the
    /// dominant axis plus 3.
    pub plane_type: u8,
}

impl Default for Plane {
    fn default() -> Self {
        Self {
            normal: VEC3_ORIGIN,
            dist: 0.0,
            plane_type: PLANE_ANYZ,
        }
    }
}

impl Plane {
    pub fn new(normal: Vec3, dist: f32) -> Self {
        Self {
            normal,
            dist,
            plane_type: plane_type_for_normal(&normal),
        }
    }

    /// Positive-facing plane along one axis.
    pub fn axial(axis: usize, dist: f32) -> Self {
        let mut normal = [0.0; 3];
        normal[axis] = 1.0;
        Self {
            normal,
            dist,
            plane_type: axis as u8,
        }
    }

    /// Signed distance of `p`, in double precision.
    #[inline]
    pub fn distance_to(&self, p: &Vec3) -> f64 {
        if self.plane_type < 3 {
            p[self.plane_type as usize] as f64 - self.dist as f64
        } else {
            dot_product_f64(&self.normal, p) - self.dist as f64
        }
    }

    /// Same plane facing the other way. Axial fast-path types only hold
    /// for positive normals, so the type is recomputed.
    pub fn flipped(&self) -> Self {
        Plane::new(vector_negate(&self.normal), -self.dist)
    }
}

pub fn plane_type_for_normal(normal: &Vec3) -> u8 {
    if normal[0] == 1.0 {
        return PLANE_X;
    }
    if normal[1] == 1.0 {
        return PLANE_Y;
    }
    if normal[2] == 1.0 {
        return PLANE_Z;
    }

    let ax = normal[0].abs();
    let ay = normal[1].abs();
    let az = normal[2].abs();
    if ax >= ay && ax >= az {
        PLANE_ANYX
    } else if ay >= ax && ay >= az {
        PLANE_ANYY
    } else {
        PLANE_ANYZ
    }
}

// ============================================================
// Trace
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trace {
    /// The entire path was in solid.
    pub allsolid: bool,
    /// The initial point was in solid.
    pub startsolid: bool,
    pub inopen: bool,
    pub inwater: bool,
    /// Completed part of the move; 1.0 means nothing was hit.
    pub fraction: f32,
    pub endpos: Vec3,
    /// Surface normal at impact.
    pub plane: Plane,
    /// Entity the surface belongs to; the world when nothing was hit.
    pub ent: EntityId,
}

impl Default for Trace {
    fn default() -> Self {
        Self {
            allsolid: false,
            startsolid: false,
            inopen: false,
            inwater: false,
            fraction: 1.0,
            endpos: VEC3_ORIGIN,
            plane: Plane::default(),
            ent: EntityId::WORLD,
        }
    }
}

impl Trace {
    /// Fresh sweep state: assumed all solid until an open leaf is seen.
    pub fn begin(end: &Vec3) -> Self {
        Self {
            allsolid: true,
            endpos: *end,
            ..Self::default()
        }
    }

    /// Result for a move that must not happen at all.
    pub fn stuck(start: &Vec3) -> Self {
        Self {
            allsolid: true,
            startsolid: true,
            fraction: 0.0,
            endpos: if vec3_is_finite(start) { *start } else { VEC3_ORIGIN },
            ..Self::default()
        }
    }

    /// True when the move was cut short or began inside something.
    #[inline]
    pub fn hit_something(&self) -> bool {
        self.fraction < 1.0 || self.startsolid
    }
}

// ============================================================
// MATHLIB -- Vector operations
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn dot_product_f64(a: &Vec3, b: &Vec3) -> f64 {
    a[0] as f64 * b[0] as f64 + a[1] as f64 * b[1] as f64 + a[2] as f64 * b[2] as f64
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn vector_negate(v: &Vec3) -> Vec3 {
    [-v[0], -v[1], -v[2]]
}

/// veca + scale * vecb
#[inline]
pub fn vector_ma(veca: &Vec3, scale: f32, vecb: &Vec3) -> Vec3 {
    [
        veca[0] + scale * vecb[0],
        veca[1] + scale * vecb[1],
        veca[2] + scale * vecb[2],
    ]
}

#[inline]
pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

pub fn vector_compare(v1: &Vec3, v2: &Vec3) -> bool {
    v1[0] == v2[0] && v1[1] == v2[1] && v1[2] == v2[2]
}

pub fn vector_length(v: &Vec3) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Normalize in place, returns original length.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = vector_length(v);
    if length != 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

pub fn cross_product(v1: &Vec3, v2: &Vec3) -> Vec3 {
    [
        v1[1] * v2[2] - v1[2] * v2[1],
        v1[2] * v2[0] - v1[0] * v2[2],
        v1[0] * v2[1] - v1[1] * v2[0],
    ]
}

#[inline]
pub fn vec3_is_finite(v: &Vec3) -> bool {
    v[0].is_finite() && v[1].is_finite() && v[2].is_finite()
}

#[inline]
pub fn vec3_is_zero(v: &Vec3) -> bool {
    v[0] == 0.0 && v[1] == 0.0 && v[2] == 0.0
}

/// True when the two boxes share any volume or touch.
#[inline]
pub fn boxes_overlap(amins: &Vec3, amaxs: &Vec3, bmins: &Vec3, bmaxs: &Vec3) -> bool {
    !(amins[0] > bmaxs[0]
        || amins[1] > bmaxs[1]
        || amins[2] > bmaxs[2]
        || amaxs[0] < bmins[0]
        || amaxs[1] < bmins[1]
        || amaxs[2] < bmins[2])
}

// ============================================================
// Angle functions
// ============================================================

/// Returns (forward, right, up) for the given pitch/yaw/roll in degrees.
pub fn angle_vectors(angles: &Vec3) -> (Vec3, Vec3, Vec3) {
    let (sy, cy) = angles[YAW].to_radians().sin_cos();
    let (sp, cp) = angles[PITCH].to_radians().sin_cos();
    let (sr, cr) = angles[ROLL].to_radians().sin_cos();

    let forward = [cp * cy, cp * sy, -sp];
    let right = [
        -sr * sp * cy + -cr * -sy,
        -sr * sp * sy + -cr * cy,
        -sr * cp,
    ];
    let up = [cr * sp * cy + -sr * -sy, cr * sp * sy + -sr * cy, cr * cp];
    (forward, right, up)
}
