// cmodel.rs -- clipping hulls and the hull sweep
//
// A hull is a tree of clip nodes whose leaves are content classes. Every
// hull is pre-expanded for one mover size, so sweeping a box through the
// world reduces to sweeping a point through the matching hull.

use crate::common::com_warning;
use crate::q_shared::*;

use rayon::prelude::*;
use std::sync::Arc;
use thiserror::Error;

/// 1/32 epsilon to keep floating point happy.
pub const DIST_EPSILON: f64 = 0.03125;

/// Upper bound on 0.1 back-off steps when an impact point lands in solid.
pub const MAX_BACKOFF_STEPS: usize = 16;

/// Mover sizes the map hulls are expanded for: point, player, large.
pub const HULL_CLIP_SIZES: [(Vec3, Vec3); MAX_MAP_HULLS] = [
    ([0.0, 0.0, 0.0], [0.0, 0.0, 0.0]),
    ([-16.0, -16.0, -24.0], [16.0, 16.0, 32.0]),
    ([-32.0, -32.0, -24.0], [32.0, 32.0, 64.0]),
];

const PARALLEL_VALIDATE_THRESHOLD: usize = 4096;

// ============================================================
// Clip nodes
// ============================================================

/// Child of a clip node: another node or a leaf carrying contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipChild {
    Node(usize),
    Leaf(Contents),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipNode {
    /// Index into the hull's plane array.
    pub plane: usize,
    /// Front (distance >= 0) and back children.
    pub children: [ClipChild; 2],
}

/// Clip node as stored on disk: a plane number and two children, where
/// negative children are contents codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawClipNode {
    pub planenum: i32,
    pub children: [i32; 2],
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HullError {
    #[error("hull has no clip nodes but its head node is {0}")]
    Empty(i32),
    #[error("bad head node {0}")]
    BadHeadNode(i32),
    #[error("clip node {node}: bad plane number {plane}")]
    BadPlane { node: usize, plane: i32 },
    #[error("clip node {node}: child {child} out of range")]
    BadChild { node: usize, child: i32 },
    #[error("clip node {node}: child {child} does not come after its parent")]
    BackwardChild { node: usize, child: i32 },
    #[error("clip node {node}: bad contents code {code}")]
    BadContents { node: usize, code: i32 },
}

fn convert_child(node: usize, raw: i32, numnodes: usize) -> Result<ClipChild, HullError> {
    if raw < 0 {
        return Contents::from_raw(raw)
            .map(ClipChild::Leaf)
            .ok_or(HullError::BadContents { node, code: raw });
    }
    let child = raw as usize;
    if child >= numnodes {
        return Err(HullError::BadChild { node, child: raw });
    }
    if child <= node {
        return Err(HullError::BackwardChild { node, child: raw });
    }
    Ok(ClipChild::Node(child))
}

fn convert_node(
    index: usize,
    raw: &RawClipNode,
    numnodes: usize,
    numplanes: usize,
) -> Result<ClipNode, HullError> {
    if raw.planenum < 0 || raw.planenum as usize >= numplanes {
        return Err(HullError::BadPlane { node: index, plane: raw.planenum });
    }
    Ok(ClipNode {
        plane: raw.planenum as usize,
        children: [
            convert_child(index, raw.children[0], numnodes)?,
            convert_child(index, raw.children[1], numnodes)?,
        ],
    })
}

// ============================================================
// Hull
// ============================================================

/// A shared, read-only clipping hull.
#[derive(Debug, Clone)]
pub struct Hull {
    clipnodes: Arc<[ClipNode]>,
    planes: Arc<[Plane]>,
    root: ClipChild,
    clip_mins: Vec3,
    clip_maxs: Vec3,
}

impl Hull {
    /// A hull with no geometry: everything is empty.
    pub fn empty(clip_mins: Vec3, clip_maxs: Vec3) -> Self {
        Self {
            clipnodes: Arc::from(Vec::new()),
            planes: Arc::from(Vec::new()),
            root: ClipChild::Leaf(Contents::Empty),
            clip_mins,
            clip_maxs,
        }
    }

    /// Build a hull from loader output.
    ///
    /// Plane numbers, child node indices and contents codes are checked, and
    /// every node child must have a larger index than its parent so walks
    /// always terminate. Large node arrays are validated in parallel.
    pub fn from_raw(
        raw: &[RawClipNode],
        planes: Vec<Plane>,
        headnode: i32,
        clip_mins: Vec3,
        clip_maxs: Vec3,
    ) -> Result<Self, HullError> {
        let root = if headnode < 0 {
            Contents::from_raw(headnode)
                .map(ClipChild::Leaf)
                .ok_or(HullError::BadHeadNode(headnode))?
        } else if raw.is_empty() {
            return Err(HullError::Empty(headnode));
        } else if headnode as usize >= raw.len() {
            return Err(HullError::BadHeadNode(headnode));
        } else {
            ClipChild::Node(headnode as usize)
        };

        let numnodes = raw.len();
        let numplanes = planes.len();
        let clipnodes: Vec<ClipNode> = if numnodes >= PARALLEL_VALIDATE_THRESHOLD {
            raw.par_iter()
                .enumerate()
                .map(|(i, r)| convert_node(i, r, numnodes, numplanes))
                .collect::<Result<_, _>>()?
        } else {
            raw.iter()
                .enumerate()
                .map(|(i, r)| convert_node(i, r, numnodes, numplanes))
                .collect::<Result<_, _>>()?
        };

        Ok(Self {
            clipnodes: Arc::from(clipnodes),
            planes: Arc::from(planes),
            root,
            clip_mins,
            clip_maxs,
        })
    }

    /// Solid convex region: behind every plane (normals face outward).
    pub fn convex(planes: &[Plane], clip_mins: Vec3, clip_maxs: Vec3) -> Self {
        let boxes = [planes];
        Self::from_convex_set(&boxes, clip_mins, clip_maxs)
    }

    /// Union of axis-aligned solid boxes, given in hull space (already
    /// expanded for the mover size).
    pub fn from_boxes(boxes: &[(Vec3, Vec3)], clip_mins: Vec3, clip_maxs: Vec3) -> Self {
        let planesets: Vec<Vec<Plane>> = boxes
            .iter()
            .map(|(mins, maxs)| {
                (0..6)
                    .map(|i| {
                        let axis = i >> 1;
                        if i & 1 == 0 {
                            Plane::axial(axis, maxs[axis])
                        } else {
                            // outward normal points down the axis
                            Plane::axial(axis, mins[axis]).flipped()
                        }
                    })
                    .collect()
            })
            .collect();
        let sets: Vec<&[Plane]> = planesets.iter().map(|s| s.as_slice()).collect();
        Self::from_convex_set(&sets, clip_mins, clip_maxs)
    }

    /// Chain one run of nodes per convex piece. Leaving a piece through any
    /// plane falls through to the next piece; getting behind every plane of
    /// a piece is solid.
    fn from_convex_set(pieces: &[&[Plane]], clip_mins: Vec3, clip_maxs: Vec3) -> Self {
        let total: usize = pieces.iter().map(|p| p.len()).sum();
        if total == 0 {
            return Self::empty(clip_mins, clip_maxs);
        }

        let mut planes = Vec::with_capacity(total);
        let mut clipnodes = Vec::with_capacity(total);
        let mut first = 0;
        for (k, piece) in pieces.iter().enumerate() {
            let next_piece = first + piece.len();
            let outside = if pieces[k + 1..].iter().all(|p| p.is_empty()) {
                ClipChild::Leaf(Contents::Empty)
            } else {
                ClipChild::Node(next_piece)
            };
            for (j, plane) in piece.iter().enumerate() {
                let inside = if j + 1 == piece.len() {
                    ClipChild::Leaf(Contents::Solid)
                } else {
                    ClipChild::Node(first + j + 1)
                };
                planes.push(*plane);
                clipnodes.push(ClipNode {
                    plane: first + j,
                    children: [outside, inside],
                });
            }
            first = next_piece;
        }

        Self {
            clipnodes: Arc::from(clipnodes),
            planes: Arc::from(planes),
            root: ClipChild::Node(0),
            clip_mins,
            clip_maxs,
        }
    }

    pub fn view(&self) -> HullView<'_> {
        HullView {
            clipnodes: &self.clipnodes,
            planes: &self.planes,
            root: self.root,
        }
    }

    pub fn root(&self) -> ClipChild {
        self.root
    }

    pub fn clip_mins(&self) -> Vec3 {
        self.clip_mins
    }

    pub fn clip_maxs(&self) -> Vec3 {
        self.clip_maxs
    }

    pub fn num_clipnodes(&self) -> usize {
        self.clipnodes.len()
    }
}

// ============================================================
// Box hull
// ============================================================

const fn box_clipnode(i: usize) -> ClipNode {
    let other = if i == 5 {
        ClipChild::Leaf(Contents::Solid)
    } else {
        ClipChild::Node(i + 1)
    };
    let children = if i & 1 == 0 {
        [ClipChild::Leaf(Contents::Empty), other]
    } else {
        [other, ClipChild::Leaf(Contents::Empty)]
    };
    ClipNode { plane: i, children }
}

const BOX_CLIPNODES: [ClipNode; 6] = [
    box_clipnode(0),
    box_clipnode(1),
    box_clipnode(2),
    box_clipnode(3),
    box_clipnode(4),
    box_clipnode(5),
];

/// Six-plane hull used to clip against bounding-box entities. Cheap to
/// build per trace; lives on the stack.
#[derive(Debug, Clone, Copy)]
pub struct BoxHull {
    planes: [Plane; 6],
}

impl BoxHull {
    pub fn new(mins: &Vec3, maxs: &Vec3) -> Self {
        let mut planes = [Plane::default(); 6];
        for (i, plane) in planes.iter_mut().enumerate() {
            let axis = i >> 1;
            let dist = if i & 1 == 0 { maxs[axis] } else { mins[axis] };
            *plane = Plane::axial(axis, dist);
        }
        Self { planes }
    }

    pub fn view(&self) -> HullView<'_> {
        HullView {
            clipnodes: &BOX_CLIPNODES,
            planes: &self.planes,
            root: ClipChild::Node(0),
        }
    }
}

// ============================================================
// Brush models
// ============================================================

/// Collision model: one hull per mover size plus the model bounds.
#[derive(Debug, Clone)]
pub struct BrushModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub hulls: [Hull; MAX_MAP_HULLS],
}

impl BrushModel {
    pub fn new(mins: Vec3, maxs: Vec3, hulls: [Hull; MAX_MAP_HULLS]) -> Self {
        Self { mins, maxs, hulls }
    }

    /// Single solid box.
    pub fn from_box(mins: Vec3, maxs: Vec3) -> Self {
        Self::from_boxes(&[(mins, maxs)])
    }

    /// Union of solid boxes, with each map hull expanded for its mover size.
    pub fn from_boxes(boxes: &[(Vec3, Vec3)]) -> Self {
        let mut mins = [f32::MAX; 3];
        let mut maxs = [f32::MIN; 3];
        for (bmins, bmaxs) in boxes {
            for k in 0..3 {
                mins[k] = mins[k].min(bmins[k]);
                maxs[k] = maxs[k].max(bmaxs[k]);
            }
        }
        if boxes.is_empty() {
            mins = VEC3_ORIGIN;
            maxs = VEC3_ORIGIN;
        }

        let hulls = HULL_CLIP_SIZES.map(|(clip_mins, clip_maxs)| {
            let expanded: Vec<(Vec3, Vec3)> = boxes
                .iter()
                .map(|(bmins, bmaxs)| {
                    (vector_subtract(bmins, &clip_maxs), vector_subtract(bmaxs, &clip_mins))
                })
                .collect();
            Hull::from_boxes(&expanded, clip_mins, clip_maxs)
        });
        Self { mins, maxs, hulls }
    }

    /// Pick the hull for a mover of the given size.
    pub fn hull_for_size(&self, size: &Vec3) -> &Hull {
        if size[0] < 3.0 {
            &self.hulls[0]
        } else if size[0] <= 32.0 {
            &self.hulls[1]
        } else {
            &self.hulls[2]
        }
    }
}

// ============================================================
// Hull queries
// ============================================================

/// Borrowed view of a hull's node and plane arrays.
#[derive(Debug, Clone, Copy)]
pub struct HullView<'a> {
    clipnodes: &'a [ClipNode],
    planes: &'a [Plane],
    root: ClipChild,
}

#[inline]
fn lerp_point(p1: &Vec3, p2: &Vec3, frac: f64) -> Vec3 {
    [
        (p1[0] as f64 + frac * (p2[0] as f64 - p1[0] as f64)) as f32,
        (p1[1] as f64 + frac * (p2[1] as f64 - p1[1] as f64)) as f32,
        (p1[2] as f64 + frac * (p2[2] as f64 - p1[2] as f64)) as f32,
    ]
}

impl HullView<'_> {
    /// Contents of the leaf holding `p`.
    pub fn point_contents(&self, p: &Vec3) -> Contents {
        self.contents_from(self.root, p)
    }

    fn contents_from(&self, mut num: ClipChild, p: &Vec3) -> Contents {
        loop {
            match num {
                ClipChild::Leaf(contents) => return contents,
                ClipChild::Node(i) => {
                    let node = &self.clipnodes[i];
                    let d = self.planes[node.plane].distance_to(p);
                    num = if d < 0.0 { node.children[1] } else { node.children[0] };
                }
            }
        }
    }

    /// Sweep a point from `start` to `end` through the hull.
    ///
    /// The result never has `ent` set; callers fill that in. A sweep that
    /// never leaves solid reports fraction 0 at `start`.
    pub fn trace(&self, start: &Vec3, end: &Vec3) -> Trace {
        if !vec3_is_finite(start) || !vec3_is_finite(end) {
            com_warning("hull trace with non-finite endpoint\n");
            return Trace::stuck(start);
        }

        let mut trace = Trace::begin(end);

        if vector_compare(start, end) {
            match self.point_contents(start) {
                Contents::Solid => {
                    trace.startsolid = true;
                    trace.fraction = 0.0;
                    trace.endpos = *start;
                }
                Contents::Empty => {
                    trace.allsolid = false;
                    trace.inopen = true;
                }
                _ => {
                    trace.allsolid = false;
                    trace.inwater = true;
                }
            }
            return trace;
        }

        self.recursive_hull_check(self.root, 0.0, 1.0, start, end, &mut trace);

        if trace.allsolid {
            trace.fraction = 0.0;
            trace.endpos = *start;
        }
        trace
    }

    /// Sweep the segment `p1..p2` (covering fractions `p1f..p2f` of the whole
    /// move) below `num`. Returns false once the impact has been recorded.
    ///
    /// Segments entirely on one side of a plane descend in a loop; only
    /// crossings recurse.
    pub fn recursive_hull_check(
        &self,
        mut num: ClipChild,
        p1f: f32,
        p2f: f32,
        p1: &Vec3,
        p2: &Vec3,
        trace: &mut Trace,
    ) -> bool {
        let node = loop {
            let i = match num {
                ClipChild::Leaf(contents) => {
                    if contents == Contents::Solid {
                        trace.startsolid = true;
                    } else {
                        trace.allsolid = false;
                        if contents == Contents::Empty {
                            trace.inopen = true;
                        } else {
                            trace.inwater = true;
                        }
                    }
                    return true; // empty
                }
                ClipChild::Node(i) => i,
            };

            let node = &self.clipnodes[i];
            let plane = &self.planes[node.plane];
            let t1 = plane.distance_to(p1);
            let t2 = plane.distance_to(p2);

            if t1 >= 0.0 && t2 >= 0.0 {
                num = node.children[0];
            } else if t1 < 0.0 && t2 < 0.0 {
                num = node.children[1];
            } else {
                break (node, plane, t1, t2);
            }
        };
        let (node, plane, t1, t2) = node;

        // put the crosspoint DIST_EPSILON pixels on the near side
        let mut frac = if t1 < 0.0 {
            (t1 + DIST_EPSILON) / (t1 - t2)
        } else {
            (t1 - DIST_EPSILON) / (t1 - t2)
        };
        frac = frac.clamp(0.0, 1.0);

        let span = (p2f - p1f) as f64;
        let mut midf = p1f as f64 + span * frac;
        let mut mid = lerp_point(p1, p2, frac);
        let side = usize::from(t1 < 0.0);

        // move up to the node
        if !self.recursive_hull_check(node.children[side], p1f, midf as f32, p1, &mid, trace) {
            return false;
        }

        if self.contents_from(node.children[side ^ 1], &mid) != Contents::Solid {
            // go past the node
            return self.recursive_hull_check(node.children[side ^ 1], midf as f32, p2f, &mid, p2, trace);
        }

        if trace.allsolid {
            return false; // never got out of the solid area
        }

        // the other side of the node is solid, this is the impact point
        trace.plane = if side == 0 { *plane } else { plane.flipped() };

        let (midf, mid) = self.back_off(p1, p2, p1f, span, frac);
        trace.fraction = midf as f32;
        trace.endpos = mid;
        false
    }

    /// Step back from `frac` toward `p1` until the point leaves solid. Gives
    /// up with a warning once past the start or after `MAX_BACKOFF_STEPS`,
    /// keeping the last point tried.
    fn back_off(&self, p1: &Vec3, p2: &Vec3, p1f: f32, span: f64, mut frac: f64) -> (f64, Vec3) {
        let mut midf = p1f as f64 + span * frac;
        let mut mid = lerp_point(p1, p2, frac);
        let mut steps = 0;
        while self.point_contents(&mid) == Contents::Solid {
            frac -= 0.1;
            steps += 1;
            if frac < 0.0 || steps > MAX_BACKOFF_STEPS {
                com_warning("backup past 0\n");
                break;
            }
            midf = p1f as f64 + span * frac;
            mid = lerp_point(p1, p2, frac);
        }
        (midf, mid)
    }
}
