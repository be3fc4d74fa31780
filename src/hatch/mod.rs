//! Parallel-line hatching.
//!
//! A hatch fills the interior of an offset polygon set with evenly spaced
//! parallel mark segments, linked by jumps across holes and between lines.
//! Hatch lines are indexed by their intercept along whichever axis is closer
//! to perpendicular to the hatch direction, so the sweep never runs parallel
//! to its own indexing axis. Successive hatch lines alternate traversal
//! direction; without that, every line would jump back to the same side and
//! roughly double the jump travel.

pub mod optimized;

use crate::clipper::offset_region_edges;
use crate::config::RegionProfile;
use crate::geometry::{
    eliminate_duplicate_vertices, sort_x_then_y, sort_y_then_x, BoundingBox, Edge, Vertex,
};
use crate::layer::Layer;
use crate::scanpath::{Path, PathKind, Segment};
use crate::{CoordF, INTERSECT_RANGE_MM, MIN_DETERMINANT};

/// Axis along which hatch lines are indexed (spaced), chosen from the hatch
/// angle so that the hatch direction is never parallel to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAxis {
    /// Hatch lines are indexed by x intercept (hatch angle within 45 deg of
    /// the y axis).
    AlongX,
    /// Hatch lines are indexed by y intercept (hatch angle within 45 deg of
    /// the x axis).
    AlongY,
}

/// Classify a hatch angle's indexing axis.
///
/// Angles in [315, 45) and [135, 225) run close to the x axis and are
/// indexed along y; the rest are indexed along x.
pub fn sweep_axis(angle_deg: CoordF) -> SweepAxis {
    if ((angle_deg.floor() as i64 + 315) % 180) > 90 {
        SweepAxis::AlongY
    } else {
        SweepAxis::AlongX
    }
}

/// Precomputed per-sweep values shared by every hatch line.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SweepGeometry {
    pub angle_deg: CoordF,
    pub axis: SweepAxis,
    /// Hatch-to-hatch spacing measured along the indexing axis. Signed:
    /// follows the sign of the trigonometric projection, so sweeps can run
    /// in either direction.
    pub spacing: CoordF,
    /// Slope of a hatch line with respect to the indexing axis: tan(angle)
    /// when indexed along y, cos/sin when indexed along x (1/tan fails at
    /// 90 degrees, whereas cos/sin returns 0 there).
    pub slope: CoordF,
}

impl SweepGeometry {
    pub fn new(angle_deg: CoordF, spacing_mm: CoordF) -> Self {
        let rad = angle_deg.to_radians();
        let axis = sweep_axis(angle_deg);
        let (spacing, slope) = match axis {
            SweepAxis::AlongY => (spacing_mm / rad.cos(), rad.tan()),
            SweepAxis::AlongX => (spacing_mm / rad.sin(), rad.cos() / rad.sin()),
        };
        Self {
            angle_deg,
            axis,
            spacing,
            slope,
        }
    }
}

/// Compute the minimum and maximum intercepts of hatch lines drawn through
/// every vertex in `vertices`, along the indexing axis for `angle_deg`.
/// This bounds the number of hatch lines a sweep must generate. Returns
/// `None` for an empty vertex list.
pub fn find_hatch_boundary(vertices: &[Vertex], angle_deg: CoordF) -> Option<(CoordF, CoordF)> {
    if vertices.is_empty() {
        return None;
    }
    let rad = angle_deg.to_radians();
    let intercepts: Vec<CoordF> = match sweep_axis(angle_deg) {
        SweepAxis::AlongY => {
            let slope = rad.tan();
            vertices.iter().map(|v| v.y - v.x * slope).collect()
        }
        SweepAxis::AlongX => {
            let slope = rad.cos() / rad.sin();
            vertices.iter().map(|v| v.x - v.y * slope).collect()
        }
    };
    let mut min = intercepts[0];
    let mut max = intercepts[0];
    for a in intercepts {
        if a < min {
            min = a;
        }
        if a > max {
            max = a;
        }
    }
    Some((min, max))
}

/// Endpoints of the hatch line at `intercept`, spanning the layer bounding
/// box. The traversal direction depends on the angle quadrant, so that the
/// generated marks advance the way the hatch angle points.
fn hatch_line_span(geom: &SweepGeometry, bb: &BoundingBox, intercept: CoordF) -> (Vertex, Vertex) {
    match geom.axis {
        SweepAxis::AlongY => {
            // Angles above 90 deg (135..225) run in the negative x direction.
            let (x0, x1) = if geom.angle_deg > 90.0 {
                (bb.max_x, bb.min_x)
            } else {
                (bb.min_x, bb.max_x)
            };
            (
                Vertex::new(x0, intercept + x0 * geom.slope),
                Vertex::new(x1, intercept + x1 * geom.slope),
            )
        }
        SweepAxis::AlongX => {
            // Angles above 180 deg (225..315) run in the negative y direction.
            let (y0, y1) = if geom.angle_deg > 180.0 {
                (bb.min_y, bb.max_y)
            } else {
                (bb.max_y, bb.min_y)
            };
            (
                Vertex::new(intercept + y0 * geom.slope, y0),
                Vertex::new(intercept + y1 * geom.slope, y1),
            )
        }
    }
}

/// Intersect the hatch line at `intercept` with one edge.
///
/// The determinant between the two segments is normalized by the edge
/// length and compared against [`MIN_DETERMINANT`]; below that the pair is
/// declared parallel. An intersection is accepted only when the computed
/// point lies on both segments inflated by [`INTERSECT_RANGE_MM`].
pub(crate) fn find_intersection(
    geom: &SweepGeometry,
    bb: &BoundingBox,
    intercept: CoordF,
    edge: &Edge,
) -> Option<Vertex> {
    let (hatch_start, hatch_finish) = hatch_line_span(geom, bb, intercept);

    let edge_len = edge.length();
    if edge_len == 0.0 {
        return None;
    }

    // Hatch line as a*x + b*y = c, edge as a1*x + b1*y = c1.
    let a = hatch_finish.y - hatch_start.y;
    let b = hatch_start.x - hatch_finish.x;
    let c = a * hatch_start.x + b * hatch_start.y;
    let a1 = edge.end.y - edge.start.y;
    let b1 = edge.start.x - edge.end.x;
    let c1 = a1 * edge.start.x + b1 * edge.start.y;

    let det = a * b1 - a1 * b;
    if det.abs() / edge_len < MIN_DETERMINANT {
        return None;
    }

    let x = (b1 * c - b * c1) / det;
    let y = (a * c1 - a1 * c) / det;

    let on = |s: Vertex, f: Vertex| {
        x >= s.x.min(f.x) - INTERSECT_RANGE_MM
            && x <= s.x.max(f.x) + INTERSECT_RANGE_MM
            && y >= s.y.min(f.y) - INTERSECT_RANGE_MM
            && y <= s.y.max(f.y) + INTERSECT_RANGE_MM
    };
    if !on(hatch_start, hatch_finish) || !on(edge.start, edge.end) {
        return None;
    }

    Some(Vertex::new(x, y))
}

/// Drive a hatch sweep over `edges` from `a_min` to `a_max`.
///
/// For every hatch line that yields a usable intersection list, `visit` is
/// called with the intersections sorted along the perpendicular axis and
/// the traversal direction used. Lines with no intersections are skipped
/// without consuming a direction flip, matching the alternation the sort
/// establishes. Lines whose intersection count stays odd even after the
/// duplicate fallback are dropped entirely.
pub(crate) fn sweep(
    edges: &[Edge],
    geom: &SweepGeometry,
    bb: &BoundingBox,
    a_min: CoordF,
    a_max: CoordF,
    mut visit: impl FnMut(Vec<Vertex>, bool),
) {
    let (a_start, a_end) = if geom.spacing > 0.0 {
        (a_min, a_max)
    } else {
        (a_max, a_min)
    };

    let mut ascending = true;
    // A hatch exactly at a_start would be a single point, so start one
    // spacing in.
    let mut a_curr = a_start + geom.spacing;
    loop {
        let mut hits: Vec<Vertex> = Vec::new();
        for edge in edges {
            if let Some(v) = find_intersection(geom, bb, a_curr, edge) {
                hits.push(v);
            }
        }

        if !hits.is_empty() {
            let dir = ascending;
            ascending = !ascending;
            match geom.axis {
                // Lines indexed along x progress across y, so order their
                // intersections by y; and vice versa.
                SweepAxis::AlongX => sort_y_then_x(&mut hits, dir),
                SweepAxis::AlongY => sort_x_then_y(&mut hits, dir),
            }

            let deduped = eliminate_duplicate_vertices(&hits);
            if deduped.len() % 2 == 0 {
                visit(deduped, dir);
            } else if hits.len() % 2 == 0 {
                // Deduplication produced an odd count; the raw list (with
                // duplicates) still pairs up, so fall back to it.
                visit(hits, dir);
            }
            // Both odd: this hatch line cannot be paired; discard it.
        }

        a_curr += geom.spacing;
        if geom.spacing > 0.0 {
            if a_curr >= a_end {
                break;
            }
        } else if a_curr <= a_end {
            break;
        }
    }
}

/// Generate the hatch path for all regions in `region_indices` (which must
/// share the tag of `profile`), including their holes.
///
/// `offset` is the hatch offset with all contour offsets folded in.
/// `a_min`/`a_max` bound the sweep along the indexing axis for
/// `hatch_angle`. Returns `None` when offsetting consumed every polygon or
/// no hatch line crossed the remaining geometry.
#[allow(clippy::too_many_arguments)]
pub fn hatch(
    layer: &Layer,
    region_indices: &[usize],
    profile: &RegionProfile,
    offset: CoordF,
    hatch_angle: CoordF,
    a_min: CoordF,
    a_max: CoordF,
    integer_ids: bool,
    bb: &BoundingBox,
) -> Option<Path> {
    let hatch_style = profile.hatch_style_label(integer_ids);
    let jump_style = profile.jump_style_label(integer_ids);

    let edges = offset_region_edges(layer, region_indices, offset);
    if edges.is_empty() {
        return None;
    }

    let geom = SweepGeometry::new(hatch_angle, profile.hatch_spacing);

    // Accumulate the intersections of every usable hatch line into a single
    // stream. Each line contributes an even count, so alternating mark/jump
    // assignment below stays aligned: within a line, pairs are marks with
    // jumps across holes; between lines, the connecting segment is a jump.
    let mut intersections: Vec<Vertex> = Vec::new();
    sweep(&edges, &geom, bb, a_min, a_max, |line, _ascending| {
        intersections.extend(line);
    });

    if intersections.is_empty() {
        return None;
    }

    let mut segments = Vec::with_capacity(intersections.len());
    let mut mark = true;
    for pair in intersections.windows(2) {
        segments.push(Segment {
            start: pair[0],
            end: pair[1],
            style: if mark {
                hatch_style.clone()
            } else {
                jump_style.clone()
            },
            is_mark: mark,
        });
        mark = !mark;
    }

    Some(Path {
        kind: PathKind::Hatch,
        tag: profile.tag.clone(),
        sky_writing: profile.hatch_sky_writing,
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::profile_with_hatch;
    use crate::layer::{Loop, LoopKind};

    fn square_layer() -> Layer {
        let lp = Loop {
            kind: LoopKind::Outer,
            tag: "core".to_string(),
            contour_traj: 1,
            hatch_traj: 1,
            vertices: vec![
                Vertex::new(0.0, 0.0),
                Vertex::new(10.0, 0.0),
                Vertex::new(10.0, 10.0),
                Vertex::new(0.0, 10.0),
            ],
        };
        Layer::from_loops(&[lp], 0.03, 0.03)
    }

    fn square_with_hole_layer() -> Layer {
        let outer = Loop {
            kind: LoopKind::Outer,
            tag: "core".to_string(),
            contour_traj: 1,
            hatch_traj: 1,
            vertices: vec![
                Vertex::new(0.0, 0.0),
                Vertex::new(10.0, 0.0),
                Vertex::new(10.0, 10.0),
                Vertex::new(0.0, 10.0),
            ],
        };
        let hole = Loop {
            kind: LoopKind::Inner,
            tag: "core".to_string(),
            contour_traj: 1,
            hatch_traj: 1,
            vertices: vec![
                Vertex::new(3.0, 3.0),
                Vertex::new(3.0, 7.0),
                Vertex::new(7.0, 7.0),
                Vertex::new(7.0, 3.0),
            ],
        };
        Layer::from_loops(&[outer, hole], 0.03, 0.03)
    }

    #[test]
    fn test_sweep_axis_classification() {
        assert_eq!(sweep_axis(0.0), SweepAxis::AlongY);
        assert_eq!(sweep_axis(30.0), SweepAxis::AlongY);
        assert_eq!(sweep_axis(45.0), SweepAxis::AlongX);
        assert_eq!(sweep_axis(90.0), SweepAxis::AlongX);
        assert_eq!(sweep_axis(134.9), SweepAxis::AlongX);
        assert_eq!(sweep_axis(180.0), SweepAxis::AlongY);
        assert_eq!(sweep_axis(225.0), SweepAxis::AlongX);
        assert_eq!(sweep_axis(270.0), SweepAxis::AlongX);
        assert_eq!(sweep_axis(315.0), SweepAxis::AlongY);
    }

    #[test]
    fn test_find_hatch_boundary_horizontal() {
        let verts = vec![
            Vertex::new(0.0, 0.0),
            Vertex::new(10.0, 0.0),
            Vertex::new(10.0, 10.0),
            Vertex::new(0.0, 10.0),
        ];
        let (a_min, a_max) = find_hatch_boundary(&verts, 0.0).unwrap();
        assert!((a_min - 0.0).abs() < 1e-9);
        assert!((a_max - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_find_hatch_boundary_vertical() {
        let verts = vec![Vertex::new(2.0, 0.0), Vertex::new(8.0, 3.0)];
        let (a_min, a_max) = find_hatch_boundary(&verts, 90.0).unwrap();
        assert!((a_min - 2.0).abs() < 1e-9);
        assert!((a_max - 8.0).abs() < 1e-9);
        assert!(find_hatch_boundary(&[], 90.0).is_none());
    }

    #[test]
    fn test_find_intersection_hit_and_miss() {
        let geom = SweepGeometry::new(0.0, 1.0);
        let bb = BoundingBox {
            min_x: 0.0,
            max_x: 10.0,
            min_y: 0.0,
            max_y: 10.0,
        };
        // Vertical edge at x = 5 crossing the horizontal hatch at y = 3.
        let edge = Edge::new(Vertex::new(5.0, 0.0), Vertex::new(5.0, 10.0));
        let hit = find_intersection(&geom, &bb, 3.0, &edge).unwrap();
        assert!((hit.x - 5.0).abs() < 1e-9);
        assert!((hit.y - 3.0).abs() < 1e-9);

        // Horizontal edge is parallel to the hatch line.
        let parallel = Edge::new(Vertex::new(0.0, 4.0), Vertex::new(10.0, 4.0));
        assert!(find_intersection(&geom, &bb, 3.0, &parallel).is_none());

        // Edge that stops short of the hatch line.
        let short = Edge::new(Vertex::new(5.0, 4.0), Vertex::new(5.0, 10.0));
        assert!(find_intersection(&geom, &bb, 3.0, &short).is_none());
    }

    #[test]
    fn test_hatch_square_mark_counts() {
        let layer = square_layer();
        let profile = profile_with_hatch("core", 1.0);
        let bb = layer.bounding_box();
        let (a_min, a_max) = find_hatch_boundary(&layer.vertices, 0.0).unwrap();
        let path = hatch(
            &layer, &[0], &profile, 0.0, 0.0, a_min, a_max, true, &bb,
        )
        .unwrap();

        let marks = path.segments.iter().filter(|s| s.is_mark).count();
        let jumps = path.segments.len() - marks;
        // Sweep runs y = 1..=9: nine full-width marks linked by jumps.
        assert_eq!(marks, 9);
        assert_eq!(marks, jumps + 1);
    }

    #[test]
    fn test_hatch_alternates_direction() {
        let layer = square_layer();
        let profile = profile_with_hatch("core", 1.0);
        let bb = layer.bounding_box();
        let (a_min, a_max) = find_hatch_boundary(&layer.vertices, 0.0).unwrap();
        let path = hatch(
            &layer, &[0], &profile, 0.0, 0.0, a_min, a_max, true, &bb,
        )
        .unwrap();

        let marks: Vec<_> = path.segments.iter().filter(|s| s.is_mark).collect();
        // First mark runs left to right, the second right to left.
        assert!(marks[0].start.x < marks[0].end.x);
        assert!(marks[1].start.x > marks[1].end.x);
        assert!(marks[2].start.x < marks[2].end.x);
    }

    #[test]
    fn test_hatch_split_by_hole() {
        let layer = square_with_hole_layer();
        let profile = profile_with_hatch("core", 1.0);
        let bb = layer.bounding_box();
        let (a_min, a_max) = find_hatch_boundary(&layer.vertices, 0.0).unwrap();
        let path = hatch(
            &layer,
            &[0, 1],
            &profile,
            0.0,
            0.0,
            a_min,
            a_max,
            true,
            &bb,
        )
        .unwrap();

        let marks = path.segments.iter().filter(|s| s.is_mark).count();
        let jumps = path.segments.len() - marks;
        // Lines at y = 3..=7 are split in two by the hole; y = 1, 2, 8, 9
        // span the full width. 4 + 2 * 5 = 14 marks, give or take one for
        // the grazing lines at the hole boundary.
        assert!((13..=15).contains(&marks), "got {marks} marks");
        assert_eq!(marks, jumps + 1);
    }

    #[test]
    fn test_hatch_marks_inside_polygon() {
        let layer = square_with_hole_layer();
        let profile = profile_with_hatch("core", 1.0);
        let bb = layer.bounding_box();
        let (a_min, a_max) = find_hatch_boundary(&layer.vertices, 0.0).unwrap();
        let path = hatch(
            &layer,
            &[0, 1],
            &profile,
            0.0,
            0.0,
            a_min,
            a_max,
            true,
            &bb,
        )
        .unwrap();
        // No mark midpoint may fall strictly inside the hole.
        for s in path.segments.iter().filter(|s| s.is_mark) {
            let mx = (s.start.x + s.end.x) / 2.0;
            let my = (s.start.y + s.end.y) / 2.0;
            let inside_hole = mx > 3.001 && mx < 6.999 && my > 3.001 && my < 6.999;
            assert!(!inside_hole, "mark through hole at ({mx}, {my})");
        }
    }

    #[test]
    fn test_hatch_vanished_offset_returns_none() {
        let layer = square_layer();
        let profile = profile_with_hatch("core", 1.0);
        let bb = layer.bounding_box();
        let (a_min, a_max) = find_hatch_boundary(&layer.vertices, 0.0).unwrap();
        // Offset larger than the square's inradius removes everything.
        assert!(hatch(&layer, &[0], &profile, 6.0, 0.0, a_min, a_max, true, &bb).is_none());
    }

    #[test]
    fn test_hatch_styles_follow_id_mode() {
        let layer = square_layer();
        let profile = profile_with_hatch("core", 2.0);
        let bb = layer.bounding_box();
        let (a_min, a_max) = find_hatch_boundary(&layer.vertices, 0.0).unwrap();
        let by_name = hatch(
            &layer, &[0], &profile, 0.0, 0.0, a_min, a_max, false, &bb,
        )
        .unwrap();
        assert_eq!(by_name.segments[0].style, profile.hatch_style);
        let by_int = hatch(
            &layer, &[0], &profile, 0.0, 0.0, a_min, a_max, true, &bb,
        )
        .unwrap();
        assert_eq!(by_int.segments[0].style, profile.hatch_style_int_id.to_string());
    }
}
