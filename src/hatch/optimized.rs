//! Travel-minimizing hatching.
//!
//! The basic hatcher draws every hatch line across the entire polygon set,
//! which makes the laser jump over every hole and between every disjoint
//! area on every line. This variant instead grows contiguous "hatch
//! regions" while the intersection structure stays stable, then stitches
//! the finished regions together in a nearest-neighbor order so most jumps
//! are short hops between neighboring areas. It is a heuristic; no
//! optimality is claimed.

use crate::clipper::offset_region_edges;
use crate::config::RegionProfile;
use crate::geometry::{distance, BoundingBox, Vertex};
use crate::hatch::{sweep, SweepGeometry};
use crate::layer::Layer;
use crate::scanpath::{Path, PathKind, Segment};
use crate::{CoordF, VERTEX_MERGE_RANGE_MM};

/// A contiguous run of hatch lines with no internal voids: the unit the
/// nearest-neighbor pass reorders.
#[derive(Debug, Clone)]
struct HatchRegion {
    start: Vertex,
    end: Vertex,
    segments: Vec<Segment>,
}

/// Generate a travel-minimized hatch path for the regions in
/// `region_indices`. Arguments mirror [`crate::hatch::hatch`]; the two are
/// interchangeable per region profile.
#[allow(clippy::too_many_arguments)]
pub fn hatch_optimized(
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

    // Phase 1: walk the sweep, extending open hatch regions while each new
    // line carries the same intersection count as the last. A change in
    // count means the area split or merged, so the open regions are closed
    // and a fresh set is seeded from the current line.
    let mut completed: Vec<HatchRegion> = Vec::new();
    let mut open: Vec<HatchRegion> = Vec::new();
    let mut prev_count: Option<usize> = None;

    let mark = |start: Vertex, end: Vertex| Segment {
        start,
        end,
        style: hatch_style.clone(),
        is_mark: true,
    };
    let jump = |start: Vertex, end: Vertex| Segment {
        start,
        end,
        style: jump_style.clone(),
        is_mark: false,
    };

    sweep(&edges, &geom, bb, a_min, a_max, |line, _ascending| {
        if prev_count == Some(line.len()) {
            // The line is already sorted in this sweep step's traversal
            // direction, so pair k enters at line[2k] and exits at
            // line[2k+1] regardless of which way the zig-zag runs.
            for (k, region) in open.iter_mut().enumerate() {
                let entry = line[2 * k];
                let exit = line[2 * k + 1];
                region.segments.push(jump(region.end, entry));
                region.segments.push(mark(entry, exit));
                region.end = exit;
            }
        } else {
            completed.append(&mut open);
            for pair in line.chunks_exact(2) {
                open.push(HatchRegion {
                    start: pair[0],
                    end: pair[1],
                    segments: vec![mark(pair[0], pair[1])],
                });
            }
            prev_count = Some(line.len());
        }
    });
    completed.append(&mut open);

    if completed.is_empty() {
        return None;
    }

    // Phase 2: nearest-neighbor ordering. Starting from the first region,
    // always continue to the unvisited region whose entry point is closest
    // to the current exit.
    let mut order = Vec::with_capacity(completed.len());
    let mut visited = vec![false; completed.len()];
    let mut current = 0usize;
    for _ in 0..completed.len() {
        order.push(current);
        visited[current] = true;
        let exit = completed[current].end;
        let mut best = 0usize;
        let mut best_cost = CoordF::INFINITY;
        for (i, candidate) in completed.iter().enumerate() {
            if !visited[i] {
                let cost = distance(exit, candidate.start);
                if cost < best_cost {
                    best_cost = cost;
                    best = i;
                }
            }
        }
        current = best;
    }

    // Phase 3: concatenate the ordered regions with connecting jumps.
    let mut stitched: Vec<Segment> = Vec::new();
    for pair in order.windows(2) {
        let from = &completed[pair[0]];
        let to = &completed[pair[1]];
        stitched.extend(from.segments.iter().cloned());
        stitched.push(jump(from.end, to.start));
    }
    stitched.extend(completed[*order.last().unwrap()].segments.iter().cloned());

    // Failsafe pass: the laser path must be continuous. Any remaining gap
    // between consecutive segments is bridged with a jump, except when the
    // next segment merely runs backwards, in which case it is reversed in
    // place.
    let mut segments: Vec<Segment> = Vec::with_capacity(stitched.len());
    for mut seg in stitched {
        if let Some(prev_end) = segments.last().map(|s| s.end) {
            if distance(prev_end, seg.start) > VERTEX_MERGE_RANGE_MM {
                if distance(prev_end, seg.end) <= VERTEX_MERGE_RANGE_MM {
                    std::mem::swap(&mut seg.start, &mut seg.end);
                } else {
                    segments.push(jump(prev_end, seg.start));
                }
            }
        }
        segments.push(seg);
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
    use crate::hatch::{find_hatch_boundary, hatch};
    use crate::layer::{Layer, Loop, LoopKind};

    fn make_loop(kind: LoopKind, verts: Vec<Vertex>) -> Loop {
        Loop {
            kind,
            tag: "core".to_string(),
            contour_traj: 1,
            hatch_traj: 1,
            vertices: verts,
        }
    }

    fn square(x0: f64, y0: f64, size: f64) -> Vec<Vertex> {
        vec![
            Vertex::new(x0, y0),
            Vertex::new(x0 + size, y0),
            Vertex::new(x0 + size, y0 + size),
            Vertex::new(x0, y0 + size),
        ]
    }

    fn assert_continuous(path: &Path) {
        for pair in path.segments.windows(2) {
            let gap = distance(pair[0].end, pair[1].start);
            assert!(
                gap <= VERTEX_MERGE_RANGE_MM,
                "gap of {gap} mm between segments"
            );
        }
    }

    #[test]
    fn test_optimized_square_matches_basic_mark_count() {
        let layer = Layer::from_loops(
            &[make_loop(LoopKind::Outer, square(0.0, 0.0, 10.0))],
            0.03,
            0.03,
        );
        let profile = profile_with_hatch("core", 1.0);
        let bb = layer.bounding_box();
        let (a_min, a_max) = find_hatch_boundary(&layer.vertices, 0.0).unwrap();

        let basic = hatch(&layer, &[0], &profile, 0.0, 0.0, a_min, a_max, true, &bb).unwrap();
        let optimized =
            hatch_optimized(&layer, &[0], &profile, 0.0, 0.0, a_min, a_max, true, &bb).unwrap();

        let basic_marks = basic.segments.iter().filter(|s| s.is_mark).count();
        let opt_marks = optimized.segments.iter().filter(|s| s.is_mark).count();
        assert_eq!(basic_marks, opt_marks);
        assert_continuous(&optimized);
    }

    #[test]
    fn test_optimized_hole_creates_subregions() {
        let mut hole = square(3.0, 3.0, 4.0);
        hole.reverse();
        let layer = Layer::from_loops(
            &[
                make_loop(LoopKind::Outer, square(0.0, 0.0, 10.0)),
                make_loop(LoopKind::Inner, hole),
            ],
            0.03,
            0.03,
        );
        let profile = profile_with_hatch("core", 1.0);
        let bb = layer.bounding_box();
        let (a_min, a_max) = find_hatch_boundary(&layer.vertices, 0.0).unwrap();

        let optimized = hatch_optimized(
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

        assert_continuous(&optimized);
        let basic = hatch(
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
        let basic_marks = basic.segments.iter().filter(|s| s.is_mark).count();
        let opt_marks = optimized.segments.iter().filter(|s| s.is_mark).count();
        assert_eq!(basic_marks, opt_marks);
    }

    #[test]
    fn test_optimized_disjoint_squares_cover_both() {
        let layer = Layer::from_loops(
            &[
                make_loop(LoopKind::Outer, square(0.0, 0.0, 4.0)),
                make_loop(LoopKind::Outer, square(10.0, 0.0, 4.0)),
            ],
            0.03,
            0.03,
        );
        let profile = profile_with_hatch("core", 1.0);
        let bb = layer.bounding_box();
        let (a_min, a_max) = find_hatch_boundary(&layer.vertices, 0.0).unwrap();

        let optimized = hatch_optimized(
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
        assert_continuous(&optimized);

        // The same marks get burned as in the basic sweep, jointly covering
        // both squares.
        let basic = hatch(
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
        let marked = |path: &crate::scanpath::Path| {
            path.segments
                .iter()
                .filter(|s| s.is_mark)
                .map(|s| distance(s.start, s.end))
                .sum::<f64>()
        };
        assert!((marked(&optimized) - marked(&basic)).abs() < 1e-6);
        let marks: Vec<_> = optimized.segments.iter().filter(|s| s.is_mark).collect();
        assert!(marks.iter().any(|s| s.start.x.max(s.end.x) <= 4.001));
        assert!(marks.iter().any(|s| s.start.x.min(s.end.x) >= 9.999));
    }

    #[test]
    fn test_optimized_empty_offset_returns_none() {
        let layer = Layer::from_loops(
            &[make_loop(LoopKind::Outer, square(0.0, 0.0, 2.0))],
            0.03,
            0.03,
        );
        let profile = profile_with_hatch("core", 1.0);
        let bb = layer.bounding_box();
        let (a_min, a_max) = find_hatch_boundary(&layer.vertices, 0.0).unwrap();
        assert!(hatch_optimized(
            &layer, &[0], &profile, 1.5, 0.0, a_min, a_max, true, &bb
        )
        .is_none());
    }
}
