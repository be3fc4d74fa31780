//! Contour tracing.
//!
//! A contour path follows (an offset of) each region boundary with mark
//! segments, hopping between disjoint rings with a single jump. Callers
//! wanting several nested contours invoke this once per contour index with
//! the offset stepped by the inter-contour spacing.

use crate::clipper::offset_regions;
use crate::config::RegionProfile;
use crate::geometry::BoundingBox;
use crate::layer::Layer;
use crate::scanpath::{Path, PathKind, Segment};
use crate::{CoordF, INTERSECT_RANGE_MM};

/// Trace one contour at `offset` around every region in `region_indices`
/// (all sharing the tag of `profile`).
///
/// Rings that survive offsetting are traced in iteration order. As a
/// failsafe, any segment whose endpoints leave the layer bounding box
/// (inflated by [`INTERSECT_RANGE_MM`]) is downgraded to a jump; correct
/// inputs never trigger this. Returns `None` when offsetting consumed every
/// polygon.
pub fn contour(
    layer: &Layer,
    region_indices: &[usize],
    profile: &RegionProfile,
    offset: CoordF,
    bb: &BoundingBox,
    integer_ids: bool,
) -> Option<Path> {
    let mark_style = profile.contour_style_label(integer_ids);
    let jump_style = profile.jump_style_label(integer_ids);

    let rings = offset_regions(layer, region_indices, offset);
    if rings.is_empty() {
        return None;
    }

    let mut segments: Vec<Segment> = Vec::with_capacity(
        rings.iter().map(|r| r.len() + 1).sum::<usize>(),
    );

    for ring in rings.iter().filter(|r| !r.is_empty()) {
        // Hop from the previous ring's endpoint to the start of this one.
        if let Some(prev_end) = segments.last().map(|s| s.end) {
            segments.push(Segment {
                start: prev_end,
                end: ring[0].start,
                style: jump_style.clone(),
                is_mark: false,
            });
        }
        for edge in ring {
            let in_bounds = !bb.segment_escapes(edge.start, edge.end, INTERSECT_RANGE_MM);
            segments.push(Segment {
                start: edge.start,
                end: edge.end,
                style: if in_bounds {
                    mark_style.clone()
                } else {
                    jump_style.clone()
                },
                is_mark: in_bounds,
            });
        }
    }

    if segments.is_empty() {
        return None;
    }

    Some(Path {
        kind: PathKind::Contour,
        tag: profile.tag.clone(),
        sky_writing: profile.contour_sky_writing,
        segments,
    })
}
