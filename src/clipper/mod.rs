//! Polygon offsetting via the Clipper kernel.
//!
//! Contours and hatch insets are produced by offsetting region boundaries
//! inward. Offsetting is delegated to geo-clipper (a Vatti-style integer
//! kernel) with mitred joins and closed-polygon end semantics; coordinates
//! are quantized by [`crate::QUANTUM_MM`] through the kernel's scale factor
//! and reconstructed to floating point afterwards.
//!
//! Holes are inferred from polygon winding: inner loops arrive from
//! ingestion wound opposite to their enclosing outer loop, so a positive
//! (inward) offset shrinks outer boundaries while enlarging holes. Callers
//! must not reorder or reverse the ingested loops.

use crate::geometry::{Edge, Vertex};
use crate::layer::Layer;
use crate::{CoordF, CLIPPER_SCALE};
use geo::{Coord as GeoCoord, LineString, MultiPolygon, Polygon as GeoPolygon};
use geo_clipper::{Clipper, EndType, JoinType};

/// Miter limit for offset corners. Round joins are too fine in detail (they
/// add many points); square joins distort sharp corners more than mitred
/// ones at the offsets used here.
const MITER_LIMIT: CoordF = 2.0;

/// Convert one closed vertex loop to a geo polygon, closing the ring if the
/// input does not repeat its first vertex.
fn loop_to_geo(vertices: &[Vertex]) -> GeoPolygon<CoordF> {
    let mut ring: Vec<GeoCoord<CoordF>> = vertices
        .iter()
        .map(|v| GeoCoord { x: v.x, y: v.y })
        .collect();
    if let (Some(first), Some(last)) = (ring.first(), ring.last()) {
        if first != last {
            ring.push(*first);
        }
    }
    GeoPolygon::new(LineString::new(ring), vec![])
}

/// Convert a result ring back into a closed edge loop. The kernel returns
/// rings with the first coordinate repeated at the end; the closing edge is
/// rebuilt explicitly instead.
fn ring_to_edges(ring: &LineString<CoordF>) -> Vec<Edge> {
    let mut points: Vec<Vertex> = ring.coords().map(|c| Vertex::new(c.x, c.y)).collect();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    if points.len() < 3 {
        return Vec::new();
    }
    let mut edges = Vec::with_capacity(points.len());
    for w in points.windows(2) {
        edges.push(Edge::new(w[0], w[1]));
    }
    edges.push(Edge::new(points[points.len() - 1], points[0]));
    edges
}

/// Offset a set of closed polygons by `offset_mm`.
///
/// Positive offsets move edges inward: outer boundaries shrink and holes
/// grow. Returns one closed edge loop per surviving ring; a single input
/// polygon may produce zero, one or several rings depending on how the
/// offset pinches it. An empty result (every polygon consumed by the
/// offset) is valid, not an error.
pub fn offset_polygons(polygons: &[Vec<Vertex>], offset_mm: CoordF) -> Vec<Vec<Edge>> {
    if polygons.is_empty() {
        return Vec::new();
    }

    let subject = MultiPolygon::new(polygons.iter().map(|p| loop_to_geo(p)).collect());
    // The kernel treats positive deltas as growth, so the inward convention
    // flips the sign here.
    let result = subject.offset(
        -offset_mm,
        JoinType::Miter(MITER_LIMIT),
        EndType::ClosedPolygon,
        CLIPPER_SCALE,
    );

    multi_to_rings(&result)
}

/// Flatten a kernel result into per-ring edge loops. Exterior rings and hole
/// rings are returned alike; the contourer traces each separately and the
/// hatcher only needs the union of all edges.
fn multi_to_rings(multi: &MultiPolygon<CoordF>) -> Vec<Vec<Edge>> {
    let mut rings = Vec::new();
    for poly in &multi.0 {
        let exterior = ring_to_edges(poly.exterior());
        if !exterior.is_empty() {
            rings.push(exterior);
        }
        for interior in poly.interiors() {
            let hole = ring_to_edges(interior);
            if !hole.is_empty() {
                rings.push(hole);
            }
        }
    }
    rings
}

/// Offset the boundaries of the given regions of a layer, returning one edge
/// loop per surviving ring. Regions passed together must share a region tag
/// and should include both the outer loops and their holes, so winding can
/// pair them up.
pub fn offset_regions(layer: &Layer, region_indices: &[usize], offset_mm: CoordF) -> Vec<Vec<Edge>> {
    let polygons: Vec<Vec<Vertex>> = region_indices
        .iter()
        .map(|&i| layer.region_loop(&layer.slice.regions[i]))
        .collect();
    offset_polygons(&polygons, offset_mm)
}

/// Like [`offset_regions`], but aggregated into a single edge list. This is
/// the form the hatcher consumes: it tests every edge against every hatch
/// line and does not care which ring an edge came from.
pub fn offset_region_edges(layer: &Layer, region_indices: &[usize], offset_mm: CoordF) -> Vec<Edge> {
    offset_regions(layer, region_indices, offset_mm)
        .into_iter()
        .flatten()
        .collect()
}
