//! Layer containers and polygon ingestion.
//!
//! A build layer owns a shared vertex list plus a slice of regions whose
//! edges index into that list (arena-and-index, so closed loops need no
//! ownership cycles and edge construction is O(1)). Ingestion promotes the
//! slicer's raw polygon loops into that form; per-part placement and
//! multi-part merging happen on the raw loops beforehand.

use crate::geometry::{BoundingBox, Vertex};
use crate::{CoordF, Error, Result};

/// Whether a closed polygon bounds solid material or a hole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    /// The enclosed area is to be hatched.
    Outer,
    /// The enclosed area is empty (a hole in an outer loop).
    Inner,
}

impl LoopKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopKind::Outer => "Outer",
            LoopKind::Inner => "Inner",
        }
    }

    /// Parse a layer-file region type, case-insensitively.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "outer" => Ok(LoopKind::Outer),
            "inner" => Ok(LoopKind::Inner),
            other => Err(Error::Layer(format!(
                "region type must be Inner or Outer, found \"{other}\""
            ))),
        }
    }
}

/// A closed polygon as produced by the slicer, before promotion into a
/// layer's shared vertex list.
///
/// Inner loops are wound opposite to their enclosing outer loop; the
/// offsetter infers holes from that winding, so it must be preserved all the
/// way through ingestion.
#[derive(Debug, Clone)]
pub struct Loop {
    pub kind: LoopKind,
    /// Region-profile tag assigned to the part this loop came from.
    pub tag: String,
    /// Build-order key for this loop's contours.
    pub contour_traj: i32,
    /// Build-order key for this loop's hatches.
    pub hatch_traj: i32,
    pub vertices: Vec<Vertex>,
}

/// Shape of the curve between an edge's endpoints. Only line segments exist
/// today; the variant is recorded in layer files for future use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurveKind {
    #[default]
    Linear,
}

/// An edge of a region: an ordered pair of 1-based indices into the owning
/// layer's vertex list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedEdge {
    pub start_idx: usize,
    pub end_idx: usize,
    pub curve: CurveKind,
}

/// A loop promoted into the layer's shared vertex list.
#[derive(Debug, Clone)]
pub struct Region {
    pub kind: LoopKind,
    pub tag: String,
    pub contour_traj: i32,
    pub hatch_traj: i32,
    pub edges: Vec<IndexedEdge>,
}

/// The regions sharing one z plane.
#[derive(Debug, Clone, Default)]
pub struct Slice {
    pub regions: Vec<Region>,
}

/// One build layer: slice thickness, shared vertex list and regions.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    /// Slice thickness in mm.
    pub thickness: CoordF,
    /// z coordinate reported by the slicer for this layer, in mm.
    pub z_height: CoordF,
    /// Shared vertex list. Edges hold 1-based indices into this.
    pub vertices: Vec<Vertex>,
    pub slice: Slice,
}

impl Layer {
    /// Promote raw loops into a layer with a shared vertex list.
    ///
    /// Vertices are added in loop order; insertion probes the list for an
    /// exact (x, y) match and reuses the index when present. No tolerance is
    /// applied here; tolerance-based merging is the slicer's job. Each loop
    /// becomes a region whose edge chain is explicitly closed by a final
    /// edge back to the loop's first vertex.
    pub fn from_loops(loops: &[Loop], thickness: CoordF, z_height: CoordF) -> Layer {
        let mut vertices: Vec<Vertex> = Vec::new();
        let mut regions = Vec::with_capacity(loops.len());

        for lp in loops {
            let Some(&first) = lp.vertices.first() else {
                continue;
            };
            let first_idx = intern_vertex(&mut vertices, first);
            let mut edges = Vec::with_capacity(lp.vertices.len());
            let mut prev_idx = first_idx;
            for &v in &lp.vertices[1..] {
                let idx = intern_vertex(&mut vertices, v);
                edges.push(IndexedEdge {
                    start_idx: prev_idx,
                    end_idx: idx,
                    curve: CurveKind::Linear,
                });
                prev_idx = idx;
            }
            edges.push(IndexedEdge {
                start_idx: prev_idx,
                end_idx: first_idx,
                curve: CurveKind::Linear,
            });
            regions.push(Region {
                kind: lp.kind,
                tag: lp.tag.clone(),
                contour_traj: lp.contour_traj,
                hatch_traj: lp.hatch_traj,
                edges,
            });
        }

        Layer {
            thickness,
            z_height,
            vertices,
            slice: Slice { regions },
        }
    }

    /// Resolve a 1-based vertex index.
    #[inline]
    pub fn vertex(&self, idx: usize) -> Vertex {
        self.vertices[idx - 1]
    }

    /// The vertex loop of a region, in edge order (start vertex of each
    /// edge). Because the chain is closed, this is the full polygon.
    pub fn region_loop(&self, region: &Region) -> Vec<Vertex> {
        region.edges.iter().map(|e| self.vertex(e.start_idx)).collect()
    }

    /// Bounding box over the shared vertex list, with the stripe-only
    /// fallback for empty layers.
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_vertices(&self.vertices)
    }

    /// Check the layer against the region-profile table and structural
    /// invariants. All problems are aggregated into one error so a bad layer
    /// file reports everything wrong with it at once.
    pub fn validate(&self, known_tags: &[String], source: &str) -> Result<()> {
        let mut problems = Vec::new();

        if !(self.thickness > 0.0) || !self.thickness.is_finite() {
            problems.push(format!("layer thickness is not positive in {source}"));
        }

        for (i, region) in self.slice.regions.iter().enumerate() {
            if !known_tags.iter().any(|t| t == &region.tag) {
                problems.push(format!(
                    "{source} region {i} carries tag \"{}\" with no matching region profile",
                    region.tag
                ));
            }
            if region.contour_traj < 0 {
                problems.push(format!(
                    "{source} region {i} has negative contour trajectory number {}",
                    region.contour_traj
                ));
            }
            if region.hatch_traj < 0 {
                problems.push(format!(
                    "{source} region {i} has negative hatch trajectory number {}",
                    region.hatch_traj
                ));
            }
            for e in &region.edges {
                if e.start_idx == 0
                    || e.end_idx == 0
                    || e.start_idx > self.vertices.len()
                    || e.end_idx > self.vertices.len()
                {
                    problems.push(format!(
                        "{source} region {i} has an edge index outside the vertex list"
                    ));
                    break;
                }
            }
            // Closed-chain check: successive edges share endpoints and the
            // final edge returns to the first vertex.
            let closed = region
                .edges
                .windows(2)
                .all(|w| w[0].end_idx == w[1].start_idx)
                && match (region.edges.first(), region.edges.last()) {
                    (Some(first), Some(last)) => last.end_idx == first.start_idx,
                    _ => false,
                };
            if !closed {
                problems.push(format!("{source} region {i} is not a closed edge chain"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Layer(problems.join("; ")))
        }
    }
}

/// Find `v` in the list by exact match, or append it. Returns the 1-based
/// index either way.
fn intern_vertex(vertices: &mut Vec<Vertex>, v: Vertex) -> usize {
    match vertices.iter().position(|&w| w.x == v.x && w.y == v.y) {
        Some(i) => i + 1,
        None => {
            vertices.push(v);
            vertices.len()
        }
    }
}

/// Apply a part's magnification and placement offset to its loops:
/// `v' = v * mag + offset * mag`.
pub fn scale_loops(loops: &mut [Loop], magnification: CoordF, x_offset: CoordF, y_offset: CoordF) {
    for lp in loops {
        for v in &mut lp.vertices {
            v.x = v.x * magnification + x_offset * magnification;
            v.y = v.y * magnification + y_offset * magnification;
        }
    }
}

/// Merge the per-part loop sets contributing to one z plane into a single
/// combined set, in part order. Parts with no geometry on this plane
/// contribute nothing.
pub fn combine_loops(per_part: Vec<Vec<Loop>>) -> Vec<Loop> {
    let mut combined = Vec::new();
    for part in per_part {
        combined.extend(part);
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_loop(tag: &str) -> Loop {
        Loop {
            kind: LoopKind::Outer,
            tag: tag.to_string(),
            contour_traj: 1,
            hatch_traj: 2,
            vertices: vec![
                Vertex::new(0.0, 0.0),
                Vertex::new(10.0, 0.0),
                Vertex::new(10.0, 10.0),
                Vertex::new(0.0, 10.0),
            ],
        }
    }

    #[test]
    fn test_from_loops_builds_closed_chain() {
        let layer = Layer::from_loops(&[square_loop("core")], 0.03, 0.03);
        assert_eq!(layer.vertices.len(), 4);
        let region = &layer.slice.regions[0];
        assert_eq!(region.edges.len(), 4);
        // Final edge returns to the first vertex.
        assert_eq!(region.edges[3].end_idx, region.edges[0].start_idx);
        // All indices are 1-based and in range.
        for e in &region.edges {
            assert!(e.start_idx >= 1 && e.start_idx <= 4);
            assert!(e.end_idx >= 1 && e.end_idx <= 4);
        }
    }

    #[test]
    fn test_from_loops_reuses_shared_vertices() {
        let mut second = square_loop("core");
        // Second loop shares the exact corner (10, 10).
        second.vertices = vec![
            Vertex::new(10.0, 10.0),
            Vertex::new(20.0, 10.0),
            Vertex::new(20.0, 20.0),
        ];
        let layer = Layer::from_loops(&[square_loop("core"), second], 0.03, 0.03);
        // 4 + 3 vertices with one shared -> 6 unique.
        assert_eq!(layer.vertices.len(), 6);
        let r1 = &layer.slice.regions[1];
        assert_eq!(layer.vertex(r1.edges[0].start_idx), Vertex::new(10.0, 10.0));
    }

    #[test]
    fn test_region_loop_resolves_vertices() {
        let layer = Layer::from_loops(&[square_loop("core")], 0.03, 0.03);
        let lp = layer.region_loop(&layer.slice.regions[0]);
        assert_eq!(lp.len(), 4);
        assert_eq!(lp[0], Vertex::new(0.0, 0.0));
        assert_eq!(lp[3], Vertex::new(0.0, 10.0));
    }

    #[test]
    fn test_scale_loops() {
        let mut loops = vec![square_loop("core")];
        scale_loops(&mut loops, 2.0, 1.0, -1.0);
        assert_eq!(loops[0].vertices[0], Vertex::new(2.0, -2.0));
        assert_eq!(loops[0].vertices[2], Vertex::new(22.0, 18.0));
    }

    #[test]
    fn test_validate_accepts_good_layer() {
        let layer = Layer::from_loops(&[square_loop("core")], 0.03, 0.03);
        assert!(layer.validate(&["core".to_string()], "layer_1").is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_tag_and_bad_thickness() {
        let mut layer = Layer::from_loops(&[square_loop("skin")], 0.03, 0.03);
        layer.thickness = 0.0;
        let err = layer
            .validate(&["core".to_string()], "layer_1")
            .unwrap_err()
            .to_string();
        assert!(err.contains("thickness"));
        assert!(err.contains("skin"));
    }

    #[test]
    fn test_validate_rejects_negative_trajectory() {
        let mut lp = square_loop("core");
        lp.hatch_traj = -3;
        let layer = Layer::from_loops(&[lp], 0.03, 0.03);
        assert!(layer.validate(&["core".to_string()], "layer_1").is_err());
    }

    #[test]
    fn test_loop_kind_parse() {
        assert_eq!(LoopKind::parse("outer").unwrap(), LoopKind::Outer);
        assert_eq!(LoopKind::parse("Inner").unwrap(), LoopKind::Inner);
        assert!(LoopKind::parse("middle").is_err());
    }

    #[test]
    fn test_combine_loops_preserves_part_order() {
        let combined = combine_loops(vec![
            vec![square_loop("a")],
            vec![],
            vec![square_loop("b"), square_loop("c")],
        ]);
        let tags: Vec<_> = combined.iter().map(|l| l.tag.as_str()).collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
    }
}
