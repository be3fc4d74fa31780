//! External slicer integration.
//!
//! The STL triangle slicer is an external executable invoked once per part;
//! it writes a layered SVG next to the STL, with one group per layer and
//! one polygon per closed loop, classified as a solid boundary or a hole.
//! This module runs the slicer synchronously, measures part extents
//! straight from STL files, and parses the slicer's SVG output back into
//! tagged loops.

use crate::geometry::{Vertex, Vertex3};
use crate::layer::{Loop, LoopKind};
use crate::{CoordF, Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Extents of an STL part, straight from its facet vertices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StlBounds {
    /// Component-wise minimum over all vertices. Part placement adds this
    /// to the user offsets, since the slicer re-origins its SVG output.
    pub min: Vertex3,
    pub max_x: CoordF,
    pub max_y: CoordF,
}

/// Read the extents of a binary or ASCII STL file.
///
/// Binary files are recognized by their exact size: an 80-byte header, a
/// facet count, and 50 bytes per facet. Anything else is parsed as ASCII
/// `vertex x y z` lines, tolerating variable whitespace.
pub fn stl_bounds(path: &Path) -> Result<StlBounds> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Slicer(format!("cannot read {}: {e}", path.display())))?;

    let vertices = if is_binary_stl(&bytes) {
        binary_vertices(&bytes)
    } else {
        ascii_vertices(&bytes)
    };

    let Some(&first) = vertices.first() else {
        return Err(Error::Slicer(format!(
            "{} contains no vertices",
            path.display()
        )));
    };

    let mut bounds = StlBounds {
        min: first,
        max_x: first.x,
        max_y: first.y,
    };
    for v in &vertices[1..] {
        bounds.min.x = bounds.min.x.min(v.x);
        bounds.min.y = bounds.min.y.min(v.y);
        bounds.min.z = bounds.min.z.min(v.z);
        bounds.max_x = bounds.max_x.max(v.x);
        bounds.max_y = bounds.max_y.max(v.y);
    }
    Ok(bounds)
}

fn is_binary_stl(bytes: &[u8]) -> bool {
    if bytes.len() < 84 {
        return false;
    }
    let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
    bytes.len() == 84 + count * 50
}

fn binary_vertices(bytes: &[u8]) -> Vec<Vertex3> {
    let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
    let mut out = Vec::with_capacity(count * 3);
    for i in 0..count {
        // Each facet: normal (3 floats), three vertices (9 floats), 2 spare
        // bytes.
        let facet = &bytes[84 + i * 50..84 + i * 50 + 48];
        for k in 1..4 {
            let at = |j: usize| {
                let o = (k * 3 + j) * 4;
                f32::from_le_bytes([facet[o], facet[o + 1], facet[o + 2], facet[o + 3]]) as CoordF
            };
            out.push(Vertex3 {
                x: at(0),
                y: at(1),
                z: at(2),
            });
        }
    }
    out
}

fn ascii_vertices(bytes: &[u8]) -> Vec<Vertex3> {
    let text = String::from_utf8_lossy(bytes);
    let mut out = Vec::new();
    for line in text.lines() {
        let Some(pos) = line.find("vertex") else {
            continue;
        };
        let coords: Vec<CoordF> = line[pos + "vertex".len()..]
            .split_whitespace()
            .take(3)
            .filter_map(|t| t.parse().ok())
            .collect();
        if coords.len() == 3 {
            out.push(Vertex3 {
                x: coords[0],
                y: coords[1],
                z: coords[2],
            });
        }
    }
    out
}

/// Slice one part, waiting for the slicer to exit.
///
/// The slicer is asked for SVG output at a constant layer height, with the
/// first layer at the same height, and a 5 um curve resolution; coarser
/// resolutions introduce contour offsets that scan generation magnifies.
/// A non-zero exit code or a missing output file fails the batch.
pub fn run_slicer(slicer: &str, stl_path: &Path, thickness_mm: CoordF) -> Result<PathBuf> {
    let thickness = thickness_mm.to_string();
    let status = Command::new(slicer)
        .arg(stl_path)
        .arg("--export-svg")
        .arg("--no-gui")
        .args(["--layer-height", &thickness])
        .args(["--first-layer-height", &thickness])
        .args(["--resolution", "0.005"])
        .status()
        .map_err(|e| Error::Slicer(format!("could not launch slicer \"{slicer}\": {e}")))?;

    if !status.success() {
        return Err(Error::Slicer(format!(
            "slicer exited with {status} for {}",
            stl_path.display()
        )));
    }
    let svg = stl_path.with_extension("svg");
    if !svg.exists() {
        return Err(Error::Slicer(format!(
            "slicer produced no output for {}",
            stl_path.display()
        )));
    }
    Ok(svg)
}

/// Value of attribute `name` within one markup line.
fn attr<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{name}=\"");
    let start = line.find(&needle)? + needle.len();
    let rest = &line[start..];
    Some(&rest[..rest.find('"')?])
}

/// Layer index parsed from a group's `id="layerN"` attribute.
fn group_layer_index(line: &str) -> Option<i32> {
    attr(line, "id")?.strip_prefix("layer")?.parse().ok()
}

/// Highest layer index present in a sliced SVG. Layers are indexed from 0,
/// so the part spans `layer_count + 1` slices.
pub fn layer_count(svg_path: &Path) -> Result<i32> {
    let text = std::fs::read_to_string(svg_path)
        .map_err(|e| Error::Slicer(format!("cannot read {}: {e}", svg_path.display())))?;
    let mut highest = 0;
    for line in text.lines() {
        if line.contains("<g") {
            if let Some(n) = group_layer_index(line) {
                highest = highest.max(n);
            }
        }
    }
    Ok(highest)
}

/// Read the loops of one slicer layer, tagging each with the part's region
/// tag and trajectory numbers. Solid boundaries become outer loops and
/// holes inner loops; the slicer winds holes opposite to boundaries, which
/// the offsetter depends on. Returns the loops plus the layer's z height;
/// a layer index missing from the file yields no loops.
pub fn read_layer_loops(
    svg_path: &Path,
    layer_index: i32,
    tag: &str,
    contour_traj: i32,
    hatch_traj: i32,
) -> Result<(Vec<Loop>, Option<CoordF>)> {
    let text = std::fs::read_to_string(svg_path)
        .map_err(|e| Error::Slicer(format!("cannot read {}: {e}", svg_path.display())))?;

    let mut loops = Vec::new();
    let mut z_height = None;
    let mut in_target = false;

    for line in text.lines() {
        if line.contains("<g") {
            in_target = group_layer_index(line) == Some(layer_index);
            if in_target {
                z_height = attr(line, "slic3r:z").and_then(|z| z.parse().ok());
            }
            continue;
        }
        if in_target && line.contains("</g>") {
            break;
        }
        if in_target && line.contains("<polygon") {
            let kind = match attr(line, "slic3r:type") {
                Some("contour") => LoopKind::Outer,
                Some("hole") => LoopKind::Inner,
                _ => continue,
            };
            let Some(points) = attr(line, "points") else {
                continue;
            };
            let vertices = parse_points(points);
            if vertices.len() >= 3 {
                loops.push(Loop {
                    kind,
                    tag: tag.to_string(),
                    contour_traj,
                    hatch_traj,
                    vertices,
                });
            }
        }
    }

    Ok((loops, z_height))
}

fn parse_points(points: &str) -> Vec<Vertex> {
    points
        .split_whitespace()
        .filter_map(|pair| {
            let (x, y) = pair.split_once(',')?;
            Some(Vertex::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
        })
        .collect()
}
