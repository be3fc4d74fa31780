//! Layer XML files: the combined polygon description of one cross-section.
//!
//! The writer and reader here are the handoff between the two pipeline
//! stages: layer generation writes these files, scan generation reads them
//! back. Edge Start/End values are 1-based indices into the vertex list;
//! edge normals are reserved and always zero.

use crate::geometry::Vertex;
use crate::layer::{CurveKind, IndexedEdge, Layer, LoopKind, Region, Slice};
use crate::output::{element_blocks, element_text, trim_decimal};
use crate::{Error, Result, LAYER_COORD_PRECISION, OUTPUT_COORD_SYSTEM_PER_VERTEX};
use std::fmt::Write as _;
use std::path::Path;

/// Write one layer file.
pub fn write_layer_xml(path: &Path, layer: &Layer) -> Result<()> {
    let p = LAYER_COORD_PRECISION;
    let mut out = String::new();

    out.push_str("<?xml version='1.0'?>\n");
    out.push_str("<!--Combined layer cross-section-->\n");
    out.push_str("<Layer>\n");
    let _ = writeln!(out, "\t<Thickness>{}</Thickness>", trim_decimal(layer.thickness));

    out.push_str("\t<VertexList>\n");
    for (i, v) in layer.vertices.iter().enumerate() {
        out.push_str("\t\t<Vertex>\n");
        let _ = writeln!(out, "\t\t\t<X>{:.p$}</X>", v.x);
        let _ = writeln!(out, "\t\t\t<Y>{:.p$}</Y>", v.y);
        if i == 0 || OUTPUT_COORD_SYSTEM_PER_VERTEX {
            out.push_str("\t\t\t<Co-ordinate_system>Cartesian</Co-ordinate_system>\n");
        }
        out.push_str("\t\t</Vertex>\n");
    }
    out.push_str("\t</VertexList>\n");

    out.push_str("\t<Slice>\n");
    for region in &layer.slice.regions {
        out.push_str("\t\t<Region>\n");
        let _ = writeln!(out, "\t\t\t<Tag>{}</Tag>", region.tag);
        let _ = writeln!(out, "\t\t\t<contourTraj>{}</contourTraj>", region.contour_traj);
        let _ = writeln!(out, "\t\t\t<hatchTraj>{}</hatchTraj>", region.hatch_traj);
        let _ = writeln!(out, "\t\t\t<Type>{}</Type>", region.kind.as_str());
        for edge in &region.edges {
            out.push_str("\t\t\t<Edge>\n");
            let _ = writeln!(out, "\t\t\t\t<Start>{}</Start>", edge.start_idx);
            let _ = writeln!(out, "\t\t\t\t<End>{}</End>", edge.end_idx);
            out.push_str("\t\t\t\t<Normal>\n");
            out.push_str("\t\t\t\t\t<Nx>0</Nx>\n");
            out.push_str("\t\t\t\t\t<Ny>0</Ny>\n");
            out.push_str("\t\t\t\t\t<Nz>0</Nz>\n");
            out.push_str("\t\t\t\t</Normal>\n");
            out.push_str("\t\t\t</Edge>\n");
        }
        out.push_str("\t\t</Region>\n");
    }
    out.push_str("\t</Slice>\n");
    out.push_str("</Layer>\n");

    std::fs::write(path, out)?;
    Ok(())
}

/// Read a layer file back into memory.
pub fn read_layer_xml(path: &Path) -> Result<Layer> {
    let name = path.display();
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Layer(format!("could not load {name}: {e}")))?;

    let thickness = element_text(&text, "Thickness")
        .and_then(|t| t.parse::<f64>().ok())
        .ok_or_else(|| Error::Layer(format!("{name} has no readable Thickness")))?;

    let vertex_list = element_text(&text, "VertexList").unwrap_or("");
    let mut vertices: Vec<Vertex> = Vec::new();
    for block in element_blocks(vertex_list, "Vertex") {
        let x = element_text(block, "X").and_then(|t| t.parse::<f64>().ok());
        let y = element_text(block, "Y").and_then(|t| t.parse::<f64>().ok());
        match (x, y) {
            (Some(x), Some(y)) => vertices.push(Vertex::new(x, y)),
            _ => return Err(Error::Layer(format!("{name} contains a malformed vertex"))),
        }
    }

    let slice_block = element_text(&text, "Slice").unwrap_or("");
    let mut regions = Vec::new();
    for block in element_blocks(slice_block, "Region") {
        let tag = element_text(block, "Tag")
            .ok_or_else(|| Error::Layer(format!("{name} contains a region without a tag")))?
            .to_string();
        let contour_traj = parse_int(block, "contourTraj", &format!("{name}"))?;
        let hatch_traj = parse_int(block, "hatchTraj", &format!("{name}"))?;
        let kind = LoopKind::parse(
            element_text(block, "Type")
                .ok_or_else(|| Error::Layer(format!("{name} contains a region without a type")))?,
        )?;

        let mut edges = Vec::new();
        for edge_block in element_blocks(block, "Edge") {
            let start_idx = parse_int(edge_block, "Start", &format!("{name}"))? as usize;
            let end_idx = parse_int(edge_block, "End", &format!("{name}"))? as usize;
            edges.push(IndexedEdge {
                start_idx,
                end_idx,
                curve: CurveKind::Linear,
            });
        }
        regions.push(Region {
            kind,
            tag,
            contour_traj,
            hatch_traj,
            edges,
        });
    }

    Ok(Layer {
        thickness,
        z_height: 0.0,
        vertices,
        slice: Slice { regions },
    })
}

fn parse_int(block: &str, tag: &str, source: &str) -> Result<i32> {
    element_text(block, tag)
        .and_then(|t| t.trim().parse::<f64>().ok())
        .map(|v| v as i32)
        .ok_or_else(|| Error::Layer(format!("{source} has a non-integer <{tag}> value")))
}

/// Write the layer-header file: the build's total layer count and, per
/// emitted layer, its z height and filename.
pub fn write_layer_header_xml(
    path: &Path,
    entries: &[(f64, String)],
    total_layers: i32,
) -> Result<()> {
    let mut out = String::new();
    out.push_str("<?xml version='1.0'?>\n");
    out.push_str("<Object>\n");
    let _ = writeln!(out, "\t<No._of_Layers>{total_layers}</No._of_Layers>");
    for (z_height, filename) in entries {
        out.push_str("\t<Layer_info>\n");
        let _ = writeln!(out, "\t\t<z_Height>{}</z_Height>", trim_decimal(*z_height));
        let _ = writeln!(out, "\t\t<Layer_filename>{filename}</Layer_filename>");
        out.push_str("\t</Layer_info>\n");
    }
    out.push_str("</Object>\n");

    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Loop;

    fn temp_file(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("scanpath-layerxml-{}-{name}", std::process::id()))
    }

    fn sample_layer() -> Layer {
        let outer = Loop {
            kind: LoopKind::Outer,
            tag: "core".to_string(),
            contour_traj: 1,
            hatch_traj: 2,
            vertices: vec![
                Vertex::new(0.0, 0.0),
                Vertex::new(10.0, 0.0),
                Vertex::new(10.0, 10.0),
                Vertex::new(0.0, 10.0),
            ],
        };
        let mut hole_vertices = vec![
            Vertex::new(3.0, 3.0),
            Vertex::new(7.0, 3.0),
            Vertex::new(7.0, 7.0),
            Vertex::new(3.0, 7.0),
        ];
        hole_vertices.reverse();
        let hole = Loop {
            kind: LoopKind::Inner,
            tag: "core".to_string(),
            contour_traj: 1,
            hatch_traj: 2,
            vertices: hole_vertices,
        };
        Layer::from_loops(&[outer, hole], 0.03, 0.03)
    }

    #[test]
    fn test_layer_round_trip() {
        let path = temp_file("roundtrip.xml");
        let layer = sample_layer();
        write_layer_xml(&path, &layer).unwrap();
        let back = read_layer_xml(&path).unwrap();

        assert_eq!(back.thickness, layer.thickness);
        assert_eq!(back.vertices.len(), layer.vertices.len());
        assert_eq!(back.slice.regions.len(), 2);
        let region = &back.slice.regions[0];
        assert_eq!(region.tag, "core");
        assert_eq!(region.kind, LoopKind::Outer);
        assert_eq!(region.contour_traj, 1);
        assert_eq!(region.hatch_traj, 2);
        assert_eq!(region.edges, layer.slice.regions[0].edges);
        assert_eq!(back.slice.regions[1].kind, LoopKind::Inner);
        // The reconstructed layer still satisfies validation.
        back.validate(&["core".to_string()], "roundtrip").unwrap();

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_coordinate_system_on_first_vertex_only() {
        let path = temp_file("coordsys.xml");
        write_layer_xml(&path, &sample_layer()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("<Co-ordinate_system>").count(), 1);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_coordinates_have_six_decimals() {
        let path = temp_file("precision.xml");
        write_layer_xml(&path, &sample_layer()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("<X>0.000000</X>"));
        assert!(text.contains("<X>10.000000</X>"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_read_rejects_garbage() {
        let path = temp_file("garbage.xml");
        std::fs::write(&path, "<Layer><Thickness>abc</Thickness></Layer>").unwrap();
        assert!(read_layer_xml(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_header_file_contents() {
        let path = temp_file("header.xml");
        let entries = vec![
            (0.03, "layer_01.xml".to_string()),
            (0.06, "layer_02.xml".to_string()),
        ];
        write_layer_header_xml(&path, &entries, 42).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("<No._of_Layers>42</No._of_Layers>"));
        assert_eq!(text.matches("<Layer_info>").count(), 2);
        assert!(text.contains("<z_Height>0.06</z_Height>"));
        assert!(text.contains("<Layer_filename>layer_02.xml</Layer_filename>"));
        std::fs::remove_file(&path).ok();
    }
}
