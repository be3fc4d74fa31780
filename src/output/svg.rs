//! SVG visualizations of layer and scan files.
//!
//! Both views share one set of scaling parameters, computed once from the
//! extents of the whole build so every layer renders at the same position
//! and scale. The view is a 2000 x 2000 canvas with a top-left origin, so
//! y coordinates are flipped on the way in. Scan views draw marks only;
//! jumps are invisible moves.

use crate::config::BuildConfig;
use crate::layer::{Layer, LoopKind};
use crate::scanpath::Trajectory;
use crate::{CoordF, Error, Result};
use std::fmt::Write as _;
use std::path::Path;

/// Side length of the square SVG canvas, in user units.
pub const VIEW_DIM: i32 = 2000;

/// Scaling parameters shared by every SVG of one build, derived from the
/// build extents by the layer stage and handed to the scan stage through a
/// small sidecar file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvgView {
    pub mag: CoordF,
    pub x_off: CoordF,
    pub y_off: CoordF,
}

impl SvgView {
    /// Fit the given extents into the canvas with a margin.
    pub fn fit(min_x: CoordF, max_x: CoordF, min_y: CoordF, max_y: CoordF) -> SvgView {
        let span = (max_x - min_x).max(max_y - min_y);
        if span <= 0.0 {
            return SvgView {
                mag: 1.0,
                x_off: 0.0,
                y_off: 0.0,
            };
        }
        let mag = 1400.0 / span;
        SvgView {
            mag,
            x_off: 150.0 - min_x * mag,
            y_off: 25.0 - min_y * mag,
        }
    }

    fn place(&self, x: CoordF, y: CoordF) -> (CoordF, CoordF) {
        (
            x * self.mag + self.x_off,
            VIEW_DIM as CoordF - (y * self.mag + self.y_off),
        )
    }
}

/// Persist the view parameters for the scan stage.
pub fn write_view_file(path: &Path, view: &SvgView) -> Result<()> {
    std::fs::write(path, format!("{},{},{}\n", view.mag, view.x_off, view.y_off))?;
    Ok(())
}

/// Read the view parameters written by the layer stage.
pub fn read_view_file(path: &Path) -> Result<SvgView> {
    let text = std::fs::read_to_string(path)?;
    let mut parts = text.trim().split(',');
    let mut next = || -> Option<CoordF> { parts.next()?.trim().parse().ok() };
    match (next(), next(), next()) {
        (Some(mag), Some(x_off), Some(y_off)) => Ok(SvgView { mag, x_off, y_off }),
        _ => Err(Error::Scan(format!(
            "malformed SVG view parameters in {}",
            path.display()
        ))),
    }
}

fn svg_open(out: &mut String) {
    let _ = writeln!(
        out,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{VIEW_DIM}\" height=\"{VIEW_DIM}\" \
         viewBox=\"0 0 {VIEW_DIM} {VIEW_DIM}\">"
    );
}

fn svg_line(out: &mut String, view: &SvgView, a: (CoordF, CoordF), b: (CoordF, CoordF), stroke: &str, width: CoordF) {
    let (x1, y1) = view.place(a.0, a.1);
    let (x2, y2) = view.place(b.0, b.1);
    let _ = writeln!(
        out,
        "<line x1=\"{x1:.2}\" y1=\"{y1:.2}\" x2=\"{x2:.2}\" y2=\"{y2:.2}\" \
         stroke=\"{stroke}\" stroke-width=\"{width}\" />"
    );
}

/// Draw one layer's region outlines. Holes render blue, solid boundaries
/// black, and regions whose tag matches no configured part render red so
/// tagging mistakes stand out.
pub fn write_layer_svg(path: &Path, layer: &Layer, config: &BuildConfig, view: &SvgView) -> Result<()> {
    let mut out = String::new();
    svg_open(&mut out);
    for region in &layer.slice.regions {
        let known_tag = config.parts.iter().any(|p| p.tag == region.tag);
        let stroke = if !known_tag {
            "red"
        } else if region.kind == LoopKind::Inner {
            "blue"
        } else {
            "black"
        };
        for edge in &region.edges {
            let s = layer.vertex(edge.start_idx);
            let f = layer.vertex(edge.end_idx);
            svg_line(&mut out, view, (s.x, s.y), (f.x, f.y), stroke, 1.0);
        }
    }
    out.push_str("</svg>\n");
    std::fs::write(path, out)?;
    Ok(())
}

/// Draw one layer's scan paths: every mark as a thin black line, jumps
/// omitted.
pub fn write_scan_svg(path: &Path, trajectories: &[Trajectory], view: &SvgView) -> Result<()> {
    let mut out = String::new();
    svg_open(&mut out);
    for trajectory in trajectories {
        for scan_path in &trajectory.paths {
            for segment in &scan_path.segments {
                if segment.is_mark {
                    svg_line(
                        &mut out,
                        view,
                        (segment.start.x, segment.start.y),
                        (segment.end.x, segment.end.y),
                        "black",
                        0.25,
                    );
                }
            }
        }
    }
    out.push_str("</svg>\n");
    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::minimal_config;
    use crate::geometry::Vertex;
    use crate::layer::Loop;
    use crate::scanpath::{Path as ScanPath, PathKind, ProcessingMode, Segment};

    fn temp_file(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("scanpath-svg-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_view_fit_and_flip() {
        let view = SvgView::fit(0.0, 140.0, 0.0, 70.0);
        assert!((view.mag - 10.0).abs() < 1e-9);
        // y is measured from the top of the canvas.
        let (_, y) = view.place(0.0, 0.0);
        let (_, y_top) = view.place(0.0, 70.0);
        assert!(y > y_top);
    }

    #[test]
    fn test_view_file_round_trip() {
        let path = temp_file("view.cfg");
        let view = SvgView::fit(-5.0, 5.0, -5.0, 5.0);
        write_view_file(&path, &view).unwrap();
        let back = read_view_file(&path).unwrap();
        assert_eq!(back, view);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_scan_svg_draws_marks_only() {
        let path = temp_file("scan.svg");
        let trajectories = vec![Trajectory {
            number: 1,
            mode: ProcessingMode::Sequential,
            paths: vec![ScanPath {
                kind: PathKind::Hatch,
                tag: "core".to_string(),
                sky_writing: 0,
                segments: vec![
                    Segment {
                        start: Vertex::new(0.0, 0.0),
                        end: Vertex::new(10.0, 0.0),
                        style: "1".to_string(),
                        is_mark: true,
                    },
                    Segment {
                        start: Vertex::new(10.0, 0.0),
                        end: Vertex::new(10.0, 1.0),
                        style: "2".to_string(),
                        is_mark: false,
                    },
                ],
            }],
            work: Vec::new(),
        }];
        let view = SvgView::fit(0.0, 10.0, 0.0, 10.0);
        write_scan_svg(&path, &trajectories, &view).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("<line").count(), 1);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_layer_svg_colors_by_kind_and_tag() {
        let path = temp_file("layer.svg");
        let mut config = minimal_config();
        config.parts.push(crate::config::PartFile {
            file: "cube.stl".to_string(),
            x_offset: 0.0,
            y_offset: 0.0,
            z_offset: 0.0,
            tag: "core".to_string(),
            contour_traj: 1,
            hatch_traj: 2,
        });
        let square = |tag: &str, kind: LoopKind| Loop {
            kind,
            tag: tag.to_string(),
            contour_traj: 1,
            hatch_traj: 2,
            vertices: vec![
                Vertex::new(0.0, 0.0),
                Vertex::new(4.0, 0.0),
                Vertex::new(4.0, 4.0),
                Vertex::new(0.0, 4.0),
            ],
        };
        let layer = Layer::from_loops(
            &[
                square("core", LoopKind::Outer),
                square("core", LoopKind::Inner),
                square("mystery", LoopKind::Outer),
            ],
            0.03,
            0.03,
        );
        let view = SvgView::fit(0.0, 4.0, 0.0, 4.0);
        write_layer_svg(&path, &layer, &config, &view).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("stroke=\"black\"").count(), 4);
        assert_eq!(text.matches("stroke=\"blue\"").count(), 4);
        assert_eq!(text.matches("stroke=\"red\"").count(), 4);
        std::fs::remove_file(&path).ok();
    }
}
