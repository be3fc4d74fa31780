//! Resumable batch pipeline.
//!
//! Two stages, each processing a bounded number of layers per invocation
//! and checkpointing its progress to disk:
//!
//! 1. **Layer generation** slices every part (once), merges the per-part
//!    polygons of each z plane into one layer and writes layer XML files.
//! 2. **Scan generation** reads the layer files back, plans trajectories
//!    and writes scan XML files.
//!
//! Per-layer outputs depend only on that layer's inputs and the profile
//! table, so splitting a run across any number of batch invocations
//! produces byte-identical artifacts.

use crate::config::BuildConfig;
use crate::layer::{combine_loops, scale_loops, Layer, Loop};
use crate::output::layer::{read_layer_xml, write_layer_header_xml, write_layer_xml};
use crate::output::scan::write_scan_xml;
use crate::output::svg::{
    read_view_file, write_layer_svg, write_scan_svg, write_view_file, SvgView,
};
use crate::output::{layer_file_stem, scan_file_stem};
use crate::scanpath::{build_layer_paths, StripeTracker};
use crate::slicer;
use crate::status::StageStatus;
use crate::{CoordF, Error, Result, LAYERS_PER_BATCH};
use log::{debug, info};
use std::fs;
use std::path::PathBuf;

const LAYER_STATUS_FILENAME: &str = "layer_stage.status";
const SCAN_STATUS_FILENAME: &str = "scan_stage.status";
const VIEW_FILENAME: &str = "svg_view.cfg";
const ARCHIVE_FILENAME: &str = "scanpath_files.zip";

/// What one batch invocation accomplished.
#[derive(Debug, Clone, Copy)]
pub struct BatchOutcome {
    /// First layer this batch processed.
    pub first_layer: i32,
    /// Last layer processed so far (across all batches).
    pub last_layer: i32,
    /// Total layers in the build (or available to this stage).
    pub total_layers: i32,
    /// Whether the stage has processed its final layer.
    pub finished: bool,
}

pub fn layer_status_path(config: &BuildConfig) -> PathBuf {
    config.project_dir().join(LAYER_STATUS_FILENAME)
}

pub fn scan_status_path(config: &BuildConfig) -> PathBuf {
    config.project_dir().join(SCAN_STATUS_FILENAME)
}

fn view_path(config: &BuildConfig) -> PathBuf {
    config.layer_dir().join(VIEW_FILENAME)
}

/// A part readied for layer extraction: its sliced SVG plus placement.
struct PreparedPart {
    svg: PathBuf,
    tag: String,
    contour_traj: i32,
    hatch_traj: i32,
    /// Placement offsets with the STL minimum folded in; the slicer
    /// re-origins its output, so the minimum has to be added back.
    x_offset: CoordF,
    y_offset: CoordF,
    /// z offset expressed in whole layers.
    layer_offset: i32,
    /// Highest build layer this part contributes to, before the one-layer
    /// inclusive allowance.
    top_layer: i32,
}

/// Verify, measure and (when needed) slice every part; derive the build's
/// layer total and the shared SVG view. Identical filenames are sliced
/// once, and resumed runs (`skip_slicing`) reuse the slicer output on
/// disk.
fn prepare_parts(
    config: &BuildConfig,
    skip_slicing: bool,
) -> Result<(Vec<PreparedPart>, i32, SvgView)> {
    let thickness = config.general.layer_thickness_mm;
    let mut prepared = Vec::with_capacity(config.parts.len());
    let mut measured: Vec<(String, slicer::StlBounds)> = Vec::new();

    let mut min_x = CoordF::INFINITY;
    let mut max_x = CoordF::NEG_INFINITY;
    let mut min_y = CoordF::INFINITY;
    let mut max_y = CoordF::NEG_INFINITY;
    let mut top_layers: Vec<i32> = Vec::new();

    for part in &config.parts {
        let stl = config.part_path(part);
        let bounds = match measured.iter().find(|(file, _)| file == &part.file) {
            Some((_, bounds)) => *bounds,
            None => {
                if !stl.exists() {
                    return Err(Error::Layer(format!(
                        "the STL file {} cannot be found next to the configuration file",
                        part.file
                    )));
                }
                let bounds = slicer::stl_bounds(&stl)?;
                if !skip_slicing {
                    slicer::run_slicer(&config.general.slicer_executable, &stl, thickness)?;
                }
                measured.push((part.file.clone(), bounds));
                bounds
            }
        };

        min_x = min_x.min(bounds.min.x + part.x_offset);
        max_x = max_x.max(bounds.max_x + part.x_offset);
        min_y = min_y.min(bounds.min.y + part.y_offset);
        max_y = max_y.max(bounds.max_y + part.y_offset);

        let x_offset = part.x_offset + bounds.min.x;
        let y_offset = part.y_offset + bounds.min.y;
        let z_offset = part.z_offset + bounds.min.z;
        let layer_offset = (z_offset / thickness) as i32;

        let svg = stl.with_extension("svg");
        let top_layer = slicer::layer_count(&svg)? + layer_offset;
        top_layers.push(top_layer);
        debug!(
            "part {} spans layers {}..={} (tag {})",
            part.file,
            layer_offset + 1,
            top_layer + 1,
            part.tag
        );

        prepared.push(PreparedPart {
            svg,
            tag: part.tag.clone(),
            contour_traj: part.contour_traj,
            hatch_traj: part.hatch_traj,
            x_offset,
            y_offset,
            layer_offset,
            top_layer,
        });
    }

    // Single stripes extend both the view extents and the layer total.
    for stripe in &config.single_stripes.stripes {
        min_x = min_x.min(stripe.start_x.min(stripe.end_x));
        max_x = max_x.max(stripe.start_x.max(stripe.end_x));
        min_y = min_y.min(stripe.start_y.min(stripe.end_y));
        max_y = max_y.max(stripe.start_y.max(stripe.end_y));
        top_layers.push(stripe.layer - 1);
    }

    let Some(highest) = top_layers.iter().max().copied() else {
        return Err(Error::Config(
            "the build contains no parts and no single stripes".to_string(),
        ));
    };
    let total_layers = highest + 1;

    Ok((prepared, total_layers, SvgView::fit(min_x, max_x, min_y, max_y)))
}

/// Whether layer `i` is due an SVG under the configured interval modulus.
/// Negative intervals draw every layer; zero disables drawing outright.
fn svg_due(interval: i32, layer_num: i32) -> bool {
    if interval < 0 {
        true
    } else if interval == 0 {
        false
    } else {
        layer_num == 1 || layer_num % interval == 0
    }
}

/// Run one layer-generation batch: slice on first invocation, then emit
/// layer files for the next [`LAYERS_PER_BATCH`] layers and update the
/// checkpoint.
pub fn run_layer_batch(config: &BuildConfig) -> Result<BatchOutcome> {
    let xml_dir = config.layer_xml_dir();
    let svg_dir = config.layer_svg_dir();
    fs::create_dir_all(&xml_dir)?;
    fs::create_dir_all(&svg_dir)?;

    let status_path = layer_status_path(config);
    let status = StageStatus::read(&status_path);
    let (parts, total_layers, view) = prepare_parts(config, status.started)?;
    write_view_file(&view_path(config), &view)?;

    let thickness = config.general.layer_thickness_mm;
    let first_layer = status.last_layer + 1;
    let last_layer = (status.last_layer + LAYERS_PER_BATCH).min(total_layers);

    for i in first_layer..=last_layer {
        info!("building layer {i} of {total_layers}");

        // Gather each part's polygons for this z plane. A part whose slicer
        // output lacks this layer simply contributes nothing.
        let mut per_part: Vec<Vec<Loop>> = Vec::new();
        let mut z_height: Option<CoordF> = None;
        for part in &parts {
            if i > part.layer_offset && i <= part.top_layer + 1 {
                let (mut loops, z) = slicer::read_layer_loops(
                    &part.svg,
                    (i - 1) - part.layer_offset,
                    &part.tag,
                    part.contour_traj,
                    part.hatch_traj,
                )?;
                scale_loops(
                    &mut loops,
                    config.general.part_magnification,
                    part.x_offset,
                    part.y_offset,
                );
                if z_height.is_none() {
                    z_height = z;
                }
                per_part.push(loops);
            }
        }

        let combined = combine_loops(per_part);
        let layer = Layer::from_loops(
            &combined,
            thickness,
            z_height.unwrap_or(thickness * i as CoordF),
        );

        let stem = layer_file_stem(i, total_layers);
        write_layer_xml(&xml_dir.join(format!("{stem}.xml")), &layer)?;
        if config.general.create_layer_svg && svg_due(config.general.layer_svg_interval, i) {
            write_layer_svg(&svg_dir.join(format!("{stem}.svg")), &layer, config, &view)?;
        }
    }

    // The header lists every layer emitted so far, so it stays consistent
    // whether the run happens in one batch or many.
    let entries: Vec<(CoordF, String)> = (1..=last_layer)
        .map(|i| {
            (
                thickness * i as CoordF,
                format!("{}.xml", layer_file_stem(i, total_layers)),
            )
        })
        .collect();
    write_layer_header_xml(&xml_dir.join("layer_header.xml"), &entries, total_layers)?;

    let finished = last_layer >= total_layers;
    StageStatus {
        started: true,
        last_layer,
        finished,
        output_folder: config.layer_dir().display().to_string(),
    }
    .write(&status_path)?;

    Ok(BatchOutcome {
        first_layer,
        last_layer,
        total_layers,
        finished,
    })
}

/// Count the layer XML files in a directory by filename pattern, returning
/// (count, lowest layer number, highest layer number).
fn count_layer_files(dir: &PathBuf) -> Result<(usize, i32, i32)> {
    let mut count = 0usize;
    let mut min_layer = i32::MAX;
    let mut max_layer = i32::MIN;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("xml") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(digits) = stem.strip_prefix("layer_") else {
            continue;
        };
        let Ok(n) = digits.parse::<i32>() else {
            continue;
        };
        count += 1;
        min_layer = min_layer.min(n);
        max_layer = max_layer.max(n);
    }
    Ok((count, min_layer, max_layer))
}

/// Run one scan-generation batch over the layer files on disk.
///
/// The stripe tracker carries the marked flags across batches of the same
/// run, keeping them monotonic.
pub fn run_scan_batch(config: &BuildConfig, stripes: &mut StripeTracker) -> Result<BatchOutcome> {
    let layer_xml_dir = config.layer_xml_dir();
    let (count, min_layer, max_layer) = match count_layer_files(&layer_xml_dir) {
        Ok(found) => found,
        Err(_) => (0, 0, 0),
    };
    if count == 0 {
        return Err(Error::Scan(format!(
            "{} does not contain any XML layer files; run layer generation before scan generation",
            layer_xml_dir.display()
        )));
    }

    let mut ending = config.general.ending_scan_layer;
    if ending < 1 {
        ending = max_layer;
    }
    if ending < min_layer {
        return Err(Error::Scan(format!(
            "the ending layer {ending} lies below the lowest layer file ({min_layer})"
        )));
    }

    let status_path = scan_status_path(config);
    let status = StageStatus::read(&status_path);
    let mut first_layer = status.last_layer + 1;
    first_layer = first_layer
        .max(config.general.starting_scan_layer)
        .max(min_layer);
    if first_layer > max_layer {
        return Err(Error::Scan(format!(
            "the starting layer {first_layer} lies beyond the highest layer file ({max_layer})"
        )));
    }

    let final_layer = ending.min(max_layer);
    let last_layer = (first_layer + LAYERS_PER_BATCH - 1).min(final_layer);

    let xml_dir = config.scan_xml_dir();
    let svg_dir = config.scan_svg_dir();
    fs::create_dir_all(&xml_dir)?;
    fs::create_dir_all(&svg_dir)?;

    let view = read_view_file(&view_path(config)).unwrap_or(SvgView {
        mag: 1.0,
        x_off: 0.0,
        y_off: 0.0,
    });
    let tags = config.region_tags();

    for i in first_layer..=last_layer {
        info!("scanning layer {i} of {final_layer}");

        let layer_path = layer_xml_dir.join(format!("{}.xml", layer_file_stem(i, max_layer)));
        let layer = read_layer_xml(&layer_path)?;
        layer.validate(&tags, &layer_path.display().to_string())?;

        let trajectories = build_layer_paths(config, &layer, i, stripes)?;

        let stem = scan_file_stem(i, max_layer);
        write_scan_xml(&xml_dir.join(format!("{stem}.xml")), i, config, &trajectories)?;
        if config.general.create_scan_svg && svg_due(config.general.scan_svg_interval, i) {
            write_scan_svg(&svg_dir.join(format!("{stem}.svg")), &trajectories, &view)?;
        }
    }

    let finished = last_layer >= final_layer;
    StageStatus {
        started: true,
        last_layer,
        finished,
        output_folder: config.scan_dir().display().to_string(),
    }
    .write(&status_path)?;

    Ok(BatchOutcome {
        first_layer,
        last_layer,
        total_layers: max_layer,
        finished,
    })
}

/// Package every scan XML file into a zip archive in the project folder.
pub fn create_scan_archive(config: &BuildConfig) -> Result<PathBuf> {
    let archive_path = config.project_dir().join(ARCHIVE_FILENAME);
    let file = fs::File::create(&archive_path)?;
    let mut archive = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let mut files: Vec<PathBuf> = fs::read_dir(config.scan_xml_dir())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("xml"))
        .collect();
    files.sort();

    for path in files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        archive
            .start_file(name, options)
            .map_err(|e| Error::Scan(format!("zip error: {e}")))?;
        let mut source = fs::File::open(&path)?;
        std::io::copy(&mut source, &mut archive)?;
    }
    archive
        .finish()
        .map_err(|e| Error::Scan(format!("zip error: {e}")))?;
    Ok(archive_path)
}

/// Remove both stages' checkpoints, so the next run starts from layer 1.
pub fn clear_status_files(config: &BuildConfig) {
    let _ = fs::remove_file(layer_status_path(config));
    let _ = fs::remove_file(scan_status_path(config));
}
