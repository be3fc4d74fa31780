//! Build configuration.
//!
//! The configuration file carries eight sections: a header (schema version),
//! general build settings, velocity profiles, segment styles, region
//! profiles, part placements, the trajectory-processing table, and optional
//! single stripes. It is loaded from JSON with serde and then *finalized*:
//! integer IDs are assigned in insertion order, per-region jump styles are
//! auto-generated, string references are resolved to indices, and everything
//! is cross-checked. A reference that dangles (a style naming a missing
//! velocity profile, a part naming a missing region tag) is fatal at load
//! time, never at layer time.
//!
//! After finalization the configuration is read-only for the rest of the
//! run; stripe marking state lives in
//! [`crate::scanpath::StripeTracker`], not here.

use crate::scanpath::ProcessingMode;
use crate::{CoordF, Error, Result, CONFIG_SCHEMA_VERSION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Region tag recorded on single-stripe paths. Not tied to any region
/// profile.
pub const STRIPE_TAG: &str = "single_stripes";

/// Trajectory number parts fall back to for contours when the configuration
/// omits one; such parts are built after all explicitly ordered work.
fn default_contour_traj() -> i32 {
    9998
}

/// Hatch counterpart of [`default_contour_traj`].
fn default_hatch_traj() -> i32 {
    9999
}

fn default_interval() -> i32 {
    -1
}

fn default_ending_layer() -> i32 {
    -1
}

fn default_dosing_factor() -> CoordF {
    1.5
}

fn default_true() -> bool {
    true
}

fn default_magnification() -> CoordF {
    1.0
}

fn default_slicer() -> String {
    "slic3r".to_string()
}

/// Configuration file header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    /// Schema version of this file. A mismatch with
    /// [`CONFIG_SCHEMA_VERSION`] is fatal.
    pub config_version: i32,
}

/// General build settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct General {
    /// Output folder, created next to the configuration file.
    pub project_folder: String,
    /// Slice thickness in mm; constant across the build.
    pub layer_thickness_mm: CoordF,
    /// Multiplier on layer thickness controlling powder dosing per layer.
    #[serde(default = "default_dosing_factor")]
    pub dosing_factor: CoordF,
    /// When true, auto-generated integer IDs replace the string IDs of
    /// velocity profiles and segment styles in scan output.
    #[serde(default = "default_true")]
    pub integer_ids: bool,
    /// Package the scan XML files into a zip archive after generation.
    #[serde(default)]
    pub create_scan_zip: bool,
    /// Emit SVG visualizations of layer files.
    #[serde(default)]
    pub create_layer_svg: bool,
    /// Layer-SVG interval modulus; -1 draws every layer.
    #[serde(default = "default_interval")]
    pub layer_svg_interval: i32,
    /// Emit SVG visualizations of scan files.
    #[serde(default)]
    pub create_scan_svg: bool,
    /// Scan-SVG interval modulus; -1 draws every layer.
    #[serde(default = "default_interval")]
    pub scan_svg_interval: i32,
    /// First layer to generate scans for; 0 starts at the lowest layer.
    #[serde(default)]
    pub starting_scan_layer: i32,
    /// Last layer to generate scans for (inclusive); -1 means the topmost.
    #[serde(default = "default_ending_layer")]
    pub ending_scan_layer: i32,
    /// Uniform magnification applied to part geometry during placement.
    #[serde(default = "default_magnification")]
    pub part_magnification: CoordF,
    /// External slicer executable invoked per part.
    #[serde(default = "default_slicer")]
    pub slicer_executable: String,
}

/// One row of the velocity-profile section: a velocity plus its delay
/// bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityProfile {
    pub id: String,
    /// Laser velocity, mm/s.
    pub velocity: CoordF,
    /// How the profile is specified: Delay, Acceleration or Auto.
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub laser_on_delay: CoordF,
    #[serde(default)]
    pub laser_off_delay: CoordF,
    #[serde(default)]
    pub jump_delay: CoordF,
    #[serde(default)]
    pub mark_delay: CoordF,
    #[serde(default)]
    pub polygon_delay: CoordF,
    /// Auto-assigned 1-based insertion-order ID.
    #[serde(skip)]
    pub integer_id: i32,
    /// Whether any used segment style references this profile.
    #[serde(skip)]
    pub is_used: bool,
}

/// Wobble parameters of a traveler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wobble {
    pub frequency: CoordF,
    /// Elliptical (-1, 1) or oval (0).
    pub shape: i32,
    /// Transverse amplitude, mm (perpendicular to travel).
    pub trans_amp: CoordF,
    /// Longitudinal amplitude, mm (along travel).
    pub long_amp: CoordF,
}

/// Per-laser parameters inside a segment style. The lead (or only) laser
/// has zero sync delay; a trailing laser follows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Traveler {
    pub id: String,
    #[serde(default)]
    pub sync_delay: CoordF,
    /// Mark power, watts.
    #[serde(default)]
    pub power: CoordF,
    /// Spot size, microns.
    #[serde(default)]
    pub spot_size: CoordF,
    #[serde(default)]
    pub wobble: Option<Wobble>,
}

/// One row of the segment-style section: the laser configuration applied
/// while traversing a segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentStyle {
    pub id: String,
    /// Velocity profile governing segments with this style.
    pub velocity_profile: String,
    /// Empty means no laser is explicitly selected (jump-only styles);
    /// otherwise Independent or FollowMe.
    #[serde(default)]
    pub laser_mode: String,
    #[serde(default)]
    pub lead_laser: Option<Traveler>,
    #[serde(default)]
    pub trail_laser: Option<Traveler>,
    #[serde(skip)]
    pub integer_id: i32,
    /// Index of the velocity profile, resolved at finalization.
    #[serde(skip)]
    pub velocity_profile_int_id: i32,
    #[serde(skip)]
    pub is_used: bool,
}

/// Process recipe bound to a region tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionProfile {
    pub tag: String,
    /// Velocity profile for jumps between marks of this region. A dedicated
    /// jump segment style referencing it is auto-generated at finalization.
    pub jump_velocity_profile: String,
    /// Segment style for contours; empty omits contours.
    #[serde(default)]
    pub contour_style: String,
    /// Offset of the first contour from the part outline, mm; positive is
    /// indented.
    #[serde(default)]
    pub contour_offset: CoordF,
    /// Number of contours; 0 omits contours.
    #[serde(default)]
    pub contour_count: i32,
    /// Center-to-center spacing of successive contours, mm.
    #[serde(default)]
    pub contour_spacing: CoordF,
    /// Skywriting mode for contours; opaque to this crate.
    #[serde(default)]
    pub contour_sky_writing: i32,
    /// Segment style for hatches; empty omits hatches.
    #[serde(default)]
    pub hatch_style: String,
    /// Offset of hatches from the innermost contour, mm.
    #[serde(default)]
    pub hatch_offset: CoordF,
    /// Hatch center-to-center spacing, mm.
    #[serde(default)]
    pub hatch_spacing: CoordF,
    /// Skywriting mode for hatches.
    #[serde(default)]
    pub hatch_sky_writing: i32,
    /// Select the travel-minimizing hatcher instead of the basic sweep.
    #[serde(default)]
    pub optimize_hatch: bool,
    /// Hatch angle on layer 1, degrees.
    #[serde(default)]
    pub layer1_hatch_angle: CoordF,
    /// Counter-clockwise hatch-angle increment per layer, degrees.
    #[serde(default)]
    pub hatch_layer_rotation: CoordF,
    /// Integer ID of `contour_style`; -1 when contours are omitted.
    #[serde(skip)]
    pub contour_style_int_id: i32,
    /// Integer ID of `hatch_style`; -1 when hatches are omitted.
    #[serde(skip)]
    pub hatch_style_int_id: i32,
    /// ID of the auto-generated jump style for this region.
    #[serde(skip)]
    pub jump_style: String,
    #[serde(skip)]
    pub jump_style_int_id: i32,
    #[serde(skip)]
    pub is_used: bool,
}

impl RegionProfile {
    /// Whether this profile produces contour paths at all.
    pub fn contours_enabled(&self) -> bool {
        !self.contour_style.is_empty() && self.contour_count > 0
    }

    /// Whether this profile produces hatch paths at all.
    pub fn hatches_enabled(&self) -> bool {
        !self.hatch_style.is_empty() && self.hatch_spacing > 0.0
    }

    pub fn contour_style_label(&self, integer_ids: bool) -> String {
        if integer_ids {
            self.contour_style_int_id.to_string()
        } else {
            self.contour_style.clone()
        }
    }

    pub fn hatch_style_label(&self, integer_ids: bool) -> String {
        if integer_ids {
            self.hatch_style_int_id.to_string()
        } else {
            self.hatch_style.clone()
        }
    }

    pub fn jump_style_label(&self, integer_ids: bool) -> String {
        if integer_ids {
            self.jump_style_int_id.to_string()
        } else {
            self.jump_style.clone()
        }
    }
}

/// One STL part and its placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartFile {
    /// STL filename, resolved relative to the configuration file.
    pub file: String,
    #[serde(default)]
    pub x_offset: CoordF,
    #[serde(default)]
    pub y_offset: CoordF,
    #[serde(default)]
    pub z_offset: CoordF,
    /// Region-profile tag applied to every loop sliced from this part.
    pub tag: String,
    #[serde(default = "default_contour_traj")]
    pub contour_traj: i32,
    #[serde(default = "default_hatch_traj")]
    pub hatch_traj: i32,
}

/// One row of the trajectory-processing table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryProcessing {
    pub trajectory: i32,
    pub mode: ProcessingMode,
}

/// A standalone calibration stripe, marked once on a single layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleStripe {
    /// Ordering key; stripe trajectories must be <= 0 and are emitted
    /// before all part trajectories.
    #[serde(default)]
    pub trajectory: i32,
    #[serde(default)]
    pub id: String,
    /// Segment style used to mark the stripe.
    pub style: String,
    pub start_x: CoordF,
    pub start_y: CoordF,
    pub end_x: CoordF,
    pub end_y: CoordF,
    /// Build height of the stripe, mm; converted to a layer number at
    /// finalization.
    pub height_mm: CoordF,
    #[serde(skip)]
    pub style_int_id: i32,
    /// Layer this stripe is marked on, `floor(height / thickness)`.
    #[serde(skip)]
    pub layer: i32,
}

impl SingleStripe {
    pub fn style_label(&self, integer_ids: bool) -> String {
        if integer_ids {
            self.style_int_id.to_string()
        } else {
            self.style.clone()
        }
    }
}

/// The optional single-stripe section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StripeSection {
    /// Velocity profile for jumps between stripes.
    #[serde(default)]
    pub jump_velocity_profile: String,
    #[serde(default)]
    pub sky_writing: i32,
    #[serde(default)]
    pub stripes: Vec<SingleStripe>,
    #[serde(skip)]
    pub jump_style: String,
    #[serde(skip)]
    pub jump_style_int_id: i32,
}

impl StripeSection {
    pub fn jump_style_label(&self, integer_ids: bool) -> String {
        if integer_ids {
            self.jump_style_int_id.to_string()
        } else {
            self.jump_style.clone()
        }
    }
}

/// The complete build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    pub header: Header,
    pub general: General,
    pub velocity_profiles: Vec<VelocityProfile>,
    pub segment_styles: Vec<SegmentStyle>,
    pub region_profiles: Vec<RegionProfile>,
    #[serde(default)]
    pub parts: Vec<PartFile>,
    #[serde(default)]
    pub trajectory_processing: Vec<TrajectoryProcessing>,
    #[serde(default)]
    pub single_stripes: StripeSection,
    /// Directory containing the configuration file. STL paths and the
    /// project folder are resolved against it.
    #[serde(skip)]
    pub config_dir: PathBuf,
}

impl BuildConfig {
    /// Load and finalize a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<BuildConfig> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config: BuildConfig = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.config_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        config.finalize()?;
        Ok(config)
    }

    /// Resolve references, assign integer IDs, generate jump styles and
    /// validate every section. Errors are aggregated so one load reports
    /// every problem in the file.
    pub fn finalize(&mut self) -> Result<()> {
        if self.header.config_version != CONFIG_SCHEMA_VERSION {
            // Version mismatches invalidate all other diagnostics.
            return Err(Error::Config(format!(
                "configuration schema version {} is not supported (expected {})",
                self.header.config_version, CONFIG_SCHEMA_VERSION
            )));
        }

        let mut problems: Vec<String> = Vec::new();

        if self.general.project_folder.is_empty() {
            problems.push("general: project_folder must not be empty".to_string());
        }
        if !(self.general.layer_thickness_mm > 0.0) {
            problems.push("general: layer_thickness_mm must be positive".to_string());
        }

        for (i, vp) in self.velocity_profiles.iter_mut().enumerate() {
            vp.integer_id = i as i32 + 1;
        }

        for (i, style) in self.segment_styles.iter_mut().enumerate() {
            style.integer_id = i as i32 + 1;
            match self
                .velocity_profiles
                .iter()
                .find(|vp| vp.id == style.velocity_profile)
            {
                Some(vp) => style.velocity_profile_int_id = vp.integer_id,
                None => problems.push(format!(
                    "segment style \"{}\" references unknown velocity profile \"{}\"",
                    style.id, style.velocity_profile
                )),
            }
        }

        // Region profiles: resolve style references and create one jump
        // style per profile from its jump velocity profile.
        for profile in &mut self.region_profiles {
            profile.contour_style_int_id =
                match resolve_style(&self.segment_styles, &profile.contour_style) {
                    StyleRef::Absent => -1,
                    StyleRef::Found(id) => id,
                    StyleRef::Dangling => {
                        problems.push(format!(
                            "region profile \"{}\" references unknown contour style \"{}\"",
                            profile.tag, profile.contour_style
                        ));
                        -1
                    }
                };
            profile.hatch_style_int_id =
                match resolve_style(&self.segment_styles, &profile.hatch_style) {
                    StyleRef::Absent => -1,
                    StyleRef::Found(id) => id,
                    StyleRef::Dangling => {
                        problems.push(format!(
                            "region profile \"{}\" references unknown hatch style \"{}\"",
                            profile.tag, profile.hatch_style
                        ));
                        -1
                    }
                };

            match append_jump_style(
                &mut self.segment_styles,
                &self.velocity_profiles,
                &profile.jump_velocity_profile,
            ) {
                Ok((id, int_id)) => {
                    profile.jump_style = id;
                    profile.jump_style_int_id = int_id;
                }
                Err(msg) => problems.push(format!("region profile \"{}\": {msg}", profile.tag)),
            }
        }

        // Single stripes: their own jump style, style resolution and layer
        // number derivation.
        if !self.single_stripes.stripes.is_empty() {
            match append_jump_style(
                &mut self.segment_styles,
                &self.velocity_profiles,
                &self.single_stripes.jump_velocity_profile,
            ) {
                Ok((id, int_id)) => {
                    self.single_stripes.jump_style = id;
                    self.single_stripes.jump_style_int_id = int_id;
                }
                Err(msg) => problems.push(format!("single stripes: {msg}")),
            }

            let thickness = self.general.layer_thickness_mm;
            for (i, stripe) in self.single_stripes.stripes.iter_mut().enumerate() {
                match resolve_style(&self.segment_styles, &stripe.style) {
                    StyleRef::Found(id) => stripe.style_int_id = id,
                    _ => problems.push(format!(
                        "stripe {i} references unknown segment style \"{}\"",
                        stripe.style
                    )),
                }
                if stripe.trajectory > 0 {
                    problems.push(format!(
                        "stripe {i} has trajectory {} (stripe trajectories must be <= 0)",
                        stripe.trajectory
                    ));
                }
                if (stripe.start_x - stripe.end_x).abs() + (stripe.start_y - stripe.end_y).abs()
                    <= 0.001
                {
                    problems.push(format!("stripe {i} has no x or y length"));
                }
                if thickness > 0.0 {
                    stripe.layer = (stripe.height_mm / thickness).floor() as i32;
                    if stripe.layer < 1 {
                        problems.push(format!(
                            "stripe {i} height {} mm falls below the first layer",
                            stripe.height_mm
                        ));
                    }
                }
            }
        }

        for part in &self.parts {
            if !self.region_profiles.iter().any(|p| p.tag == part.tag) {
                problems.push(format!(
                    "part \"{}\" references unknown region tag \"{}\"",
                    part.file, part.tag
                ));
            }
            if !part.file.to_ascii_lowercase().ends_with(".stl") {
                problems.push(format!("part \"{}\" is not an .stl file", part.file));
            }
            if part.contour_traj <= 0 || part.hatch_traj <= 0 {
                problems.push(format!(
                    "part \"{}\" trajectory numbers must be positive",
                    part.file
                ));
            }
        }

        if !problems.is_empty() {
            return Err(Error::Config(problems.join("; ")));
        }

        self.mark_usage();
        Ok(())
    }

    /// Compute `is_used` flags: region profiles referenced by parts, styles
    /// referenced by those profiles or by stripes, velocity profiles
    /// referenced by used styles. Scan files emit only used styles and
    /// profiles.
    fn mark_usage(&mut self) {
        for profile in &mut self.region_profiles {
            profile.is_used = self.parts.iter().any(|p| p.tag == profile.tag);
        }

        let mut used_style_ids: Vec<i32> = Vec::new();
        for profile in self.region_profiles.iter().filter(|p| p.is_used) {
            if profile.contours_enabled() {
                used_style_ids.push(profile.contour_style_int_id);
            }
            if profile.hatches_enabled() {
                used_style_ids.push(profile.hatch_style_int_id);
            }
            used_style_ids.push(profile.jump_style_int_id);
        }
        for stripe in &self.single_stripes.stripes {
            used_style_ids.push(stripe.style_int_id);
        }
        if !self.single_stripes.stripes.is_empty() {
            used_style_ids.push(self.single_stripes.jump_style_int_id);
        }

        for style in &mut self.segment_styles {
            style.is_used = used_style_ids.contains(&style.integer_id);
        }
        let used_vp_ids: Vec<i32> = self
            .segment_styles
            .iter()
            .filter(|s| s.is_used)
            .map(|s| s.velocity_profile_int_id)
            .collect();
        for vp in &mut self.velocity_profiles {
            vp.is_used = used_vp_ids.contains(&vp.integer_id);
        }
    }

    /// Tags of every region profile, in table order.
    pub fn region_tags(&self) -> Vec<String> {
        self.region_profiles.iter().map(|p| p.tag.clone()).collect()
    }

    pub fn profile_for_tag(&self, tag: &str) -> Option<&RegionProfile> {
        self.region_profiles.iter().find(|p| p.tag == tag)
    }

    /// Processing mode for a trajectory number; sequential unless the
    /// trajectory-processing table says otherwise.
    pub fn processing_mode(&self, trajectory: i32) -> ProcessingMode {
        self.trajectory_processing
            .iter()
            .find(|t| t.trajectory == trajectory)
            .map(|t| t.mode)
            .unwrap_or(ProcessingMode::Sequential)
    }

    /// Root of the project output tree.
    pub fn project_dir(&self) -> PathBuf {
        self.config_dir.join(&self.general.project_folder)
    }

    pub fn layer_dir(&self) -> PathBuf {
        self.project_dir().join("layers")
    }

    pub fn scan_dir(&self) -> PathBuf {
        self.project_dir().join("scans")
    }

    pub fn layer_xml_dir(&self) -> PathBuf {
        self.layer_dir().join("xml")
    }

    pub fn layer_svg_dir(&self) -> PathBuf {
        self.layer_dir().join("svg")
    }

    pub fn scan_xml_dir(&self) -> PathBuf {
        self.scan_dir().join("xml")
    }

    pub fn scan_svg_dir(&self) -> PathBuf {
        self.scan_dir().join("svg")
    }

    /// Absolute path of a part's STL file.
    pub fn part_path(&self, part: &PartFile) -> PathBuf {
        self.config_dir.join(&part.file)
    }
}

enum StyleRef {
    /// The reference string is empty (feature omitted).
    Absent,
    Found(i32),
    Dangling,
}

fn resolve_style(styles: &[SegmentStyle], id: &str) -> StyleRef {
    if id.is_empty() {
        return StyleRef::Absent;
    }
    match styles.iter().find(|s| s.id == id) {
        Some(s) => StyleRef::Found(s.integer_id),
        None => StyleRef::Dangling,
    }
}

/// Append an auto-generated jump segment style referencing
/// `jump_velocity_profile`. Jump styles carry no travelers, which leaves the
/// most recently used laser to execute the jump.
fn append_jump_style(
    styles: &mut Vec<SegmentStyle>,
    velocity_profiles: &[VelocityProfile],
    jump_velocity_profile: &str,
) -> std::result::Result<(String, i32), String> {
    let vp = velocity_profiles
        .iter()
        .find(|vp| vp.id == jump_velocity_profile)
        .ok_or_else(|| {
            format!("jump velocity profile \"{jump_velocity_profile}\" is not defined")
        })?;

    let integer_id = styles.len() as i32 + 1;
    let id = format!("Auto-generated{integer_id}");
    styles.push(SegmentStyle {
        id: id.clone(),
        velocity_profile: vp.id.clone(),
        laser_mode: String::new(),
        lead_laser: None,
        trail_laser: None,
        integer_id,
        velocity_profile_int_id: vp.integer_id,
        is_used: true,
    });
    Ok((id, integer_id))
}
