//! Scan XML files: the laser movements of one layer.
//!
//! A scan file carries a header, the velocity profiles and segment styles
//! actually used by the build, and the layer's trajectories in ascending
//! number order. Paths store their start coordinate once; every segment
//! then records only its style and endpoint, the next segment picking up
//! where the previous one ended.

use crate::config::{BuildConfig, SegmentStyle, Traveler, VelocityProfile};
use crate::output::trim_decimal;
use crate::scanpath::Trajectory;
use crate::{Result, SCAN_COORD_PRECISION, SCAN_SCHEMA_VERSION};
use std::fmt::Write as _;
use std::path::Path;

/// Write one scan file.
pub fn write_scan_xml(
    path: &Path,
    layer_num: i32,
    config: &BuildConfig,
    trajectories: &[Trajectory],
) -> Result<()> {
    let mut out = String::new();
    out.push_str("<?xml version='1.0'?>\n");
    out.push_str("<!--Scan paths for one layer-->\n");
    out.push_str("<Layer>\n");

    write_header(&mut out, layer_num, config);
    write_velocity_profiles(&mut out, config);
    write_segment_styles(&mut out, config);

    // An empty trajectory list is omitted entirely rather than emitted as a
    // self-closing element.
    if !trajectories.is_empty() {
        out.push_str("\t<TrajectoryList>\n");
        for trajectory in trajectories {
            write_trajectory(&mut out, trajectory);
        }
        out.push_str("\t</TrajectoryList>\n");
    }

    out.push_str("</Layer>\n");
    std::fs::write(path, out)?;
    Ok(())
}

fn write_header(out: &mut String, layer_num: i32, config: &BuildConfig) {
    let thickness = config.general.layer_thickness_mm;
    out.push_str("\t<Header>\n");
    let _ = writeln!(out, "\t\t<SchemaVersion>{SCAN_SCHEMA_VERSION}</SchemaVersion>");
    let _ = writeln!(out, "\t\t<LayerNum>{layer_num}</LayerNum>");
    let _ = writeln!(out, "\t\t<LayerThickness>{}</LayerThickness>", trim_decimal(thickness));
    // Constant slice thickness, so cumulative height is a multiple of it.
    let _ = writeln!(
        out,
        "\t\t<AbsoluteHeight>{}</AbsoluteHeight>",
        trim_decimal(thickness * layer_num as f64)
    );
    let _ = writeln!(
        out,
        "\t\t<DosingFactor>{}</DosingFactor>",
        trim_decimal(config.general.dosing_factor)
    );
    let _ = writeln!(
        out,
        "\t\t<BuildDescription>{}</BuildDescription>",
        config.general.project_folder
    );
    out.push_str("\t</Header>\n");
}

fn write_velocity_profiles(out: &mut String, config: &BuildConfig) {
    let integer_ids = config.general.integer_ids;
    out.push_str("\t<VelocityProfileList>\n");
    for vp in config.velocity_profiles.iter().filter(|vp| vp.is_used) {
        write_velocity_profile(out, vp, integer_ids);
    }
    out.push_str("\t</VelocityProfileList>\n");
}

fn write_velocity_profile(out: &mut String, vp: &VelocityProfile, integer_ids: bool) {
    out.push_str("\t\t<VelocityProfile>\n");
    if integer_ids {
        let _ = writeln!(out, "\t\t\t<ID>{}</ID>", vp.integer_id);
    } else {
        let _ = writeln!(out, "\t\t\t<ID>{}</ID>", vp.id);
    }
    let _ = writeln!(out, "\t\t\t<Velocity>{}</Velocity>", trim_decimal(vp.velocity));
    let _ = writeln!(out, "\t\t\t<Mode>{}</Mode>", vp.mode);
    let _ = writeln!(out, "\t\t\t<LaserOnDelay>{}</LaserOnDelay>", trim_decimal(vp.laser_on_delay));
    let _ = writeln!(
        out,
        "\t\t\t<LaserOffDelay>{}</LaserOffDelay>",
        trim_decimal(vp.laser_off_delay)
    );
    let _ = writeln!(out, "\t\t\t<JumpDelay>{}</JumpDelay>", trim_decimal(vp.jump_delay));
    let _ = writeln!(out, "\t\t\t<MarkDelay>{}</MarkDelay>", trim_decimal(vp.mark_delay));
    let _ = writeln!(
        out,
        "\t\t\t<PolygonDelay>{}</PolygonDelay>",
        trim_decimal(vp.polygon_delay)
    );
    out.push_str("\t\t</VelocityProfile>\n");
}

fn write_segment_styles(out: &mut String, config: &BuildConfig) {
    let integer_ids = config.general.integer_ids;
    out.push_str("\t<SegmentStyleList>\n");
    for style in config.segment_styles.iter().filter(|s| s.is_used) {
        write_segment_style(out, style, integer_ids);
    }
    out.push_str("\t</SegmentStyleList>\n");
}

fn write_segment_style(out: &mut String, style: &SegmentStyle, integer_ids: bool) {
    out.push_str("\t\t<SegmentStyle>\n");
    if integer_ids {
        let _ = writeln!(out, "\t\t\t<ID>{}</ID>", style.integer_id);
        let _ = writeln!(
            out,
            "\t\t\t<VelocityProfileID>{}</VelocityProfileID>",
            style.velocity_profile_int_id
        );
    } else {
        let _ = writeln!(out, "\t\t\t<ID>{}</ID>", style.id);
        let _ = writeln!(
            out,
            "\t\t\t<VelocityProfileID>{}</VelocityProfileID>",
            style.velocity_profile
        );
    }
    if !style.laser_mode.is_empty() {
        let _ = writeln!(out, "\t\t\t<LaserMode>{}</LaserMode>", style.laser_mode);
    }
    if let Some(traveler) = &style.lead_laser {
        write_traveler(out, traveler);
    }
    if let Some(traveler) = &style.trail_laser {
        write_traveler(out, traveler);
    }
    out.push_str("\t\t</SegmentStyle>\n");
}

fn write_traveler(out: &mut String, traveler: &Traveler) {
    out.push_str("\t\t\t<Traveler>\n");
    let _ = writeln!(out, "\t\t\t\t<ID>{}</ID>", traveler.id);
    let _ = writeln!(out, "\t\t\t\t<SyncDelay>{}</SyncDelay>", trim_decimal(traveler.sync_delay));
    let _ = writeln!(out, "\t\t\t\t<Power>{}</Power>", trim_decimal(traveler.power));
    let _ = writeln!(out, "\t\t\t\t<SpotSize>{}</SpotSize>", trim_decimal(traveler.spot_size));
    if let Some(wobble) = &traveler.wobble {
        out.push_str("\t\t\t\t<Wobble>\n");
        out.push_str("\t\t\t\t\t<On>1</On>\n");
        let _ = writeln!(out, "\t\t\t\t\t<Freq>{}</Freq>", trim_decimal(wobble.frequency));
        let _ = writeln!(out, "\t\t\t\t\t<Shape>{}</Shape>", wobble.shape);
        let _ = writeln!(out, "\t\t\t\t\t<TransAmp>{}</TransAmp>", trim_decimal(wobble.trans_amp));
        let _ = writeln!(out, "\t\t\t\t\t<LongAmp>{}</LongAmp>", trim_decimal(wobble.long_amp));
        out.push_str("\t\t\t\t</Wobble>\n");
    }
    out.push_str("\t\t\t</Traveler>\n");
}

fn write_trajectory(out: &mut String, trajectory: &Trajectory) {
    let p = SCAN_COORD_PRECISION;
    out.push_str("\t\t<Trajectory>\n");
    let _ = writeln!(out, "\t\t\t<TrajectoryID>{}</TrajectoryID>", trajectory.number);
    let _ = writeln!(
        out,
        "\t\t\t<PathProcessingMode>{}</PathProcessingMode>",
        trajectory.mode.as_str()
    );
    for path in &trajectory.paths {
        let Some(first) = path.segments.first() else {
            continue;
        };
        out.push_str("\t\t\t<Path>\n");
        let _ = writeln!(out, "\t\t\t\t<Type>{}</Type>", path.kind.as_str());
        let _ = writeln!(out, "\t\t\t\t<Tag>{}</Tag>", path.tag);
        let _ = writeln!(out, "\t\t\t\t<NumSegments>{}</NumSegments>", path.segments.len());
        let _ = writeln!(out, "\t\t\t\t<SkyWritingMode>{}</SkyWritingMode>", path.sky_writing);
        out.push_str("\t\t\t\t<Start>\n");
        let _ = writeln!(out, "\t\t\t\t\t<X>{:.p$}</X>", first.start.x);
        let _ = writeln!(out, "\t\t\t\t\t<Y>{:.p$}</Y>", first.start.y);
        out.push_str("\t\t\t\t</Start>\n");
        for segment in &path.segments {
            out.push_str("\t\t\t\t<Segment>\n");
            let _ = writeln!(out, "\t\t\t\t\t<SegStyle>{}</SegStyle>", segment.style);
            out.push_str("\t\t\t\t\t<End>\n");
            let _ = writeln!(out, "\t\t\t\t\t\t<X>{:.p$}</X>", segment.end.x);
            let _ = writeln!(out, "\t\t\t\t\t\t<Y>{:.p$}</Y>", segment.end.y);
            out.push_str("\t\t\t\t\t</End>\n");
            out.push_str("\t\t\t\t</Segment>\n");
        }
        out.push_str("\t\t\t</Path>\n");
    }
    out.push_str("\t\t</Trajectory>\n");
}
