//! Artifact emission: layer XML, scan XML and SVG views.
//!
//! All markup is formatted directly into strings. The schemas are flat and
//! fixed, and every file is both written and (for layer files) read back by
//! this crate, so a rigid text representation beats dragging in a DOM.

pub mod layer;
pub mod scan;
pub mod svg;

use crate::CoordF;

/// Format a float the way the scan schema expects scalar fields: fixed
/// notation with trailing zeros (and a trailing dot) trimmed, so `1.5`
/// stays `1.5` and `3.0` becomes `3`.
pub fn trim_decimal(value: CoordF) -> String {
    let mut s = format!("{value:.15}");
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    s
}

/// File stem for layer artifacts, zero-padded to the width of the build's
/// total layer count: `layer_007` in a 3-digit build.
pub fn layer_file_stem(layer_num: i32, total_layers: i32) -> String {
    let width = total_layers.to_string().len();
    format!("layer_{layer_num:0width$}")
}

/// Scan counterpart of [`layer_file_stem`].
pub fn scan_file_stem(layer_num: i32, total_layers: i32) -> String {
    let width = total_layers.to_string().len();
    format!("scan_{layer_num:0width$}")
}

/// Text of the first `<tag>...</tag>` element inside `block`, if any.
pub(crate) fn element_text<'a>(block: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = block.find(&open)? + open.len();
    let rest = &block[start..];
    let end = rest.find(&close)?;
    Some(rest[..end].trim())
}

/// Inner text of every `<tag>...</tag>` element inside `block`, in order.
/// Elements of the same name must not nest (none of our schemas nest them).
pub(crate) fn element_blocks<'a>(block: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut out = Vec::new();
    let mut rest = block;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else {
            break;
        };
        out.push(&after[..end]);
        rest = &after[end + close.len()..];
    }
    out
}
