//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::Fit;

/// Width produced by a `scale` step: `source_width * factor`, rounded, at least 1px.
///
/// # Examples
/// ```
/// # use imgpipe::imaging::calculate_scaled_width;
/// assert_eq!(calculate_scaled_width(800, 0.5), 400);
/// assert_eq!(calculate_scaled_width(801, 0.5), 401);
/// ```
pub fn calculate_scaled_width(source_width: u32, factor: f64) -> u32 {
    (source_width as f64 * factor).round().max(1.0) as u32
}

/// Fill in a missing resize dimension from the source aspect ratio.
///
/// With neither dimension given the source size is returned.
pub fn calculate_resize_box(
    source: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
) -> (u32, u32) {
    let (src_w, src_h) = source;
    match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, scale_edge(src_h, w, src_w)),
        (None, Some(h)) => (scale_edge(src_w, h, src_h), h),
        (None, None) => source,
    }
}

fn scale_edge(edge: u32, numerator: u32, denominator: u32) -> u32 {
    ((edge as f64 * numerator as f64 / denominator as f64).round() as u32).max(1)
}

/// Calculate dimensions needed to fill a target area (resize before crop).
///
/// Returns dimensions that completely cover the target area while maintaining
/// the source aspect ratio. One dimension will match exactly, the other may exceed.
pub fn calculate_fill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height will match, width will exceed
        let h = tgt_h;
        let w = ((h as f64 * src_aspect).round() as u32).max(1);
        (w, h)
    } else {
        // Source is taller: width will match, height will exceed
        let w = tgt_w;
        let h = ((w as f64 / src_aspect).round() as u32).max(1);
        (w, h)
    }
}

/// Calculate the largest dimensions that fit inside a target area.
///
/// The inverse of [`calculate_fill_dimensions`]: one dimension matches
/// exactly, the other may fall short.
pub fn calculate_fit_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        let w = tgt_w;
        let h = ((w as f64 / src_aspect).round() as u32).max(1);
        (w, h)
    } else {
        let h = tgt_h;
        let w = ((h as f64 * src_aspect).round() as u32).max(1);
        (w, h)
    }
}

/// Two-stage geometry of a resize: scale to `scaled`, then crop (cover) or
/// pad (contain) to `canvas`. For the other fits the two are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeGeometry {
    pub scaled: (u32, u32),
    pub canvas: (u32, u32),
}

/// Plan a resize of `source` into the requested box.
///
/// Returns `None` when `without_enlargement` is set and the resize would
/// upscale in either dimension; the image is then left as is.
pub fn plan_resize(
    source: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
    fit: Fit,
    without_enlargement: bool,
) -> Option<ResizeGeometry> {
    let target = calculate_resize_box(source, width, height);

    let geometry = match fit {
        Fit::Cover => ResizeGeometry {
            scaled: calculate_fill_dimensions(source, target),
            canvas: target,
        },
        Fit::Contain => ResizeGeometry {
            scaled: calculate_fit_dimensions(source, target),
            canvas: target,
        },
        Fit::Fill => ResizeGeometry {
            scaled: target,
            canvas: target,
        },
        Fit::Inside => {
            let fit = calculate_fit_dimensions(source, target);
            ResizeGeometry {
                scaled: fit,
                canvas: fit,
            }
        }
        Fit::Outside => {
            let fill = calculate_fill_dimensions(source, target);
            ResizeGeometry {
                scaled: fill,
                canvas: fill,
            }
        }
    };

    if without_enlargement && (geometry.scaled.0 > source.0 || geometry.scaled.1 > source.1) {
        return None;
    }
    Some(geometry)
}

/// Offset that centres `inner` within `outer` (saturating at zero).
pub fn centre_offset(outer: (u32, u32), inner: (u32, u32)) -> (u32, u32) {
    (
        outer.0.saturating_sub(inner.0) / 2,
        outer.1.saturating_sub(inner.1) / 2,
    )
}
