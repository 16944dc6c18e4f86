//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Largest size with the source aspect ratio that fits inside `bounds`.
///
/// Scales up as well as down, matching ImageMagick's plain `WxH` geometry.
/// Each output edge is at least one pixel.
///
/// # Examples
/// ```
/// # use qrss_plus::imaging::fit_within;
/// assert_eq!(fit_within((1000, 600), (250, 150)), (250, 150));
/// assert_eq!(fit_within((1000, 200), (250, 150)), (250, 50));
/// ```
pub fn fit_within(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = (source.0.max(1) as f64, source.1.max(1) as f64);
    let (max_w, max_h) = (bounds.0 as f64, bounds.1 as f64);

    let scale = (max_w / src_w).min(max_h / src_h);
    let w = (src_w * scale).round().max(1.0) as u32;
    let h = (src_h * scale).round().max(1.0) as u32;
    (w.min(bounds.0.max(1)), h.min(bounds.1.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_same_aspect() {
        assert_eq!(fit_within((1000, 600), (250, 150)), (250, 150));
    }

    #[test]
    fn fit_wide_source_is_width_bound() {
        assert_eq!(fit_within((1000, 200), (250, 150)), (250, 50));
    }

    #[test]
    fn fit_tall_source_is_height_bound() {
        assert_eq!(fit_within((300, 600), (250, 150)), (75, 150));
    }

    #[test]
    fn fit_scales_small_sources_up() {
        assert_eq!(fit_within((100, 60), (250, 150)), (250, 150));
    }

    #[test]
    fn fit_extreme_strip_keeps_one_pixel() {
        assert_eq!(fit_within((10000, 1), (250, 150)), (250, 1));
    }

    #[test]
    fn fit_degenerate_source() {
        assert_eq!(fit_within((0, 0), (250, 150)), (150, 150));
    }
}
