//! Mapping from preview-canvas coordinates to render-surface coordinates.
//!
//! Placements are authored on a preview canvas with the origin at the
//! top-left. Image-origin surfaces may differ in size from that canvas and
//! render into PDF space with the origin at the bottom-left, so X scales,
//! Y scales and flips, and font sizes scale by the smaller axis factor to
//! avoid distortion. PDF-origin surfaces are authored directly in PDF
//! space, so the mapping is the identity with no flip.

/// A pure mapping from authored coordinates to output-surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceMap {
    /// PDF-native template: coordinates pass through untouched.
    Identity,
    /// Image template: independent axis scales plus the vertical flip.
    Scaled {
        scale_x: f32,
        scale_y: f32,
        out_height: f32,
    },
}

impl SurfaceMap {
    /// Mapping for an image-origin surface of `output` pixels whose
    /// placement was authored against a `canvas_width` × `canvas_height`
    /// preview.
    pub fn for_image(canvas_width: f32, canvas_height: f32, output: (f32, f32)) -> SurfaceMap {
        let (out_width, out_height) = output;
        SurfaceMap::Scaled {
            scale_x: out_width / canvas_width,
            scale_y: out_height / canvas_height,
            out_height,
        }
    }

    /// Mapping for a PDF-native surface.
    pub fn for_pdf() -> SurfaceMap {
        SurfaceMap::Identity
    }

    pub fn map_x(&self, x: f32) -> f32 {
        match *self {
            SurfaceMap::Identity => x,
            SurfaceMap::Scaled { scale_x, .. } => x * scale_x,
        }
    }

    /// Maps an authored (top-down) Y to the output (bottom-up) Y. Identity
    /// mappings use Y as authored: PDF templates are placed in PDF space.
    pub fn map_y(&self, y: f32) -> f32 {
        match *self {
            SurfaceMap::Identity => y,
            SurfaceMap::Scaled { scale_y, out_height, .. } => out_height - y * scale_y,
        }
    }

    /// Scales an authored font size by the smaller axis factor.
    pub fn map_font_size(&self, size: f32) -> f32 {
        match *self {
            SurfaceMap::Identity => size,
            SurfaceMap::Scaled { scale_x, scale_y, .. } => size * scale_x.min(scale_y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubled_output_scales_and_flips() {
        // Canvas 800x600, output 1600x1200: 2x on both axes.
        let map = SurfaceMap::for_image(800.0, 600.0, (1600.0, 1200.0));
        assert_eq!(map.map_font_size(36.0), 72.0);
        assert_eq!(map.map_y(400.0), 1200.0 - 400.0 * 2.0);
        assert_eq!(map.map_x(100.0), 200.0);
    }

    #[test]
    fn equal_dimensions_leave_x_untouched_and_only_flip_y() {
        let map = SurfaceMap::for_image(800.0, 600.0, (800.0, 600.0));
        assert_eq!(map.map_x(123.0), 123.0);
        assert_eq!(map.map_font_size(30.0), 30.0);
        assert_eq!(map.map_y(100.0), 500.0);
    }

    #[test]
    fn pdf_mapping_is_the_identity_with_no_flip() {
        let map = SurfaceMap::for_pdf();
        assert_eq!(map.map_x(72.0), 72.0);
        assert_eq!(map.map_y(72.0), 72.0);
        assert_eq!(map.map_font_size(18.0), 18.0);
    }

    #[test]
    fn mapping_is_pure() {
        let map = SurfaceMap::for_image(640.0, 480.0, (1000.0, 500.0));
        assert_eq!(map.map_y(200.0), map.map_y(200.0));
        // Non-uniform scale: size uses the smaller factor.
        assert_eq!(map.map_font_size(40.0), 40.0 * (500.0f32 / 480.0).min(1000.0 / 640.0));
    }
}
