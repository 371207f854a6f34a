//! Dynamic font-size fitting.
//!
//! Starting at the requested size, the fitter walks downward in fixed steps
//! and accepts the first (largest) size whose measured width fits the box.
//! If nothing fits by the floor, the floor is returned and the text is
//! allowed to overflow; overflow is an accepted outcome, not an error.

use super::ResolvedFont;

/// Smallest size the fitter will choose.
pub const MIN_FONT_SIZE: f32 = 8.0;

/// Size decrement per scan step, in points.
pub const FIT_STEP: f32 = 1.0;

/// Returns the largest size in `[MIN_FONT_SIZE, starting_size]` at which
/// `text` measures no wider than `max_width`, or `MIN_FONT_SIZE` when every
/// candidate overflows. Identical inputs always produce the identical size.
pub fn fit_font_size(font: &ResolvedFont, text: &str, max_width: f32, starting_size: f32) -> f32 {
    let mut size = starting_size;
    while size > MIN_FONT_SIZE {
        if font.text_width(text, size) <= max_width {
            return size;
        }
        size -= FIT_STEP;
    }
    MIN_FONT_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fonts::FontCatalog;

    #[test]
    fn keeps_starting_size_when_text_already_fits() {
        let catalog = FontCatalog::bundled().unwrap();
        let font = catalog.resolve("Helvetica", false, false);
        let size = fit_font_size(font, "Ana", 500.0, 36.0);
        assert_eq!(size, 36.0);
    }

    #[test]
    fn shrinks_until_width_fits() {
        let catalog = FontCatalog::bundled().unwrap();
        let font = catalog.resolve("Helvetica", false, false);
        let text = "A Rather Long Participant Name";
        let max_width = 200.0;
        let size = fit_font_size(font, text, max_width, 48.0);
        assert!(size < 48.0);
        assert!(size >= MIN_FONT_SIZE);
        // The chosen size fits; one step larger would not.
        assert!(font.text_width(text, size) <= max_width);
        assert!(font.text_width(text, size + FIT_STEP) > max_width);
    }

    #[test]
    fn returns_floor_when_nothing_fits() {
        let catalog = FontCatalog::bundled().unwrap();
        let font = catalog.resolve("Helvetica", false, false);
        let size = fit_font_size(font, "An Impossibly Long Name For A Tiny Box", 10.0, 48.0);
        assert_eq!(size, MIN_FONT_SIZE);
    }

    #[test]
    fn fitting_is_deterministic() {
        let catalog = FontCatalog::bundled().unwrap();
        let font = catalog.resolve("Georgia", true, false);
        let a = fit_font_size(font, "Maria del Carmen", 180.0, 40.0);
        let b = fit_font_size(font, "Maria del Carmen", 180.0, 40.0);
        assert_eq!(a, b);
    }
}
