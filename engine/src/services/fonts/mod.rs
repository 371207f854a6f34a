//! Font resolution over the bundled DejaVu faces.
//!
//! Resolution is total: any requested family name maps to one of the three
//! bundled catalog families, unknown names fall back to the sans family,
//! and display families that are inherently bold (Impact and friends)
//! always resolve to the bold variant regardless of the requested flags.
//! Same inputs always yield the same face; there is no error path.

pub mod fit;

use ttf_parser::Face;

use crate::error::{EngineError, Result};

/// The catalog families a logical font-family request can land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FamilyClass {
    Sans,
    Serif,
    Mono,
    /// Display families whose semantic weight is bold; the requested bold
    /// flag is ignored and the bold variant is always used.
    DisplayBold,
}

fn classify_family(family: &str) -> FamilyClass {
    match family.trim().to_ascii_lowercase().as_str() {
        "times" | "times new roman" | "georgia" | "garamond" | "palatino" | "serif" => {
            FamilyClass::Serif
        }
        "courier" | "courier new" | "consolas" | "monaco" | "monospace" => FamilyClass::Mono,
        "impact" | "arial black" | "haettenschweiler" => FamilyClass::DisplayBold,
        // Helvetica, Arial, Verdana, Tahoma and anything unrecognized.
        _ => FamilyClass::Sans,
    }
}

/// A concrete embeddable font: PostScript name, raw TrueType bytes and the
/// parsed face used for metric queries.
pub struct ResolvedFont {
    postscript_name: &'static str,
    data: &'static [u8],
    face: Face<'static>,
}

impl ResolvedFont {
    fn load(postscript_name: &'static str, data: &'static [u8]) -> Result<ResolvedFont> {
        let face = Face::parse(data, 0)
            .map_err(|e| EngineError::Render(format!("bundled font {postscript_name}: {e}")))?;
        Ok(ResolvedFont { postscript_name, data, face })
    }

    pub fn postscript_name(&self) -> &'static str {
        self.postscript_name
    }

    pub fn data(&self) -> &'static [u8] {
        self.data
    }

    pub fn face(&self) -> &Face<'static> {
        &self.face
    }

    pub fn units_per_em(&self) -> f32 {
        f32::from(self.face.units_per_em())
    }

    /// Horizontal advance of `c` in font units. Characters without a glyph
    /// measure as the replacement `?` they will render as.
    pub fn char_advance(&self, c: char) -> f32 {
        let glyph = self
            .face
            .glyph_index(c)
            .or_else(|| self.face.glyph_index('?'));
        match glyph {
            Some(id) => f32::from(self.face.glyph_hor_advance(id).unwrap_or(0)),
            None => 0.0,
        }
    }

    /// Width of `text` in surface units when set at `font_size` points.
    pub fn text_width(&self, text: &str, font_size: f32) -> f32 {
        let units: f32 = text.chars().map(|c| self.char_advance(c)).sum();
        units * font_size / self.units_per_em()
    }
}

macro_rules! bundled {
    ($name:literal, $file:literal) => {
        ResolvedFont::load($name, include_bytes!(concat!("../../../fonts/", $file)))
    };
}

/// The full set of embeddable faces, parsed once per catalog.
pub struct FontCatalog {
    // [regular, bold, italic, bold-italic] per family.
    sans: [ResolvedFont; 4],
    serif: [ResolvedFont; 4],
    mono: [ResolvedFont; 4],
}

impl FontCatalog {
    /// Parses the bundled DejaVu faces. Only fails if the bundled bytes are
    /// corrupt, which would be a packaging defect.
    pub fn bundled() -> Result<FontCatalog> {
        Ok(FontCatalog {
            sans: [
                bundled!("DejaVuSans", "DejaVuSans.ttf")?,
                bundled!("DejaVuSans-Bold", "DejaVuSans-Bold.ttf")?,
                bundled!("DejaVuSans-Oblique", "DejaVuSans-Oblique.ttf")?,
                bundled!("DejaVuSans-BoldOblique", "DejaVuSans-BoldOblique.ttf")?,
            ],
            serif: [
                bundled!("DejaVuSerif", "DejaVuSerif.ttf")?,
                bundled!("DejaVuSerif-Bold", "DejaVuSerif-Bold.ttf")?,
                bundled!("DejaVuSerif-Italic", "DejaVuSerif-Italic.ttf")?,
                bundled!("DejaVuSerif-BoldItalic", "DejaVuSerif-BoldItalic.ttf")?,
            ],
            mono: [
                bundled!("DejaVuSansMono", "DejaVuSansMono.ttf")?,
                bundled!("DejaVuSansMono-Bold", "DejaVuSansMono-Bold.ttf")?,
                bundled!("DejaVuSansMono-Oblique", "DejaVuSansMono-Oblique.ttf")?,
                bundled!("DejaVuSansMono-BoldOblique", "DejaVuSansMono-BoldOblique.ttf")?,
            ],
        })
    }

    /// Maps a logical family plus style flags to a concrete face.
    pub fn resolve(&self, family: &str, bold: bool, italic: bool) -> &ResolvedFont {
        let (set, bold, italic) = match classify_family(family) {
            FamilyClass::Sans => (&self.sans, bold, italic),
            FamilyClass::Serif => (&self.serif, bold, italic),
            FamilyClass::Mono => (&self.mono, bold, italic),
            FamilyClass::DisplayBold => (&self.sans, true, italic),
        };
        &set[variant_index(bold, italic)]
    }
}

fn variant_index(bold: bool, italic: bool) -> usize {
    match (bold, italic) {
        (false, false) => 0,
        (true, false) => 1,
        (false, true) => 2,
        (true, true) => 3,
    }
}
