//! TrueType embedding for the render surface.
//!
//! Fonts are embedded as simple fonts with a WinAnsi encoding: a Widths
//! array built from the face's real advances, a FontDescriptor carrying the
//! scaled vertical metrics, and the raw TrueType program as FontFile2.

use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::services::fonts::ResolvedFont;

/// Adds the font program, descriptor and font dictionary for `font` to
/// `doc`, returning the font dictionary's object id for use in a page's
/// resource table.
pub fn embed_truetype(doc: &mut Document, font: &ResolvedFont) -> ObjectId {
    let face = font.face();
    let upem = font.units_per_em();
    let glyph_space = |v: f32| f64::from((v * 1000.0 / upem).round()) as i64;

    let font_file_id = doc.add_object(Stream::new(
        dictionary! { "Length1" => font.data().len() as i64 },
        font.data().to_vec(),
    ));

    let bbox = face.global_bounding_box();
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => font.postscript_name(),
        // Nonsymbolic.
        "Flags" => 32,
        "FontBBox" => vec![
            glyph_space(f32::from(bbox.x_min)).into(),
            glyph_space(f32::from(bbox.y_min)).into(),
            glyph_space(f32::from(bbox.x_max)).into(),
            glyph_space(f32::from(bbox.y_max)).into(),
        ],
        "ItalicAngle" => if face.is_italic() { -11 } else { 0 },
        "Ascent" => glyph_space(f32::from(face.ascender())),
        "Descent" => glyph_space(f32::from(face.descender())),
        "CapHeight" => glyph_space(f32::from(face.capital_height().unwrap_or(face.ascender()))),
        "StemV" => 80,
        "MissingWidth" => 500,
        "FontFile2" => font_file_id,
    });

    // Widths for the byte range we encode (Latin-1). Codes without a glyph
    // fall back to the declared MissingWidth at draw time.
    let widths: Vec<Object> = (32u32..=255)
        .map(|code| {
            let width = char::from_u32(code)
                .and_then(|c| face.glyph_index(c))
                .and_then(|id| face.glyph_hor_advance(id))
                .map(|adv| glyph_space(f32::from(adv)))
                .unwrap_or(500);
            width.into()
        })
        .collect();

    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "TrueType",
        "BaseFont" => font.postscript_name(),
        "FirstChar" => 32,
        "LastChar" => 255,
        "Widths" => widths,
        "FontDescriptor" => descriptor_id,
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Lossy Latin-1 encoding for the simple-font text operators. Characters
/// outside the byte range degrade to `?` rather than failing the draw.
pub fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_passes_through_and_others_degrade() {
        assert_eq!(encode_text("Ana"), b"Ana".to_vec());
        assert_eq!(encode_text("José"), vec![b'J', b'o', b's', 0xE9]);
        assert_eq!(encode_text("名前"), b"??".to_vec());
    }
}
