//! Certificate rendering: draws a participant name and certificate ID onto
//! a template surface and returns the composed single-page PDF.
//!
//! PDF templates keep their first page as the render surface; raster
//! templates are promoted to a fresh page sized exactly to their pixel
//! dimensions with the image drawn full-bleed behind the text. The name is
//! auto-fit to 80% of the surface width and centered; the certificate ID is
//! placed at its authored position with no fitting.

pub mod coords;
pub mod pdf_font;

use image::GenericImageView;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use common::model::placement::{PlacementSpec, RgbColor, TextElementSpec};
use common::model::template::SurfaceKind;

use crate::error::{EngineError, Result};
use crate::services::fonts::fit::fit_font_size;
use crate::services::fonts::{FontCatalog, ResolvedFont};
use coords::SurfaceMap;
use pdf_font::{embed_truetype, encode_text};

/// Fraction of the surface width the participant name may occupy.
pub const NAME_WIDTH_RATIO: f32 = 0.8;

/// Resource names for the fonts this renderer adds to a page. Prefixed to
/// stay clear of whatever the template already declares.
const NAME_FONT_RES: &str = "CGF1";
const ID_FONT_RES: &str = "CGF2";

/// Outcome of rendering one certificate. `storage_key` and `local_path`
/// are filled in by the orchestrator once the bytes land somewhere.
#[derive(Debug, Clone)]
pub struct RenderResult {
    pub bytes: Vec<u8>,
    pub storage_key: Option<String>,
    pub local_path: Option<String>,
    /// The name font size actually drawn, after auto-fit.
    pub effective_font_size: f32,
}

struct TextLayout {
    name_x: f32,
    name_y: f32,
    name_size: f32,
    id_x: f32,
    id_y: f32,
    id_size: f32,
}

pub struct TemplateRenderer<'a> {
    fonts: &'a FontCatalog,
}

impl<'a> TemplateRenderer<'a> {
    pub fn new(fonts: &'a FontCatalog) -> TemplateRenderer<'a> {
        TemplateRenderer { fonts }
    }

    /// Renders one certificate over `surface`. Unreadable surface bytes are
    /// a render error isolated to this participant; font fallback and text
    /// overflow degrade gracefully instead of failing.
    pub fn render(
        &self,
        surface: &[u8],
        kind: SurfaceKind,
        name: &str,
        certificate_id: &str,
        spec: &PlacementSpec,
    ) -> Result<RenderResult> {
        match kind {
            SurfaceKind::Pdf => self.render_over_pdf(surface, name, certificate_id, spec),
            SurfaceKind::Image(_) => self.render_over_image(surface, name, certificate_id, spec),
        }
    }

    fn resolve(&self, element: &TextElementSpec) -> &ResolvedFont {
        self.fonts.resolve(&element.font_family, element.bold, element.italic)
    }

    fn compute_layout(
        &self,
        name: &str,
        spec: &PlacementSpec,
        surface_width: f32,
        map: &SurfaceMap,
    ) -> TextLayout {
        let name_font = self.resolve(&spec.name);

        // The name never carries an authored X: fit first, then center.
        let base_size = map.map_font_size(spec.name.font_size);
        let max_width = surface_width * NAME_WIDTH_RATIO;
        let name_size = fit_font_size(name_font, name, max_width, base_size);
        let name_width = name_font.text_width(name, name_size);

        TextLayout {
            name_x: (surface_width - name_width) / 2.0,
            name_y: map.map_y(spec.name.y),
            name_size,
            id_x: map.map_x(spec.certificate_id.x.unwrap_or(0.0)),
            id_y: map.map_y(spec.certificate_id.y),
            id_size: map.map_font_size(spec.certificate_id.font_size),
        }
    }

    fn text_operations(
        &self,
        layout: &TextLayout,
        name: &str,
        certificate_id: &str,
        spec: &PlacementSpec,
    ) -> Vec<Operation> {
        let mut ops = Vec::new();
        push_text(
            &mut ops,
            NAME_FONT_RES,
            layout.name_size,
            spec.name.color,
            layout.name_x,
            layout.name_y,
            name,
        );
        push_text(
            &mut ops,
            ID_FONT_RES,
            layout.id_size,
            spec.certificate_id.color,
            layout.id_x,
            layout.id_y,
            certificate_id,
        );
        ops
    }

    fn render_over_pdf(
        &self,
        surface: &[u8],
        name: &str,
        certificate_id: &str,
        spec: &PlacementSpec,
    ) -> Result<RenderResult> {
        let mut doc = Document::load_mem(surface)
            .map_err(|e| EngineError::Render(format!("unreadable template PDF: {e}")))?;
        let page_id = *doc
            .get_pages()
            .values()
            .next()
            .ok_or_else(|| EngineError::Render("template PDF has no pages".into()))?;
        let (width, _height) = media_box_size(&doc, page_id);

        // PDF templates are authored in the surface's own coordinate space.
        let map = SurfaceMap::for_pdf();
        let layout = self.compute_layout(name, spec, width, &map);

        let name_font_id = embed_truetype(&mut doc, self.resolve(&spec.name));
        let id_font_id = embed_truetype(&mut doc, self.resolve(&spec.certificate_id));

        let content = Content { operations: self.text_operations(&layout, name, certificate_id, spec) };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().map_err(render_err)?,
        ));

        // Shadow the (possibly inherited) resource table with a copy that
        // also carries our fonts, so the background keeps resolving.
        let mut resources = effective_resources(&doc, page_id);
        let mut font_table = match resources.get(b"Font") {
            Ok(obj) => resolve_dict(&doc, obj).cloned().unwrap_or_default(),
            Err(_) => Dictionary::new(),
        };
        font_table.set(NAME_FONT_RES, name_font_id);
        font_table.set(ID_FONT_RES, id_font_id);
        resources.set("Font", Object::Dictionary(font_table));

        let page = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(render_err)?;
        let contents = match page.get(b"Contents") {
            Ok(Object::Reference(existing)) => {
                Object::Array(vec![Object::Reference(*existing), content_id.into()])
            }
            Ok(Object::Array(existing)) => {
                let mut streams = existing.clone();
                streams.push(content_id.into());
                Object::Array(streams)
            }
            _ => content_id.into(),
        };
        page.set("Contents", contents);
        page.set("Resources", Object::Dictionary(resources));

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| EngineError::Render(e.to_string()))?;
        Ok(RenderResult {
            bytes,
            storage_key: None,
            local_path: None,
            effective_font_size: layout.name_size,
        })
    }

    fn render_over_image(
        &self,
        surface: &[u8],
        name: &str,
        certificate_id: &str,
        spec: &PlacementSpec,
    ) -> Result<RenderResult> {
        let img = image::load_from_memory(surface)
            .map_err(|e| EngineError::Render(format!("unreadable template image: {e}")))?;
        let (px_width, px_height) = img.dimensions();
        let (width, height) = (px_width as f32, px_height as f32);

        // The page is sized to the image, which may differ from the preview
        // canvas the placement was authored on.
        let map = SurfaceMap::for_image(spec.canvas_width, spec.canvas_height, (width, height));
        let layout = self.compute_layout(name, spec, width, &map);

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let image_id = doc.add_object(background_xobject(surface, &img));
        let name_font_id = embed_truetype(&mut doc, self.resolve(&spec.name));
        let id_font_id = embed_truetype(&mut doc, self.resolve(&spec.certificate_id));

        let mut operations = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![width.into(), 0.into(), 0.into(), height.into(), 0.into(), 0.into()],
            ),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
        ];
        operations.extend(self.text_operations(&layout, name, certificate_id, spec));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().map_err(render_err)?,
        ));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
                "Font" => dictionary! {
                    NAME_FONT_RES => name_font_id,
                    ID_FONT_RES => id_font_id,
                },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| EngineError::Render(e.to_string()))?;
        Ok(RenderResult {
            bytes,
            storage_key: None,
            local_path: None,
            effective_font_size: layout.name_size,
        })
    }
}

fn render_err(e: lopdf::Error) -> EngineError {
    EngineError::Render(e.to_string())
}

fn push_text(
    ops: &mut Vec<Operation>,
    font_res: &str,
    size: f32,
    color: RgbColor,
    x: f32,
    y: f32,
    text: &str,
) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font_res.into(), size.into()]));
    ops.push(Operation::new(
        "rg",
        vec![
            (f32::from(color.r) / 255.0).into(),
            (f32::from(color.g) / 255.0).into(),
            (f32::from(color.b) / 255.0).into(),
        ],
    ));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new(
        "Tj",
        vec![Object::String(encode_text(text), StringFormat::Literal)],
    ));
    ops.push(Operation::new("ET", vec![]));
}

/// The background image as a PDF XObject. JPEG bytes pass through with a
/// DCTDecode filter; anything else is flattened to raw RGB8.
fn background_xobject(surface: &[u8], img: &image::DynamicImage) -> Stream {
    let (width, height) = img.dimensions();
    let is_jpeg = matches!(image::guess_format(surface), Ok(image::ImageFormat::Jpeg));
    if is_jpeg {
        let color_space = match img.color() {
            image::ColorType::L8 | image::ColorType::L16 => "DeviceGray",
            _ => "DeviceRGB",
        };
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(width),
                "Height" => i64::from(height),
                "ColorSpace" => color_space,
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            surface.to_vec(),
        )
    } else {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(width),
                "Height" => i64::from(height),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            img.to_rgb8().into_raw(),
        )
    }
}

fn as_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => doc.get_object(*id).ok().and_then(|o| o.as_dict().ok()),
        _ => None,
    }
}

/// Page MediaBox dimensions, following the Parent chain for inherited
/// boxes. Falls back to US Letter when the template omits one.
fn media_box_size(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let mut current = page_id;
    for _ in 0..16 {
        let Ok(dict) = doc.get_dictionary(current) else { break };
        if let Ok(obj) = dict.get(b"MediaBox") {
            let resolved = match obj {
                Object::Reference(id) => doc.get_object(*id).ok(),
                other => Some(other),
            };
            if let Some(values) = resolved.and_then(|o| o.as_array().ok()) {
                if values.len() == 4 {
                    let nums: Vec<f32> = values.iter().filter_map(as_number).collect();
                    if nums.len() == 4 {
                        return ((nums[2] - nums[0]).abs(), (nums[3] - nums[1]).abs());
                    }
                }
            }
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(id)) => current = *id,
            _ => break,
        }
    }
    (612.0, 792.0)
}

/// The resource table in effect for a page, resolved and cloned, walking
/// the Parent chain when the page inherits it.
fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut current = page_id;
    for _ in 0..16 {
        let Ok(dict) = doc.get_dictionary(current) else { break };
        if let Ok(obj) = dict.get(b"Resources") {
            if let Some(resources) = resolve_dict(doc, obj) {
                return resources.clone();
            }
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(id)) => current = *id,
            _ => break,
        }
    }
    Dictionary::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::model::template::ImageKind;
    use std::io::Cursor;

    fn placement() -> PlacementSpec {
        PlacementSpec {
            name: TextElementSpec {
                x: None,
                y: 400.0,
                font_size: 36.0,
                font_family: "Helvetica".into(),
                color: RgbColor { r: 20, g: 20, b: 20 },
                bold: true,
                italic: false,
            },
            certificate_id: TextElementSpec {
                x: Some(40.0),
                y: 560.0,
                font_size: 12.0,
                font_family: "Courier".into(),
                color: RgbColor { r: 90, g: 90, b: 90 },
                bold: false,
                italic: false,
            },
            canvas_width: 800.0,
            canvas_height: 600.0,
        }
    }

    fn png_surface(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([250, 245, 230]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn pdf_surface(width: f32, height: f32) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn renders_over_an_image_surface() {
        let catalog = FontCatalog::bundled().unwrap();
        let renderer = TemplateRenderer::new(&catalog);
        let surface = png_surface(800, 600);
        let result = renderer
            .render(
                &surface,
                SurfaceKind::Image(ImageKind::Png),
                "Amelia Vance",
                "CERT-20260829-AUG-00417",
                &placement(),
            )
            .unwrap();
        assert!(result.bytes.starts_with(b"%PDF"));
        assert!(result.effective_font_size <= 36.0);

        let reloaded = Document::load_mem(&result.bytes).unwrap();
        assert_eq!(reloaded.get_pages().len(), 1);
    }

    #[test]
    fn renders_over_a_pdf_surface() {
        let catalog = FontCatalog::bundled().unwrap();
        let renderer = TemplateRenderer::new(&catalog);
        let surface = pdf_surface(842.0, 595.0);
        let result = renderer
            .render(
                &surface,
                SurfaceKind::Pdf,
                "Bruno Keller",
                "CERT-20260829-AUG-00418",
                &placement(),
            )
            .unwrap();
        let reloaded = Document::load_mem(&result.bytes).unwrap();
        assert_eq!(reloaded.get_pages().len(), 1);
    }

    #[test]
    fn scaled_image_surface_scales_the_name_size() {
        let catalog = FontCatalog::bundled().unwrap();
        let renderer = TemplateRenderer::new(&catalog);
        // 2x the authored canvas on both axes; a short name should keep the
        // full pre-scaled size.
        let surface = png_surface(1600, 1200);
        let result = renderer
            .render(
                &surface,
                SurfaceKind::Image(ImageKind::Png),
                "Li Na",
                "CERT-20260829-AUG-00419",
                &placement(),
            )
            .unwrap();
        assert_eq!(result.effective_font_size, 72.0);
    }

    #[test]
    fn unreadable_surface_is_a_render_error() {
        let catalog = FontCatalog::bundled().unwrap();
        let renderer = TemplateRenderer::new(&catalog);
        let err = renderer
            .render(
                b"not a template",
                SurfaceKind::Pdf,
                "Nobody",
                "CERT-20260829-AUG-00420",
                &placement(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Render(_)));
    }
}
