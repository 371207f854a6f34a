use serde::{Deserialize, Serialize};

/// An RGB color with 0–255 channels, as authored in the preview editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Placement of a single text element on the certificate surface.
///
/// Coordinates are expressed against the preview canvas dimensions recorded
/// in the owning [`PlacementSpec`], with the origin at the top-left (screen
/// convention). `x` is optional: the participant-name element is always
/// auto-centered and never carries one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElementSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    pub y: f32,
    /// Authored size in points. For the name element this is the upper
    /// bound handed to the auto-fit pass; for the certificate-ID element it
    /// is used as-is.
    pub font_size: f32,
    pub font_family: String,
    pub color: RgbColor,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
}

/// The authored text-placement configuration consumed from the browser
/// preview editor.
///
/// Wire shape (camelCase JSON):
/// `{ name: {...}, certificateId: {...}, canvasWidth, canvasHeight }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementSpec {
    pub name: TextElementSpec,
    pub certificate_id: TextElementSpec,
    /// Dimensions of the preview canvas the positions were authored against.
    pub canvas_width: f32,
    pub canvas_height: f32,
}
