use crate::model::placement::PlacementSpec;
use serde::{Deserialize, Serialize};

/// Raster format of an image-backed template surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageKind {
    Png,
    Jpeg,
}

/// The kind of background surface a template renders over, decided once at
/// ingestion time and carried as an explicit tag from then on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceKind {
    /// A PDF whose first page is used directly as the render surface.
    Pdf,
    /// A raster image promoted to a single PDF page at render time.
    Image(ImageKind),
}

impl SurfaceKind {
    pub fn tag(&self) -> &'static str {
        match self {
            SurfaceKind::Pdf => "pdf",
            SurfaceKind::Image(ImageKind::Png) => "png",
            SurfaceKind::Image(ImageKind::Jpeg) => "jpeg",
        }
    }

    pub fn from_tag(tag: &str) -> Option<SurfaceKind> {
        match tag {
            "pdf" => Some(SurfaceKind::Pdf),
            "png" => Some(SurfaceKind::Image(ImageKind::Png)),
            "jpeg" => Some(SurfaceKind::Image(ImageKind::Jpeg)),
            _ => None,
        }
    }
}

/// A certificate template: background surface plus authored text placement.
/// Created by an administrator; read-only to the engine and immutable for
/// the duration of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub display_name: String,
    pub categories: Vec<String>,
    pub surface_kind: SurfaceKind,
    /// Durable-storage key of the source surface, when it has been uploaded.
    pub surface_key: Option<String>,
    pub placement: PlacementSpec,
}
