use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::shared::face_region::FaceRegion;

/// Aspect ratios above this read as a round face.
pub const ROUND_RATIO: f64 = 0.9;

/// Aspect ratios below this read as an oval face.
pub const OVAL_RATIO: f64 = 0.75;

pub const FOREHEAD_LABEL: &str = "Medium";
pub const JAWLINE_LABEL: &str = "Defined";
pub const CHEEKBONES_LABEL: &str = "High";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FaceShape {
    Round,
    Oval,
    Square,
}

impl FaceShape {
    /// Classify `width / height`. Both thresholds fall into `Square`.
    pub fn from_aspect_ratio(ratio: f64) -> Self {
        if ratio > ROUND_RATIO {
            FaceShape::Round
        } else if ratio < OVAL_RATIO {
            FaceShape::Oval
        } else {
            FaceShape::Square
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FaceShape::Round => "Round",
            FaceShape::Oval => "Oval",
            FaceShape::Square => "Square",
        }
    }
}

impl fmt::Display for FaceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse descriptive labels for a scanned face.
///
/// Only the face shape depends on geometry; the other three are fixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AttributeResult {
    pub face_shape: FaceShape,
    pub forehead: &'static str,
    pub jawline: &'static str,
    pub cheekbones: &'static str,
}

impl AttributeResult {
    pub fn with_shape(face_shape: FaceShape) -> Self {
        Self {
            face_shape,
            forehead: FOREHEAD_LABEL,
            jawline: JAWLINE_LABEL,
            cheekbones: CHEEKBONES_LABEL,
        }
    }

    /// `(slot, value)` pairs in display order.
    pub fn labels(&self) -> [(&'static str, &'static str); 4] {
        [
            ("Face shape", self.face_shape.label()),
            ("Forehead", self.forehead),
            ("Jawline", self.jawline),
            ("Cheekbones", self.cheekbones),
        ]
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("malformed face region: {width}x{height}")]
pub struct MalformedRegion {
    pub width: f64,
    pub height: f64,
}

pub fn estimate(region: &FaceRegion) -> Result<AttributeResult, MalformedRegion> {
    let ratio = region.aspect_ratio().ok_or(MalformedRegion {
        width: region.width(),
        height: region.height(),
    })?;
    Ok(AttributeResult::with_shape(FaceShape::from_aspect_ratio(
        ratio,
    )))
}
