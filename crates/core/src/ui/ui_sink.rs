use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scan::attribute_estimator::AttributeResult;
use crate::shared::face_region::FaceRegion;
use crate::upload::photo_upload::UploadPreview;

/// The top-level screens. Exactly one is visible at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UiSection {
    #[default]
    MainMenu,
    FaceScan,
    Hairstyles,
}

impl fmt::Display for UiSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UiSection::MainMenu => "main menu",
            UiSection::FaceScan => "face scan",
            UiSection::Hairstyles => "hairstyles",
        })
    }
}

/// Everything the scan flow renders.
///
/// Implementations only display; they never call back into the flow.
pub trait UiSink: Send {
    fn show_section(&mut self, section: UiSection);

    /// Fills the four attribute label slots.
    fn publish_attributes(&mut self, attributes: &AttributeResult);

    /// Draws at most one rectangle over the live video. `None` clears it.
    fn draw_overlay(&mut self, region: Option<&FaceRegion>);

    fn show_notification(&mut self, message: &str);

    fn dismiss_notification(&mut self);

    fn show_upload_preview(&mut self, _preview: &UploadPreview) {}

    fn show_style_preview(&mut self, _style: &str) {}
}
