use std::fmt;
use std::io::{self, Write};

use facescan_core::scan::attribute_estimator::AttributeResult;
use facescan_core::shared::face_region::FaceRegion;
use facescan_core::ui::ui_sink::{UiSection, UiSink};
use facescan_core::upload::photo_upload::UploadPreview;

/// Renders the scan flow as plain text lines.
pub struct ConsoleUi<W: Write + Send = io::Stderr> {
    out: W,
}

impl ConsoleUi {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> ConsoleUi<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.out, "{args}") {
            log::debug!("Console output failed: {e}");
        }
    }
}

impl<W: Write + Send> UiSink for ConsoleUi<W> {
    fn show_section(&mut self, section: UiSection) {
        let title = match section {
            UiSection::MainMenu => "Main menu",
            UiSection::FaceScan => "Face scan",
            UiSection::Hairstyles => "Hairstyles for you",
        };
        self.line(format_args!("== {title} =="));
    }

    fn publish_attributes(&mut self, attributes: &AttributeResult) {
        for (slot, value) in attributes.labels() {
            self.line(format_args!("  {slot:<11} {value}"));
        }
    }

    fn draw_overlay(&mut self, region: Option<&FaceRegion>) {
        match region {
            Some(r) => self.line(format_args!(
                "  face at ({:.0}, {:.0})-({:.0}, {:.0})",
                r.top_left.0, r.top_left.1, r.bottom_right.0, r.bottom_right.1
            )),
            None => log::trace!("No face in frame"),
        }
    }

    fn show_notification(&mut self, message: &str) {
        self.line(format_args!("* {message}"));
    }

    fn dismiss_notification(&mut self) {}

    fn show_upload_preview(&mut self, preview: &UploadPreview) {
        self.line(format_args!(
            "  photo {} ({}x{})",
            preview.path.display(),
            preview.width,
            preview.height
        ));
    }

    fn show_style_preview(&mut self, style: &str) {
        self.line(format_args!("  Here's how you look with {style}"));
    }
}
