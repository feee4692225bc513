use std::time::Duration;

/// Interval between detection polls while scanning.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Delay between publishing attributes and showing the hairstyle gallery.
pub const PRESENTATION_DELAY: Duration = Duration::from_millis(800);

/// How long a notification stays visible.
pub const NOTIFICATION_TTL: Duration = Duration::from_millis(3000);

/// Simulated analysis time for uploaded photos.
pub const UPLOAD_ANALYSIS_DELAY: Duration = Duration::from_millis(1500);

/// Upper bound on waiting for the first frame after a camera is opened.
pub const BIND_TIMEOUT: Duration = Duration::from_secs(5);

pub const BIND_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

pub const BLAZEFACE_MODEL_NAME: &str = "blazeface_short_range.onnx";

pub mod messages {
    pub const ANALYSIS_COMPLETE: &str = "Face analysis complete!";
    pub const CAMERA_DENIED: &str = "Camera access denied";
    pub const CAMERA_UNAVAILABLE: &str = "No camera available";
    pub const DETECTION_FAILED: &str = "Face detection failed";
    pub const SCAN_IN_PROGRESS: &str = "A scan is already in progress";
    pub const UPLOAD_UNREADABLE: &str = "Could not read that photo";
}
