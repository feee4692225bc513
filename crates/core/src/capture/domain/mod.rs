pub mod capture_manager;
pub mod media_capture;
