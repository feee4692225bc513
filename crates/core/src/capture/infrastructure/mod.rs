pub mod image_sequence_camera;
pub mod unavailable_camera;
