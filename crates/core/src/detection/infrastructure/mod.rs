pub mod background_loaded_detector;
#[cfg(feature = "blazeface")]
pub mod model_resolver;
#[cfg(feature = "blazeface")]
pub mod onnx_blazeface_detector;
pub mod scripted_face_detector;
