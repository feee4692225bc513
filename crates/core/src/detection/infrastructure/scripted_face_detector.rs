use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum DetectionScriptError {
    #[error("failed to read detection script {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid detection script: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Replays pre-recorded detections by frame index.
///
/// Frames missing from the script detect nothing. Scripts are JSON objects
/// mapping a frame index to a list of regions:
///
/// ```json
/// { "3": [{ "top_left": [0, 0], "bottom_right": [100, 80] }] }
/// ```
#[derive(Debug, Default, Clone)]
pub struct ScriptedFaceDetector {
    script: HashMap<usize, Vec<FaceRegion>>,
}

impl ScriptedFaceDetector {
    pub fn new(script: HashMap<usize, Vec<FaceRegion>>) -> Self {
        Self { script }
    }

    pub fn from_json_str(json: &str) -> Result<Self, DetectionScriptError> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, DetectionScriptError> {
        let json = std::fs::read_to_string(path).map_err(|source| DetectionScriptError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn frames_with_faces(&self) -> usize {
        self.script.values().filter(|r| !r.is_empty()).count()
    }
}

#[async_trait]
impl FaceDetector for ScriptedFaceDetector {
    async fn estimate_faces(
        &mut self,
        frame: &Frame,
        _return_tensors: bool,
    ) -> Result<Vec<FaceRegion>, DetectionError> {
        Ok(self.script.get(&frame.index()).cloned().unwrap_or_default())
    }
}
