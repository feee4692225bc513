/// BlazeFace face detector using ONNX Runtime via `ort`.
///
/// Short-range model: bounding boxes only, best score first.
use std::path::Path;

use async_trait::async_trait;

use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

pub const DEFAULT_CONFIDENCE: f64 = 0.5;

const NMS_IOU_THRESH: f64 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output: box deltas then 6 keypoints.
const REGRESSOR_STRIDE: usize = 16;

pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    confidence: f64,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?.commit_from_file(model_path)?;
        log::info!("Loaded BlazeFace model from {}", model_path.display());
        Ok(Self {
            session,
            confidence,
            anchors: generate_anchors(),
        })
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, Box<dyn std::error::Error>> {
        if frame.channels() < 3 {
            return Err(format!("expected an RGB frame, got {} channels", frame.channels()).into());
        }
        let fw = frame.width() as f32;
        let fh = frame.height() as f32;

        let input_value = ort::value::Tensor::from_array(preprocess(frame, INPUT_SIZE))?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        // regressors: [1, 896, 16], classificators: [1, 896, 1]
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }
        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let mut raw_dets = Vec::new();
        let num_anchors = self.anchors.len().min(NUM_ANCHORS);
        for (i, &raw_score) in score_data.iter().enumerate().take(num_anchors) {
            let score = sigmoid(raw_score);
            if (score as f64) < self.confidence {
                continue;
            }
            let offset = i * REGRESSOR_STRIDE;
            if offset + 4 > reg_data.len() {
                break;
            }
            let anchor = self.anchors[i];
            let cx = anchor[0] + reg_data[offset] / INPUT_SIZE as f32;
            let cy = anchor[1] + reg_data[offset + 1] / INPUT_SIZE as f32;
            let w = reg_data[offset + 2] / INPUT_SIZE as f32;
            let h = reg_data[offset + 3] / INPUT_SIZE as f32;

            raw_dets.push(RawDet {
                x1: ((cx - w / 2.0) * fw).max(0.0) as f64,
                y1: ((cy - h / 2.0) * fh).max(0.0) as f64,
                x2: ((cx + w / 2.0) * fw).min(fw) as f64,
                y2: ((cy + h / 2.0) * fh).min(fh) as f64,
                score: score as f64,
            });
        }

        Ok(nms(&mut raw_dets, NMS_IOU_THRESH)
            .iter()
            .map(|d| FaceRegion::new((d.x1, d.y1), (d.x2, d.y2)))
            .collect())
    }
}

#[async_trait]
impl FaceDetector for OnnxBlazefaceDetector {
    async fn estimate_faces(
        &mut self,
        frame: &Frame,
        _return_tensors: bool,
    ) -> Result<Vec<FaceRegion>, DetectionError> {
        self.detect(frame)
            .map_err(|e| DetectionError::Failure(e.to_string()))
    }
}

/// Resize frame to `size × size` and normalize to [0,1] NCHW float32.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src_h = frame.height();
    let src_w = frame.width();
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));
    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as u32).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as u32).min(src_w - 1);
            let px = frame.pixel(src_x, src_y);
            for c in 0..3 {
                tensor[[0, c, y, x]] = px[c] as f32 / 255.0;
            }
        }
    }
    tensor
}

/// Anchors for the short-range model: a 16×16 grid with 2 anchors per cell
/// followed by an 8×8 grid with 6.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)];
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }
    anchors
}

#[derive(Clone, Debug)]
struct RawDet {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    score: f64,
}

fn nms(dets: &mut [RawDet], iou_thresh: f64) -> Vec<RawDet> {
    dets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];
    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if !suppressed[j] && bbox_iou(&dets[i], &dets[j]) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn bbox_iou(a: &RawDet, b: &RawDet) -> f64 {
    let inter = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0)
        * (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn det(x1: f64, y1: f64, x2: f64, y2: f64, score: f64) -> RawDet {
        RawDet {
            x1,
            y1,
            x2,
            y2,
            score,
        }
    }

    #[test]
    fn test_preprocess_shape() {
        let frame = Frame::new(vec![128u8; 200 * 100 * 3], 200, 100, 3, 0);
        let tensor = preprocess(&frame, 128);
        assert_eq!(tensor.shape(), &[1, 3, 128, 128]);
    }

    #[test]
    fn test_preprocess_normalized() {
        let frame = Frame::new(vec![255u8; 50 * 50 * 3], 50, 50, 3, 0);
        let tensor = preprocess(&frame, 128);
        assert_relative_eq!(tensor[[0, 0, 0, 0]], 1.0, epsilon = 0.01);
    }

    #[test]
    fn test_preprocess_reads_rgba_frames() {
        let frame = Frame::new(vec![0u8; 8 * 8 * 4], 8, 8, 4, 0);
        let tensor = preprocess(&frame, 16);
        assert_eq!(tensor[[0, 2, 15, 15]], 0.0);
    }

    #[test]
    fn test_generate_anchors_count() {
        assert_eq!(generate_anchors().len(), NUM_ANCHORS);
    }

    #[test]
    fn test_anchors_in_unit_range() {
        for a in generate_anchors() {
            assert!(a[0] > 0.0 && a[0] < 1.0);
            assert!(a[1] > 0.0 && a[1] < 1.0);
        }
    }

    #[test]
    fn test_sigmoid() {
        assert_relative_eq!(sigmoid(0.0), 0.5, epsilon = 1e-6);
        assert!(sigmoid(10.0) > 0.999);
        assert!(sigmoid(-10.0) < 0.001);
    }

    #[test]
    fn test_nms_suppresses_overlap_and_keeps_best_first() {
        let mut dets = vec![
            det(5.0, 5.0, 105.0, 105.0, 0.7),
            det(0.0, 0.0, 100.0, 100.0, 0.9),
            det(200.0, 200.0, 250.0, 250.0, 0.8),
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].score, 0.8);
    }
}
