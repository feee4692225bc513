use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box of a detected face in frame-pixel coordinates.
///
/// Detectors are not required to produce well-formed boxes; consumers check
/// [`FaceRegion::is_well_formed`] before deriving anything from the geometry.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub top_left: (f64, f64),
    pub bottom_right: (f64, f64),
}

impl FaceRegion {
    pub fn new(top_left: (f64, f64), bottom_right: (f64, f64)) -> Self {
        Self {
            top_left,
            bottom_right,
        }
    }

    pub fn width(&self) -> f64 {
        self.bottom_right.0 - self.top_left.0
    }

    pub fn height(&self) -> f64 {
        self.bottom_right.1 - self.top_left.1
    }

    /// True when both extents are finite and strictly positive.
    pub fn is_well_formed(&self) -> bool {
        let (w, h) = (self.width(), self.height());
        w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0
    }

    /// `width / height`, or `None` for a malformed region.
    pub fn aspect_ratio(&self) -> Option<f64> {
        self.is_well_formed().then(|| self.width() / self.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_extents() {
        let r = FaceRegion::new((10.0, 20.0), (110.0, 100.0));
        assert_relative_eq!(r.width(), 100.0);
        assert_relative_eq!(r.height(), 80.0);
    }

    #[test]
    fn test_aspect_ratio() {
        let r = FaceRegion::new((0.0, 0.0), (100.0, 80.0));
        assert_relative_eq!(r.aspect_ratio().unwrap(), 1.25);
    }

    #[rstest]
    #[case::zero_width(FaceRegion::new((10.0, 0.0), (10.0, 50.0)))]
    #[case::zero_height(FaceRegion::new((0.0, 10.0), (50.0, 10.0)))]
    #[case::inverted(FaceRegion::new((100.0, 100.0), (0.0, 0.0)))]
    #[case::nan(FaceRegion::new((f64::NAN, 0.0), (10.0, 10.0)))]
    #[case::infinite(FaceRegion::new((0.0, 0.0), (f64::INFINITY, 10.0)))]
    fn test_malformed_regions(#[case] region: FaceRegion) {
        assert!(!region.is_well_formed());
        assert!(region.aspect_ratio().is_none());
    }

    #[test]
    fn test_deserializes_from_corner_arrays() {
        let json = r#"{"top_left": [0, 0], "bottom_right": [100, 140]}"#;
        let r: FaceRegion = serde_json::from_str(json).unwrap();
        assert_eq!(r, FaceRegion::new((0.0, 0.0), (100.0, 140.0)));
    }
}
