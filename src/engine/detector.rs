//! SCRFD Face Detector
//!
//! Finds face boxes with the InsightFace SCRFD model. Only the box and score
//! are kept; landmarks come from the dedicated 68-point regressor.

use image::{DynamicImage, GenericImageView};
use openvino::InferRequest;
use anyhow::Result;
use tracing::debug;

use super::pool::{read_tensor_f32, SafeCompiledModel};
use super::preprocess::{preprocess_for_detection, ResizeInfo, DETECTOR_INPUT_SIZE};

/// Face detection result in source image coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

/// Output layout of an SCRFD export, derived from its output count
#[derive(Debug, Clone, PartialEq)]
struct ScrfdLayout {
    strides: Vec<i32>,
    anchors_per_cell: usize,
}

impl ScrfdLayout {
    /// 6/9 outputs: 3 strides, 2 anchors. 10/15 outputs: 5 strides, 1 anchor.
    /// The trailing keypoint outputs, when present, are ignored.
    fn from_output_count(count: usize) -> Self {
        match count {
            10 | 15 => Self { strides: vec![8, 16, 32, 64, 128], anchors_per_cell: 1 },
            6 | 9 => Self { strides: vec![8, 16, 32], anchors_per_cell: 2 },
            _ => {
                tracing::warn!("Unknown SCRFD output count: {}, assuming 3 strides", count);
                Self { strides: vec![8, 16, 32], anchors_per_cell: 2 }
            }
        }
    }
}

pub struct FaceDetector {
    model: SafeCompiledModel,
    nms_threshold: f32,
}

impl FaceDetector {
    pub fn new(model: SafeCompiledModel) -> Self {
        Self { model, nms_threshold: 0.4 }
    }

    /// All faces at or above `min_confidence`, after NMS, most confident first
    pub fn detect(&self, image: &DynamicImage, min_confidence: f32) -> Result<Vec<FaceBox>> {
        let resize_info = ResizeInfo::new(image.dimensions(), DETECTOR_INPUT_SIZE);
        let input_tensor = preprocess_for_detection(image);

        let request = self.model.infer(&input_tensor)?;
        let detections = parse_scrfd_outputs(&request, &resize_info, min_confidence)?;
        let faces = nms(detections, self.nms_threshold);

        debug!("Detected {} faces after NMS", faces.len());
        Ok(faces)
    }

    /// The single most confident face, if any reaches `min_confidence`
    pub fn detect_best(&self, image: &DynamicImage, min_confidence: f32) -> Result<Option<FaceBox>> {
        Ok(self.detect(image, min_confidence)?.into_iter().next())
    }
}

fn output_count(request: &InferRequest) -> usize {
    (0..20)
        .take_while(|&i| request.get_output_tensor_by_index(i).is_ok())
        .count()
}

/// Decode SCRFD distance predictions (scores, then boxes, per stride)
fn parse_scrfd_outputs(request: &InferRequest, resize_info: &ResizeInfo, min_confidence: f32) -> Result<Vec<FaceBox>> {
    let layout = ScrfdLayout::from_output_count(output_count(request));
    let fmc = layout.strides.len();
    let mut all_boxes = Vec::new();

    for (idx, &stride) in layout.strides.iter().enumerate() {
        let scores = read_tensor_f32(&request.get_output_tensor_by_index(idx)?)?;
        let bboxes = read_tensor_f32(&request.get_output_tensor_by_index(idx + fmc)?)?;

        decode_stride(&scores, &bboxes, stride, layout.anchors_per_cell, min_confidence, |x1, y1, x2, y2, score| {
            let (ox1, oy1) = resize_info.to_original(x1, y1);
            let (ox2, oy2) = resize_info.to_original(x2, y2);
            let (w, h) = (resize_info.original_width as f32, resize_info.original_height as f32);
            all_boxes.push(FaceBox {
                x1: ox1.clamp(0.0, w),
                y1: oy1.clamp(0.0, h),
                x2: ox2.clamp(0.0, w),
                y2: oy2.clamp(0.0, h),
                confidence: score,
            });
        });
    }

    debug!("{} candidate faces before NMS", all_boxes.len());
    Ok(all_boxes)
}

/// Walk the anchor grid of one stride and emit boxes in detector input space
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: i32,
    anchors_per_cell: usize,
    min_confidence: f32,
    mut emit: impl FnMut(f32, f32, f32, f32, f32),
) {
    let (input_w, input_h) = (DETECTOR_INPUT_SIZE.0 as i32, DETECTOR_INPUT_SIZE.1 as i32);
    let (feat_w, feat_h) = (input_w / stride, input_h / stride);
    let s = stride as f32;

    let centers = (0..feat_h)
        .flat_map(|y| (0..feat_w).map(move |x| (x as f32 * s, y as f32 * s)))
        .flat_map(|c| std::iter::repeat(c).take(anchors_per_cell));

    for (i, (cx, cy)) in centers.enumerate() {
        let Some(&score) = scores.get(i) else { break };
        if score < min_confidence {
            continue;
        }
        let Some(d) = bboxes.get(i * 4..i * 4 + 4) else { break };
        emit(cx - d[0] * s, cy - d[1] * s, cx + d[2] * s, cy + d[3] * s, score);
    }
}

/// Non-maximum suppression, sorted by confidence descending
pub fn nms(mut boxes: Vec<FaceBox>, threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| compute_iou(kept, &candidate) <= threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Compute intersection over union
pub fn compute_iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> FaceBox {
        FaceBox { x1, y1, x2, y2, confidence }
    }

    #[test]
    fn test_iou_calculation() {
        let a = face(0.0, 0.0, 10.0, 10.0, 0.9);
        let b = face(5.0, 5.0, 15.0, 15.0, 0.8);

        // Intersection: 25, union: 175
        let iou = compute_iou(&a, &b);
        assert!((iou - 25.0 / 175.0).abs() < 1e-6);
        assert_eq!(compute_iou(&a, &face(20.0, 20.0, 30.0, 30.0, 0.5)), 0.0);
    }

    #[test]
    fn test_nms_keeps_best_of_overlapping() {
        let boxes = vec![
            face(1.0, 1.0, 11.0, 11.0, 0.7),
            face(0.0, 0.0, 10.0, 10.0, 0.9),
            face(50.0, 50.0, 60.0, 60.0, 0.8),
        ];
        let kept = nms(boxes, 0.4);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.8);
    }

    #[test]
    fn test_layout_from_output_count() {
        assert_eq!(ScrfdLayout::from_output_count(9).strides, vec![8, 16, 32]);
        assert_eq!(ScrfdLayout::from_output_count(15).anchors_per_cell, 1);
        assert_eq!(ScrfdLayout::from_output_count(6).anchors_per_cell, 2);
    }

    #[test]
    fn test_decode_stride_filters_and_places_boxes() {
        // stride 32 on 512 input -> 16x16 cells, 2 anchors each
        let cells = 16 * 16 * 2;
        let mut scores = vec![0.0f32; cells];
        let mut bboxes = vec![0.0f32; cells * 4];
        // Anchor 3 sits in cell (1, 0), centre (32, 0)
        scores[3] = 0.95;
        bboxes[12..16].copy_from_slice(&[0.5, 0.0, 1.0, 2.0]);

        let mut found = Vec::new();
        decode_stride(&scores, &bboxes, 32, 2, 0.5, |x1, y1, x2, y2, s| found.push((x1, y1, x2, y2, s)));

        assert_eq!(found, vec![(16.0, 0.0, 64.0, 64.0, 0.95)]);
    }

    #[test]
    fn test_decode_stride_tolerates_short_outputs() {
        let scores = vec![0.9f32; 4];
        let bboxes = vec![1.0f32; 8];
        let mut count = 0;
        decode_stride(&scores, &bboxes, 8, 2, 0.5, |_, _, _, _, _| count += 1);
        assert_eq!(count, 2);
    }
}
