//! YOLOv8 object detection over ONNX Runtime.

use std::path::Path;
use std::sync::Mutex;

use image::{imageops::FilterType, RgbImage};
use ndarray::ArrayView2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// COCO class names (80 classes), in model output order.
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

const NUM_BOXES: usize = 8400;
const NUM_FEATURES: usize = 4 + 80;

/// Produces the class labels visible in a frame.
pub trait LabelDetector: Send + Sync {
    fn labels(&self, frame: &RgbImage) -> MediaResult<Vec<String>>;
}

/// Detected object in model input coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub class_id: usize,
    pub confidence: f32,
}

impl Detection {
    pub fn label(&self) -> &'static str {
        COCO_CLASSES.get(self.class_id).copied().unwrap_or("unknown")
    }

    fn iou(&self, other: &Detection) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.width * self.height + other.width * other.height - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// Configuration for the YOLO detector.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Path to ONNX model file
    pub model_path: String,
    pub confidence_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Square model input size
    pub input_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "models/object_detection/yolov8n.onnx".to_string(),
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
        }
    }
}

impl DetectorConfig {
    /// Load from `DETECTOR_MODEL_PATH` and `DETECTOR_CONFIDENCE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_path: std::env::var("DETECTOR_MODEL_PATH").unwrap_or(defaults.model_path),
            confidence_threshold: std::env::var("DETECTOR_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.confidence_threshold),
            ..defaults
        }
    }
}

/// YOLOv8 detector. The session is loaded once and shared.
pub struct YoloDetector {
    session: Mutex<Session>,
    config: DetectorConfig,
}

impl YoloDetector {
    /// Load the model. Fails if the file is missing or cannot be parsed.
    pub fn new(config: DetectorConfig) -> MediaResult<Self> {
        let model_path = Path::new(&config.model_path);
        if !model_path.exists() {
            return Err(MediaError::model_not_found(&config.model_path));
        }

        let session = Mutex::new(create_session(model_path)?);
        info!(
            model_path = %config.model_path,
            input_size = config.input_size,
            "Object detector initialized"
        );

        Ok(Self { session, config })
    }

    /// Run detection on one frame.
    pub fn detect(&self, frame: &RgbImage) -> MediaResult<Vec<Detection>> {
        let input = self.preprocess(frame)?;
        let outputs = self.run_inference(input)?;
        let candidates = decode_output(&outputs, self.config.confidence_threshold)?;
        let detections = non_maximum_suppression(candidates, self.config.nms_threshold);
        debug!(count = detections.len(), "Object detection completed");
        Ok(detections)
    }

    /// Resize to the model input and lay out as normalized NCHW.
    fn preprocess(&self, frame: &RgbImage) -> MediaResult<Value> {
        let size = self.config.input_size;
        let resized;
        let rgb = if frame.dimensions() == (size, size) {
            frame
        } else {
            resized = image::imageops::resize(frame, size, size, FilterType::Triangle);
            &resized
        };

        let plane = (size * size) as usize;
        let mut chw = vec![0f32; 3 * plane];
        for (i, px) in rgb.pixels().enumerate() {
            chw[i] = px[0] as f32 / 255.0;
            chw[plane + i] = px[1] as f32 / 255.0;
            chw[2 * plane + i] = px[2] as f32 / 255.0;
        }

        let shape = vec![1usize, 3, size as usize, size as usize];
        Tensor::from_array((shape, chw.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::detection_failed(format!("Failed to create tensor: {}", e)))
    }

    fn run_inference(&self, input: Value) -> MediaResult<Vec<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detection_failed(format!("ONNX inference failed: {}", e)))?;

        // YOLOv8 output is [1, 84, 8400]
        let output = outputs
            .get("output0")
            .ok_or_else(|| MediaError::detection_failed("Missing output0 tensor"))?;

        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::detection_failed(format!("Failed to extract tensor: {}", e)))?;

        Ok(tensor.1.to_vec())
    }
}

impl LabelDetector for YoloDetector {
    fn labels(&self, frame: &RgbImage) -> MediaResult<Vec<String>> {
        Ok(self
            .detect(frame)?
            .iter()
            .map(|d| d.label().to_string())
            .collect())
    }
}

/// Decode a `[84, 8400]` YOLOv8 output into thresholded candidates.
fn decode_output(outputs: &[f32], confidence_threshold: f32) -> MediaResult<Vec<Detection>> {
    if outputs.len() != NUM_FEATURES * NUM_BOXES {
        return Err(MediaError::detection_failed(format!(
            "Unexpected output size: expected {}, got {}",
            NUM_FEATURES * NUM_BOXES,
            outputs.len()
        )));
    }

    let features = ArrayView2::from_shape((NUM_FEATURES, NUM_BOXES), outputs)
        .map_err(|e| MediaError::detection_failed(format!("Failed to reshape output: {}", e)))?;
    let boxes = features.t();

    let mut candidates = Vec::new();
    for row in boxes.outer_iter() {
        let (class_id, confidence) = row
            .iter()
            .skip(4)
            .enumerate()
            .fold((0, 0.0f32), |best, (c, &score)| {
                if score > best.1 {
                    (c, score)
                } else {
                    best
                }
            });

        if confidence < confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        candidates.push(Detection {
            x: cx - w / 2.0,
            y: cy - h / 2.0,
            width: w,
            height: h,
            class_id,
            confidence,
        });
    }
    Ok(candidates)
}

/// Class-aware non-maximum suppression.
fn non_maximum_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in detections {
        let overlaps = keep
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !overlaps {
            keep.push(candidate);
        }
    }
    keep
}

/// Create an ONNX Runtime session, preferring CUDA when built with it.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)?;

    let builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, using CPU");
    }

    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("Failed to load ONNX model: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, class_id: usize, confidence: f32) -> Detection {
        Detection {
            x,
            y: 0.0,
            width: 100.0,
            height: 100.0,
            class_id,
            confidence,
        }
    }

    #[test]
    fn test_coco_classes() {
        assert_eq!(COCO_CLASSES.len(), 80);
        assert_eq!(det(0.0, 2, 0.9).label(), "car");
        assert_eq!(det(0.0, 500, 0.9).label(), "unknown");
    }

    #[test]
    fn test_nms_suppresses_same_class_overlap() {
        let kept = non_maximum_suppression(
            vec![det(0.0, 0, 0.6), det(5.0, 0, 0.9), det(5.0, 2, 0.5), det(400.0, 0, 0.4)],
            0.45,
        );
        let summary: Vec<(usize, f32)> = kept.iter().map(|d| (d.class_id, d.confidence)).collect();
        assert_eq!(summary, vec![(0, 0.9), (2, 0.5), (0, 0.4)]);
    }

    #[test]
    fn test_decode_output_picks_best_class() {
        let mut outputs = vec![0.0f32; NUM_FEATURES * NUM_BOXES];
        // Box 7: centre (320, 320), 64x32, class 16 ("dog") at 0.8
        let set = |o: &mut Vec<f32>, feature: usize, value: f32| o[feature * NUM_BOXES + 7] = value;
        set(&mut outputs, 0, 320.0);
        set(&mut outputs, 1, 320.0);
        set(&mut outputs, 2, 64.0);
        set(&mut outputs, 3, 32.0);
        set(&mut outputs, 4 + 16, 0.8);
        set(&mut outputs, 4 + 15, 0.3);

        let detections = decode_output(&outputs, 0.25).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label(), "dog");
        assert!((detections[0].x - 288.0).abs() < 1e-4);
        assert!((detections[0].y - 304.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_output_rejects_wrong_shape() {
        assert!(decode_output(&[0.0; 10], 0.25).is_err());
    }

    #[test]
    fn test_missing_model_is_reported() {
        let config = DetectorConfig {
            model_path: "/nonexistent/yolov8n.onnx".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            YoloDetector::new(config),
            Err(MediaError::ModelNotFound(_))
        ));
    }
}
