pub mod bytetrack_tracker;
pub mod math;
pub mod onnx_arcface_embedder;
pub mod onnx_face_oracle;
pub mod onnx_genderage_estimator;
pub mod onnx_session;
pub mod onnx_yolo_detector;
pub mod replay_face_oracle;
