pub mod face_oracle;
pub mod face_tracker;
pub mod raw_detection;
