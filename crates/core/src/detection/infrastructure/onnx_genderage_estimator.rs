/// Gender/age estimator for InsightFace-style `genderage` models.
///
/// Input is a 96x96 RGB crop with raw 0-255 values; output is
/// `[female_logit, male_logit, age / 100]`.
use std::path::Path;
use std::sync::Mutex;

use crate::shared::frame::Frame;

use super::onnx_session::load_session;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const INPUT_SIZE: usize = 96;

/// Raw estimate: gender code (0 female, 1 male) and age in years.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenderAge {
    pub gender_code: i64,
    pub age: f64,
}

pub struct GenderAgeEstimator {
    session: Mutex<ort::session::Session>,
}

impl GenderAgeEstimator {
    pub fn new(model_path: &Path) -> Result<Self, BoxError> {
        Ok(Self {
            session: Mutex::new(load_session(model_path)?),
        })
    }

    pub fn estimate(&self, crop: &Frame) -> Result<GenderAge, BoxError> {
        let input_value = ort::value::Tensor::from_array(preprocess(crop))?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let array = outputs[0].try_extract_array::<f32>()?;
        let values = array.as_slice().ok_or("Cannot get genderage slice")?;
        decode(values)
    }
}

fn decode(values: &[f32]) -> Result<GenderAge, BoxError> {
    if values.len() < 3 {
        return Err(format!("genderage output has {} values, need 3", values.len()).into());
    }
    Ok(GenderAge {
        gender_code: if values[1] > values[0] { 1 } else { 0 },
        age: (values[2] as f64 * 100.0).round(),
    })
}

fn preprocess(crop: &Frame) -> ndarray::Array4<f32> {
    let src = crop.as_ndarray();
    let src_w = crop.width() as usize;
    let src_h = crop.height() as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    for y in 0..INPUT_SIZE {
        let src_y = ((y * src_h) / INPUT_SIZE).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x = ((x * src_w) / INPUT_SIZE).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32;
            }
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_male() {
        let ga = decode(&[0.1, 2.3, 0.347]).unwrap();
        assert_eq!(ga.gender_code, 1);
        assert!((ga.age - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_female() {
        assert_eq!(decode(&[1.5, -0.2, 0.2]).unwrap().gender_code, 0);
    }

    #[test]
    fn test_decode_short_output_is_error() {
        assert!(decode(&[0.5, 0.5]).is_err());
    }

    #[test]
    fn test_preprocess_keeps_raw_range() {
        let crop = Frame::new(vec![200u8; 20 * 20 * 3], 20, 20, 3, 0);
        let t = preprocess(&crop);
        assert_eq!(t.shape(), &[1, 3, 96, 96]);
        assert_eq!(t[[0, 2, 95, 95]], 200.0);
    }
}
