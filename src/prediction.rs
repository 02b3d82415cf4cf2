//! Crop classifier and ranking of its probability output.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tract_onnx::prelude::*;

use crate::error::ModelError;
use crate::features::{FeatureVector, FEATURE_COUNT};
use crate::models::CropSuggestion;
use crate::round_to;

/// Pre-trained multi-class model. Implementations are loaded once and only
/// read afterwards, so one instance is shared by every worker.
pub trait Classifier: Send + Sync {
    /// Class labels, index-aligned with `predict_proba` output.
    fn classes(&self) -> &[String];

    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError>;
}

/// ONNX export of the crop classifier plus its label list.
pub struct OnnxClassifier {
    plan: TypedRunnableModel<TypedModel>,
    classes: Vec<String>,
}

impl OnnxClassifier {
    pub fn load(model_path: &Path, labels_path: &Path) -> Result<Self, ModelError> {
        let classes = load_labels(labels_path)?;

        let plan = tract_onnx::onnx()
            .model_for_path(model_path)
            .and_then(|model| {
                model.with_input_fact(
                    0,
                    InferenceFact::dt_shape(f32::datum_type(), tvec!(1, FEATURE_COUNT)),
                )
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| ModelError::Load {
                path: model_path.to_path_buf(),
                message: format!("{e:#}"),
            })?;

        tracing::info!(
            model = %model_path.display(),
            classes = classes.len(),
            "crop model loaded"
        );

        Ok(Self { plan, classes })
    }
}

impl Classifier for OnnxClassifier {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
        let outputs = self
            .plan
            .run(tvec!(input_row(features)?.into()))
            .map_err(|e| ModelError::Inference(format!("{e:#}")))?;

        probabilities(&outputs, self.classes.len())
    }
}

/// One-sample `[1, FEATURE_COUNT]` f32 input.
fn input_row(features: &FeatureVector) -> Result<Tensor, ModelError> {
    let row: Vec<f32> = features.values().iter().map(|&v| v as f32).collect();
    let array = tract_ndarray::Array2::from_shape_vec((1, FEATURE_COUNT), row)
        .map_err(|e| ModelError::Inference(e.to_string()))?;
    Ok(array.into())
}

/// Classifier exports emit the predicted label first and the probability
/// matrix after it. The probabilities are the first f32 output holding one
/// value per class.
fn probabilities(outputs: &[TValue], classes: usize) -> Result<Vec<f64>, ModelError> {
    let output = outputs
        .iter()
        .find(|output| output.datum_type() == f32::datum_type() && output.len() == classes)
        .ok_or_else(|| ModelError::Inference(format!("no f32 output with {classes} probabilities")))?;

    let view = output
        .to_array_view::<f32>()
        .map_err(|e| ModelError::Inference(format!("{e:#}")))?;
    Ok(view.iter().map(|&p| f64::from(p)).collect())
}

fn load_labels(path: &Path) -> Result<Vec<String>, ModelError> {
    let labels_error = |message: String| ModelError::Labels {
        path: path.to_path_buf(),
        message,
    };

    let raw = fs::read_to_string(path).map_err(|e| labels_error(e.to_string()))?;
    let labels: Vec<String> = serde_json::from_str(&raw).map_err(|e| labels_error(e.to_string()))?;

    if labels.is_empty() {
        return Err(labels_error("label list is empty".to_string()));
    }
    let mut seen = HashSet::new();
    if let Some(duplicate) = labels.iter().find(|label| !seen.insert(label.as_str())) {
        return Err(labels_error(format!("duplicate label {duplicate:?}")));
    }

    Ok(labels)
}

/// Runs the classifier for one sample and ranks the result.
pub fn predict(
    classifier: &dyn Classifier,
    features: &FeatureVector,
) -> Result<Vec<CropSuggestion>, ModelError> {
    let probabilities = classifier.predict_proba(features)?;
    let classes = classifier.classes();
    if probabilities.len() != classes.len() {
        return Err(ModelError::ClassMismatch {
            classes: classes.len(),
            probabilities: probabilities.len(),
        });
    }
    Ok(rank(classes, &probabilities))
}

/// Drops zero-probability classes and orders the rest by probability,
/// highest first. Equal probabilities keep the model's class order.
pub fn rank(classes: &[String], probabilities: &[f64]) -> Vec<CropSuggestion> {
    let mut retained: Vec<(&String, f64)> = classes
        .iter()
        .zip(probabilities.iter().copied())
        .filter(|(_, probability)| *probability > 0.0)
        .collect();

    retained.sort_by(|a, b| b.1.total_cmp(&a.1));

    retained
        .into_iter()
        .map(|(label, probability)| CropSuggestion(label.clone(), format_percentage(probability)))
        .collect()
}

/// `0.8` -> `"80.0%"`, `0.33333` -> `"33.33%"`.
pub fn format_percentage(probability: f64) -> String {
    let percent = round_to(probability * 100.0, 2);
    let text = percent.to_string();
    if text.contains('.') {
        format!("{text}%")
    } else {
        format!("{text}.0%")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSet;
    use serde_json::json;
    use std::io::Write;

    struct FixedClassifier {
        classes: Vec<String>,
        probabilities: Vec<f64>,
    }

    impl FixedClassifier {
        fn new(pairs: &[(&str, f64)]) -> Self {
            Self {
                classes: pairs.iter().map(|(label, _)| label.to_string()).collect(),
                probabilities: pairs.iter().map(|(_, p)| *p).collect(),
            }
        }
    }

    impl Classifier for FixedClassifier {
        fn classes(&self) -> &[String] {
            &self.classes
        }

        fn predict_proba(&self, _features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
            Ok(self.probabilities.clone())
        }
    }

    fn sample() -> FeatureVector {
        let fields = json!({
            "N": 90, "P": 42, "K": 43, "temperature": 20.9,
            "humidity": 82, "ph": 6.5, "rainfall": 202.9
        });
        FeatureSet::new(fields.as_object().unwrap().clone())
            .validate()
            .unwrap()
    }

    fn labels(suggestions: &[CropSuggestion]) -> Vec<&str> {
        suggestions.iter().map(|s| s.label()).collect()
    }

    #[test]
    fn percentages_match_python_float_text() {
        assert_eq!(format_percentage(0.8), "80.0%");
        assert_eq!(format_percentage(0.2), "20.0%");
        assert_eq!(format_percentage(1.0), "100.0%");
        assert_eq!(format_percentage(1.0 / 3.0), "33.33%");
        assert_eq!(format_percentage(0.125), "12.5%");
        assert_eq!(format_percentage(0.000001), "0.0%");
        assert_eq!(format_percentage(f64::from(0.8f32)), "80.0%");
    }

    #[test]
    fn zero_probabilities_are_dropped() {
        let classifier = FixedClassifier::new(&[("rice", 0.8), ("wheat", 0.2), ("maize", 0.0)]);
        let ranked = predict(&classifier, &sample()).unwrap();
        assert_eq!(
            ranked,
            vec![
                CropSuggestion("rice".into(), "80.0%".into()),
                CropSuggestion("wheat".into(), "20.0%".into()),
            ]
        );
    }

    #[test]
    fn tiny_but_nonzero_probability_is_kept() {
        let classes = vec!["rice".to_string(), "jute".to_string()];
        let ranked = rank(&classes, &[0.9999999, 0.0000001]);
        assert_eq!(labels(&ranked), ["rice", "jute"]);
        assert_eq!(ranked[1].percentage(), "0.0%");
    }

    #[test]
    fn ordering_is_numeric_not_textual() {
        let classes: Vec<String> = ["apple", "banana", "coffee"].iter().map(|s| s.to_string()).collect();
        let ranked = rank(&classes, &[0.095, 0.805, 0.1]);
        assert_eq!(labels(&ranked), ["banana", "coffee", "apple"]);
        assert_eq!(ranked[1].percentage(), "10.0%");
        assert_eq!(ranked[2].percentage(), "9.5%");
    }

    #[test]
    fn ties_keep_class_order_on_every_call() {
        let classes: Vec<String> = ["mango", "grapes", "lentil", "orange"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let probabilities = [0.25, 0.25, 0.25, 0.25];
        let first = rank(&classes, &probabilities);
        assert_eq!(labels(&first), ["mango", "grapes", "lentil", "orange"]);
        for _ in 0..10 {
            assert_eq!(rank(&classes, &probabilities), first);
        }
    }

    #[test]
    fn mismatched_output_is_an_error() {
        let mut classifier = FixedClassifier::new(&[("rice", 0.5), ("wheat", 0.5)]);
        classifier.probabilities.pop();
        let err = predict(&classifier, &sample()).unwrap_err();
        assert!(matches!(
            err,
            ModelError::ClassMismatch {
                classes: 2,
                probabilities: 1
            }
        ));
    }

    #[test]
    fn labels_file_is_read_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["apple", "banana", "rice"]"#).unwrap();
        assert_eq!(load_labels(file.path()).unwrap(), ["apple", "banana", "rice"]);
    }

    #[test]
    fn duplicate_or_empty_labels_are_rejected() {
        let mut duplicate = tempfile::NamedTempFile::new().unwrap();
        write!(duplicate, r#"["rice", "rice"]"#).unwrap();
        assert!(matches!(load_labels(duplicate.path()), Err(ModelError::Labels { .. })));

        let mut empty = tempfile::NamedTempFile::new().unwrap();
        write!(empty, "[]").unwrap();
        assert!(matches!(load_labels(empty.path()), Err(ModelError::Labels { .. })));
    }

    fn output(tensor: Tensor) -> TValue {
        tensor.into()
    }

    #[test]
    fn input_row_is_one_f32_sample() {
        let row = input_row(&sample()).unwrap();
        assert_eq!(row.datum_type(), f32::datum_type());
        assert_eq!(row.shape(), &[1, FEATURE_COUNT]);
        let values: Vec<f32> = row.to_array_view::<f32>().unwrap().iter().copied().collect();
        assert_eq!(values, [90.0, 42.0, 43.0, 20.9, 82.0, 6.5, 202.9]);
    }

    #[test]
    fn label_output_is_skipped_for_probabilities() {
        let outputs = [
            output(tract_ndarray::arr1(&[2i64]).into()),
            output(tract_ndarray::arr1(&["rice".to_string()]).into()),
            output(tract_ndarray::arr2(&[[0.0f32, 0.25, 0.75]]).into()),
        ];
        assert_eq!(probabilities(&outputs, 3).unwrap(), [0.0, 0.25, 0.75]);
    }

    #[test]
    fn wrong_length_output_is_not_used() {
        let outputs = [
            output(tract_ndarray::arr1(&[0i64]).into()),
            output(tract_ndarray::arr2(&[[0.5f32, 0.5]]).into()),
            output(tract_ndarray::arr2(&[[0.125f32, 0.375, 0.5]]).into()),
        ];
        assert_eq!(probabilities(&outputs, 3).unwrap(), [0.125, 0.375, 0.5]);
    }

    #[test]
    fn missing_probability_output_is_an_error() {
        let outputs = [
            output(tract_ndarray::arr1(&[1i64, 2, 3]).into()),
            output(tract_ndarray::arr2(&[[0.5f32, 0.5]]).into()),
        ];
        let err = probabilities(&outputs, 3).unwrap_err();
        assert!(matches!(err, ModelError::Inference(ref message) if message.contains("3 probabilities")));
    }

    #[test]
    fn missing_model_refuses_to_load() {
        let mut labels = tempfile::NamedTempFile::new().unwrap();
        write!(labels, r#"["rice"]"#).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let result = OnnxClassifier::load(&dir.path().join("absent.onnx"), labels.path());
        assert!(matches!(result, Err(ModelError::Load { .. })));
    }

    #[test]
    fn corrupt_model_refuses_to_load() {
        let mut labels = tempfile::NamedTempFile::new().unwrap();
        write!(labels, r#"["rice"]"#).unwrap();
        let mut model = tempfile::NamedTempFile::new().unwrap();
        model.write_all(b"not an onnx graph").unwrap();
        let result = OnnxClassifier::load(model.path(), labels.path());
        assert!(matches!(result, Err(ModelError::Load { .. })));
    }
}
