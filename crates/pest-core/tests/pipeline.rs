//! End-to-end tests of the identification pipeline
//!
//! A fixture classifier stands in for the trained network so the scenarios are
//! reproducible without shipping model weights.

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use pest_core::decision::softmax;
use pest_core::{
    Classifier, DecisionPolicy, ImageTensor, InferenceService, KnowledgeBase, LabelSet,
    ModelManifest, PestError, PreprocessConfig, Preprocessor, ScoreVector,
};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../data")
}

fn photo_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Jpeg(90))
        .unwrap();
    bytes
}

/// Scores a held-out image as Beetles with probability 0.92
struct BeetlesFixture {
    labels: LabelSet,
}

impl Classifier for BeetlesFixture {
    fn infer(&self, input: &ImageTensor) -> pest_core::Result<ScoreVector> {
        assert_eq!(input.shape(), [1, 3, 300, 300]);
        let rest = 0.08 / (self.labels.len() - 1) as f32;
        let logits = self
            .labels
            .iter()
            .map(|l| if l.as_str() == "Beetles" { 0.92f32.ln() } else { rest.ln() })
            .collect();
        ScoreVector::new(logits, self.labels.len())
    }

    fn num_classes(&self) -> usize {
        self.labels.len()
    }

    fn model_version(&self) -> &str {
        "beetles-fixture"
    }
}

/// Derives logits from channel statistics so different images score differently
struct ChannelStats;

impl Classifier for ChannelStats {
    fn infer(&self, input: &ImageTensor) -> pest_core::Result<ScoreVector> {
        let data = input.as_array();
        let n = (data.len() / 3) as f32;
        let means: Vec<f32> = (0..3)
            .map(|c| data.iter().skip(c * data.len() / 3).take(data.len() / 3).sum::<f32>() / n)
            .collect();
        let logits = (0..12)
            .map(|i| means[i % 3] * (i as f32 + 1.0) - (i as f32) * 0.1)
            .collect();
        ScoreVector::new(logits, 12)
    }

    fn num_classes(&self) -> usize {
        12
    }

    fn model_version(&self) -> &str {
        "channel-stats"
    }
}

fn reference_service(classifier: Arc<dyn Classifier>) -> InferenceService {
    let manifest = ModelManifest::load(&data_dir().join("model.json")).unwrap();
    InferenceService::new(
        Preprocessor::new(manifest.input.clone()).unwrap(),
        classifier,
        manifest.label_set().unwrap(),
        DecisionPolicy::default(),
    )
    .unwrap()
}

#[test]
fn test_beetles_end_to_end() {
    let service = reference_service(Arc::new(BeetlesFixture {
        labels: LabelSet::reference(),
    }));
    let knowledge = KnowledgeBase::load(&data_dir().join("pests.json"), service.labels()).unwrap();

    let result = service.classify(&photo_bytes(640, 427)).unwrap();
    assert_eq!(result.prediction.label.as_str(), "Beetles");
    assert!((result.prediction.confidence - 0.92).abs() < 1e-4);
    assert!(result.is_pest);

    let record = knowledge.lookup(result.advisory_ref.as_str()).unwrap();
    assert_eq!(record.scientific_name, "Coleoptera");
}

#[test]
fn test_probabilities_sum_to_one_for_real_images() {
    let preprocessor = Preprocessor::new(PreprocessConfig::reference()).unwrap();
    for (w, h) in [(300, 300), (1024, 768), (57, 211)] {
        let tensor = preprocessor.prepare(&photo_bytes(w, h)).unwrap();
        assert_eq!(tensor.shape(), [1, 3, 300, 300]);

        let scores = ChannelStats.infer(&tensor).unwrap();
        let sum: f32 = softmax(scores.as_slice()).iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }
}

#[test]
fn test_repeated_classification_is_identical() {
    let service = reference_service(Arc::new(ChannelStats));
    let bytes = photo_bytes(480, 360);

    let first = service.classify(&bytes).unwrap();
    for _ in 0..3 {
        assert_eq!(service.classify(&bytes).unwrap(), first);
    }
}

#[test]
fn test_concurrent_classification() {
    let service = Arc::new(reference_service(Arc::new(ChannelStats)));
    let bytes = Arc::new(photo_bytes(200, 150));
    let expected = service.classify(&bytes).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            let bytes = Arc::clone(&bytes);
            std::thread::spawn(move || service.classify(&bytes).unwrap())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn test_error_tags() {
    let service = reference_service(Arc::new(ChannelStats));
    assert!(matches!(service.classify(&[]), Err(PestError::NoInput)));

    let noise: Vec<u8> = (0..4096u32).map(|i| (i.wrapping_mul(2654435761) >> 24) as u8).collect();
    assert!(matches!(service.classify(&noise), Err(PestError::Decode(_))));
}

#[test]
fn test_every_label_has_advisory() {
    let manifest = ModelManifest::load(&data_dir().join("model.json")).unwrap();
    let labels = manifest.label_set().unwrap();
    let knowledge = KnowledgeBase::load(&data_dir().join("pests.json"), &labels).unwrap();

    for label in labels.iter() {
        let record = knowledge.lookup(label.as_str()).unwrap();
        assert!(!record.scientific_name.is_empty());
        assert!(!record.description.is_empty());
        assert!(!record.symptoms.is_empty());
        assert!(!record.organic_treatment.is_empty());
        assert!(!record.chemical_treatment.is_empty());
        assert!(!record.prevention.is_empty());
        assert!(!record.common_species.is_empty());
    }
}
