use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use visage_faceindex::{Backend, FaceIndex, HnswConfig, IndexConfig};
use visage_metric::Metric;
use visage_recognize::{Identity, OpenSetClassifier, Strategy, Threshold};

fn index(backend: &Backend, dim: usize) -> Arc<dyn FaceIndex> {
    backend
        .build(IndexConfig {
            model_id: "m".into(),
            dim,
            metric: Metric::Euclidean,
        })
        .unwrap()
}

#[test]
fn enrolled_identity_round_trip() {
    for backend in [Backend::Flat, Backend::Hnsw(HnswConfig::default())] {
        let idx = index(&backend, 2);
        idx.enroll("A", &[0.0, 0.0]).unwrap();
        let c = OpenSetClassifier::new(idx, Threshold::new(0.1).unwrap(), Strategy::Nearest);
        let r = c.classify(&[0.0, 0.0]).unwrap();
        assert_eq!(r.identity, Identity::Known("A".into()));
        assert_eq!(r.distance, Some(0.0));
    }
}

#[test]
fn duplicate_enrollments_both_reachable() {
    let idx = index(&Backend::Flat, 2);
    idx.enroll("A", &[0.5, 0.5]).unwrap();
    idx.enroll("A", &[0.5, 0.5]).unwrap();
    let neighbors = idx.query(&[0.5, 0.5], 2).unwrap();
    assert_eq!(neighbors.len(), 2);
    assert!(neighbors.iter().all(|n| n.distance == 0.0));

    let c = OpenSetClassifier::new(idx, Threshold::new(0.0).unwrap(), Strategy::Nearest);
    let r = c.classify(&[0.5, 0.5]).unwrap();
    assert_eq!(r.identity.label(), Some("A"));
    assert_eq!(r.reference, Some(0));
}

#[test]
fn classify_while_enrolling_and_retuning() {
    let dim = 4;
    let idx = index(&Backend::Hnsw(HnswConfig::default()), dim);
    let known: Vec<Vec<f32>> = (0..10)
        .map(|i| (0..dim).map(|k| if k == i % dim { 10.0 * (i + 1) as f32 } else { 0.0 }).collect())
        .collect();
    for (i, v) in known.iter().enumerate() {
        idx.enroll(&format!("p{i}"), v).unwrap();
    }
    let classifier = Arc::new(OpenSetClassifier::new(
        Arc::clone(&idx),
        Threshold::new(0.5).unwrap(),
        Strategy::Nearest,
    ));

    let mut handles = Vec::new();
    for t in 0..4u64 {
        let classifier = Arc::clone(&classifier);
        let known = known.clone();
        handles.push(thread::spawn(move || {
            for (i, v) in known.iter().enumerate() {
                let r = classifier.classify(v).unwrap();
                // Enrolled vectors are exact matches at any τ >= 0.
                assert_eq!(r.identity.label(), Some(format!("p{i}").as_str()), "thread {t}");
            }
        }));
    }
    {
        let idx = Arc::clone(&idx);
        handles.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(4);
            for i in 0..50 {
                let v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
                idx.enroll(&format!("walk-in-{i}"), &v).unwrap();
            }
        }));
    }
    {
        let threshold = classifier.threshold().clone();
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                threshold.set(0.1 + i as f32 * 0.01).unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(idx.len(), 60);
}
