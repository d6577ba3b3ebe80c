use serde::Serialize;
use visage_metric::{DistanceMatrix, Metric};

use crate::RecognizeError;

/// A threshold chosen from labeled distances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Calibration {
    pub threshold: f32,

    /// Fraction of impostor distances accepted at `threshold`.
    pub false_accept_rate: f32,

    /// Fraction of genuine distances accepted at `threshold`.
    pub true_accept_rate: f32,
}

/// Picks the largest τ whose false-accept rate over `impostor` distances is
/// at most `target_far`, then reports the true-accept rate over `genuine`.
///
/// Acceptance is `distance <= τ`, as in the classifier.
pub fn calibrate_threshold(
    genuine: &[f32],
    impostor: &[f32],
    target_far: f32,
) -> Result<Calibration, RecognizeError> {
    if !(0.0..=1.0).contains(&target_far) {
        return Err(RecognizeError::Calibration(format!(
            "target false-accept rate {target_far} outside [0, 1]"
        )));
    }
    if genuine.is_empty() || impostor.is_empty() {
        return Err(RecognizeError::Calibration(
            "need at least one genuine and one impostor distance".into(),
        ));
    }
    if genuine.iter().chain(impostor).any(|d| !d.is_finite() || *d < 0.0) {
        return Err(RecognizeError::Calibration(
            "distances must be finite and non-negative".into(),
        ));
    }

    let mut imp = impostor.to_vec();
    imp.sort_by(f32::total_cmp);
    let allowed = (target_far as f64 * imp.len() as f64).floor() as usize;

    let threshold = if allowed >= imp.len() {
        genuine.iter().chain(&imp).copied().fold(0.0f32, f32::max)
    } else {
        // Just below the first impostor that would break the target.
        let limit = imp[allowed];
        if limit <= 0.0 {
            return Err(RecognizeError::Calibration(format!(
                "{} impostor distances are 0; no threshold meets the target",
                imp.len() - allowed
            )));
        }
        f32::from_bits(limit.to_bits() - 1)
    };

    Ok(Calibration {
        threshold,
        false_accept_rate: accept_rate(&imp, threshold),
        true_accept_rate: accept_rate(genuine, threshold),
    })
}

fn accept_rate(distances: &[f32], threshold: f32) -> f32 {
    let accepted = distances.iter().filter(|&&d| d <= threshold).count();
    accepted as f32 / distances.len() as f32
}

/// Splits all pairwise distances of a labeled set into same-label
/// (genuine) and cross-label (impostor) lists.
pub fn pair_distances<E, L>(
    embeddings: &[E],
    labels: &[L],
    metric: Metric,
) -> Result<(Vec<f32>, Vec<f32>), RecognizeError>
where
    E: AsRef<[f32]> + Sync,
    L: PartialEq,
{
    if embeddings.len() != labels.len() {
        return Err(RecognizeError::InvalidConfig(format!(
            "{} embeddings, {} labels",
            embeddings.len(),
            labels.len()
        )));
    }
    let matrix = DistanceMatrix::compute(embeddings, metric)
        .map_err(|e| RecognizeError::InvalidConfig(e.to_string()))?;

    let mut genuine = Vec::new();
    let mut impostor = Vec::new();
    for i in 0..labels.len() {
        for j in i + 1..labels.len() {
            if labels[i] == labels[j] {
                genuine.push(matrix.get(i, j));
            } else {
                impostor.push(matrix.get(i, j));
            }
        }
    }
    Ok((genuine, impostor))
}
