use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Distance function over embeddings. Lower is more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// L2 distance.
    #[default]
    Euclidean,
    /// Squared L2 distance. Same ordering as [`Metric::Euclidean`], no sqrt.
    SquaredEuclidean,
    /// `1 - cos(a, b)`, in `[0, 2]`.
    Cosine,
}

impl Metric {
    /// Distance between `a` and `b` under this metric.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Euclidean => euclidean_distance(a, b),
            Self::SquaredEuclidean => squared_euclidean_distance(a, b),
            Self::Cosine => cosine_distance(a, b),
        }
    }

    /// Stable one-byte tag used by on-disk formats.
    pub fn tag(self) -> u8 {
        match self {
            Self::Euclidean => 0,
            Self::SquaredEuclidean => 1,
            Self::Cosine => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Euclidean),
            1 => Some(Self::SquaredEuclidean),
            2 => Some(Self::Cosine),
            _ => None,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Euclidean => write!(f, "euclidean"),
            Self::SquaredEuclidean => write!(f, "squared_euclidean"),
            Self::Cosine => write!(f, "cosine"),
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "euclidean" | "l2" => Ok(Self::Euclidean),
            "squared_euclidean" | "l2sq" => Ok(Self::SquaredEuclidean),
            "cosine" => Ok(Self::Cosine),
            other => Err(format!("unknown metric {other:?}")),
        }
    }
}

/// Squared L2 distance.
///
/// Returns `f32::INFINITY` on dimension mismatch so a ragged vector never
/// looks like a close match.
pub fn squared_euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    let mut sum: f64 = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let d = x as f64 - y as f64;
        sum += d * d;
    }
    sum as f32
}

/// L2 distance. Returns `f32::INFINITY` on dimension mismatch.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    let mut sum: f64 = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let d = x as f64 - y as f64;
        sum += d * d;
    }
    sum.sqrt() as f32
}

/// `1 - cos θ`, in `[0, 2]`.
///
/// A zero-length vector has no direction, so it sits at the maximum
/// distance 2.0 from everything; so do vectors of unequal length.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 2.0;
    }
    let (dot, aa, bb) = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| (x as f64, y as f64))
        .fold((0.0f64, 0.0f64, 0.0f64), |(d, na, nb), (x, y)| {
            (d + x * y, na + x * x, nb + y * y)
        });
    let denom = (aa * bb).sqrt();
    if denom == 0.0 {
        return 2.0;
    }
    (1.0 - (dot / denom).clamp(-1.0, 1.0)) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_known_values() {
        assert_eq!(euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(squared_euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(euclidean_distance(&[1.5, -2.0], &[1.5, -2.0]), 0.0);
    }

    #[test]
    fn euclidean_dimension_mismatch_is_infinite() {
        assert!(euclidean_distance(&[1.0], &[1.0, 0.0]).is_infinite());
        assert!(squared_euclidean_distance(&[1.0], &[1.0, 0.0]).is_infinite());
    }

    #[test]
    fn cosine_identical_orthogonal_opposite() {
        assert!(cosine_distance(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0, 0.0], &[-1.0, 0.0, 0.0]) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_zero_vector() {
        assert_eq!(cosine_distance(&[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0]), 2.0);
    }

    #[test]
    fn metric_dispatch() {
        let a = [1.0, 2.0];
        let b = [4.0, 6.0];
        assert_eq!(Metric::Euclidean.distance(&a, &b), 5.0);
        assert_eq!(Metric::SquaredEuclidean.distance(&a, &b), 25.0);
    }

    #[test]
    fn metric_tags_are_stable() {
        for m in [Metric::Euclidean, Metric::SquaredEuclidean, Metric::Cosine] {
            assert_eq!(Metric::from_tag(m.tag()), Some(m));
        }
        assert_eq!(Metric::from_tag(9), None);
    }

    #[test]
    fn metric_parse_and_display() {
        assert_eq!("l2".parse::<Metric>().unwrap(), Metric::Euclidean);
        assert_eq!(
            "squared_euclidean".parse::<Metric>().unwrap(),
            Metric::SquaredEuclidean
        );
        assert!("manhattan".parse::<Metric>().is_err());
        assert_eq!(Metric::Cosine.to_string(), "cosine");
    }

    #[test]
    fn metric_serde_snake_case() {
        let json = serde_json::to_string(&Metric::SquaredEuclidean).unwrap();
        assert_eq!(json, "\"squared_euclidean\"");
        let back: Metric = serde_json::from_str("\"cosine\"").unwrap();
        assert_eq!(back, Metric::Cosine);
    }
}
