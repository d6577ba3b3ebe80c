//! Distance kernels shared by training (triplet mining) and serving
//! (similarity search).
//!
//! All kernels accumulate in f64 and return f32. The [`DistanceMatrix`] is
//! computed row-parallel with rayon; every cell depends only on its two
//! inputs, so the result is identical regardless of thread scheduling.

mod distance;
mod error;
mod matrix;

pub use distance::{Metric, cosine_distance, euclidean_distance, squared_euclidean_distance};
pub use error::MetricError;
pub use matrix::DistanceMatrix;
