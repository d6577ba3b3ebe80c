//! Open-set face recognition on top of a [`visage_faceindex::FaceIndex`].
//!
//! A query embedding is matched against the enrolled entries and accepted
//! only when its distance is within the threshold τ; everything else is
//! [`Identity::Unknown`]. τ lives in a shared [`Threshold`] handle so it can
//! be retuned while serving, and [`calibrate_threshold`] derives it from
//! labeled distances for a target false-accept rate.
//!
//! [`Recognizer`] composes a [`FaceEmbedder`] with the classifier for the
//! image-level operations: classify the faces found in a picture, enroll a
//! labeled image.

mod calibrate;
mod classifier;
mod embedder;
mod error;
mod recognizer;
mod threshold;

pub use calibrate::{Calibration, calibrate_threshold, pair_distances};
pub use classifier::{Classification, ClassifierConfig, Identity, OpenSetClassifier, Strategy};
pub use embedder::FaceEmbedder;
pub use error::RecognizeError;
pub use recognizer::{FaceResult, Recognizer};
pub use threshold::Threshold;
