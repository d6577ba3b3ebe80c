use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::RecognizeError;

/// Shared, thread-safe acceptance radius τ.
///
/// Clones share the same value, so an operator can retune a running
/// classifier without rebuilding it.
#[derive(Debug, Clone)]
pub struct Threshold(Arc<AtomicU32>);

impl Threshold {
    pub fn new(value: f32) -> Result<Self, RecognizeError> {
        validate(value)?;
        Ok(Self(Arc::new(AtomicU32::new(value.to_bits()))))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Replaces τ for every holder of this handle.
    pub fn set(&self, value: f32) -> Result<(), RecognizeError> {
        validate(value)?;
        self.0.store(value.to_bits(), Ordering::Release);
        Ok(())
    }
}

fn validate(value: f32) -> Result<(), RecognizeError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(RecognizeError::InvalidThreshold(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_value() {
        let t = Threshold::new(0.5).unwrap();
        let other = t.clone();
        other.set(0.25).unwrap();
        assert_eq!(t.get(), 0.25);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(Threshold::new(-0.1).is_err());
        assert!(Threshold::new(f32::NAN).is_err());
        let t = Threshold::new(0.0).unwrap();
        assert!(t.set(f32::INFINITY).is_err());
        assert_eq!(t.get(), 0.0);
    }
}
