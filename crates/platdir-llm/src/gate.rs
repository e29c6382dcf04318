use thiserror::Error;

/// A model proposal carrying a self-reported confidence in `0..=1`.
pub trait Confident {
    fn confidence(&self) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("confidence {confidence} below threshold {threshold}")]
pub struct LowConfidence {
    pub confidence: f64,
    pub threshold: f64,
}

/// Admits proposals whose confidence clears a threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceGate {
    threshold: f64,
    inclusive: bool,
}

impl ConfidenceGate {
    /// Enrichment: strictly greater than 0.6.
    pub const ENRICHMENT: Self = Self::above(0.6);
    /// Recategorisation: 0.8 or more.
    pub const RECATEGORIZATION: Self = Self::at_least(0.8);

    pub const fn above(threshold: f64) -> Self {
        Self {
            threshold,
            inclusive: false,
        }
    }

    pub const fn at_least(threshold: f64) -> Self {
        Self {
            threshold,
            inclusive: true,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn passes(&self, confidence: f64) -> bool {
        if self.inclusive {
            confidence >= self.threshold
        } else {
            confidence > self.threshold
        }
    }

    pub fn admit<T: Confident>(&self, proposal: T) -> Result<T, LowConfidence> {
        let confidence = proposal.confidence();
        if self.passes(confidence) {
            Ok(proposal)
        } else {
            Err(LowConfidence {
                confidence,
                threshold: self.threshold,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct P(f64);

    impl Confident for P {
        fn confidence(&self) -> f64 {
            self.0
        }
    }

    #[test]
    fn strict_and_inclusive_boundaries() {
        assert!(ConfidenceGate::ENRICHMENT.admit(P(0.6)).is_err());
        assert!(ConfidenceGate::ENRICHMENT.admit(P(0.61)).is_ok());
        assert!(ConfidenceGate::RECATEGORIZATION.admit(P(0.8)).is_ok());
        let err = ConfidenceGate::RECATEGORIZATION.admit(P(0.79)).err().expect("rejected");
        assert_eq!(err.threshold, 0.8);
    }

    #[test]
    fn nan_is_rejected() {
        assert!(ConfidenceGate::above(0.0).admit(P(f64::NAN)).is_err());
        assert!(ConfidenceGate::at_least(0.0).admit(P(f64::NAN)).is_err());
    }
}
