//! Truth-value algebra.
//!
//! A [`TruthValue`] is a `(strength, confidence)` pair, both within `[0, 1]`.
//! Construction rejects out-of-range or non-finite values instead of clamping,
//! and every operator re-checks its inputs and its result.
//!
//! Operators follow the simplified PLN formulas:
//!
//! | operator      | strength                    | confidence            |
//! |---------------|-----------------------------|-----------------------|
//! | deduction     | `s1 * s2`                   | `c1 * c2`             |
//! | abduction     | `s1 * s2`                   | `c1 * c2 * 0.8`       |
//! | induction     | `s1 * s2`                   | `c1 * c2 * 0.7`       |
//! | conjunction   | `s1 * s2`                   | `min(c1, c2)`         |
//! | disjunction   | `s1 + s2 - s1 * s2`         | `min(c1, c2)`         |
//! | negation      | `1 - s`                     | `c`                   |

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Confidence discount applied by [`abduction`].
pub const ABDUCTION_DISCOUNT: f64 = 0.8;

/// Confidence discount applied by [`induction`].
pub const INDUCTION_DISCOUNT: f64 = 0.7;

/// Upper bound on confidence reached by [`generalize`].
pub const GENERALIZATION_CONFIDENCE_CAP: f64 = 0.9;

/// Strength/confidence pair describing how true a statement is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTruthValue")]
pub struct TruthValue {
    strength: f64,
    confidence: f64,
}

#[derive(Deserialize)]
struct RawTruthValue {
    strength: f64,
    confidence: f64,
}

impl TryFrom<RawTruthValue> for TruthValue {
    type Error = EngineError;

    fn try_from(raw: RawTruthValue) -> Result<Self, Self::Error> {
        TruthValue::new(raw.strength, raw.confidence)
    }
}

fn check_unit(field: &str, value: f64) -> EngineResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::validation(
            field,
            format!("{} is outside [0, 1]", value),
        ))
    }
}

impl TruthValue {
    /// Create a truth value, rejecting anything outside `[0, 1]`.
    pub fn new(strength: f64, confidence: f64) -> EngineResult<Self> {
        check_unit("strength", strength)?;
        check_unit("confidence", confidence)?;
        Ok(Self {
            strength,
            confidence,
        })
    }

    /// `TV(1, 1)`, the identity for deduction and conjunction.
    pub const fn certain() -> Self {
        Self {
            strength: 1.0,
            confidence: 1.0,
        }
    }

    /// How true the statement is.
    #[inline]
    pub fn strength(&self) -> f64 {
        self.strength
    }

    /// How sure we are of [`strength`](Self::strength).
    #[inline]
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Strength weighted by confidence.
    pub fn weighted(&self) -> f64 {
        self.strength * self.confidence
    }

    /// Re-run the range checks. Values built through [`TruthValue::new`]
    /// always pass; this guards values produced by arithmetic.
    pub fn validate(&self) -> EngineResult<()> {
        check_unit("strength", self.strength)?;
        check_unit("confidence", self.confidence)
    }

    /// Component-wise comparison with tolerance.
    pub fn approx_eq(&self, other: &TruthValue, epsilon: f64) -> bool {
        (self.strength - other.strength).abs() <= epsilon
            && (self.confidence - other.confidence).abs() <= epsilon
    }
}

impl std::fmt::Display for TruthValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TV({:.3}, {:.3})", self.strength, self.confidence)
    }
}

fn binary(
    a: &TruthValue,
    b: &TruthValue,
    op: impl FnOnce(&TruthValue, &TruthValue) -> (f64, f64),
) -> EngineResult<TruthValue> {
    a.validate()?;
    b.validate()?;
    let (strength, confidence) = op(a, b);
    TruthValue::new(strength, confidence)
}

/// `(A→B) ∧ (B→C) ⊢ (A→C)`. Confidence attenuates multiplicatively, so
/// longer chains end up less certain.
pub fn deduction(a: &TruthValue, b: &TruthValue) -> EngineResult<TruthValue> {
    binary(a, b, |a, b| {
        (a.strength * b.strength, a.confidence * b.confidence)
    })
}

/// `(A→B) ∧ B ⊢ A`, deduction-shaped with a fixed 0.8 confidence discount.
pub fn abduction(a: &TruthValue, b: &TruthValue) -> EngineResult<TruthValue> {
    binary(a, b, |a, b| {
        (
            a.strength * b.strength,
            a.confidence * b.confidence * ABDUCTION_DISCOUNT,
        )
    })
}

/// Instance-to-rule inference, deduction-shaped with a fixed 0.7 confidence discount.
pub fn induction(a: &TruthValue, b: &TruthValue) -> EngineResult<TruthValue> {
    binary(a, b, |a, b| {
        (
            a.strength * b.strength,
            a.confidence * b.confidence * INDUCTION_DISCOUNT,
        )
    })
}

/// `A ∧ B`.
pub fn conjunction(a: &TruthValue, b: &TruthValue) -> EngineResult<TruthValue> {
    binary(a, b, |a, b| {
        (a.strength * b.strength, a.confidence.min(b.confidence))
    })
}

/// `A ∨ B`.
pub fn disjunction(a: &TruthValue, b: &TruthValue) -> EngineResult<TruthValue> {
    binary(a, b, |a, b| {
        (
            a.strength + b.strength - a.strength * b.strength,
            a.confidence.min(b.confidence),
        )
    })
}

/// `¬A`.
pub fn negation(tv: &TruthValue) -> EngineResult<TruthValue> {
    tv.validate()?;
    TruthValue::new(1.0 - tv.strength, tv.confidence)
}

/// Generalize from observed instances: mean strength, confidence growing
/// with the number of instances (`n / 10`) up to 0.9.
///
/// No instances yields `TV(0.5, 0.0)`: maximal ignorance.
pub fn generalize(instances: &[TruthValue]) -> EngineResult<TruthValue> {
    if instances.is_empty() {
        return TruthValue::new(0.5, 0.0);
    }
    for tv in instances {
        tv.validate()?;
    }
    let mean = instances.iter().map(TruthValue::strength).sum::<f64>() / instances.len() as f64;
    let confidence = (instances.len() as f64 / 10.0).min(GENERALIZATION_CONFIDENCE_CAP);
    TruthValue::new(mean.clamp(0.0, 1.0), confidence)
}

/// Fold a sequence with [`deduction`], starting from `TV(1, 1)`.
pub fn chain_deduction<'a, I>(values: I) -> EngineResult<TruthValue>
where
    I: IntoIterator<Item = &'a TruthValue>,
{
    values
        .into_iter()
        .try_fold(TruthValue::certain(), |acc, tv| deduction(&acc, tv))
}
