//! Confidence calibration from the store's own track record.
//!
//! A rule's stated confidence is adjusted by how often acting on that
//! rule, at that confidence, actually improved things for this store.
//! High confidence is a floor: poor history never demotes it.

use std::collections::HashMap;

use crate::domain::decision::{CalibrationNote, Confidence, RuleKind};

/// Evaluated outcomes required in a bucket before history moves the dial.
pub const MIN_CALIBRATION_SAMPLES: u32 = 5;
const PROMOTE_RATE: f64 = 0.70;
const DEMOTE_RATE: f64 = 0.30;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BucketStats {
    pub evaluated: u32,
    pub improved: u32,
}

impl BucketStats {
    pub fn success_rate(&self) -> f64 {
        if self.evaluated == 0 {
            return 0.0;
        }
        f64::from(self.improved) / f64::from(self.evaluated)
    }
}

/// Historical (rule, base-confidence) success counts, derived on demand
/// from evaluated outcomes.
#[derive(Clone, Debug, Default)]
pub struct ConfidenceStats {
    buckets: HashMap<(RuleKind, Confidence), BucketStats>,
}

impl ConfidenceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, rule: RuleKind, confidence: Confidence, improved: bool) {
        let bucket = self.buckets.entry((rule, confidence)).or_default();
        bucket.evaluated += 1;
        if improved {
            bucket.improved += 1;
        }
    }

    pub fn set_bucket(&mut self, rule: RuleKind, confidence: Confidence, stats: BucketStats) {
        self.buckets.insert((rule, confidence), stats);
    }

    pub fn bucket(&self, rule: RuleKind, confidence: Confidence) -> Option<BucketStats> {
        self.buckets.get(&(rule, confidence)).copied()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibrated {
    pub confidence: Confidence,
    pub note: Option<CalibrationNote>,
}

/// Adjust `base` confidence with the store's history for this rule.
pub fn calibrate(rule: RuleKind, base: Confidence, stats: &ConfidenceStats) -> Calibrated {
    let Some(bucket) = stats.bucket(rule, base) else {
        return Calibrated { confidence: base, note: None };
    };
    if bucket.evaluated < MIN_CALIBRATION_SAMPLES {
        return Calibrated { confidence: base, note: None };
    }

    let success_rate = bucket.success_rate();
    let note = Some(CalibrationNote { success_rate, samples: bucket.evaluated });

    let confidence = match base {
        Confidence::High => Confidence::High,
        Confidence::Medium if success_rate >= PROMOTE_RATE => Confidence::High,
        Confidence::Medium if success_rate <= DEMOTE_RATE => Confidence::Low,
        Confidence::Medium => Confidence::Medium,
        Confidence::Low if success_rate >= PROMOTE_RATE => Confidence::Medium,
        Confidence::Low => Confidence::Low,
    };

    Calibrated { confidence, note }
}
