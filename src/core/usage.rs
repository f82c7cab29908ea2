//! Token and cost accounting with additive composition.

use serde::{Deserialize, Serialize};

/// Usage reported by an agent invocation, or the running total across a run.
///
/// Token counts are always present (agents that report nothing contribute
/// zero). `cost` and `duration_ms` stay `None` until some contributor reports
/// them, so consumers can tell "not reported" from "reported as zero"; once
/// any contributor reports one, the total sums over the contributors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Usage {
    /// Fold another usage into this total.
    pub fn absorb(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cost = sum_option(self.cost, other.cost);
        self.duration_ms = sum_option(self.duration_ms, other.duration_ms);
    }
}

fn sum_option<T: std::ops::Add<Output = T>>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (None, None) => None,
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (Some(a), Some(b)) => Some(a + b),
    }
}
