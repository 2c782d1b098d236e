//! Pairwise correlation monitor over strategy return series.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::stats;

/// Pairs at or above this magnitude are flagged and capped by the
/// allocator.
pub const HIGH_CORRELATION: f64 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CorrelationPair {
    pub a: String,
    pub b: String,
    pub rho: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CorrelationReport {
    /// Strategy ids in matrix order (sorted).
    pub ids: Vec<String>,
    /// Dense symmetric matrix, `matrix[i][j] = ρ(ids[i], ids[j])`.
    pub matrix: Vec<Vec<f64>>,
    pub high_pairs: Vec<CorrelationPair>,
}

impl CorrelationReport {
    pub fn rho(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.ids.iter().position(|id| id == a)?;
        let j = self.ids.iter().position(|id| id == b)?;
        Some(self.matrix[i][j])
    }
}

/// Pearson correlation for every pair, computed over the overlapping
/// prefix of length `min(|a|, |b|)`. Pairs shorter than 3 observations,
/// or with zero variance on either side, score 0.
pub fn correlation_matrix(returns: &HashMap<String, Vec<f64>>) -> CorrelationReport {
    let mut ids: Vec<String> = returns.keys().cloned().collect();
    ids.sort();
    let n = ids.len();

    let mut matrix = vec![vec![0.0; n]; n];
    let mut high_pairs = Vec::new();

    for i in 0..n {
        matrix[i][i] = stats::pearson(&returns[&ids[i]], &returns[&ids[i]]);
        for j in (i + 1)..n {
            let rho = stats::pearson(&returns[&ids[i]], &returns[&ids[j]]);
            matrix[i][j] = rho;
            matrix[j][i] = rho;
            if rho.abs() >= HIGH_CORRELATION {
                high_pairs.push(CorrelationPair {
                    a: ids[i].clone(),
                    b: ids[j].clone(),
                    rho,
                });
            }
        }
    }

    CorrelationReport {
        ids,
        matrix,
        high_pairs,
    }
}
