//! Confidence-weighted ranking of strategy profiles.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::StrategyProfile;
use crate::registry::StrategyLevel;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub strategy_id: String,
    pub name: String,
    pub level: StrategyLevel,
    pub fitness: f64,
    pub confidence_multiplier: f64,
    pub score: f64,
    pub sharpe: f64,
    pub max_drawdown_pct: f64,
}

/// How much the lifecycle level lets us trust the fitness number. A
/// passed walk-forward adds a tenth at the levels where it is fresh
/// evidence.
pub fn confidence_multiplier(level: StrategyLevel, walk_forward_passed: bool) -> f64 {
    let bonus = if walk_forward_passed { 0.1 } else { 0.0 };
    match level {
        StrategyLevel::L0Incubate => 0.3,
        StrategyLevel::L1Backtest => 0.6 + bonus,
        StrategyLevel::L2Paper => 0.9,
        StrategyLevel::L3Live => 1.0 + bonus,
        StrategyLevel::Killed => 0.0,
    }
}

/// Rank every non-killed profile by `fitness × confidence`, breaking
/// ties by higher Sharpe, then smaller drawdown, then id.
pub fn build_leaderboard(profiles: &[StrategyProfile]) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = profiles
        .iter()
        .filter(|p| p.level != StrategyLevel::Killed)
        .map(|p| {
            let multiplier = confidence_multiplier(p.level, p.walk_forward_passed);
            LeaderboardEntry {
                rank: 0,
                strategy_id: p.strategy_id.clone(),
                name: p.name.clone(),
                level: p.level,
                fitness: p.fitness,
                confidence_multiplier: multiplier,
                score: p.fitness * multiplier,
                sharpe: p.sharpe,
                max_drawdown_pct: p.max_drawdown_pct,
            }
        })
        .collect();

    entries.sort_by_key(|e| {
        (
            Reverse(OrderedFloat(e.score)),
            Reverse(OrderedFloat(e.sharpe)),
            OrderedFloat(e.max_drawdown_pct.abs()),
            e.strategy_id.clone(),
        )
    });
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i + 1;
    }
    entries
}
