//! Half-Kelly capital allocation with level, correlation and total
//! exposure caps.

use std::cmp::Reverse;
use std::collections::HashMap;

use ordered_float::OrderedFloat;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::correlation::CorrelationReport;
use super::types::{FundConfig, StrategyProfile};
use crate::registry::StrategyLevel;

/// Cap on each allocation while the strategy is still paper trading.
const L2_CAP: f64 = 0.15;
/// Cap on live strategies with under 30 days of paper history.
const NEW_L3_CAP: f64 = 0.10;
/// Paper days after which a live strategy is considered mature.
const L3_MATURITY_DAYS: i64 = 30;
/// Combined cap for any highly-correlated pair.
const PAIR_CAP: f64 = 0.40;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Allocation {
    pub strategy_id: String,
    pub capital_usd: f64,
    pub weight_pct: f64,
    pub reason: String,
}

/// Allocate `total_capital` across eligible profiles.
///
/// Eligibility is `level ∈ {L2_PAPER, L3_LIVE}` with positive fitness.
/// Raw half-Kelly weights (`fitness / max_fitness × 0.5`) are then run
/// through per-level caps, pairwise correlation caps (`|ρ| ≥ 0.7` pairs
/// share at most 40%), and a uniform scale-down to the total exposure
/// limit. Output is sorted by weight descending.
pub fn allocate(
    profiles: &[StrategyProfile],
    total_capital: f64,
    config: &FundConfig,
    correlation: Option<&CorrelationReport>,
) -> Vec<Allocation> {
    let eligible: Vec<&StrategyProfile> = profiles
        .iter()
        .filter(|p| {
            matches!(p.level, StrategyLevel::L2Paper | StrategyLevel::L3Live) && p.fitness > 0.0
        })
        .collect();
    if eligible.is_empty() || total_capital <= 0.0 {
        return vec![];
    }

    let max_fitness = eligible
        .iter()
        .map(|p| p.fitness)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut weights: HashMap<String, f64> = HashMap::new();
    let mut reasons: HashMap<String, String> = HashMap::new();

    for p in &eligible {
        let raw = p.fitness / max_fitness * 0.5;
        let (cap, cap_label) = level_cap(p, config);
        let w = raw.min(cap);
        let mut reason = format!("fitness {:.3}, half-Kelly weight {:.1}%", p.fitness, raw * 100.0);
        if raw > cap {
            reason.push_str(&format!(", capped at {} {:.0}%", cap_label, cap * 100.0));
        }
        weights.insert(p.strategy_id.clone(), w);
        reasons.insert(p.strategy_id.clone(), reason);
    }

    // Correlation cap: any |ρ| ≥ 0.7 pair shares at most PAIR_CAP,
    // scaled down proportionally.
    if let Some(report) = correlation {
        for pair in &report.high_pairs {
            let (Some(&wa), Some(&wb)) = (weights.get(&pair.a), weights.get(&pair.b)) else {
                continue;
            };
            let combined = wa + wb;
            if combined > PAIR_CAP {
                let scale = PAIR_CAP / combined;
                weights.insert(pair.a.clone(), wa * scale);
                weights.insert(pair.b.clone(), wb * scale);
                for id in [&pair.a, &pair.b] {
                    if let Some(r) = reasons.get_mut(id) {
                        r.push_str(&format!(
                            ", correlation-capped (|rho| = {:.2} with peer)",
                            pair.rho.abs()
                        ));
                    }
                }
                tracing::debug!(a = %pair.a, b = %pair.b, rho = pair.rho, "correlated pair capped");
            }
        }
    }

    // Total exposure: scale everything uniformly under the limit.
    let exposure_limit = config.max_total_exposure_pct / 100.0;
    let total: f64 = weights.values().sum();
    if total > exposure_limit && total > 0.0 {
        let scale = exposure_limit / total;
        for (id, w) in &mut weights {
            *w *= scale;
            if let Some(r) = reasons.get_mut(id) {
                r.push_str(&format!(", scaled x{scale:.3} for total exposure"));
            }
        }
    }

    let mut allocations: Vec<Allocation> = weights
        .into_iter()
        .filter(|(_, w)| *w > 0.0)
        .map(|(id, w)| Allocation {
            reason: reasons.remove(&id).unwrap_or_default(),
            strategy_id: id,
            capital_usd: w * total_capital,
            weight_pct: w * 100.0,
        })
        .collect();
    allocations.sort_by_key(|a| (Reverse(OrderedFloat(a.weight_pct)), a.strategy_id.clone()));
    allocations
}

fn level_cap(profile: &StrategyProfile, config: &FundConfig) -> (f64, &'static str) {
    match profile.level {
        StrategyLevel::L2Paper => (L2_CAP, "L2 limit"),
        StrategyLevel::L3Live if profile.paper_days_active() < L3_MATURITY_DAYS => {
            (NEW_L3_CAP, "new-L3 limit")
        }
        _ => (config.max_single_strategy_pct / 100.0, "single-strategy limit"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fund::correlation::CorrelationPair;
    use crate::fund::types::PaperPerformance;
    use crate::paper::decay::DecayLevel;

    fn paper(days: i64) -> PaperPerformance {
        PaperPerformance {
            days_active: days,
            trade_count: 50,
            sharpe: 1.0,
            rolling_sharpe_7d: 0.8,
            rolling_sharpe_30d: 0.9,
            max_drawdown_pct: -8.0,
            current_drawdown_pct: -2.0,
            cumulative_return_pct: 12.0,
            consecutive_loss_days: 0,
            decay_level: DecayLevel::Healthy,
        }
    }

    fn profile(id: &str, level: StrategyLevel, fitness: f64, paper_days: i64) -> StrategyProfile {
        StrategyProfile {
            strategy_id: id.into(),
            name: id.into(),
            level,
            fitness,
            sharpe: 1.5,
            max_drawdown_pct: -10.0,
            total_trades: 200,
            walk_forward_passed: true,
            paper: Some(paper(paper_days)),
        }
    }

    fn pair_report(a: &str, b: &str, rho: f64) -> CorrelationReport {
        CorrelationReport {
            ids: vec![a.to_string(), b.to_string()],
            matrix: vec![vec![1.0, rho], vec![rho, 1.0]],
            high_pairs: if rho.abs() >= 0.7 {
                vec![CorrelationPair {
                    a: a.to_string(),
                    b: b.to_string(),
                    rho,
                }]
            } else {
                vec![]
            },
        }
    }

    #[test]
    fn only_l2_and_l3_with_positive_fitness_are_eligible() {
        let profiles = vec![
            profile("incubate", StrategyLevel::L0Incubate, 3.0, 0),
            profile("backtest", StrategyLevel::L1Backtest, 3.0, 0),
            profile("paper", StrategyLevel::L2Paper, 1.0, 60),
            profile("unfit", StrategyLevel::L3Live, -0.5, 60),
            profile("dead", StrategyLevel::Killed, 3.0, 60),
        ];
        let allocations = allocate(&profiles, 1_000_000.0, &FundConfig::new(1_000_000.0), None);
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].strategy_id, "paper");
    }

    #[test]
    fn l2_cap_applies() {
        let profiles = vec![profile("paper", StrategyLevel::L2Paper, 2.0, 60)];
        let allocations = allocate(&profiles, 1_000_000.0, &FundConfig::new(1_000_000.0), None);
        // raw 50% → L2 cap 15%
        assert!((allocations[0].weight_pct - 15.0).abs() < 1e-9);
        assert!((allocations[0].capital_usd - 150_000.0).abs() < 1e-6);
        assert!(allocations[0].reason.contains("L2 limit"));
    }

    #[test]
    fn young_live_strategy_capped_at_ten() {
        let profiles = vec![profile("fresh", StrategyLevel::L3Live, 2.0, 10)];
        let allocations = allocate(&profiles, 1_000_000.0, &FundConfig::new(1_000_000.0), None);
        assert!((allocations[0].weight_pct - 10.0).abs() < 1e-9);
        assert!(allocations[0].reason.contains("new-L3"));
    }

    #[test]
    fn perfectly_correlated_pair_shares_forty_percent() {
        let profiles = vec![
            profile("a", StrategyLevel::L3Live, 2.0, 60),
            profile("b", StrategyLevel::L3Live, 2.0, 60),
        ];
        let report = pair_report("a", "b", 1.0);
        let allocations = allocate(
            &profiles,
            1_000_000.0,
            &FundConfig::new(1_000_000.0),
            Some(&report),
        );
        let total: f64 = allocations.iter().map(|a| a.weight_pct).sum();
        assert!(total <= 40.0 + 1e-9, "combined {total}%");
        // Proportional scale-down of two equal 30% caps → 20% each.
        for a in &allocations {
            assert!((a.weight_pct - 20.0).abs() < 1e-9);
        }
    }

    #[test]
    fn uncorrelated_pair_keeps_individual_caps() {
        let profiles = vec![
            profile("a", StrategyLevel::L3Live, 2.0, 60),
            profile("b", StrategyLevel::L3Live, 2.0, 60),
        ];
        let report = pair_report("a", "b", 0.0);
        let allocations = allocate(
            &profiles,
            1_000_000.0,
            &FundConfig::new(1_000_000.0),
            Some(&report),
        );
        // raw 50% each → single-strategy cap 30% each, total 60% ≤ 70%.
        for a in &allocations {
            assert!((a.weight_pct - 30.0).abs() < 1e-9);
        }
    }

    #[test]
    fn total_exposure_scales_uniformly() {
        let profiles = vec![
            profile("a", StrategyLevel::L3Live, 2.0, 60),
            profile("b", StrategyLevel::L3Live, 2.0, 60),
            profile("c", StrategyLevel::L3Live, 2.0, 60),
        ];
        let allocations = allocate(&profiles, 900_000.0, &FundConfig::new(900_000.0), None);
        let total: f64 = allocations.iter().map(|a| a.weight_pct).sum();
        // 3 × 30% = 90% → scaled to the 70% limit.
        assert!((total - 70.0).abs() < 1e-9);
        for a in &allocations {
            assert!((a.weight_pct - 70.0 / 3.0).abs() < 1e-9);
            assert!(a.capital_usd > 0.0);
        }
    }

    #[test]
    fn output_sorted_by_weight_desc() {
        let profiles = vec![
            profile("small", StrategyLevel::L2Paper, 0.5, 60),
            profile("large", StrategyLevel::L3Live, 2.0, 60),
        ];
        let allocations = allocate(&profiles, 1_000_000.0, &FundConfig::new(1_000_000.0), None);
        assert_eq!(allocations[0].strategy_id, "large");
        assert!(allocations[0].weight_pct >= allocations[1].weight_pct);
    }

    #[test]
    fn no_eligible_profiles_allocates_nothing() {
        let profiles = vec![profile("incubate", StrategyLevel::L0Incubate, 2.0, 0)];
        assert!(allocate(&profiles, 1_000_000.0, &FundConfig::new(1_000_000.0), None).is_empty());
        assert!(allocate(&[], 1_000_000.0, &FundConfig::new(1_000_000.0), None).is_empty());
    }
}
