use std::collections::HashMap;
use std::path::PathBuf;

use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::allocator::{allocate, Allocation};
use super::correlation::{correlation_matrix, CorrelationReport};
use super::fitness::{fitness_score, FitnessInputs, PerfTerm};
use super::leaderboard::{build_leaderboard, LeaderboardEntry};
use super::promotion::{demotion_check, promotion_check, GateCheck};
use super::risk::{RiskAssessment, RiskMonitor};
use super::types::{FundConfig, PaperPerformance, StrategyProfile};
use crate::error::{CoreError, CoreResult};
use crate::registry::{StrategyLevel, StrategyRecord};

const MS_PER_DAY: i64 = 86_400_000;

/// Persisted fund state: the committed allocation set plus bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FundState {
    pub total_capital: f64,
    pub cash_reserve: f64,
    pub allocations: Vec<Allocation>,
    pub last_rebalance_at_ms: Option<i64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// Everything the caller feeds one rebalance cycle.
pub struct RebalanceInputs<'a> {
    pub records: &'a [StrategyRecord],
    /// Paper-trading evidence per strategy id.
    pub paper: &'a HashMap<String, PaperPerformance>,
    /// Recent-window backtest evidence per strategy id; absent entries
    /// fall back to long-term evidence.
    pub recent: &'a HashMap<String, PerfTerm>,
    /// Daily return series per strategy id for the correlation monitor.
    pub returns: &'a HashMap<String, Vec<f64>>,
    pub now_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RebalanceReport {
    pub profiles: Vec<StrategyProfile>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub correlation: CorrelationReport,
    pub allocations: Vec<Allocation>,
    pub promotion_checks: Vec<GateCheck>,
    pub demotion_checks: Vec<GateCheck>,
}

/// Periodic orchestrator: fuses backtest, walk-forward and paper
/// evidence into fitness, ranks the book, allocates capital under risk
/// caps, and reports promotion/demotion gates. It never applies level
/// transitions itself; that stays with the registry.
pub struct FundManager {
    config: FundConfig,
    state_path: PathBuf,
    state: Mutex<FundState>,
    risk: Mutex<RiskMonitor>,
}

impl FundManager {
    /// Open the manager against a JSON state file, creating fresh state
    /// when the file does not exist.
    pub async fn open(
        state_path: impl Into<PathBuf>,
        config: FundConfig,
        now_ms: i64,
    ) -> CoreResult<Self> {
        config
            .validate()
            .map_err(|e| CoreError::InvalidInput(format!("fund config: {e}")))?;

        let state_path = state_path.into();
        let state = match tokio::fs::read(&state_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => FundState {
                total_capital: config.total_capital,
                cash_reserve: config.total_capital * config.cash_reserve_pct / 100.0,
                allocations: vec![],
                last_rebalance_at_ms: None,
                created_at_ms: now_ms,
                updated_at_ms: now_ms,
            },
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            config,
            state_path,
            state: Mutex::new(state),
            risk: Mutex::new(RiskMonitor::new()),
        })
    }

    pub fn config(&self) -> &FundConfig {
        &self.config
    }

    pub async fn state(&self) -> FundState {
        self.state.lock().await.clone()
    }

    /// Build fused profiles for every non-killed record.
    pub fn build_profiles(
        &self,
        records: &[StrategyRecord],
        paper: &HashMap<String, PaperPerformance>,
        recent: &HashMap<String, PerfTerm>,
        now_ms: i64,
    ) -> Vec<StrategyProfile> {
        records
            .iter()
            .filter(|r| r.level != StrategyLevel::Killed)
            .map(|record| {
                let long_term = record.last_backtest.map_or(
                    PerfTerm {
                        sharpe: 0.0,
                        trades: 0,
                        max_drawdown_pct: 0.0,
                    },
                    |bt| PerfTerm {
                        sharpe: bt.sharpe,
                        trades: bt.total_trades,
                        max_drawdown_pct: bt.max_drawdown_pct,
                    },
                );
                let paper_perf = paper.get(&record.id).copied();
                let paper_term = paper_perf.map(|p| PerfTerm {
                    sharpe: p.sharpe,
                    trades: p.trade_count,
                    max_drawdown_pct: p.max_drawdown_pct,
                });
                let fitness = fitness_score(&FitnessInputs {
                    long_term,
                    recent: recent.get(&record.id).copied(),
                    paper: paper_term,
                    days_since_launch: (now_ms - record.created_at_ms).max(0) / MS_PER_DAY,
                });
                StrategyProfile::from_record(record, paper_perf, fitness)
            })
            .collect()
    }

    /// One full cycle: fitness → profiles → leaderboard → correlation →
    /// allocation → persisted fund state. Atomic: either the new
    /// allocation set and `last_rebalance_at` commit together, or state
    /// stays untouched.
    pub async fn rebalance(&self, inputs: &RebalanceInputs<'_>) -> CoreResult<RebalanceReport> {
        let profiles = self.build_profiles(
            inputs.records,
            inputs.paper,
            inputs.recent,
            inputs.now_ms,
        );
        let leaderboard = build_leaderboard(&profiles);
        let correlation = correlation_matrix(inputs.returns);
        let allocations = allocate(
            &profiles,
            self.config.total_capital,
            &self.config,
            Some(&correlation),
        );
        let promotion_checks = profiles.iter().map(promotion_check).collect();
        let demotion_checks = profiles.iter().map(demotion_check).collect();

        let mut state = self.state.lock().await;
        let new_state = FundState {
            total_capital: self.config.total_capital,
            cash_reserve: self.config.total_capital * self.config.cash_reserve_pct / 100.0,
            allocations: allocations.clone(),
            last_rebalance_at_ms: Some(inputs.now_ms),
            created_at_ms: state.created_at_ms,
            updated_at_ms: inputs.now_ms,
        };
        self.persist(&new_state).await?;
        *state = new_state;

        tracing::info!(
            strategies = profiles.len(),
            allocated = allocations.len(),
            "fund rebalance committed"
        );

        Ok(RebalanceReport {
            profiles,
            leaderboard,
            correlation,
            allocations,
            promotion_checks,
            demotion_checks,
        })
    }

    pub async fn mark_day_start(&self, equity: f64) {
        self.risk.lock().await.mark_day_start(equity);
    }

    pub async fn evaluate_risk(&self, current_equity: f64) -> RiskAssessment {
        self.risk.lock().await.evaluate(current_equity)
    }

    async fn persist(&self, state: &FundState) -> CoreResult<()> {
        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.state_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.state_path).await?;
        Ok(())
    }
}
