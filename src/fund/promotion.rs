//! Promotion and demotion gate checks.
//!
//! These only report: the registry applies transitions. Each check
//! yields the satisfied criteria (`reasons`) and the failed ones
//! (`blockers`), so hosts can display exactly why a strategy moved or
//! stalled.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::StrategyProfile;
use crate::registry::StrategyLevel;

const L2_MIN_SHARPE: f64 = 1.0;
const L2_MAX_DRAWDOWN_PCT: f64 = 25.0;
const L2_MIN_TRADES: usize = 100;

const L3_MIN_PAPER_DAYS: i64 = 30;
const L3_MIN_PAPER_TRADES: usize = 30;
const L3_MIN_SHARPE_30D: f64 = 0.5;
const L3_MAX_CURRENT_DD_PCT: f64 = 20.0;
/// Max relative deviation between backtest and paper Sharpe for L2→L3.
const L3_MAX_SHARPE_DEVIATION: f64 = 0.3;

/// Relative backtest/paper Sharpe divergence that demotes L2 back to L1.
const L2_DEMOTE_DEVIATION: f64 = 0.5;
const L2_DEMOTE_SHARPE_30D: f64 = -0.5;
const L3_DEMOTE_LOSS_DAYS: usize = 3;
/// Cumulative paper loss (percent of initial paper capital) that kills
/// a strategy outright.
const KILL_LOSS_PCT: f64 = -40.0;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GateCheck {
    pub strategy_id: String,
    pub from: StrategyLevel,
    pub to: Option<StrategyLevel>,
    pub eligible: bool,
    pub reasons: Vec<String>,
    pub blockers: Vec<String>,
}

impl GateCheck {
    fn ineligible(profile: &StrategyProfile, note: &str) -> Self {
        Self {
            strategy_id: profile.strategy_id.clone(),
            from: profile.level,
            to: None,
            eligible: false,
            reasons: vec![note.to_string()],
            blockers: vec![],
        }
    }
}

/// Relative deviation between backtest and paper Sharpe.
fn sharpe_deviation(backtest: f64, paper: f64) -> f64 {
    (backtest - paper).abs() / backtest.abs().max(f64::EPSILON)
}

pub fn promotion_check(profile: &StrategyProfile) -> GateCheck {
    let mut reasons = Vec::new();
    let mut blockers = Vec::new();

    let to = match profile.level {
        StrategyLevel::L0Incubate => {
            reasons.push("definition validated".to_string());
            Some(StrategyLevel::L1Backtest)
        }
        StrategyLevel::L1Backtest => {
            check(
                &mut reasons,
                &mut blockers,
                profile.walk_forward_passed,
                "walk-forward passed",
                "walk-forward not passed",
            );
            check(
                &mut reasons,
                &mut blockers,
                profile.sharpe >= L2_MIN_SHARPE,
                &format!("backtest sharpe {:.2} >= {L2_MIN_SHARPE}", profile.sharpe),
                &format!("backtest sharpe {:.2} < {L2_MIN_SHARPE}", profile.sharpe),
            );
            check(
                &mut reasons,
                &mut blockers,
                profile.max_drawdown_pct.abs() <= L2_MAX_DRAWDOWN_PCT,
                &format!(
                    "max drawdown {:.1}% within {L2_MAX_DRAWDOWN_PCT}%",
                    profile.max_drawdown_pct
                ),
                &format!(
                    "max drawdown {:.1}% exceeds {L2_MAX_DRAWDOWN_PCT}%",
                    profile.max_drawdown_pct
                ),
            );
            check(
                &mut reasons,
                &mut blockers,
                profile.total_trades >= L2_MIN_TRADES,
                &format!("{} trades >= {L2_MIN_TRADES}", profile.total_trades),
                &format!("only {} trades, need {L2_MIN_TRADES}", profile.total_trades),
            );
            Some(StrategyLevel::L2Paper)
        }
        StrategyLevel::L2Paper => {
            let Some(paper) = profile.paper else {
                return GateCheck {
                    strategy_id: profile.strategy_id.clone(),
                    from: profile.level,
                    to: Some(StrategyLevel::L3Live),
                    eligible: false,
                    reasons,
                    blockers: vec!["no paper-trading history".to_string()],
                };
            };
            check(
                &mut reasons,
                &mut blockers,
                paper.days_active >= L3_MIN_PAPER_DAYS,
                &format!("{} paper days >= {L3_MIN_PAPER_DAYS}", paper.days_active),
                &format!("only {} paper days, need {L3_MIN_PAPER_DAYS}", paper.days_active),
            );
            check(
                &mut reasons,
                &mut blockers,
                paper.trade_count >= L3_MIN_PAPER_TRADES,
                &format!("{} paper trades >= {L3_MIN_PAPER_TRADES}", paper.trade_count),
                &format!(
                    "only {} paper trades, need {L3_MIN_PAPER_TRADES}",
                    paper.trade_count
                ),
            );
            check(
                &mut reasons,
                &mut blockers,
                paper.rolling_sharpe_30d >= L3_MIN_SHARPE_30D,
                &format!(
                    "30d sharpe {:.2} >= {L3_MIN_SHARPE_30D}",
                    paper.rolling_sharpe_30d
                ),
                &format!(
                    "30d sharpe {:.2} < {L3_MIN_SHARPE_30D}",
                    paper.rolling_sharpe_30d
                ),
            );
            check(
                &mut reasons,
                &mut blockers,
                paper.current_drawdown_pct.abs() <= L3_MAX_CURRENT_DD_PCT,
                &format!(
                    "current drawdown {:.1}% within {L3_MAX_CURRENT_DD_PCT}%",
                    paper.current_drawdown_pct
                ),
                &format!(
                    "current drawdown {:.1}% exceeds {L3_MAX_CURRENT_DD_PCT}%",
                    paper.current_drawdown_pct
                ),
            );
            let deviation = sharpe_deviation(profile.sharpe, paper.sharpe);
            check(
                &mut reasons,
                &mut blockers,
                deviation <= L3_MAX_SHARPE_DEVIATION,
                &format!("backtest/paper sharpe deviation {:.0}% within 30%", deviation * 100.0),
                &format!("backtest/paper sharpe deviation {:.0}% exceeds 30%", deviation * 100.0),
            );
            Some(StrategyLevel::L3Live)
        }
        StrategyLevel::L3Live => {
            return GateCheck::ineligible(profile, "no further promotion target");
        }
        StrategyLevel::Killed => {
            return GateCheck::ineligible(profile, "killed strategies never promote");
        }
    };

    GateCheck {
        strategy_id: profile.strategy_id.clone(),
        from: profile.level,
        to,
        eligible: blockers.is_empty(),
        reasons,
        blockers,
    }
}

/// Demotion triggers fire on ANY satisfied condition. The kill rule
/// dominates every per-level rule.
pub fn demotion_check(profile: &StrategyProfile) -> GateCheck {
    let mut reasons = Vec::new();

    if let Some(paper) = profile.paper {
        if paper.cumulative_return_pct < KILL_LOSS_PCT && profile.level != StrategyLevel::Killed {
            return GateCheck {
                strategy_id: profile.strategy_id.clone(),
                from: profile.level,
                to: Some(StrategyLevel::Killed),
                eligible: true,
                reasons: vec![format!(
                    "cumulative paper loss {:.1}% breaches {KILL_LOSS_PCT}%",
                    paper.cumulative_return_pct
                )],
                blockers: vec![],
            };
        }
    }

    let to = match (profile.level, profile.paper) {
        (StrategyLevel::L3Live, Some(paper)) => {
            if paper.consecutive_loss_days >= L3_DEMOTE_LOSS_DAYS {
                reasons.push(format!(
                    "{} consecutive loss days",
                    paper.consecutive_loss_days
                ));
            }
            if paper.rolling_sharpe_7d < 0.0 {
                reasons.push(format!("7d sharpe {:.2} negative", paper.rolling_sharpe_7d));
            }
            if paper.decay_level == crate::paper::decay::DecayLevel::Critical {
                reasons.push("decay level critical".to_string());
            }
            Some(StrategyLevel::L2Paper)
        }
        (StrategyLevel::L2Paper, Some(paper)) => {
            if paper.rolling_sharpe_30d < L2_DEMOTE_SHARPE_30D {
                reasons.push(format!(
                    "30d sharpe {:.2} below {L2_DEMOTE_SHARPE_30D}",
                    paper.rolling_sharpe_30d
                ));
            }
            let deviation = sharpe_deviation(profile.sharpe, paper.sharpe);
            if deviation > L2_DEMOTE_DEVIATION {
                reasons.push(format!(
                    "backtest/paper sharpe deviation {:.0}% exceeds 50%",
                    deviation * 100.0
                ));
            }
            Some(StrategyLevel::L1Backtest)
        }
        _ => None,
    };

    let eligible = !reasons.is_empty() && to.is_some();
    GateCheck {
        strategy_id: profile.strategy_id.clone(),
        from: profile.level,
        to: if eligible { to } else { None },
        eligible,
        reasons,
        blockers: vec![],
    }
}

fn check(
    reasons: &mut Vec<String>,
    blockers: &mut Vec<String>,
    passed: bool,
    reason: &str,
    blocker: &str,
) {
    if passed {
        reasons.push(reason.to_string());
    } else {
        blockers.push(blocker.to_string());
    }
}
