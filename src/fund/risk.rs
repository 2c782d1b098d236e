//! Fund-wide daily risk evaluation against the day-start equity mark.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Normal,
    Caution,
    Warning,
    Critical,
}

impl RiskLevel {
    /// Sizing multiplier consumers apply to live orders at this level.
    pub fn scale_factor(self) -> f64 {
        match self {
            Self::Normal => 1.0,
            Self::Caution => 0.8,
            Self::Warning => 0.5,
            Self::Critical => 0.0,
        }
    }

    /// Thresholds are strict: a drawdown must exceed a boundary to
    /// promote to the next level; landing exactly on it stays below.
    pub fn from_daily_drawdown(drawdown_pct: f64) -> Self {
        if drawdown_pct > 10.0 {
            Self::Critical
        } else if drawdown_pct > 5.0 {
            Self::Warning
        } else if drawdown_pct > 0.0 {
            Self::Caution
        } else {
            Self::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    /// Non-negative, in percent.
    pub daily_drawdown_pct: f64,
    pub scale_factor: f64,
    pub today_pnl: f64,
    pub today_pnl_pct: f64,
    pub day_start_equity: f64,
}

/// Tracks the day-start equity mark and grades the current equity
/// against it. The caller marks day starts on its own clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskMonitor {
    day_start_equity: Option<f64>,
}

impl RiskMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_day_start(&mut self, equity: f64) {
        self.day_start_equity = Some(equity);
    }

    pub fn day_start_equity(&self) -> Option<f64> {
        self.day_start_equity
    }

    /// Grade `current_equity`. Without a day-start mark the current
    /// equity doubles as the mark (zero drawdown).
    pub fn evaluate(&self, current_equity: f64) -> RiskAssessment {
        let start = self.day_start_equity.unwrap_or(current_equity);
        let daily_drawdown_pct = if start > 0.0 {
            ((start - current_equity) / start * 100.0).max(0.0)
        } else {
            0.0
        };
        let risk_level = RiskLevel::from_daily_drawdown(daily_drawdown_pct);
        let today_pnl = current_equity - start;
        let today_pnl_pct = if start > 0.0 {
            today_pnl / start * 100.0
        } else {
            0.0
        };

        if risk_level >= RiskLevel::Warning {
            tracing::warn!(
                daily_drawdown_pct,
                level = ?risk_level,
                "fund risk level elevated"
            );
        }

        RiskAssessment {
            risk_level,
            daily_drawdown_pct,
            scale_factor: risk_level.scale_factor(),
            today_pnl,
            today_pnl_pct,
            day_start_equity: start,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assess(start: f64, current: f64) -> RiskAssessment {
        let mut monitor = RiskMonitor::new();
        monitor.mark_day_start(start);
        monitor.evaluate(current)
    }

    #[test]
    fn zero_drawdown_is_normal() {
        let a = assess(100_000.0, 100_000.0);
        assert_eq!(a.risk_level, RiskLevel::Normal);
        assert_eq!(a.daily_drawdown_pct, 0.0);
        assert_eq!(a.scale_factor, 1.0);
    }

    #[test]
    fn gains_stay_normal() {
        let a = assess(100_000.0, 105_000.0);
        assert_eq!(a.risk_level, RiskLevel::Normal);
        assert_eq!(a.daily_drawdown_pct, 0.0);
        assert_eq!(a.today_pnl, 5_000.0);
        assert_eq!(a.today_pnl_pct, 5.0);
    }

    #[test]
    fn boundary_walk_around_thresholds() {
        // 3.001% → caution
        let a = assess(100_000.0, 96_999.0);
        assert!((a.daily_drawdown_pct - 3.001).abs() < 1e-9);
        assert_eq!(a.risk_level, RiskLevel::Caution);

        // exactly 5% → still caution (strict threshold)
        let a = assess(100_000.0, 95_000.0);
        assert_eq!(a.daily_drawdown_pct, 5.0);
        assert_eq!(a.risk_level, RiskLevel::Caution);

        // 5.001% → warning
        let a = assess(100_000.0, 94_999.0);
        assert_eq!(a.risk_level, RiskLevel::Warning);
        assert_eq!(a.scale_factor, 0.5);
    }

    #[test]
    fn critical_past_ten_percent() {
        let a = assess(100_000.0, 90_000.0);
        assert_eq!(a.risk_level, RiskLevel::Warning); // exactly 10% stays warning
        let a = assess(100_000.0, 89_999.0);
        assert_eq!(a.risk_level, RiskLevel::Critical);
        assert_eq!(a.scale_factor, 0.0);
    }

    #[test]
    fn tiny_positive_drawdown_is_caution() {
        let a = assess(100_000.0, 99_999.0);
        assert_eq!(a.risk_level, RiskLevel::Caution);
        assert_eq!(a.scale_factor, 0.8);
    }

    #[test]
    fn transitions_are_monotone_in_drawdown() {
        let mut last = RiskLevel::Normal;
        for bp in 0..1500 {
            let dd = f64::from(bp) / 100.0;
            let level = RiskLevel::from_daily_drawdown(dd);
            assert!(level >= last, "risk regressed at {dd}%");
            last = level;
        }
    }

    #[test]
    fn unmarked_monitor_grades_flat() {
        let monitor = RiskMonitor::new();
        let a = monitor.evaluate(123_456.0);
        assert_eq!(a.risk_level, RiskLevel::Normal);
        assert_eq!(a.today_pnl, 0.0);
    }
}
