//! Strategy records and their JSON persistence.
//!
//! Records are metadata-only: ids, parameters, lifecycle level and the
//! latest backtest/walk-forward artefacts. Executable implementations
//! live in the [`RuntimeCatalog`], and records re-hydrate against it by
//! id: "what the strategy is" persists as JSON, "what it does" stays
//! code.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::data::MarketKind;
use crate::engine::context::{Strategy, StrategyFactory};
use crate::engine::types::BacktestResult;
use crate::engine::walkforward::WalkForwardReport;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum StrategyLevel {
    #[serde(rename = "L0_INCUBATE")]
    L0Incubate,
    #[serde(rename = "L1_BACKTEST")]
    L1Backtest,
    #[serde(rename = "L2_PAPER")]
    L2Paper,
    #[serde(rename = "L3_LIVE")]
    L3Live,
    #[serde(rename = "KILLED")]
    Killed,
}

impl StrategyLevel {
    pub fn is_terminal(self) -> bool {
        self == Self::Killed
    }

    /// Legal state-machine moves: one step up, one step down (L3→L2,
    /// L2→L1), or any live state to `Killed`.
    pub fn can_transition_to(self, next: Self) -> bool {
        use StrategyLevel::{Killed, L0Incubate, L1Backtest, L2Paper, L3Live};
        match (self, next) {
            (Killed, _) => false,
            (_, Killed) => true,
            (L0Incubate, L1Backtest)
            | (L1Backtest, L2Paper)
            | (L2Paper, L3Live)
            | (L3Live, L2Paper)
            | (L2Paper, L1Backtest) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for StrategyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::L0Incubate => "L0_INCUBATE",
            Self::L1Backtest => "L1_BACKTEST",
            Self::L2Paper => "L2_PAPER",
            Self::L3Live => "L3_LIVE",
            Self::Killed => "KILLED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

/// Immutable strategy metadata. The executable half (`on_bar`) is never
/// serialised; it is resolved from the runtime catalog by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StrategyDefinition {
    pub id: String,
    pub name: String,
    pub version: String,
    pub markets: Vec<MarketKind>,
    pub symbols: Vec<String>,
    pub timeframes: Vec<String>,
    #[serde(default)]
    pub parameters: HashMap<String, f64>,
    #[serde(default)]
    pub parameter_ranges: HashMap<String, ParameterRange>,
}

/// Condensed backtest artefact kept on the record; the promotion gates
/// and fitness scoring read from this.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BacktestSummary {
    pub sharpe: f64,
    pub sortino: f64,
    pub max_drawdown_pct: f64,
    pub total_return_pct: f64,
    pub win_rate_pct: f64,
    pub profit_factor: f64,
    pub total_trades: usize,
    pub finished_at_ms: i64,
}

impl BacktestSummary {
    pub fn from_result(result: &BacktestResult, finished_at_ms: i64) -> Self {
        Self {
            sharpe: result.sharpe,
            sortino: result.sortino,
            max_drawdown_pct: result.max_drawdown_pct,
            total_return_pct: result.total_return_pct,
            win_rate_pct: result.win_rate_pct,
            profit_factor: result.profit_factor,
            total_trades: result.total_trades,
            finished_at_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WalkForwardSummary {
    pub passed: bool,
    pub ratio: f64,
    pub threshold: f64,
    pub avg_train_sharpe: f64,
    pub combined_test_sharpe: f64,
    pub finished_at_ms: i64,
}

impl WalkForwardSummary {
    pub fn from_report(report: &WalkForwardReport, finished_at_ms: i64) -> Self {
        Self {
            passed: report.passed,
            ratio: report.ratio,
            threshold: report.threshold,
            avg_train_sharpe: report.avg_train_sharpe,
            combined_test_sharpe: report.combined_test_sharpe,
            finished_at_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StrategyRecord {
    pub id: String,
    pub name: String,
    pub version: String,
    pub level: StrategyLevel,
    pub definition: StrategyDefinition,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    #[serde(default)]
    pub last_backtest: Option<BacktestSummary>,
    #[serde(default)]
    pub last_walk_forward: Option<WalkForwardSummary>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    strategies: Vec<StrategyRecord>,
}

/// Exclusive owner of strategy records, persisted as a single JSON
/// document. Writes go through a temp file and rename so a crash never
/// truncates the registry.
pub struct StrategyRegistry {
    path: PathBuf,
    records: Mutex<BTreeMap<String, StrategyRecord>>,
}

impl StrategyRegistry {
    /// Open a registry file, creating an empty registry when the file
    /// does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: RegistryFile = serde_json::from_slice(&bytes)?;
                file.strategies
                    .into_iter()
                    .map(|r| (r.id.clone(), r))
                    .collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub async fn register(
        &self,
        definition: StrategyDefinition,
        now_ms: i64,
    ) -> CoreResult<StrategyRecord> {
        if definition.id.is_empty() {
            return Err(CoreError::InvalidInput("strategy id is empty".into()));
        }
        let mut records = self.records.lock().await;
        if records.contains_key(&definition.id) {
            return Err(CoreError::InvalidInput(format!(
                "strategy {} is already registered",
                definition.id
            )));
        }
        let record = StrategyRecord {
            id: definition.id.clone(),
            name: definition.name.clone(),
            version: definition.version.clone(),
            level: StrategyLevel::L0Incubate,
            definition,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            last_backtest: None,
            last_walk_forward: None,
        };
        records.insert(record.id.clone(), record.clone());
        self.persist(&records).await?;
        tracing::info!(strategy_id = %record.id, "strategy registered");
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> CoreResult<StrategyRecord> {
        let records = self.records.lock().await;
        records
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("strategy {id}")))
    }

    pub async fn list(&self) -> Vec<StrategyRecord> {
        self.records.lock().await.values().cloned().collect()
    }

    pub async fn list_by_level(&self, level: StrategyLevel) -> Vec<StrategyRecord> {
        self.records
            .lock()
            .await
            .values()
            .filter(|r| r.level == level)
            .cloned()
            .collect()
    }

    /// Apply a lifecycle transition, enforcing the state machine.
    pub async fn apply_transition(
        &self,
        id: &str,
        to: StrategyLevel,
        reason: &str,
        now_ms: i64,
    ) -> CoreResult<StrategyRecord> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("strategy {id}")))?;
        if !record.level.can_transition_to(to) {
            return Err(CoreError::InvalidInput(format!(
                "illegal transition {} -> {to} for strategy {id}",
                record.level
            )));
        }
        tracing::info!(strategy_id = id, from = %record.level, to = %to, reason, "level transition");
        record.level = to;
        record.updated_at_ms = now_ms;
        let updated = record.clone();
        self.persist(&records).await?;
        Ok(updated)
    }

    pub async fn record_backtest(
        &self,
        id: &str,
        summary: BacktestSummary,
        now_ms: i64,
    ) -> CoreResult<()> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("strategy {id}")))?;
        record.last_backtest = Some(summary);
        record.updated_at_ms = now_ms;
        self.persist(&records).await
    }

    pub async fn record_walk_forward(
        &self,
        id: &str,
        summary: WalkForwardSummary,
        now_ms: i64,
    ) -> CoreResult<()> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("strategy {id}")))?;
        record.last_walk_forward = Some(summary);
        record.updated_at_ms = now_ms;
        self.persist(&records).await
    }

    async fn persist(&self, records: &BTreeMap<String, StrategyRecord>) -> CoreResult<()> {
        let file = RegistryFile {
            strategies: records.values().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Executable strategy implementations by id. The runtime half of the
/// registry: records persist as schema, this map supplies the code.
#[derive(Default)]
pub struct RuntimeCatalog {
    factories: HashMap<String, Arc<dyn StrategyFactory>>,
}

impl RuntimeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn StrategyFactory>) {
        self.factories.insert(factory.id().to_string(), factory);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn factory(&self, id: &str) -> CoreResult<&dyn StrategyFactory> {
        self.factories
            .get(id)
            .map(AsRef::as_ref)
            .ok_or_else(|| CoreError::NotFound(format!("no runtime implementation for {id}")))
    }

    /// Re-hydrate a record into an executable strategy instance.
    pub fn instantiate(&self, record: &StrategyRecord) -> CoreResult<Box<dyn Strategy>> {
        Ok(self
            .factory(&record.id)?
            .build(&record.definition.parameters))
    }
}
