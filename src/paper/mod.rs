pub mod decay;
pub mod engine;
pub mod market;
pub mod store;
pub mod types;

pub use decay::{DecayLevel, DecayState};
pub use engine::{PaperEngine, PaperEngineConfig};
pub use market::{MarketRule, MarketRules};
pub use store::PaperStore;
pub use types::{
    EquitySnapshot, Lot, OrderRequest, OrderSide, OrderStatus, PaperAccount, PaperOrder, Position,
    PositionSide,
};
