pub mod analyzer;
pub mod query;
pub mod routing;
pub mod strategy;
pub mod text;

mod error;

pub use analyzer::{QueryAnalysis, QueryAnalyzer};
pub use error::{Error, Result};
pub use query::{Difficulty, Granularity, QueryIntent, QueryType};
pub use routing::{
	Complexity, DatabaseRouter, QueryContext, RoutingDecision, RoutingPolicy, RoutingQueryType,
	StoreKind,
};
pub use strategy::StrategyKind;
