pub mod agent;
pub mod config;
pub mod error;
pub mod executor;
pub mod latest;
pub mod metrics;
pub mod model;
pub mod shutdown;
pub mod store;
pub mod supervisor;

pub use agent::{AgentContext, AgentStats};
pub use config::{Config, ConnectionMode, TargetConfig};
pub use error::{CoreError, Result};
pub use executor::{CommandExecutor, LocalExecutor, RemoteExecutor};
pub use latest::LatestValues;
pub use metrics::Collector;
pub use model::*;
pub use shutdown::Shutdown;
pub use store::{read_snapshot, target_key, RetryPolicy, TimeSeriesStore};
pub use supervisor::{CollectionSupervisor, RunningAgents};
