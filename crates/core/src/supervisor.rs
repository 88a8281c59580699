use crate::{
    agent::{run_agent, AgentContext, AgentStats},
    config::{Config, ConnectionMode},
    error::{CoreError, Result},
    executor::{CommandExecutor, LocalExecutor, RemoteExecutor},
    latest::LatestValues,
    metrics::collector_for,
    model::AgentKind,
    shutdown::Shutdown,
    store::TimeSeriesStore,
};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info};

/// Owns the configuration, the executor and the store for one target and
/// launches one agent thread per metric family.
pub struct CollectionSupervisor {
    config: Config,
    executor: Arc<dyn CommandExecutor>,
    store: Arc<TimeSeriesStore>,
}

impl CollectionSupervisor {
    /// Connect to the configured target and open its store.
    ///
    /// In remote mode an unreachable target fails here with a connection error.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let executor: Arc<dyn CommandExecutor> = match config.mode {
            ConnectionMode::Local => Arc::new(LocalExecutor::new(config.command_timeout())),
            ConnectionMode::Remote => Arc::new(RemoteExecutor::connect(
                config.target.clone(),
                config.command_timeout(),
            )?),
        };
        Self::with_executor(config, executor)
    }

    /// Build around an already constructed executor.
    pub fn with_executor(config: Config, executor: Arc<dyn CommandExecutor>) -> Result<Self> {
        config.validate()?;
        let target = executor.target_name();
        let store = Arc::new(TimeSeriesStore::open(
            &config.data_dir,
            &target,
            config.retry_policy(),
        )?);
        info!(%target, path = %store.path().display(), "store ready");

        Ok(Self {
            config,
            executor,
            store,
        })
    }

    pub fn store(&self) -> Arc<TimeSeriesStore> {
        Arc::clone(&self.store)
    }

    /// Launch every agent and return immediately.
    pub fn start(self) -> Result<RunningAgents> {
        let shutdown = Shutdown::new();
        let ctx = AgentContext {
            executor: self.executor,
            store: Arc::clone(&self.store),
            latest: Arc::new(LatestValues::new()),
            shutdown: shutdown.clone(),
        };

        let mut handles = Vec::with_capacity(AgentKind::ALL.len());
        for kind in AgentKind::ALL {
            let collector = collector_for(kind, &self.config);
            let interval = self.config.interval_for(kind);
            let ctx = ctx.clone();

            let spawned = thread::Builder::new()
                .name(format!("agent-{kind}"))
                .spawn(move || {
                    let outcome = run_agent(collector.as_ref(), &ctx, interval);
                    if let Err(e) = &outcome {
                        error!(agent = %kind, error = %e, "agent gave up, stopping collection");
                        ctx.shutdown.trigger();
                    }
                    outcome
                });

            match spawned {
                Ok(handle) => handles.push((kind, handle)),
                Err(e) => {
                    shutdown.trigger();
                    return Err(CoreError::Io(e));
                }
            }
        }

        info!(agents = handles.len(), "collection started");
        Ok(RunningAgents {
            handles,
            shutdown,
            store: self.store,
        })
    }
}

/// Handle to the agent threads of a started supervisor
pub struct RunningAgents {
    handles: Vec<(AgentKind, JoinHandle<Result<AgentStats>>)>,
    shutdown: Shutdown,
    store: Arc<TimeSeriesStore>,
}

impl RunningAgents {
    /// Ask every agent to stop before its next command.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn store(&self) -> Arc<TimeSeriesStore> {
        Arc::clone(&self.store)
    }

    /// Block until every agent has stopped.
    ///
    /// Agents only stop on shutdown or when the store becomes unusable; the
    /// latter is returned as an error.
    pub fn wait(self) -> Result<Vec<(AgentKind, AgentStats)>> {
        let mut stats = Vec::with_capacity(self.handles.len());
        let mut fatal = None;
        for (kind, handle) in self.handles {
            match handle.join() {
                Ok(Ok(agent_stats)) => stats.push((kind, agent_stats)),
                Ok(Err(e)) => {
                    fatal.get_or_insert(e);
                }
                Err(_) => error!(agent = %kind, "agent thread panicked"),
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }
}
