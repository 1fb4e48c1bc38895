use std::sync::Arc;

use crate::core::config::SupervisorConfig;
use crate::core::supervisor::Supervisor;
use crate::error::RuntimeError;
use crate::events::Bus;
use crate::runtime::{ExecutionRuntime, InProcessRuntime};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::topology::{GroupSpec, Topology};

/// Builder for a [`Supervisor`]: topology, subscribers and execution runtime.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use threadvisor::{EntryFn, GroupSpec, Supervisor, SupervisorConfig, Thread, UnitError};
///
/// # async fn demo() -> Result<(), threadvisor::RuntimeError> {
/// let worker = EntryFn::arc("worker", |thread: Thread| async move {
///     thread.ready().await;
///     Ok::<_, UnitError>(())
/// });
/// let sup = Supervisor::builder(SupervisorConfig::default())
///     .group(GroupSpec::new("workers", worker).instances(4).peer("workers"))
///     .build()?;
/// sup.run().await
/// # }
/// ```
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    groups: Vec<GroupSpec>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    runtime: Option<Arc<dyn ExecutionRuntime>>,
}

impl SupervisorBuilder {
    /// Creates a builder with the given configuration.
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            groups: Vec::new(),
            subscribers: Vec::new(),
            runtime: None,
        }
    }

    /// Declares one group.
    pub fn group(mut self, group: GroupSpec) -> Self {
        self.groups.push(group);
        self
    }

    /// Declares several groups.
    pub fn groups(mut self, groups: impl IntoIterator<Item = GroupSpec>) -> Self {
        self.groups.extend(groups);
        self
    }

    /// Sets lifecycle event subscribers.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the default [`InProcessRuntime`].
    pub fn with_runtime(mut self, runtime: Arc<dyn ExecutionRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Validates configuration and topology and builds the supervisor.
    ///
    /// Must be called inside a tokio runtime (subscriber workers are spawned here).
    pub fn build(self) -> Result<Arc<Supervisor>, RuntimeError> {
        self.cfg.validate()?;
        let topology = Arc::new(Topology::new(self.groups)?);

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let runtime = self
            .runtime
            .unwrap_or_else(|| Arc::new(InProcessRuntime::new()));

        Ok(Supervisor::new_internal(self.cfg, topology, runtime, bus, subs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, TopologyError};
    use crate::runtime::EntryFn;
    use crate::thread::Thread;

    fn spec(name: &str) -> GroupSpec {
        GroupSpec::new(name, EntryFn::arc("noop", |_t: Thread| async move { Ok(()) }))
    }

    #[tokio::test]
    async fn test_build_validates() {
        let err = SupervisorBuilder::new(SupervisorConfig::default()).build().err();
        assert_eq!(err, Some(RuntimeError::InvalidTopology(TopologyError::Empty)));

        let cfg = SupervisorConfig {
            max_revive_attempts: 0,
            ..Default::default()
        };
        let err = SupervisorBuilder::new(cfg).group(spec("a")).build().err();
        assert_eq!(
            err,
            Some(RuntimeError::InvalidConfig(ConfigError::ZeroCount {
                field: "max_revive_attempts"
            }))
        );

        let sup = SupervisorBuilder::new(SupervisorConfig::default())
            .groups([spec("a").instances(2), spec("b").peer("a")])
            .build()
            .unwrap();
        assert_eq!(sup.topology().unit_count(), 3);
        assert_eq!(sup.pool("a").unwrap().len(), 2);
        assert!(!sup.is_running());
    }
}
