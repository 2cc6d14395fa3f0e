//! Execution containers and the node-local container service.
//!
//! A container owns one store, one command queue, one module runtime, and
//! one scheduler seat, and hosts many matches. Its tick is the strictly
//! ordered pipeline: drain commands → run systems → advance ticks →
//! publish snapshots. Within a container execution is single-threaded
//! cooperative; across containers ticks run in parallel.

use crate::events::{ErrorEvent, ErrorRecord};
use crate::matches::{MatchRecord, MatchStatus};
use crate::queue::{CommandEnvelope, CommandQueue};
use crate::snapshot::{SnapshotEngine, SnapshotFrame};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use stormstack_core::{
    ContainerId, EngineConfig, IdAllocator, MatchId, PlayerId, Result, StormError,
};
use stormstack_ecs::{shared_store, ComponentStore, SharedStore};
use stormstack_modules::{CommandContext, GameModule, ModuleRuntime, SystemContext};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Lifecycle status of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContainerStatus {
    /// Created, scheduler not yet driving.
    Created,
    /// Ticking.
    Running,
    /// Held for operator intervention; resumable.
    Paused,
    /// Terminal.
    Stopped,
}

/// Player issuing follow-up commands enqueued by systems.
const SYSTEM_PLAYER: PlayerId = PlayerId(0);

/// An execution container.
pub struct Container {
    id: ContainerId,
    tick_interval: Duration,
    max_commands_per_tick: usize,
    status: RwLock<ContainerStatus>,
    store: SharedStore,
    runtime: ModuleRuntime,
    queue: CommandQueue,
    matches: RwLock<HashMap<MatchId, MatchRecord>>,
    snapshots: Mutex<SnapshotEngine>,
    match_allocator: IdAllocator,
    error_tx: broadcast::Sender<ErrorEvent>,
}

impl Container {
    /// Build a container hosting the given modules.
    ///
    /// # Errors
    ///
    /// Surfaces module registration/binding failures (`Conflict`,
    /// `PreconditionFailed`, `UnresolvableModules`).
    pub fn new(
        id: ContainerId,
        modules: Vec<Arc<dyn GameModule>>,
        config: &EngineConfig,
        tick_interval: Option<Duration>,
    ) -> Result<Self> {
        let mut store = ComponentStore::new(config.entity_capacity, config.query_cache_capacity);
        let runtime = ModuleRuntime::new(modules, store.registry_mut())?;
        let (error_tx, _) = broadcast::channel(256);

        Ok(Self {
            id,
            tick_interval: tick_interval.unwrap_or_else(|| config.tick_interval()),
            max_commands_per_tick: config.max_commands_per_tick,
            status: RwLock::new(ContainerStatus::Created),
            store: shared_store(store),
            runtime,
            queue: CommandQueue::new(config.queue_capacity),
            matches: RwLock::new(HashMap::new()),
            snapshots: Mutex::new(SnapshotEngine::new()),
            match_allocator: IdAllocator::default(),
            error_tx,
        })
    }

    /// Container id.
    #[must_use]
    pub const fn id(&self) -> ContainerId {
        self.id
    }

    /// Configured tick interval.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> ContainerStatus {
        *self.status.read()
    }

    /// Shared store handle (readers may proceed in parallel with each other).
    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// The container's module runtime.
    #[must_use]
    pub const fn runtime(&self) -> &ModuleRuntime {
        &self.runtime
    }

    /// Subscribe to captured command/system error events.
    #[must_use]
    pub fn subscribe_errors(&self) -> broadcast::Receiver<ErrorEvent> {
        self.error_tx.subscribe()
    }

    // ------------------------------------------------------------------
    // Lifecycle (idempotent transitions)
    // ------------------------------------------------------------------

    /// `Created|Running → Running`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` from `Paused` (use resume) or `Stopped`.
    pub fn start(&self) -> Result<()> {
        let mut status = self.status.write();
        match *status {
            ContainerStatus::Created | ContainerStatus::Running => {
                *status = ContainerStatus::Running;
                Ok(())
            }
            other => Err(StormError::InvalidState(format!(
                "cannot start container {} from {other:?}",
                self.id
            ))),
        }
    }

    /// `Running|Paused → Paused`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` from `Created` or `Stopped`.
    pub fn pause(&self) -> Result<()> {
        let mut status = self.status.write();
        match *status {
            ContainerStatus::Running | ContainerStatus::Paused => {
                *status = ContainerStatus::Paused;
                Ok(())
            }
            other => Err(StormError::InvalidState(format!(
                "cannot pause container {} from {other:?}",
                self.id
            ))),
        }
    }

    /// `Paused|Running → Running`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` from `Created` or `Stopped`.
    pub fn resume(&self) -> Result<()> {
        let mut status = self.status.write();
        match *status {
            ContainerStatus::Paused | ContainerStatus::Running => {
                *status = ContainerStatus::Running;
                Ok(())
            }
            other => Err(StormError::InvalidState(format!(
                "cannot resume container {} from {other:?}",
                self.id
            ))),
        }
    }

    /// Transition to `Stopped` and release queues and retained snapshots.
    /// Terminal; idempotent.
    pub fn stop(&self) {
        let mut status = self.status.write();
        if *status == ContainerStatus::Stopped {
            return;
        }
        *status = ContainerStatus::Stopped;
        drop(status);

        self.queue.clear();
        let mut snapshots = self.snapshots.lock();
        let ids: Vec<MatchId> = self.matches.read().keys().copied().collect();
        for id in ids {
            snapshots.drop_match(id);
        }
        debug!(container = %self.id, "container stopped, resources released");
    }

    // ------------------------------------------------------------------
    // Matches
    // ------------------------------------------------------------------

    /// Create a match. An explicit id comes from the control plane;
    /// `None` allocates locally.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when the id is already hosted here.
    pub fn create_match(&self, id: Option<MatchId>, player_limit: u32) -> Result<MatchId> {
        let id = id.unwrap_or_else(|| MatchId(self.match_allocator.allocate()));
        let mut matches = self.matches.write();
        if matches.contains_key(&id) {
            return Err(StormError::Conflict(format!("match {id} already exists")));
        }
        matches.insert(id, MatchRecord::new(id, player_limit));
        debug!(container = %self.id, match_id = %id, player_limit, "created match");
        Ok(id)
    }

    /// Start a match.
    ///
    /// # Errors
    ///
    /// `MatchNotFound` or `InvalidState` from a terminal state.
    pub fn start_match(&self, id: MatchId) -> Result<()> {
        self.with_match_mut(id, MatchRecord::start)
    }

    /// Finish a match: terminal, releases its queue, retained snapshot,
    /// and entities.
    ///
    /// # Errors
    ///
    /// `MatchNotFound` or `InvalidState` when the match already errored.
    pub fn finish_match(&self, id: MatchId) -> Result<()> {
        self.with_match_mut(id, MatchRecord::finish)?;
        self.release_match(id);
        Ok(())
    }

    /// Admit a player to a running match.
    ///
    /// # Errors
    ///
    /// `MatchNotFound`, `InvalidState` unless Running, `MatchFull` at the
    /// limit.
    pub fn join_match(&self, id: MatchId, player: PlayerId) -> Result<()> {
        self.with_match_mut(id, |record| record.join(player))
    }

    /// Snapshot of one match's registry entry.
    ///
    /// # Errors
    ///
    /// Returns `MatchNotFound` for an unknown id.
    pub fn match_info(&self, id: MatchId) -> Result<MatchInfo> {
        self.matches
            .read()
            .get(&id)
            .map(MatchInfo::from)
            .ok_or(StormError::MatchNotFound(id))
    }

    /// Registry entries for every hosted match.
    #[must_use]
    pub fn list_matches(&self) -> Vec<MatchInfo> {
        let mut infos: Vec<MatchInfo> =
            self.matches.read().values().map(MatchInfo::from).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Captured error records for a match, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `MatchNotFound` for an unknown id.
    pub fn match_errors(&self, id: MatchId) -> Result<Vec<ErrorRecord>> {
        self.matches
            .read()
            .get(&id)
            .map(|record| record.errors.iter().cloned().collect())
            .ok_or(StormError::MatchNotFound(id))
    }

    /// Number of hosted matches (any state).
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.matches.read().len()
    }

    /// Fill fraction of the fullest per-match command queue.
    #[must_use]
    pub fn saturation(&self) -> f64 {
        self.queue.saturation()
    }

    // ------------------------------------------------------------------
    // Command submission
    // ------------------------------------------------------------------

    /// Validate, coerce, and buffer a command for the next tick.
    ///
    /// Scope and token↔match agreement are checked at the transport
    /// boundary before this call.
    ///
    /// # Errors
    ///
    /// `MatchNotFound`; `InvalidState` when the match accepts no
    /// commands; `UnknownCommand`; `TypeError`; `Backpressure` when the
    /// FIFO is full.
    pub fn submit_command(
        &self,
        match_id: MatchId,
        player_id: PlayerId,
        command: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        {
            let matches = self.matches.read();
            let record = matches
                .get(&match_id)
                .ok_or(StormError::MatchNotFound(match_id))?;
            if record.status.is_terminal() {
                return Err(StormError::InvalidState(format!(
                    "match {match_id} is {:?} and accepts no commands",
                    record.status
                )));
            }
        }

        let (_, spec) = self
            .runtime
            .find_command(command)
            .ok_or_else(|| StormError::UnknownCommand(command.to_string()))?;
        let args = spec.coerce(payload)?;

        self.queue.submit(CommandEnvelope {
            container_id: self.id,
            match_id,
            player_id,
            command: command.to_string(),
            args,
            authored_at: Utc::now(),
        })
    }

    // ------------------------------------------------------------------
    // Tick pipeline
    // ------------------------------------------------------------------

    /// Execute one tick of the pipeline and return the published frames.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the container is `Running`.
    pub fn tick(&self) -> Result<Vec<SnapshotFrame>> {
        if self.status() != ContainerStatus::Running {
            return Err(StormError::InvalidState(format!(
                "container {} is {:?}, tick requires Running",
                self.id,
                self.status()
            )));
        }

        // 1. Snapshot of readiness.
        let running: Vec<(MatchId, u64)> = self
            .matches
            .read()
            .values()
            .filter(|record| record.status == MatchStatus::Running)
            .map(|record| (record.id, record.current_tick))
            .collect();

        let mut captured_errors: Vec<ErrorEvent> = Vec::new();
        let mut system_outcomes: Vec<(MatchId, &'static str, bool)> = Vec::new();

        {
            let mut store = self.store.write();
            let flags = self.runtime.flags().to_vec();
            let superuser = self.runtime.superuser();

            for (match_id, current_tick) in &running {
                // 2. Command drain, FIFO per match.
                for envelope in self.queue.drain(*match_id, self.max_commands_per_tick) {
                    let outcome = match self.runtime.find_command(&envelope.command) {
                        Some((owner, _)) => {
                            let mut ctx = CommandContext::new(
                                &mut store,
                                *match_id,
                                envelope.player_id,
                                *current_tick,
                                &flags,
                                superuser,
                            );
                            owner.module.execute(&envelope.command, &envelope.args, &mut ctx)
                        }
                        None => Err(StormError::UnknownCommand(envelope.command.clone())),
                    };
                    if let Err(error) = outcome {
                        warn!(
                            command = %envelope.command,
                            match_id = %match_id,
                            %error,
                            "command failed"
                        );
                        captured_errors.push(ErrorEvent {
                            match_id: *match_id,
                            record: ErrorRecord {
                                tick: *current_tick,
                                command: envelope.command,
                                player_id: Some(envelope.player_id),
                                message: error.to_string(),
                            },
                        });
                    }
                }

                // 3. System pass in dependency-topological order; systems
                // see the post-drain state. Follow-ups run next tick.
                let mut follow_ups = Vec::new();
                for enabled in self.runtime.modules() {
                    for system in &enabled.systems {
                        let mut ctx = SystemContext::new(
                            &mut store,
                            *match_id,
                            *current_tick,
                            &mut follow_ups,
                        );
                        match system.run(&mut ctx) {
                            Ok(()) => system_outcomes.push((*match_id, system.name(), true)),
                            Err(error) => {
                                warn!(
                                    system = system.name(),
                                    match_id = %match_id,
                                    %error,
                                    "system failed"
                                );
                                captured_errors.push(ErrorEvent {
                                    match_id: *match_id,
                                    record: ErrorRecord {
                                        tick: *current_tick,
                                        command: system.name().to_string(),
                                        player_id: None,
                                        message: error.to_string(),
                                    },
                                });
                                system_outcomes.push((*match_id, system.name(), false));
                            }
                        }
                    }
                }

                for follow_up in follow_ups {
                    if let Err(error) = self.submit_command(
                        *match_id,
                        SYSTEM_PLAYER,
                        &follow_up.command,
                        &follow_up.payload,
                    ) {
                        captured_errors.push(ErrorEvent {
                            match_id: *match_id,
                            record: ErrorRecord {
                                tick: *current_tick,
                                command: follow_up.command,
                                player_id: None,
                                message: error.to_string(),
                            },
                        });
                    }
                }
            }
        }

        // 4. Tick increment and failure bookkeeping.
        let mut advanced: Vec<(MatchId, u64)> = Vec::new();
        {
            let mut matches = self.matches.write();
            for event in &captured_errors {
                if let Some(record) = matches.get_mut(&event.match_id) {
                    record.record_error(event.record.clone());
                }
            }
            for (match_id, system, succeeded) in system_outcomes {
                if let Some(record) = matches.get_mut(&match_id) {
                    if succeeded {
                        record.note_system_success(system);
                    } else if record.note_system_failure(system) {
                        warn!(
                            %match_id,
                            system,
                            "second consecutive system failure, marking match Error"
                        );
                        record.mark_error();
                    }
                }
            }
            for (match_id, _) in &running {
                if let Some(record) = matches.get_mut(match_id) {
                    if record.status == MatchStatus::Running {
                        record.current_tick += 1;
                        advanced.push((*match_id, record.current_tick));
                    }
                }
            }
        }

        for event in captured_errors {
            // No subscribers is fine; the record stays in the match ring.
            let _ = self.error_tx.send(event);
        }

        // 5. Snapshot publish; construction runs after systems with no
        // store mutation permitted.
        let store = self.store.read();
        let mut snapshots = self.snapshots.lock();
        let frames = advanced
            .into_iter()
            .map(|(match_id, tick)| snapshots.capture(&store, &self.runtime, match_id, tick))
            .collect();
        Ok(frames)
    }

    /// Build a scoped full snapshot on demand (HTTP pull path).
    ///
    /// # Errors
    ///
    /// `MatchNotFound`; `InvalidState` once the match is terminal.
    pub fn snapshot_now(
        &self,
        match_id: MatchId,
        player: Option<PlayerId>,
    ) -> Result<stormstack_core::MatchSnapshot> {
        let tick = {
            let matches = self.matches.read();
            let record = matches
                .get(&match_id)
                .ok_or(StormError::MatchNotFound(match_id))?;
            if record.status.is_terminal() {
                return Err(StormError::InvalidState(format!(
                    "match {match_id} is {:?} and emits no snapshots",
                    record.status
                )));
            }
            record.current_tick
        };
        let store = self.store.read();
        Ok(SnapshotEngine::build_full(
            &store,
            &self.runtime,
            match_id,
            tick,
            player,
        ))
    }

    fn with_match_mut(
        &self,
        id: MatchId,
        f: impl FnOnce(&mut MatchRecord) -> Result<()>,
    ) -> Result<()> {
        let mut matches = self.matches.write();
        let record = matches.get_mut(&id).ok_or(StormError::MatchNotFound(id))?;
        f(record)
    }

    fn release_match(&self, id: MatchId) {
        self.queue.remove_match(id);
        self.snapshots.lock().drop_match(id);
        let entities = self.store.read().entities_in_match(id);
        if !entities.is_empty() {
            let mut store = self.store.write();
            for entity in entities {
                let _ = store.delete_entity(entity);
            }
        }
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("matches", &self.match_count())
            .finish()
    }
}

/// Serializable summary of a match registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    /// Match id.
    pub id: MatchId,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Current tick.
    pub current_tick: u64,
    /// Admitted players.
    pub players: Vec<PlayerId>,
    /// Admission cap.
    pub player_limit: u32,
}

impl From<&MatchRecord> for MatchInfo {
    fn from(record: &MatchRecord) -> Self {
        Self {
            id: record.id,
            status: record.status,
            current_tick: record.current_tick,
            players: record.players.clone(),
            player_limit: record.player_limit,
        }
    }
}

/// Named module prototypes available to containers on this node.
#[derive(Default)]
pub struct ModuleCatalog {
    modules: DashMap<String, Arc<dyn GameModule>>,
}

impl ModuleCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module prototype under its descriptor name.
    pub fn register(&self, module: Arc<dyn GameModule>) {
        let name = module.descriptor().name.clone();
        self.modules.insert(name, module);
    }

    /// Supported module names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Resolve a list of module names into instances.
    ///
    /// # Errors
    ///
    /// Returns `ModuleNotFound` for the first unknown name.
    pub fn instantiate(&self, names: &[String]) -> Result<Vec<Arc<dyn GameModule>>> {
        names
            .iter()
            .map(|name| {
                self.modules
                    .get(name)
                    .map(|entry| Arc::clone(entry.value()))
                    .ok_or_else(|| StormError::ModuleNotFound(name.clone()))
            })
            .collect()
    }
}

impl std::fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCatalog")
            .field("modules", &self.names())
            .finish()
    }
}

/// Node-local registry of containers and their scheduler seats.
pub struct ContainerService {
    config: EngineConfig,
    catalog: ModuleCatalog,
    containers: DashMap<ContainerId, Arc<Container>>,
    allocator: IdAllocator,
}

impl ContainerService {
    /// Create a service with an empty catalog.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            catalog: ModuleCatalog::new(),
            containers: DashMap::new(),
            allocator: IdAllocator::default(),
        }
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The node's module catalog.
    #[must_use]
    pub const fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    /// Create a container hosting the named modules.
    ///
    /// # Errors
    ///
    /// `ModuleNotFound` for unknown names, plus any runtime binding error.
    pub fn create_container(
        &self,
        module_names: &[String],
        tick_interval: Option<Duration>,
    ) -> Result<Arc<Container>> {
        let modules = self.catalog.instantiate(module_names)?;
        let id = ContainerId(self.allocator.allocate());
        let container = Arc::new(Container::new(id, modules, &self.config, tick_interval)?);
        self.containers.insert(id, Arc::clone(&container));
        debug!(container = %id, modules = ?module_names, "created container");
        Ok(container)
    }

    /// Look up a container.
    ///
    /// # Errors
    ///
    /// Returns `ContainerNotFound` for an unknown id.
    pub fn get(&self, id: ContainerId) -> Result<Arc<Container>> {
        self.containers
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StormError::ContainerNotFound(id))
    }

    /// Replace a container's module set by rebuilding it in place.
    /// Only legal while the container hosts no matches; the replacement
    /// starts over from `Created`.
    ///
    /// # Errors
    ///
    /// `ContainerNotFound`, `InvalidState` once matches exist, plus any
    /// module resolution error.
    pub fn reconfigure(
        &self,
        id: ContainerId,
        module_names: &[String],
        tick_interval: Option<Duration>,
    ) -> Result<Arc<Container>> {
        let existing = self.get(id)?;
        if existing.match_count() > 0 {
            return Err(StormError::InvalidState(format!(
                "container {id} hosts matches; modules are fixed"
            )));
        }
        existing.stop();

        let modules = self.catalog.instantiate(module_names)?;
        let interval = tick_interval.or(Some(existing.tick_interval()));
        let container = Arc::new(Container::new(id, modules, &self.config, interval)?);
        self.containers.insert(id, Arc::clone(&container));
        debug!(container = %id, modules = ?module_names, "reconfigured container");
        Ok(container)
    }

    /// All containers, unordered.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<Container>> {
        self.containers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Total hosted matches across containers.
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.containers
            .iter()
            .map(|entry| entry.value().match_count())
            .sum()
    }

    /// Highest command-queue saturation across containers.
    #[must_use]
    pub fn saturation(&self) -> f64 {
        self.containers
            .iter()
            .map(|entry| entry.value().saturation())
            .fold(0.0, f64::max)
    }

    /// Number of containers.
    #[must_use]
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// Stop every container, releasing resources deterministically.
    pub fn shutdown(&self) {
        for entry in &self.containers {
            entry.value().stop();
        }
    }
}

/// Shared handle to the container service.
pub type SharedContainerService = Arc<ContainerService>;

/// Create a shared container service.
#[must_use]
pub fn shared_container_service(config: EngineConfig) -> SharedContainerService {
    Arc::new(ContainerService::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_container() -> Container {
        Container::new(
            ContainerId(1),
            Vec::new(),
            &EngineConfig::default(),
            None,
        )
        .expect("container")
    }

    #[test]
    fn container_lifecycle_is_idempotent() {
        let container = empty_container();
        assert_eq!(container.status(), ContainerStatus::Created);

        container.start().expect("start");
        container.start().expect("start twice");
        assert_eq!(container.status(), ContainerStatus::Running);

        container.pause().expect("pause");
        container.pause().expect("pause twice");
        assert_eq!(container.status(), ContainerStatus::Paused);

        container.resume().expect("resume");
        assert_eq!(container.status(), ContainerStatus::Running);

        container.stop();
        container.stop();
        assert_eq!(container.status(), ContainerStatus::Stopped);
        assert!(container.start().is_err());
    }

    #[test]
    fn pause_from_created_is_invalid() {
        let container = empty_container();
        assert!(matches!(
            container.pause(),
            Err(StormError::InvalidState(_))
        ));
    }

    #[test]
    fn empty_tick_advances_running_match() {
        let container = empty_container();
        container.start().expect("start");
        let match_id = container.create_match(None, 8).expect("create");
        container.start_match(match_id).expect("start match");

        let frames = container.tick().expect("tick");

        let info = container.match_info(match_id).expect("info");
        assert_eq!(info.current_tick, 1);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].tick, 1);
        assert!(frames[0].resync);
        assert!(frames[0].snapshot.modules.is_empty());
        assert!(container.match_errors(match_id).expect("errors").is_empty());
    }

    #[test]
    fn ticks_are_strictly_monotonic() {
        let container = empty_container();
        container.start().expect("start");
        let match_id = container.create_match(None, 8).expect("create");
        container.start_match(match_id).expect("start match");

        let mut last = 0;
        for _ in 0..5 {
            let frames = container.tick().expect("tick");
            assert_eq!(frames[0].tick, last + 1);
            last = frames[0].tick;
        }
    }

    #[test]
    fn created_match_does_not_tick() {
        let container = empty_container();
        container.start().expect("start");
        let match_id = container.create_match(None, 8).expect("create");

        let frames = container.tick().expect("tick");
        assert!(frames.is_empty());
        assert_eq!(container.match_info(match_id).expect("info").current_tick, 0);
    }

    #[test]
    fn tick_requires_running_container() {
        let container = empty_container();
        assert!(matches!(
            container.tick(),
            Err(StormError::InvalidState(_))
        ));
    }

    #[test]
    fn finished_match_accepts_no_commands() {
        let container = empty_container();
        container.start().expect("start");
        let match_id = container.create_match(None, 8).expect("create");
        container.start_match(match_id).expect("start match");
        container.finish_match(match_id).expect("finish");

        let result =
            container.submit_command(match_id, PlayerId(1), "anything", &serde_json::json!({}));
        assert!(matches!(result, Err(StormError::InvalidState(_))));

        // And emits no further snapshots.
        let frames = container.tick().expect("tick");
        assert!(frames.is_empty());
        assert!(container.snapshot_now(match_id, None).is_err());
    }

    #[test]
    fn unknown_command_rejected_at_submission() {
        let container = empty_container();
        container.start().expect("start");
        let match_id = container.create_match(None, 8).expect("create");
        container.start_match(match_id).expect("start match");

        let result =
            container.submit_command(match_id, PlayerId(1), "teleport", &serde_json::json!({}));
        assert!(matches!(result, Err(StormError::UnknownCommand(_))));
    }

    #[test]
    fn explicit_match_id_conflicts_on_reuse() {
        let container = empty_container();
        container.create_match(Some(MatchId(5)), 8).expect("create");
        assert!(matches!(
            container.create_match(Some(MatchId(5)), 8),
            Err(StormError::Conflict(_))
        ));
    }

    #[test]
    fn service_creates_and_lists_containers() {
        let service = ContainerService::new(EngineConfig::default());
        let container = service.create_container(&[], None).expect("create");
        assert_eq!(service.container_count(), 1);
        assert_eq!(service.get(container.id()).expect("get").id(), container.id());
        assert!(matches!(
            service.get(ContainerId(99)),
            Err(StormError::ContainerNotFound(_))
        ));
    }

    #[test]
    fn service_rejects_unknown_modules() {
        let service = ContainerService::new(EngineConfig::default());
        let result = service.create_container(&["no_such_module".to_string()], None);
        assert!(matches!(result, Err(StormError::ModuleNotFound(_))));
    }

    #[test]
    fn service_shutdown_stops_containers() {
        let service = ContainerService::new(EngineConfig::default());
        let container = service.create_container(&[], None).expect("create");
        container.start().expect("start");
        service.shutdown();
        assert_eq!(container.status(), ContainerStatus::Stopped);
    }
}
