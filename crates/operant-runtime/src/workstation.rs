//! The workstation: one process running many chambers
//!
//! Owns the lifecycle manager, the component sources and the three engine
//! loops, each on its own named thread. Shutdown is ordered: every started
//! chamber is stopped, every chamber is removed while the loops still run (so
//! they can acknowledge), then the loops are stopped and the sources closed.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use operant_core::{
    ChamberId, ComponentHandle, ComponentKind, Components, EmptySource, EventLogger, Source,
};
use operant_task::{FileEventLogger, TaskRegistry};
use operant_time::{Clock, LoopStats, MonotonicClock, StatsHandle};

use crate::{
    ChamberConfig, ChamberSetup, EventDispatcher, LifecycleManager, LogicScheduler, NoInput,
    NoticeSink, OperatorInput, Presentation, PresentationLoop, RuntimeError, RuntimeResult,
    WorkstationConfig,
};

/// Name of the source unlisted components are bound to
pub const EMPTY_SOURCE: &str = "es";

/// Builder for a [`Workstation`]
pub struct WorkstationBuilder {
    config: WorkstationConfig,
    tasks: TaskRegistry,
    clock: Arc<dyn Clock>,
    input: Box<dyn OperatorInput>,
    notices: NoticeSink,
    sources: BTreeMap<String, Arc<dyn Source>>,
}

impl WorkstationBuilder {
    pub fn new(config: WorkstationConfig) -> Self {
        let mut sources: BTreeMap<String, Arc<dyn Source>> = BTreeMap::new();
        sources.insert(EMPTY_SOURCE.to_string(), Arc::new(EmptySource::new(EMPTY_SOURCE)));
        WorkstationBuilder {
            config,
            tasks: TaskRegistry::with_builtin(),
            clock: Arc::new(MonotonicClock::new()),
            input: Box::new(NoInput),
            notices: NoticeSink::disconnected(),
            sources,
        }
    }

    pub fn tasks(mut self, tasks: TaskRegistry) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn input(mut self, input: Box<dyn OperatorInput>) -> Self {
        self.input = input;
        self
    }

    pub fn notices(mut self, notices: NoticeSink) -> Self {
        self.notices = notices;
        self
    }

    /// Register a source under its own name, replacing any previous one
    pub fn source(mut self, source: Arc<dyn Source>) -> Self {
        self.sources.insert(source.name().to_string(), source);
        self
    }

    /// Validate the configuration and start the engine loops
    pub fn start(self) -> RuntimeResult<Workstation> {
        let source_names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        self.config.validate(&self.tasks, &source_names)?;

        let manager =
            LifecycleManager::new(self.tasks, self.clock, self.config.layout(), self.notices);
        let shutdown = Arc::new(AtomicBool::new(false));

        let logic = LogicScheduler::new(manager.clone(), self.input, self.config.logic_rate_hz);
        let presentation = PresentationLoop::new(manager.clone(), self.config.frame_rate_hz);
        let dispatcher = EventDispatcher::new(manager.clone());
        let stats = vec![
            ("logic", logic.stats_handle()),
            ("presentation", presentation.stats_handle()),
        ];

        let mut workstation = Workstation {
            loader: SessionLoader {
                manager,
                sources: Arc::new(self.sources),
                config: Arc::new(self.config),
            },
            shutdown,
            loops: Vec::new(),
            stats,
        };
        workstation.spawn_loop("operant-logic", move |stop| logic.run(stop))?;
        workstation.spawn_loop("operant-events", move |stop| dispatcher.run(stop))?;
        workstation.spawn_loop("operant-presentation", move |stop| presentation.run(stop))?;

        let layout = workstation.manager().layout();
        let config = workstation.config();
        tracing::info!(
            logic_rate_hz = config.logic_rate_hz,
            frame_rate_hz = config.frame_rate_hz,
            rows = layout.rows,
            cols = layout.cols,
            "workstation started"
        );
        Ok(workstation)
    }
}

/// Binds sessions to sources and adds them to a running workstation
///
/// Cloning is cheap; the operator console keeps one to add chambers at
/// runtime.
#[derive(Clone)]
pub struct SessionLoader {
    manager: LifecycleManager,
    sources: Arc<BTreeMap<String, Arc<dyn Source>>>,
    config: Arc<WorkstationConfig>,
}

impl SessionLoader {
    pub fn manager(&self) -> &LifecycleManager {
        &self.manager
    }

    pub fn config(&self) -> &WorkstationConfig {
        &self.config
    }

    /// The configured session of `chamber`, if any
    pub fn configured(&self, chamber: ChamberId) -> Option<&ChamberConfig> {
        self.config
            .sessions
            .iter()
            .find(|session| session.chamber_id() == chamber)
    }

    fn source(&self, name: &str) -> RuntimeResult<&Arc<dyn Source>> {
        self.sources
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownSource(name.to_string()))
    }

    fn source_names(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }

    fn bind_components(&self, session: &ChamberConfig) -> RuntimeResult<Components> {
        let required = self.manager.tasks().components(&session.task)?;
        let mut components = Components::new();
        for (id, kind) in required {
            let handle = match session.binding(id) {
                Some(binding) => self.bind(
                    &binding.source,
                    id,
                    binding.kind,
                    binding.address.as_deref(),
                )?,
                None => {
                    tracing::debug!(
                        chamber = session.chamber,
                        component = *id,
                        "component not bound in configuration; using the empty source"
                    );
                    self.bind(EMPTY_SOURCE, id, *kind, None)?
                }
            };
            components.insert(handle);
        }
        for binding in &session.components {
            if !components.contains(&binding.id) {
                components.insert(self.bind(
                    &binding.source,
                    &binding.id,
                    binding.kind,
                    binding.address.as_deref(),
                )?);
            }
        }
        Ok(components)
    }

    fn bind(
        &self,
        source: &str,
        id: &str,
        kind: ComponentKind,
        address: Option<&str>,
    ) -> RuntimeResult<ComponentHandle> {
        Ok(self.source(source)?.bind(id, kind, address)?)
    }

    fn file_loggers(&self, session: &ChamberConfig, folder: &Path) -> Vec<Box<dyn EventLogger>> {
        let metadata = session.task_metadata();
        session
            .loggers
            .iter()
            .map(|logger| {
                Box::new(FileEventLogger::for_task(
                    folder,
                    &metadata,
                    &session.task,
                    logger.kind,
                )) as Box<dyn EventLogger>
            })
            .collect()
    }

    /// Validate one session, then add it with its file loggers and extra loggers
    pub fn add_session(
        &self,
        session: &ChamberConfig,
        presentation: Box<dyn Presentation>,
        extra_loggers: Vec<Box<dyn EventLogger>>,
    ) -> RuntimeResult<ChamberId> {
        self.config
            .validate_session(session, self.manager.tasks(), &self.source_names())?;
        let components = self.bind_components(session)?;
        let mut loggers = self.file_loggers(session, &self.config.output_folder);
        loggers.extend(extra_loggers);
        let chamber = session.chamber_id();
        self.manager.add(ChamberSetup {
            chamber,
            task: session.task.clone(),
            metadata: session.task_metadata(),
            protocol: session.protocol.clone(),
            components,
            loggers,
            presentation,
        })?;
        Ok(chamber)
    }
}

/// A running workstation
pub struct Workstation {
    loader: SessionLoader,
    shutdown: Arc<AtomicBool>,
    loops: Vec<(&'static str, JoinHandle<()>)>,
    stats: Vec<(&'static str, StatsHandle)>,
}

impl Workstation {
    pub fn builder(config: WorkstationConfig) -> WorkstationBuilder {
        WorkstationBuilder::new(config)
    }

    fn spawn_loop(
        &mut self,
        name: &'static str,
        body: impl FnOnce(Arc<AtomicBool>) + Send + 'static,
    ) -> RuntimeResult<()> {
        let stop = Arc::clone(&self.shutdown);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(stop))
            .map_err(|source| RuntimeError::ThreadSpawn {
                name: name.to_string(),
                source,
            })?;
        self.loops.push((name, handle));
        Ok(())
    }

    pub fn manager(&self) -> &LifecycleManager {
        &self.loader.manager
    }

    pub fn config(&self) -> &WorkstationConfig {
        &self.loader.config
    }

    /// A handle for adding sessions while the workstation runs
    pub fn loader(&self) -> SessionLoader {
        self.loader.clone()
    }

    pub fn loop_stats(&self) -> Vec<(&'static str, LoopStats)> {
        self.stats
            .iter()
            .map(|(name, stats)| (*name, stats.lock().clone()))
            .collect()
    }

    /// Add one session, with its file loggers and extra loggers
    pub fn add_session(
        &self,
        session: &ChamberConfig,
        presentation: Box<dyn Presentation>,
        extra_loggers: Vec<Box<dyn EventLogger>>,
    ) -> RuntimeResult<ChamberId> {
        self.loader.add_session(session, presentation, extra_loggers)
    }

    /// Add every session listed in the configuration
    pub fn add_configured(
        &self,
        mut presentation: impl FnMut(ChamberId) -> Box<dyn Presentation>,
    ) -> RuntimeResult<Vec<ChamberId>> {
        let sessions = &self.loader.config.sessions;
        let mut added = Vec::with_capacity(sessions.len());
        for session in sessions {
            let chamber = session.chamber_id();
            added.push(self.add_session(session, presentation(chamber), Vec::new())?);
        }
        Ok(added)
    }

    /// Stop, remove, halt the loops, close the sources
    pub fn shutdown(mut self) -> RuntimeResult<()> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> RuntimeResult<()> {
        if self.shutdown.load(Ordering::Acquire) {
            return Ok(());
        }
        let manager = self.loader.manager.clone();
        tracing::info!(chambers = manager.chambers().len(), "workstation shutting down");
        let mut first_error = None;

        let chambers = manager.chambers();
        for &chamber in &chambers {
            match manager.stop(chamber) {
                Ok(())
                | Err(RuntimeError::ChamberRemoving(_))
                | Err(RuntimeError::UnknownChamber(_)) => {}
                Err(error) => {
                    tracing::warn!(chamber = chamber.index(), %error, "stop during shutdown failed");
                    first_error.get_or_insert(error);
                }
            }
        }

        let mut removals = Vec::with_capacity(chambers.len());
        for &chamber in &chambers {
            match manager.remove(chamber, true) {
                Ok(handle) => removals.push(handle),
                Err(RuntimeError::UnknownChamber(_)) => {}
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }
        for handle in removals {
            if let Err(error) = handle.join() {
                tracing::warn!(%error, "removal during shutdown failed");
                first_error.get_or_insert(error);
            }
        }

        self.shutdown.store(true, Ordering::Release);
        manager.notifier().notify();
        for (name, handle) in self.loops.drain(..) {
            if handle.join().is_err() {
                tracing::warn!(loop_name = name, "engine loop panicked");
            }
        }

        for (name, source) in self.loader.sources.iter() {
            if let Err(error) = source.close_source() {
                tracing::warn!(source = %name, %error, "source failed to close");
            }
        }
        tracing::info!("workstation shut down");

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Drop for Workstation {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown_inner() {
            tracing::warn!(%error, "workstation shutdown failed");
        }
    }
}
