//! Task registry
//!
//! Maps task names to factories. Every task the engine can run is registered
//! explicitly; a chamber naming an unknown task is rejected when its
//! configuration is loaded.

use std::collections::BTreeMap;
use std::fmt;

use operant_core::{ComponentKind, Components, TaskMetadata, Timestamp};

use crate::tasks::{FiveChoice, Habituation, HabituationSequence};
use crate::{Constants, Protocol, Task, TaskError, TaskInstance, TaskLogic, TaskResult};

/// Everything a factory needs to build a task instance
#[derive(Clone, Debug)]
pub struct TaskContext {
    pub metadata: TaskMetadata,
    pub components: Components,
    pub protocol: Protocol,
    /// Construction time
    pub now: Timestamp,
}

/// A task type the registry can construct
pub trait TaskDefinition: 'static {
    /// Name used in configuration
    const NAME: &'static str;

    /// Components the task requires, by id
    fn components() -> &'static [(&'static str, ComponentKind)];

    /// Declared constants with their defaults
    fn constants() -> Constants;

    /// Cross-constant checks run on the resolved values
    fn check(_constants: &Constants) -> TaskResult<()> {
        Ok(())
    }

    /// Build the task from verified components and resolved constants
    fn build(ctx: &TaskContext, constants: &Constants) -> TaskResult<Box<dyn Task>>;
}

/// Verify components, resolve constants, then build `D`
pub fn instantiate<D: TaskDefinition>(ctx: &TaskContext) -> TaskResult<Box<dyn Task>> {
    ctx.components.verify(D::components())?;
    let constants = D::constants().resolve(&ctx.protocol)?;
    D::check(&constants)?;
    D::build(ctx, &constants)
}

/// Bind `logic` to the context's metadata and components
pub fn instantiate_logic<L: TaskLogic>(
    name: &'static str,
    logic: L,
    initial: L::State,
    ctx: &TaskContext,
) -> Box<dyn Task> {
    Box::new(TaskInstance::new(
        name,
        logic,
        initial,
        ctx.metadata.clone(),
        ctx.components.clone(),
        ctx.now,
    ))
}

fn check_protocol<D: TaskDefinition>(protocol: &Protocol) -> TaskResult<()> {
    let constants = D::constants().resolve(protocol)?;
    D::check(&constants)
}

/// Registered factory for one task type
#[derive(Clone, Copy)]
pub struct TaskFactory {
    pub name: &'static str,
    pub build: fn(&TaskContext) -> TaskResult<Box<dyn Task>>,
    pub components: fn() -> &'static [(&'static str, ComponentKind)],
    pub check_protocol: fn(&Protocol) -> TaskResult<()>,
}

impl TaskFactory {
    pub fn of<D: TaskDefinition>() -> Self {
        TaskFactory {
            name: D::NAME,
            build: instantiate::<D>,
            components: D::components,
            check_protocol: check_protocol::<D>,
        }
    }
}

impl fmt::Debug for TaskFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskFactory({})", self.name)
    }
}

/// Name → factory mapping
#[derive(Clone, Debug, Default)]
pub struct TaskRegistry {
    factories: BTreeMap<&'static str, TaskFactory>,
}

impl TaskRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the reference tasks
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register::<FiveChoice>();
        registry.register::<Habituation>();
        registry.register::<HabituationSequence>();
        registry
    }

    pub fn register<D: TaskDefinition>(&mut self) -> &mut Self {
        self.factories.insert(D::NAME, TaskFactory::of::<D>());
        self
    }

    pub fn factory(&self, name: &str) -> TaskResult<&TaskFactory> {
        self.factories
            .get(name)
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    /// Components required by task `name`
    pub fn components(&self, name: &str) -> TaskResult<&'static [(&'static str, ComponentKind)]> {
        Ok((self.factory(name)?.components)())
    }

    /// Reject unknown task names and invalid protocols without building
    pub fn validate(&self, name: &str, protocol: &Protocol) -> TaskResult<()> {
        (self.factory(name)?.check_protocol)(protocol)
    }

    /// Build task `name`
    pub fn create(&self, name: &str, ctx: &TaskContext) -> TaskResult<Box<dyn Task>> {
        let factory = self.factory(name)?;
        let task = (factory.build)(ctx)?;
        tracing::debug!(
            task = factory.name,
            chamber = ctx.metadata.chamber.index(),
            "task constructed"
        );
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use operant_core::{ChamberId, EmptySource, Source};

    fn context(task: &str, protocol: Protocol) -> TaskContext {
        let registry = TaskRegistry::with_builtin();
        let source = EmptySource::default();
        let mut components = Components::new();
        for (id, kind) in registry.components(task).unwrap() {
            components.insert(source.bind(id, *kind, None).unwrap());
        }
        TaskContext {
            metadata: TaskMetadata::new(ChamberId::new(0), "default"),
            components,
            protocol,
            now: Timestamp::ZERO,
        }
    }

    #[test]
    fn test_builtin_names() {
        let registry = TaskRegistry::with_builtin();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["FiveChoice", "Habituation", "HabituationSequence"]);
    }

    #[test]
    fn test_unknown_task_rejected() {
        let registry = TaskRegistry::with_builtin();
        assert!(matches!(
            registry.validate("NoSuchTask", &Protocol::new()),
            Err(TaskError::UnknownTask(_))
        ));
    }

    #[test]
    fn test_create_builtin() {
        let registry = TaskRegistry::with_builtin();
        for name in ["FiveChoice", "Habituation", "HabituationSequence"] {
            let task = registry.create(name, &context(name, Protocol::new())).unwrap();
            assert_eq!(task.name(), name);
            assert!(!task.is_started());
        }
    }

    #[test]
    fn test_missing_component_fails_at_create() {
        let registry = TaskRegistry::with_builtin();
        let mut ctx = context("Habituation", Protocol::new());
        ctx.components = Components::new();
        assert!(matches!(
            registry.create("Habituation", &ctx),
            Err(TaskError::Component(_))
        ));
    }

    #[test]
    fn test_bad_protocol_fails_validation() {
        let registry = TaskRegistry::with_builtin();
        let protocol = Protocol::new().with("not_a_constant", 1);
        assert!(registry.validate("FiveChoice", &protocol).is_err());
        assert!(registry
            .validate("FiveChoice", &Protocol::new().with("max_trials", 10))
            .is_ok());
    }
}
