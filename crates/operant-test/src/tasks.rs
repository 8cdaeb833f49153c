//! Tasks built for engine tests
//!
//! - `Trial`: INITIATION -> STIMULUS -> REWARD on a single poke hole; a
//!   stimulus left unanswered also moves on to REWARD, without counting it
//! - `Timer`: a single state, complete after a fixed duration
//! - `Faulty`: fails (or panics) once a fixed time has elapsed

use std::sync::Arc;
use std::time::Duration;

use operant_core::{metadata, BinaryInput, ComponentKind, InputChange};
use operant_task::{
    instantiate_logic, task_states, Constants, StateMachine, Task, TaskContext, TaskDefinition,
    TaskError, TaskLogic, TaskRegistry, TaskResult,
};

pub const POKE: &str = "poke";

/// Builtin tasks plus the test tasks of this module
pub fn test_registry() -> TaskRegistry {
    let mut tasks = TaskRegistry::with_builtin();
    tasks.register::<Trial>().register::<Timer>().register::<Faulty>();
    tasks
}

// ============================================================================
// TRIAL
// ============================================================================

task_states! {
    pub enum TrialState {
        Initiation => "INITIATION",
        Stimulus => "STIMULUS",
        Reward => "REWARD",
    }
}

pub struct Trial {
    poke: Arc<dyn BinaryInput>,
    stimulus_duration: Duration,
    reward_duration: Duration,
    max_rewards: u32,
    rewards: u32,
}

impl TaskDefinition for Trial {
    const NAME: &'static str = "Trial";

    fn components() -> &'static [(&'static str, ComponentKind)] {
        &[(POKE, ComponentKind::BinaryInput)]
    }

    fn constants() -> Constants {
        Constants::new(Self::NAME)
            .declare("stimulus_duration", 5)
            .declare("reward_duration", 1)
            .declare("max_rewards", 3)
    }

    fn build(ctx: &TaskContext, constants: &Constants) -> TaskResult<Box<dyn Task>> {
        let logic = Trial {
            poke: ctx.components.binary_input(POKE)?,
            stimulus_duration: constants.seconds("stimulus_duration")?,
            reward_duration: constants.seconds("reward_duration")?,
            max_rewards: constants.get("max_rewards")?,
            rewards: 0,
        };
        Ok(instantiate_logic(Self::NAME, logic, TrialState::Initiation, ctx))
    }
}

impl TaskLogic for Trial {
    type State = TrialState;

    fn step(&mut self, machine: &mut StateMachine<TrialState>) -> TaskResult<()> {
        let poke = machine.record_input(POKE, self.poke.poll());
        match machine.state() {
            TrialState::Initiation => {
                if poke == InputChange::Entered {
                    machine.change_state(TrialState::Stimulus, Default::default());
                }
            }
            TrialState::Stimulus => {
                if poke == InputChange::Entered {
                    self.rewards += 1;
                    machine.change_state(TrialState::Reward, metadata([("response", "hit")]));
                } else if machine.in_state_for(self.stimulus_duration) {
                    machine.change_state(TrialState::Reward, metadata([("response", "none")]));
                }
            }
            TrialState::Reward => {
                if machine.in_state_for(self.reward_duration) {
                    machine.change_state(TrialState::Initiation, Default::default());
                }
            }
        }
        Ok(())
    }

    fn is_complete(&self, machine: &StateMachine<TrialState>) -> bool {
        self.rewards >= self.max_rewards && machine.state() == TrialState::Initiation
    }

    fn details(&self) -> Vec<(&'static str, String)> {
        vec![("rewards", self.rewards.to_string())]
    }
}

// ============================================================================
// TIMER
// ============================================================================

task_states! {
    pub enum TimerState {
        Running => "RUNNING",
    }
}

pub struct Timer {
    duration: Duration,
}

impl TaskDefinition for Timer {
    const NAME: &'static str = "Timer";

    fn components() -> &'static [(&'static str, ComponentKind)] {
        &[]
    }

    fn constants() -> Constants {
        Constants::new(Self::NAME).declare("duration", 1)
    }

    fn build(ctx: &TaskContext, constants: &Constants) -> TaskResult<Box<dyn Task>> {
        let logic = Timer {
            duration: constants.seconds("duration")?,
        };
        Ok(instantiate_logic(Self::NAME, logic, TimerState::Running, ctx))
    }
}

impl TaskLogic for Timer {
    type State = TimerState;

    fn step(&mut self, _machine: &mut StateMachine<TimerState>) -> TaskResult<()> {
        Ok(())
    }

    fn is_complete(&self, machine: &StateMachine<TimerState>) -> bool {
        machine.elapsed() >= self.duration
    }
}

// ============================================================================
// FAULTY
// ============================================================================

task_states! {
    pub enum FaultyState {
        Armed => "ARMED",
    }
}

pub struct Faulty {
    fault_after: Duration,
    panic: bool,
}

impl TaskDefinition for Faulty {
    const NAME: &'static str = "Faulty";

    fn components() -> &'static [(&'static str, ComponentKind)] {
        &[]
    }

    fn constants() -> Constants {
        Constants::new(Self::NAME)
            .declare("fault_after", 1)
            .declare("panic", false)
    }

    fn build(ctx: &TaskContext, constants: &Constants) -> TaskResult<Box<dyn Task>> {
        let logic = Faulty {
            fault_after: constants.seconds("fault_after")?,
            panic: constants.get("panic")?,
        };
        Ok(instantiate_logic(Self::NAME, logic, FaultyState::Armed, ctx))
    }
}

impl TaskLogic for Faulty {
    type State = FaultyState;

    fn step(&mut self, machine: &mut StateMachine<FaultyState>) -> TaskResult<()> {
        if machine.elapsed() < self.fault_after {
            return Ok(());
        }
        if self.panic {
            panic!("faulty task tripped");
        }
        Err(TaskError::Fault("faulty task tripped".to_string()))
    }

    fn is_complete(&self, _machine: &StateMachine<FaultyState>) -> bool {
        false
    }
}
