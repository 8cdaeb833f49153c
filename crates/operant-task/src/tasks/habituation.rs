//! Single-poke habituation
//!
//! Poking the lit initiation hole dispenses a pellet; the light comes back on
//! after the inter-trial interval. Runs for a fixed duration.

use std::sync::Arc;
use std::time::Duration;

use operant_core::{BinaryInput, ComponentKind, InputChange, TimedToggle, Toggle};

use crate::{
    instantiate_logic, Constants, StateMachine, Task, TaskContext, TaskDefinition, TaskLogic,
    TaskResult,
};

const INIT_POKE: &str = "init_poke";
const INIT_LIGHT: &str = "init_light";
const FOOD: &str = "food";
const FAN: &str = "fan";

crate::task_states! {
    pub enum HabituationState {
        Input => "INPUT",
        InterTrialInterval => "INTER_TRIAL_INTERVAL",
    }
}

pub struct Habituation {
    init_poke: Arc<dyn BinaryInput>,
    init_light: Arc<dyn Toggle>,
    food: Arc<dyn TimedToggle>,
    fan: Arc<dyn Toggle>,
    duration: Duration,
    inter_trial_interval: Duration,
    dispense_time: Duration,
    rewards: u32,
}

impl TaskDefinition for Habituation {
    const NAME: &'static str = "Habituation";

    fn components() -> &'static [(&'static str, ComponentKind)] {
        &[
            (INIT_POKE, ComponentKind::BinaryInput),
            (INIT_LIGHT, ComponentKind::Toggle),
            (FOOD, ComponentKind::TimedToggle),
            (FAN, ComponentKind::Toggle),
        ]
    }

    fn constants() -> Constants {
        Constants::new(Self::NAME)
            .declare("duration", 20)
            .declare("inter_trial_interval", 10)
            .declare("dispense_time", 0.7)
    }

    fn build(ctx: &TaskContext, constants: &Constants) -> TaskResult<Box<dyn Task>> {
        let c = &ctx.components;
        let logic = Habituation {
            init_poke: c.binary_input(INIT_POKE)?,
            init_light: c.toggle(INIT_LIGHT)?,
            food: c.timed_toggle(FOOD)?,
            fan: c.toggle(FAN)?,
            duration: constants.minutes("duration")?,
            inter_trial_interval: constants.seconds("inter_trial_interval")?,
            dispense_time: constants.seconds("dispense_time")?,
            rewards: 0,
        };
        Ok(instantiate_logic(Self::NAME, logic, HabituationState::Input, ctx))
    }
}

impl TaskLogic for Habituation {
    type State = HabituationState;

    fn on_start(&mut self, _machine: &mut StateMachine<HabituationState>) -> TaskResult<()> {
        self.fan.toggle(true)?;
        self.init_light.toggle(true)?;
        Ok(())
    }

    fn on_stop(&mut self, _machine: &mut StateMachine<HabituationState>) -> TaskResult<()> {
        self.init_light.toggle(false)?;
        self.fan.toggle(false)?;
        Ok(())
    }

    fn step(&mut self, machine: &mut StateMachine<HabituationState>) -> TaskResult<()> {
        let poke = machine.record_input(INIT_POKE, self.init_poke.poll());
        match machine.state() {
            HabituationState::Input => {
                if poke == InputChange::Entered {
                    self.init_light.toggle(false)?;
                    self.food.toggle_for(self.dispense_time)?;
                    self.rewards += 1;
                    machine.change_state(HabituationState::InterTrialInterval, Default::default());
                }
            }
            HabituationState::InterTrialInterval => {
                if machine.in_state_for(self.inter_trial_interval) {
                    self.init_light.toggle(true)?;
                    machine.change_state(HabituationState::Input, Default::default());
                }
            }
        }
        Ok(())
    }

    fn is_complete(&self, machine: &StateMachine<HabituationState>) -> bool {
        machine.elapsed() > self.duration
    }

    fn details(&self) -> Vec<(&'static str, String)> {
        vec![("rewards", self.rewards.to_string())]
    }
}
