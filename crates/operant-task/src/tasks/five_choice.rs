//! Five-choice serial reaction time task
//!
//! The subject starts a trial at the food trough, waits out the inter-trial
//! interval, then has to poke the one of five holes whose light came on.
//! Responses are scored correct, incorrect, premature (poked during the
//! interval) or none (no poke before the limited hold ran out).

use std::sync::Arc;
use std::time::Duration;

use operant_core::{metadata, BinaryInput, ComponentKind, InputChange, TimedToggle, Toggle};
use rand::Rng;
use serde_json::Value;

use crate::{
    instantiate_logic, Constants, StateMachine, Task, TaskContext, TaskDefinition, TaskError,
    TaskLogic, TaskResult,
};

const HOLES: usize = 5;
const NOSE_POKES: [&str; HOLES] = ["np1", "np2", "np3", "np4", "np5"];
const NOSE_POKE_LIGHTS: [&str; HOLES] =
    ["np1_light", "np2_light", "np3_light", "np4_light", "np5_light"];
const FOOD_TROUGH: &str = "food_trough";
const FOOD: &str = "food";
const FOOD_LIGHT: &str = "food_light";

crate::task_states! {
    pub enum FiveChoiceState {
        Initiation => "INITIATION",
        InterTrialInterval => "INTER_TRIAL_INTERVAL",
        StimulusOn => "STIMULUS_ON",
        LimitedHold => "LIMITED_HOLD",
        PostResponseInterval => "POST_RESPONSE_INTERVAL",
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Response {
    Correct,
    Incorrect,
    Premature,
    Omission,
}

impl Response {
    fn label(self) -> &'static str {
        match self {
            Response::Correct => "correct",
            Response::Incorrect => "incorrect",
            Response::Premature => "premature",
            Response::Omission => "none",
        }
    }
}

/// Five-choice task logic
pub struct FiveChoice {
    nose_pokes: Vec<Arc<dyn BinaryInput>>,
    nose_poke_lights: Vec<Arc<dyn Toggle>>,
    food_trough: Arc<dyn BinaryInput>,
    food: Arc<dyn TimedToggle>,
    food_light: Arc<dyn Toggle>,

    max_duration: Duration,
    max_trials: usize,
    inter_trial_interval: Duration,
    stimulus_duration: Duration,
    limited_hold_duration: Duration,
    post_response_interval: Duration,
    sequence: Vec<usize>,
    dispense_time: Duration,

    cur_trial: usize,
    tally: [u32; 4],
}

impl FiveChoice {
    pub fn cur_trial(&self) -> usize {
        self.cur_trial
    }

    /// Hole lit on the current trial
    fn target(&self) -> TaskResult<usize> {
        self.sequence.get(self.cur_trial).copied().ok_or_else(|| {
            TaskError::Fault(format!(
                "trial {} is past the end of the stimulus sequence",
                self.cur_trial
            ))
        })
    }

    fn respond(&mut self, machine: &mut StateMachine<FiveChoiceState>, response: Response) {
        self.tally[response as usize] += 1;
        machine.change_state(
            FiveChoiceState::PostResponseInterval,
            metadata([("response", response.label())]),
        );
    }

    /// Score a poke into `selection`, dispensing food when it was the lit hole
    fn judge(&self, selection: usize) -> TaskResult<Response> {
        if selection == self.target()? {
            self.food.toggle_for(self.dispense_time)?;
            Ok(Response::Correct)
        } else {
            Ok(Response::Incorrect)
        }
    }
}

impl TaskDefinition for FiveChoice {
    const NAME: &'static str = "FiveChoice";

    fn components() -> &'static [(&'static str, ComponentKind)] {
        &[
            ("np1", ComponentKind::BinaryInput),
            ("np2", ComponentKind::BinaryInput),
            ("np3", ComponentKind::BinaryInput),
            ("np4", ComponentKind::BinaryInput),
            ("np5", ComponentKind::BinaryInput),
            ("np1_light", ComponentKind::Toggle),
            ("np2_light", ComponentKind::Toggle),
            ("np3_light", ComponentKind::Toggle),
            ("np4_light", ComponentKind::Toggle),
            ("np5_light", ComponentKind::Toggle),
            (FOOD_TROUGH, ComponentKind::BinaryInput),
            (FOOD, ComponentKind::TimedToggle),
            (FOOD_LIGHT, ComponentKind::Toggle),
        ]
    }

    fn constants() -> Constants {
        let mut rng = rand::thread_rng();
        let sequence: Vec<Value> = (0..100)
            .map(|_| Value::from(rng.gen_range(0..HOLES as u64)))
            .collect();
        Constants::new(Self::NAME)
            // minutes
            .declare("max_duration", 30)
            .declare("max_trials", 100)
            .declare("inter_trial_interval", 5)
            .declare("stimulus_duration", 0.5)
            .declare("limited_hold_duration", 5)
            .declare("post_response_interval", 5)
            .declare("sequence", Value::Array(sequence))
            .declare("dispense_time", 0.7)
    }

    fn check(constants: &Constants) -> TaskResult<()> {
        let max_trials: usize = constants.get("max_trials")?;
        let sequence: Vec<usize> = constants.get("sequence")?;
        if sequence.len() < max_trials {
            return Err(constants.invalid(
                "sequence",
                format!("{} entries for {max_trials} trials", sequence.len()),
            ));
        }
        if let Some(bad) = sequence.iter().find(|&&hole| hole >= HOLES) {
            return Err(constants.invalid("sequence", format!("hole {bad} out of range 0..{HOLES}")));
        }
        Ok(())
    }

    fn build(ctx: &TaskContext, constants: &Constants) -> TaskResult<Box<dyn Task>> {
        let c = &ctx.components;
        let logic = FiveChoice {
            nose_pokes: NOSE_POKES
                .iter()
                .map(|id| c.binary_input(id))
                .collect::<Result<_, _>>()?,
            nose_poke_lights: NOSE_POKE_LIGHTS
                .iter()
                .map(|id| c.toggle(id))
                .collect::<Result<_, _>>()?,
            food_trough: c.binary_input(FOOD_TROUGH)?,
            food: c.timed_toggle(FOOD)?,
            food_light: c.toggle(FOOD_LIGHT)?,
            max_duration: constants.minutes("max_duration")?,
            max_trials: constants.get("max_trials")?,
            inter_trial_interval: constants.seconds("inter_trial_interval")?,
            stimulus_duration: constants.seconds("stimulus_duration")?,
            limited_hold_duration: constants.seconds("limited_hold_duration")?,
            post_response_interval: constants.seconds("post_response_interval")?,
            sequence: constants.get("sequence")?,
            dispense_time: constants.seconds("dispense_time")?,
            cur_trial: 0,
            tally: [0; 4],
        };
        Ok(instantiate_logic(
            Self::NAME,
            logic,
            FiveChoiceState::Initiation,
            ctx,
        ))
    }
}

impl TaskLogic for FiveChoice {
    type State = FiveChoiceState;

    fn on_start(&mut self, _machine: &mut StateMachine<FiveChoiceState>) -> TaskResult<()> {
        self.food_light.toggle(true)?;
        Ok(())
    }

    fn on_stop(&mut self, _machine: &mut StateMachine<FiveChoiceState>) -> TaskResult<()> {
        self.food_light.toggle(false)?;
        for light in &self.nose_poke_lights {
            light.toggle(false)?;
        }
        Ok(())
    }

    fn step(&mut self, machine: &mut StateMachine<FiveChoiceState>) -> TaskResult<()> {
        let mut selection = None;
        for (hole, poke) in self.nose_pokes.iter().enumerate() {
            let change = machine.record_input(NOSE_POKES[hole], poke.poll());
            if change == InputChange::Entered && selection.is_none() {
                selection = Some(hole);
            }
        }
        let trough = machine.record_input(FOOD_TROUGH, self.food_trough.poll());

        match machine.state() {
            FiveChoiceState::Initiation => {
                if trough == InputChange::Entered {
                    self.food_light.toggle(false)?;
                    machine.change_state(FiveChoiceState::InterTrialInterval, Default::default());
                }
            }
            FiveChoiceState::InterTrialInterval => {
                if selection.is_some() {
                    self.respond(machine, Response::Premature);
                } else if machine.in_state_for(self.inter_trial_interval) {
                    self.nose_poke_lights[self.target()?].toggle(true)?;
                    machine.change_state(FiveChoiceState::StimulusOn, Default::default());
                }
            }
            FiveChoiceState::StimulusOn => {
                if let Some(hole) = selection {
                    let response = self.judge(hole)?;
                    self.nose_poke_lights[self.target()?].toggle(false)?;
                    self.respond(machine, response);
                } else if machine.in_state_for(self.stimulus_duration) {
                    self.nose_poke_lights[self.target()?].toggle(false)?;
                    machine.change_state(FiveChoiceState::LimitedHold, Default::default());
                }
            }
            FiveChoiceState::LimitedHold => {
                if let Some(hole) = selection {
                    let response = self.judge(hole)?;
                    self.respond(machine, response);
                } else if machine.in_state_for(self.limited_hold_duration) {
                    self.respond(machine, Response::Omission);
                }
            }
            FiveChoiceState::PostResponseInterval => {
                if machine.in_state_for(self.post_response_interval) {
                    machine.change_state(FiveChoiceState::Initiation, Default::default());
                    self.food_light.toggle(true)?;
                    self.cur_trial += 1;
                }
            }
        }
        Ok(())
    }

    fn is_complete(&self, machine: &StateMachine<FiveChoiceState>) -> bool {
        self.cur_trial >= self.max_trials || machine.elapsed() > self.max_duration
    }

    fn details(&self) -> Vec<(&'static str, String)> {
        vec![
            ("trial", format!("{}/{}", self.cur_trial, self.max_trials)),
            ("correct", self.tally[Response::Correct as usize].to_string()),
            ("incorrect", self.tally[Response::Incorrect as usize].to_string()),
            ("premature", self.tally[Response::Premature as usize].to_string()),
            ("omissions", self.tally[Response::Omission as usize].to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::tasks::rig::{at, Rig};
    use crate::{instantiate, Protocol};

    fn protocol() -> Protocol {
        Protocol::new()
            .with("max_trials", 2)
            .with("inter_trial_interval", 1)
            .with("stimulus_duration", 0.5)
            .with("limited_hold_duration", 2)
            .with("post_response_interval", 1)
            .with("sequence", json!([2, 4]))
    }

    fn setup() -> (Rig, Box<dyn Task>) {
        let rig = Rig::new(FiveChoice::components());
        let mut task = instantiate::<FiveChoice>(&rig.context(protocol())).unwrap();
        task.start(at(0)).unwrap();
        (rig, task)
    }

    fn labels(task: &mut Box<dyn Task>) -> Vec<String> {
        task.take_events().iter().map(|e| e.label()).collect()
    }

    #[test]
    fn test_correct_trial() {
        let (rig, mut task) = setup();
        assert!(rig.is_on(FOOD_LIGHT));

        rig.poke(FOOD_TROUGH);
        task.evaluate(at(10)).unwrap();
        assert!(!rig.is_on(FOOD_LIGHT));

        task.evaluate(at(1010)).unwrap();
        assert!(rig.is_on("np3_light"));

        rig.poke("np3");
        task.evaluate(at(1100)).unwrap();
        assert!(!rig.is_on("np3_light"));

        let events = task.take_events();
        let response = events
            .iter()
            .find(|e| e.state_name() == Some("POST_RESPONSE_INTERVAL"))
            .unwrap();
        assert_eq!(response.metadata["response"], "correct");

        task.evaluate(at(2100)).unwrap();
        assert!(rig.is_on(FOOD_LIGHT));
        assert_eq!(labels(&mut task), vec!["INITIATION"]);
        assert_eq!(task.snapshot().details[0], ("trial", "1/2".to_string()));
    }

    #[test]
    fn test_event_order() {
        let (rig, mut task) = setup();
        rig.poke(FOOD_TROUGH);
        task.evaluate(at(10)).unwrap();
        task.evaluate(at(1010)).unwrap();
        rig.poke("np1");
        task.evaluate(at(1100)).unwrap();
        assert_eq!(
            labels(&mut task),
            vec![
                "INITIATION",
                "food_trough:entered",
                "INTER_TRIAL_INTERVAL",
                "STIMULUS_ON",
                "np1:entered",
                "POST_RESPONSE_INTERVAL",
            ]
        );
    }

    #[test]
    fn test_premature_response() {
        let (rig, mut task) = setup();
        rig.poke(FOOD_TROUGH);
        task.evaluate(at(10)).unwrap();
        rig.poke("np5");
        task.evaluate(at(500)).unwrap();

        let events = task.take_events();
        let last = events.last().unwrap();
        assert_eq!(last.state_name(), Some("POST_RESPONSE_INTERVAL"));
        assert_eq!(last.metadata["response"], "premature");
        assert!(!rig.is_on("np3_light"));
    }

    #[test]
    fn test_limited_hold_then_omission() {
        let (rig, mut task) = setup();
        rig.poke(FOOD_TROUGH);
        task.evaluate(at(10)).unwrap();
        task.evaluate(at(1010)).unwrap();
        task.evaluate(at(1510)).unwrap();
        assert!(!rig.is_on("np3_light"));
        task.evaluate(at(3510)).unwrap();

        let events = task.take_events();
        let states: Vec<_> = events.iter().filter_map(|e| e.state_name()).collect();
        assert_eq!(
            states,
            vec![
                "INITIATION",
                "INTER_TRIAL_INTERVAL",
                "STIMULUS_ON",
                "LIMITED_HOLD",
                "POST_RESPONSE_INTERVAL",
            ]
        );
        assert_eq!(events.last().unwrap().metadata["response"], "none");
    }

    #[test]
    fn test_complete_after_max_trials() {
        let (rig, mut task) = setup();
        let mut t = 0;
        for _ in 0..2 {
            assert!(!task.is_complete());
            rig.poke(FOOD_TROUGH);
            t += 10;
            task.evaluate(at(t)).unwrap();
            rig.poke("np2");
            t += 10;
            task.evaluate(at(t)).unwrap();
            t += 1000;
            task.evaluate(at(t)).unwrap();
        }
        assert!(task.is_complete());
    }

    #[test]
    fn test_complete_after_max_duration() {
        let rig = Rig::new(FiveChoice::components());
        let protocol = protocol().with("max_duration", 1);
        let mut task = instantiate::<FiveChoice>(&rig.context(protocol)).unwrap();
        task.start(at(0)).unwrap();
        task.evaluate(at(60_000)).unwrap();
        assert!(!task.is_complete());
        task.evaluate(at(60_001)).unwrap();
        assert!(task.is_complete());
    }

    #[test]
    fn test_stop_turns_lights_off() {
        let (rig, mut task) = setup();
        rig.poke(FOOD_TROUGH);
        task.evaluate(at(10)).unwrap();
        task.evaluate(at(1010)).unwrap();
        assert!(rig.is_on("np3_light"));
        task.stop(at(1020)).unwrap();
        assert!(!rig.is_on("np3_light"));
        assert!(!rig.is_on(FOOD_LIGHT));
        let events = task.take_events();
        assert_eq!(events.last().unwrap().label(), "final:STIMULUS_ON");
    }

    #[test]
    fn test_short_sequence_rejected() {
        let rig = Rig::new(FiveChoice::components());
        let protocol = protocol().with("max_trials", 3);
        let err = instantiate::<FiveChoice>(&rig.context(protocol)).err().unwrap();
        assert!(matches!(err, TaskError::InvalidConstant { ref key, .. } if key == "sequence"));
    }

    #[test]
    fn test_out_of_range_hole_rejected() {
        let rig = Rig::new(FiveChoice::components());
        let protocol = protocol().with("sequence", json!([0, 5]));
        assert!(instantiate::<FiveChoice>(&rig.context(protocol)).is_err());
    }

    #[test]
    fn test_default_sequence_is_valid() {
        let constants = FiveChoice::constants();
        FiveChoice::check(&constants).unwrap();
        let sequence: Vec<usize> = constants.get("sequence").unwrap();
        assert_eq!(sequence.len(), 100);
    }
}
