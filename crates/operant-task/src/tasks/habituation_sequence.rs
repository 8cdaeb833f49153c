//! Habituation followed by five-choice training in one session

use operant_core::ComponentKind;
use serde_json::json;

use crate::tasks::{FiveChoice, Habituation};
use crate::{
    instantiate, Constants, Protocol, SequenceLogic, Task, TaskContext, TaskDefinition,
    TaskResult, TaskSequence,
};

crate::task_states! {
    pub enum HabituationPhase {
        Habituation => "HABITUATION",
        FiveChoice => "FIVE_CHOICE",
    }
}

pub struct HabituationSequence {
    habituation: Protocol,
    five_choice: Protocol,
}

impl HabituationSequence {
    fn sub_protocols(constants: &Constants) -> TaskResult<(Protocol, Protocol)> {
        let habituation = Protocol::from_value(
            Self::NAME,
            constants.get("habituation_protocol")?,
        )?;
        let five_choice = Protocol::from_value(
            Self::NAME,
            constants.get("five_choice_protocol")?,
        )?;
        Ok((habituation, five_choice))
    }
}

impl TaskDefinition for HabituationSequence {
    const NAME: &'static str = "HabituationSequence";

    fn components() -> &'static [(&'static str, ComponentKind)] {
        &[
            ("init_poke", ComponentKind::BinaryInput),
            ("init_light", ComponentKind::Toggle),
            ("fan", ComponentKind::Toggle),
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
            ("food_trough", ComponentKind::BinaryInput),
            ("food", ComponentKind::TimedToggle),
            ("food_light", ComponentKind::Toggle),
        ]
    }

    fn constants() -> Constants {
        Constants::new(Self::NAME)
            .declare("habituation_protocol", json!({}))
            .declare("five_choice_protocol", json!({}))
    }

    /// Sub-protocols are checked against their own tasks up front
    fn check(constants: &Constants) -> TaskResult<()> {
        let (habituation, five_choice) = Self::sub_protocols(constants)?;
        Habituation::check(&Habituation::constants().resolve(&habituation)?)?;
        FiveChoice::check(&FiveChoice::constants().resolve(&five_choice)?)?;
        Ok(())
    }

    fn build(ctx: &TaskContext, constants: &Constants) -> TaskResult<Box<dyn Task>> {
        let (habituation, five_choice) = Self::sub_protocols(constants)?;
        let logic = HabituationSequence {
            habituation,
            five_choice,
        };
        let sequence = TaskSequence::new(
            Self::NAME,
            logic,
            HabituationPhase::Habituation,
            ctx.clone(),
        )?;
        Ok(Box::new(sequence))
    }
}

impl SequenceLogic for HabituationSequence {
    type Phase = HabituationPhase;

    fn build_phase(&self, phase: HabituationPhase, ctx: &TaskContext) -> TaskResult<Box<dyn Task>> {
        match phase {
            HabituationPhase::Habituation => instantiate::<Habituation>(&TaskContext {
                protocol: self.habituation.clone(),
                ..ctx.clone()
            }),
            HabituationPhase::FiveChoice => instantiate::<FiveChoice>(&TaskContext {
                protocol: self.five_choice.clone(),
                ..ctx.clone()
            }),
        }
    }

    fn next_phase(&self, phase: HabituationPhase) -> Option<HabituationPhase> {
        match phase {
            HabituationPhase::Habituation => Some(HabituationPhase::FiveChoice),
            HabituationPhase::FiveChoice => None,
        }
    }
}
