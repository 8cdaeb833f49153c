//! Reference tasks shipped with the engine

mod five_choice;
mod habituation;
mod habituation_sequence;

pub use five_choice::{FiveChoice, FiveChoiceState};
pub use habituation::{Habituation, HabituationState};
pub use habituation_sequence::{HabituationPhase, HabituationSequence};
