//! Temporal events raised from accumulated track histories.

mod engine;
mod event;
mod rule;

pub use engine::{EventEngine, RuleSlot};
pub use event::{Event, EventKind};
pub use rule::{
    ArmState, DwellConfig, DwellRule, EventRule, RuleSignal, ZoneConfig, ZoneRule,
};
