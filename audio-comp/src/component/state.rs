//! Component run states and the trigger state machine.
//!
//! | Trigger | Requested state | Legal from |
//! |---------|-----------------|------------|
//! | `Start` | `Active` | `Prepare` |
//! | `Release` | `Active` | `Paused` |
//! | `Stop` | `Prepare` | `Active`, `Paused` |
//! | `Pause` | `Paused` | `Active` |
//! | `Prepare` | `Prepare` | `Ready` |
//! | `Reset` | `Ready` | any |
//! | `Xrun` | `Ready` | any |
//!
//! A trigger whose requested state equals the current state reports
//! [`StateChange::AlreadySet`] and changes nothing.

use crate::error::{Error, Result};

/// Run state of a component (and of each end of a buffer link).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ComponentState {
    Init,
    Ready,
    Suspend,
    Prepare,
    Paused,
    Active,
}

/// Commands the orchestrator drives components with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Start,
    Release,
    Stop,
    Pause,
    Prepare,
    Reset,
    Xrun,
}

impl Trigger {
    /// State a component lands in when this trigger is applied.
    pub const fn requested_state(self) -> ComponentState {
        match self {
            Trigger::Start | Trigger::Release => ComponentState::Active,
            Trigger::Prepare | Trigger::Stop => ComponentState::Prepare,
            Trigger::Pause => ComponentState::Paused,
            Trigger::Reset | Trigger::Xrun => ComponentState::Ready,
        }
    }
}

/// Outcome of a legal state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    Changed,
    /// The component already was in the requested state.
    AlreadySet,
}

/// Apply `trigger` to `state` in place.
pub fn set_state(state: &mut ComponentState, trigger: Trigger) -> Result<StateChange> {
    use ComponentState::*;

    let requested = trigger.requested_state();
    if *state == requested {
        return Ok(StateChange::AlreadySet);
    }

    let allowed = match trigger {
        Trigger::Start => *state == Prepare,
        Trigger::Release => *state == Paused,
        Trigger::Stop => matches!(*state, Active | Paused),
        Trigger::Pause => *state == Active,
        Trigger::Prepare => *state == Ready,
        Trigger::Reset => {
            if matches!(*state, Active | Paused) {
                log::warn!("comp_set_state(): reset from {:?}", *state);
            }
            true
        }
        Trigger::Xrun => true,
    };

    if !allowed {
        log::error!(
            "comp_set_state(): trigger {:?} not allowed in state {:?}",
            trigger,
            *state
        );
        return Err(Error::InvalidState {
            state: *state,
            trigger,
        });
    }

    *state = requested;
    Ok(StateChange::Changed)
}
