use crate::session::{ButtonStateRequest, FaderChange, FaderStateRequest, SessionManager};
use crate::types::{percent_to_delta, percent_to_position};

/// Actions the control surface can invoke, one set per entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionId {
    MacroPressButton,
    MacroReleaseButton,
    MacroIncrementFader,
    MacroDecrementFader,
    MacroSetFader,
    ExecutorPressButton,
    ExecutorReleaseButton,
    ExecutorIncrementFader,
    ExecutorDecrementFader,
    ExecutorSetFader,
}

impl ActionId {
    /// Stable identifier the host stores in button configurations
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionId::MacroPressButton => "press_button_macro",
            ActionId::MacroReleaseButton => "release_button_macro",
            ActionId::MacroIncrementFader => "increment_fader_macro",
            ActionId::MacroDecrementFader => "decrement_fader_macro",
            ActionId::MacroSetFader => "absolute_fader_macro",
            ActionId::ExecutorPressButton => "press_button_executor",
            ActionId::ExecutorReleaseButton => "release_button_executor",
            ActionId::ExecutorIncrementFader => "increment_fader_executor",
            ActionId::ExecutorDecrementFader => "decrement_fader_executor",
            ActionId::ExecutorSetFader => "absolute_fader_executor",
        }
    }
}

/// Option field kinds the host renders in its configuration UI
#[derive(Debug, Clone, PartialEq)]
pub enum OptionKind {
    Number { default: f64, min: f64, max: f64 },
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionField {
    pub id: &'static str,
    pub label: &'static str,
    pub kind: OptionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionDefinition {
    pub id: ActionId,
    pub name: &'static str,
    pub options: Vec<OptionField>,
}

fn number_option(id: &'static str, label: &'static str, default: f64, max: f64) -> OptionField {
    OptionField {
        id,
        label,
        kind: OptionKind::Number {
            default,
            min: 1.0,
            max,
        },
    }
}

fn key_option() -> OptionField {
    OptionField {
        id: "id",
        label: "ID or Name",
        kind: OptionKind::Text,
    }
}

/// Full action schema for both entity kinds
pub fn action_definitions() -> Vec<ActionDefinition> {
    vec![
        ActionDefinition {
            id: ActionId::MacroPressButton,
            name: "Press Macro Button",
            options: vec![
                number_option("num", "ButtonNumber", 1.0, 100.0),
                key_option(),
            ],
        },
        ActionDefinition {
            id: ActionId::MacroReleaseButton,
            name: "Release Macro Button",
            options: vec![
                number_option("num", "ButtonNumber", 1.0, 100.0),
                key_option(),
            ],
        },
        ActionDefinition {
            id: ActionId::MacroIncrementFader,
            name: "Increment Macro Fader",
            options: vec![
                number_option("step", "StepSize in %", 5.0, 100.0),
                number_option("num", "FaderNumber", 1.0, 100.0),
                key_option(),
            ],
        },
        ActionDefinition {
            id: ActionId::MacroDecrementFader,
            name: "Decrement Macro Fader",
            options: vec![
                number_option("step", "StepSize in %", 5.0, 100.0),
                number_option("num", "FaderNumber", 1.0, 100.0),
                key_option(),
            ],
        },
        ActionDefinition {
            id: ActionId::MacroSetFader,
            name: "Set Macro Fader",
            options: vec![
                number_option("value", "Fadervalue in %", 50.0, 100.0),
                number_option("num", "FaderNumber", 1.0, 100.0),
                key_option(),
            ],
        },
        ActionDefinition {
            id: ActionId::ExecutorPressButton,
            name: "Press Executor Button",
            options: vec![number_option("num", "ButtonNumber", 1.0, 4.0), key_option()],
        },
        ActionDefinition {
            id: ActionId::ExecutorReleaseButton,
            name: "Release Executor Button",
            options: vec![number_option("num", "ButtonNumber", 1.0, 4.0), key_option()],
        },
        ActionDefinition {
            id: ActionId::ExecutorIncrementFader,
            name: "Increment Executor Fader",
            options: vec![number_option("step", "StepSize in %", 5.0, 100.0), key_option()],
        },
        ActionDefinition {
            id: ActionId::ExecutorDecrementFader,
            name: "Decrement Executor Fader",
            options: vec![number_option("step", "StepSize in %", 5.0, 100.0), key_option()],
        },
        ActionDefinition {
            id: ActionId::ExecutorSetFader,
            name: "Set Executor Fader",
            options: vec![
                number_option("value", "Fadervalue in %", 50.0, 100.0),
                key_option(),
            ],
        },
    ]
}

/// One invocation of an action from the control surface
///
/// `percent` carries the step size for increments/decrements and the
/// target value for absolute fader moves; it is ignored for buttons.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionInvocation {
    pub action: ActionId,
    pub key: String,
    pub number: u32,
    pub percent: f64,
}

/// Translate an invocation into the matching session operation.
///
/// Percentages are converted to normalized floats here and never cross
/// into the session layer; absolute values clamp to [0, 1] at this
/// boundary.
pub async fn dispatch(session: &SessionManager, invocation: ActionInvocation) {
    let ActionInvocation {
        action,
        key,
        number,
        percent,
    } = invocation;

    match action {
        ActionId::MacroPressButton => {
            session
                .send_button_state(ButtonStateRequest::Macro {
                    key,
                    number,
                    active: true,
                })
                .await;
        }
        ActionId::MacroReleaseButton => {
            session
                .send_button_state(ButtonStateRequest::Macro {
                    key,
                    number,
                    active: false,
                })
                .await;
        }
        ActionId::MacroIncrementFader => {
            session
                .send_fader_state(FaderStateRequest::Macro {
                    key,
                    number,
                    change: FaderChange::Increment(percent_to_delta(percent)),
                })
                .await;
        }
        ActionId::MacroDecrementFader => {
            session
                .send_fader_state(FaderStateRequest::Macro {
                    key,
                    number,
                    change: FaderChange::Increment(percent_to_delta(-percent)),
                })
                .await;
        }
        ActionId::MacroSetFader => {
            session
                .send_fader_state(FaderStateRequest::Macro {
                    key,
                    number,
                    change: FaderChange::Absolute(percent_to_position(percent)),
                })
                .await;
        }
        ActionId::ExecutorPressButton => {
            session
                .send_button_state(ButtonStateRequest::Executor {
                    key,
                    number,
                    active: true,
                })
                .await;
        }
        ActionId::ExecutorReleaseButton => {
            session
                .send_button_state(ButtonStateRequest::Executor {
                    key,
                    number,
                    active: false,
                })
                .await;
        }
        ActionId::ExecutorIncrementFader => {
            session
                .send_fader_state(FaderStateRequest::Executor {
                    key,
                    change: FaderChange::Increment(percent_to_delta(percent)),
                })
                .await;
        }
        ActionId::ExecutorDecrementFader => {
            session
                .send_fader_state(FaderStateRequest::Executor {
                    key,
                    change: FaderChange::Increment(percent_to_delta(-percent)),
                })
                .await;
        }
        ActionId::ExecutorSetFader => {
            session
                .send_fader_state(FaderStateRequest::Executor {
                    key,
                    change: FaderChange::Absolute(percent_to_position(percent)),
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn action_ids_are_unique() {
        let definitions = action_definitions();
        let ids: HashSet<&str> = definitions.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids.len(), definitions.len());
    }

    #[test]
    fn every_action_takes_a_target_key() {
        for definition in action_definitions() {
            assert!(
                definition.options.iter().any(|o| o.id == "id"),
                "{} has no target option",
                definition.id.as_str()
            );
        }
    }
}
