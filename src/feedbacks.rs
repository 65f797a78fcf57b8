use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::actions::{OptionField, OptionKind};
use crate::repository::Repository;
use crate::types::{EntityKind, Executor, Macro};

/// Feedbacks the control surface can render, one set per entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackId {
    MacroButtonState,
    MacroButtonName,
    MacroFaderName,
    MacroFaderState,
    MacroImage,
    ExecutorButtonState,
    ExecutorButtonName,
    ExecutorFaderName,
    ExecutorFaderState,
}

/// All feedbacks belonging to the macro side
pub const MACRO_FEEDBACKS: [FeedbackId; 5] = [
    FeedbackId::MacroButtonState,
    FeedbackId::MacroButtonName,
    FeedbackId::MacroFaderName,
    FeedbackId::MacroFaderState,
    FeedbackId::MacroImage,
];

/// All feedbacks belonging to the executor side
pub const EXECUTOR_FEEDBACKS: [FeedbackId; 4] = [
    FeedbackId::ExecutorButtonState,
    FeedbackId::ExecutorButtonName,
    FeedbackId::ExecutorFaderName,
    FeedbackId::ExecutorFaderState,
];

impl FeedbackId {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackId::MacroButtonState => "buttonstate_macro",
            FeedbackId::MacroButtonName => "buttonname_macro",
            FeedbackId::MacroFaderName => "fadername_macro",
            FeedbackId::MacroFaderState => "faderstate_macro",
            FeedbackId::MacroImage => "bitmap_macro",
            FeedbackId::ExecutorButtonState => "buttonstate_executor",
            FeedbackId::ExecutorButtonName => "buttonname_executor",
            FeedbackId::ExecutorFaderName => "fadername_executor",
            FeedbackId::ExecutorFaderState => "faderstate_executor",
        }
    }

    /// The feedback set that must be re-evaluated when `kind` changed
    pub fn for_kind(kind: EntityKind) -> &'static [FeedbackId] {
        match kind {
            EntityKind::Macro => &MACRO_FEEDBACKS,
            EntityKind::Executor => &EXECUTOR_FEEDBACKS,
        }
    }
}

/// Boolean feedbacks drive on/off button styling; advanced feedbacks
/// return text or image overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    Boolean,
    Advanced,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackDefinition {
    pub id: FeedbackId,
    pub name: &'static str,
    pub kind: FeedbackKind,
    pub options: Vec<OptionField>,
}

fn number_option(id: &'static str, label: &'static str, max: f64) -> OptionField {
    OptionField {
        id,
        label,
        kind: OptionKind::Number {
            default: 1.0,
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

/// Full feedback schema for both entity kinds
pub fn feedback_definitions() -> Vec<FeedbackDefinition> {
    vec![
        FeedbackDefinition {
            id: FeedbackId::MacroButtonState,
            name: "Macro Button State",
            kind: FeedbackKind::Boolean,
            options: vec![number_option("num", "ButtonNumber", 100.0), key_option()],
        },
        FeedbackDefinition {
            id: FeedbackId::MacroButtonName,
            name: "Macro Button Name",
            kind: FeedbackKind::Advanced,
            options: vec![number_option("num", "ButtonNumber", 100.0), key_option()],
        },
        FeedbackDefinition {
            id: FeedbackId::MacroFaderName,
            name: "Macro Fader Name",
            kind: FeedbackKind::Advanced,
            options: vec![number_option("num", "FaderNumber", 100.0), key_option()],
        },
        FeedbackDefinition {
            id: FeedbackId::MacroFaderState,
            name: "Macro Fader State",
            kind: FeedbackKind::Advanced,
            options: vec![number_option("num", "FaderNumber", 100.0), key_option()],
        },
        FeedbackDefinition {
            id: FeedbackId::MacroImage,
            name: "Macro Image",
            kind: FeedbackKind::Advanced,
            options: vec![key_option()],
        },
        FeedbackDefinition {
            id: FeedbackId::ExecutorButtonState,
            name: "Executor Button State",
            kind: FeedbackKind::Boolean,
            options: vec![number_option("num", "ButtonNumber", 4.0), key_option()],
        },
        FeedbackDefinition {
            id: FeedbackId::ExecutorButtonName,
            name: "Executor Button Name",
            kind: FeedbackKind::Advanced,
            options: vec![number_option("num", "ButtonNumber", 4.0), key_option()],
        },
        FeedbackDefinition {
            id: FeedbackId::ExecutorFaderName,
            name: "Executor Fader Name",
            kind: FeedbackKind::Advanced,
            options: vec![key_option()],
        },
        FeedbackDefinition {
            id: FeedbackId::ExecutorFaderState,
            name: "Executor Fader State",
            kind: FeedbackKind::Advanced,
            options: vec![key_option()],
        },
    ]
}

/// One feedback evaluation request from the host
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackQuery {
    pub id: FeedbackId,
    pub key: String,
    pub number: u32,
}

/// Result of evaluating a feedback against repository state
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackValue {
    Bool(bool),
    Text(String),
    /// Base64-encoded PNG for image feedbacks
    Png64(String),
    None,
}

fn percent_text(position: f64) -> String {
    format!("{:.0}%", position * 100.0)
}

/// Evaluate a feedback against current repository state.
///
/// Unresolvable keys and out-of-range numbers degrade to the feedback's
/// neutral value; the entity may simply not be synced yet.
pub fn evaluate(
    macros: &Repository<Macro>,
    executors: &Repository<Executor>,
    query: &FeedbackQuery,
) -> FeedbackValue {
    match query.id {
        FeedbackId::MacroButtonState => {
            let active = macros.get_single(&query.key).is_some_and(|m| {
                m.buttons
                    .iter()
                    .any(|b| b.number == query.number && b.active)
            });
            FeedbackValue::Bool(active)
        }
        FeedbackId::MacroButtonName => {
            let label = macros
                .get_single(&query.key)
                .and_then(|m| m.buttons.iter().find(|b| b.number == query.number))
                .map(|b| b.label.clone())
                .unwrap_or_default();
            FeedbackValue::Text(label)
        }
        FeedbackId::MacroFaderName => {
            let label = macros
                .get_single(&query.key)
                .and_then(|m| m.faders.iter().find(|f| f.number == query.number))
                .map(|f| f.label.clone())
                .unwrap_or_default();
            FeedbackValue::Text(label)
        }
        FeedbackId::MacroFaderState => {
            let text = macros
                .get_single(&query.key)
                .and_then(|m| m.faders.iter().find(|f| f.number == query.number))
                .map(|f| percent_text(f.position))
                .unwrap_or_default();
            FeedbackValue::Text(text)
        }
        FeedbackId::MacroImage => match macros.get_single(&query.key) {
            Some(m) if !m.image.is_empty() => FeedbackValue::Png64(STANDARD.encode(&m.image)),
            _ => FeedbackValue::None,
        },
        FeedbackId::ExecutorButtonState => {
            let active = executors.get_single(&query.key).is_some_and(|e| {
                e.buttons
                    .get(query.number.saturating_sub(1) as usize)
                    .is_some_and(|b| b.active)
            });
            FeedbackValue::Bool(active)
        }
        FeedbackId::ExecutorButtonName => {
            let label = executors
                .get_single(&query.key)
                .and_then(|e| e.buttons.get(query.number.saturating_sub(1) as usize))
                .map(|b| b.display_label().to_string())
                .unwrap_or_default();
            FeedbackValue::Text(label)
        }
        FeedbackId::ExecutorFaderName => {
            let label = executors
                .get_single(&query.key)
                .map(|e| e.fader.display_label().to_string())
                .unwrap_or_default();
            FeedbackValue::Text(label)
        }
        FeedbackId::ExecutorFaderState => {
            let text = executors
                .get_single(&query.key)
                .map(|e| percent_text(e.fader.position))
                .unwrap_or_default();
            FeedbackValue::Text(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExecutorButton, ExecutorFader, MacroButton, MacroFader};

    fn sample_macro() -> Macro {
        Macro {
            id: "m1".into(),
            name: "Blinder".into(),
            buttons: vec![
                MacroButton {
                    number: 1,
                    label: "Flash".into(),
                    active: true,
                },
                MacroButton {
                    number: 2,
                    label: "Hold".into(),
                    active: false,
                },
            ],
            faders: vec![MacroFader {
                number: 1,
                label: "Master".into(),
                position: 0.42,
            }],
            image: vec![1, 2, 3],
        }
    }

    fn sample_executor() -> Executor {
        Executor {
            id: "e1".into(),
            name: "Exec1".into(),
            member_id: "page1".into(),
            number: 1,
            buttons: [
                ExecutorButton {
                    key: "GO".into(),
                    label: String::new(),
                    active: true,
                },
                ExecutorButton::default(),
                ExecutorButton::default(),
                ExecutorButton::default(),
            ],
            fader: ExecutorFader {
                key: "F1".into(),
                label: "Speed".into(),
                position: 1.0,
            },
        }
    }

    fn repos() -> (Repository<Macro>, Repository<Executor>) {
        let mut macros = Repository::new();
        macros.add(sample_macro());
        let mut executors = Repository::new();
        executors.add(sample_executor());
        (macros, executors)
    }

    fn query(id: FeedbackId, key: &str, number: u32) -> FeedbackQuery {
        FeedbackQuery {
            id,
            key: key.into(),
            number,
        }
    }

    #[test]
    fn button_state_resolves_by_name() {
        let (macros, executors) = repos();
        assert_eq!(
            evaluate(&macros, &executors, &query(FeedbackId::MacroButtonState, "Blinder", 1)),
            FeedbackValue::Bool(true)
        );
        assert_eq!(
            evaluate(&macros, &executors, &query(FeedbackId::MacroButtonState, "Blinder", 2)),
            FeedbackValue::Bool(false)
        );
    }

    #[test]
    fn fader_state_renders_integer_percent() {
        let (macros, executors) = repos();
        assert_eq!(
            evaluate(&macros, &executors, &query(FeedbackId::MacroFaderState, "m1", 1)),
            FeedbackValue::Text("42%".into())
        );
        assert_eq!(
            evaluate(&macros, &executors, &query(FeedbackId::ExecutorFaderState, "Exec1", 1)),
            FeedbackValue::Text("100%".into())
        );
    }

    #[test]
    fn executor_button_name_falls_back_to_key() {
        let (macros, executors) = repos();
        assert_eq!(
            evaluate(&macros, &executors, &query(FeedbackId::ExecutorButtonName, "e1", 1)),
            FeedbackValue::Text("GO".into())
        );
    }

    #[test]
    fn unknown_key_degrades_to_neutral_values() {
        let (macros, executors) = repos();
        assert_eq!(
            evaluate(&macros, &executors, &query(FeedbackId::MacroButtonState, "Lamp1", 1)),
            FeedbackValue::Bool(false)
        );
        assert_eq!(
            evaluate(&macros, &executors, &query(FeedbackId::MacroImage, "Lamp1", 0)),
            FeedbackValue::None
        );
        assert_eq!(
            evaluate(&macros, &executors, &query(FeedbackId::ExecutorFaderState, "Lamp1", 0)),
            FeedbackValue::Text(String::new())
        );
    }

    #[test]
    fn out_of_range_button_number_is_neutral() {
        let (macros, executors) = repos();
        assert_eq!(
            evaluate(&macros, &executors, &query(FeedbackId::ExecutorButtonState, "e1", 0)),
            FeedbackValue::Bool(true),
            "number 0 saturates to the first button"
        );
        assert_eq!(
            evaluate(&macros, &executors, &query(FeedbackId::ExecutorButtonState, "e1", 9)),
            FeedbackValue::Bool(false)
        );
    }

    #[test]
    fn image_feedback_encodes_base64() {
        let (macros, executors) = repos();
        match evaluate(&macros, &executors, &query(FeedbackId::MacroImage, "Blinder", 0)) {
            FeedbackValue::Png64(encoded) => {
                assert_eq!(STANDARD.decode(encoded).unwrap(), vec![1, 2, 3]);
            }
            other => panic!("expected image, got {:?}", other),
        }
    }
}
