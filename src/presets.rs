use crate::actions::{ActionId, ActionInvocation};
use crate::feedbacks::FeedbackId;
use crate::types::{Executor, Macro};

/// Default step size for fader presets, in percent
const FADER_STEP_PERCENT: f64 = 5.0;

/// Pack an RGB triple the way the control surface expects colors
pub fn combine_rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresetStyle {
    pub text: String,
    pub color: u32,
    pub bgcolor: u32,
}

impl PresetStyle {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: combine_rgb(255, 255, 255),
            bgcolor: combine_rgb(0, 0, 0),
        }
    }

    fn active_background() -> Self {
        Self {
            text: String::new(),
            color: combine_rgb(0, 0, 0),
            bgcolor: combine_rgb(255, 0, 0),
        }
    }
}

/// A feedback wired into a preset, optionally overriding the style when on
#[derive(Debug, Clone, PartialEq)]
pub struct PresetFeedback {
    pub id: FeedbackId,
    pub key: String,
    pub number: u32,
    pub style: Option<PresetStyle>,
}

/// Button step bindings: press/release plus rotary directions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetSteps {
    pub down: Vec<ActionInvocation>,
    pub up: Vec<ActionInvocation>,
    pub rotate_left: Vec<ActionInvocation>,
    pub rotate_right: Vec<ActionInvocation>,
}

/// A ready-made button definition the host offers to the user
#[derive(Debug, Clone, PartialEq)]
pub struct PresetDefinition {
    pub id: String,
    pub category: String,
    pub name: String,
    pub style: PresetStyle,
    pub rotary: bool,
    pub steps: PresetSteps,
    pub feedbacks: Vec<PresetFeedback>,
}

fn invocation(action: ActionId, key: &str, number: u32, percent: f64) -> ActionInvocation {
    ActionInvocation {
        action,
        key: key.to_string(),
        number,
        percent,
    }
}

/// Derive the full preset set from current repository contents.
///
/// Presets are regenerated wholesale on every topology change rather than
/// patched incrementally; entity counts are small and topology changes
/// are rare.
pub fn generate_presets(macros: &[Macro], executors: &[Executor]) -> Vec<PresetDefinition> {
    let mut presets = Vec::new();

    for m in macros {
        for button in &m.buttons {
            presets.push(PresetDefinition {
                id: format!("{}_button_{}", m.id, button.number),
                category: m.name.clone(),
                name: format!("Button{}", button.number),
                style: PresetStyle::plain(format!("Button {}", button.number)),
                rotary: false,
                steps: PresetSteps {
                    down: vec![invocation(
                        ActionId::MacroPressButton,
                        &m.name,
                        button.number,
                        0.0,
                    )],
                    up: vec![invocation(
                        ActionId::MacroReleaseButton,
                        &m.name,
                        button.number,
                        0.0,
                    )],
                    ..Default::default()
                },
                feedbacks: vec![
                    PresetFeedback {
                        id: FeedbackId::MacroButtonState,
                        key: m.name.clone(),
                        number: button.number,
                        style: Some(PresetStyle::active_background()),
                    },
                    PresetFeedback {
                        id: FeedbackId::MacroButtonName,
                        key: m.name.clone(),
                        number: button.number,
                        style: None,
                    },
                ],
            });
        }

        for fader in &m.faders {
            presets.push(PresetDefinition {
                id: format!("{}_fader_{}", m.id, fader.number),
                category: m.name.clone(),
                name: format!("Fader{}", fader.number),
                style: PresetStyle::plain(format!("Fader {}", fader.number)),
                rotary: true,
                steps: PresetSteps {
                    rotate_left: vec![invocation(
                        ActionId::MacroDecrementFader,
                        &m.name,
                        fader.number,
                        FADER_STEP_PERCENT,
                    )],
                    rotate_right: vec![invocation(
                        ActionId::MacroIncrementFader,
                        &m.name,
                        fader.number,
                        FADER_STEP_PERCENT,
                    )],
                    ..Default::default()
                },
                feedbacks: vec![PresetFeedback {
                    id: FeedbackId::MacroFaderState,
                    key: m.name.clone(),
                    number: fader.number,
                    style: None,
                }],
            });
            presets.push(PresetDefinition {
                id: format!("{}_fader_{}_inc", m.id, fader.number),
                category: m.name.clone(),
                name: format!("Increment Fader {}", fader.number),
                style: PresetStyle::plain("⬆️"),
                rotary: false,
                steps: PresetSteps {
                    down: vec![invocation(
                        ActionId::MacroIncrementFader,
                        &m.name,
                        fader.number,
                        FADER_STEP_PERCENT,
                    )],
                    ..Default::default()
                },
                feedbacks: Vec::new(),
            });
            presets.push(PresetDefinition {
                id: format!("{}_fader_{}_dec", m.id, fader.number),
                category: m.name.clone(),
                name: format!("Decrement Fader {}", fader.number),
                style: PresetStyle::plain("⬇️"),
                rotary: false,
                steps: PresetSteps {
                    down: vec![invocation(
                        ActionId::MacroDecrementFader,
                        &m.name,
                        fader.number,
                        FADER_STEP_PERCENT,
                    )],
                    ..Default::default()
                },
                feedbacks: Vec::new(),
            });
        }
    }

    for executor in executors {
        for number in 1..=4u32 {
            presets.push(PresetDefinition {
                id: format!("{}_button_{}", executor.id, number),
                category: executor.name.clone(),
                name: format!("Button{}", number),
                style: PresetStyle::plain(format!("Button {}", number)),
                rotary: false,
                steps: PresetSteps {
                    down: vec![invocation(
                        ActionId::ExecutorPressButton,
                        &executor.name,
                        number,
                        0.0,
                    )],
                    up: vec![invocation(
                        ActionId::ExecutorReleaseButton,
                        &executor.name,
                        number,
                        0.0,
                    )],
                    ..Default::default()
                },
                feedbacks: vec![
                    PresetFeedback {
                        id: FeedbackId::ExecutorButtonState,
                        key: executor.name.clone(),
                        number,
                        style: Some(PresetStyle::active_background()),
                    },
                    PresetFeedback {
                        id: FeedbackId::ExecutorButtonName,
                        key: executor.name.clone(),
                        number,
                        style: None,
                    },
                ],
            });
        }

        presets.push(PresetDefinition {
            id: format!("{}_fader", executor.id),
            category: executor.name.clone(),
            name: "FaderState".to_string(),
            style: PresetStyle::plain("FaderState"),
            rotary: true,
            steps: PresetSteps {
                rotate_left: vec![invocation(
                    ActionId::ExecutorDecrementFader,
                    &executor.name,
                    0,
                    FADER_STEP_PERCENT,
                )],
                rotate_right: vec![invocation(
                    ActionId::ExecutorIncrementFader,
                    &executor.name,
                    0,
                    FADER_STEP_PERCENT,
                )],
                ..Default::default()
            },
            feedbacks: vec![PresetFeedback {
                id: FeedbackId::ExecutorFaderState,
                key: executor.name.clone(),
                number: 0,
                style: None,
            }],
        });
        presets.push(PresetDefinition {
            id: format!("{}_fader_inc", executor.id),
            category: executor.name.clone(),
            name: "Increment Fader".to_string(),
            style: PresetStyle::plain("⬆️"),
            rotary: false,
            steps: PresetSteps {
                down: vec![invocation(
                    ActionId::ExecutorIncrementFader,
                    &executor.name,
                    0,
                    FADER_STEP_PERCENT,
                )],
                ..Default::default()
            },
            feedbacks: Vec::new(),
        });
        presets.push(PresetDefinition {
            id: format!("{}_fader_dec", executor.id),
            category: executor.name.clone(),
            name: "Decrement Fader".to_string(),
            style: PresetStyle::plain("⬇️"),
            rotary: false,
            steps: PresetSteps {
                down: vec![invocation(
                    ActionId::ExecutorDecrementFader,
                    &executor.name,
                    0,
                    FADER_STEP_PERCENT,
                )],
                ..Default::default()
            },
            feedbacks: Vec::new(),
        });
    }

    presets
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
                    active: false,
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
                position: 0.0,
            }],
            image: Vec::new(),
        }
    }

    fn sample_executor() -> Executor {
        Executor {
            id: "e1".into(),
            name: "Exec1".into(),
            member_id: String::new(),
            number: 1,
            buttons: [
                ExecutorButton::default(),
                ExecutorButton::default(),
                ExecutorButton::default(),
                ExecutorButton::default(),
            ],
            fader: ExecutorFader::default(),
        }
    }

    #[test]
    fn macro_presets_cover_buttons_and_faders() {
        let presets = generate_presets(&[sample_macro()], &[]);
        // two buttons plus rotary/inc/dec per fader
        assert_eq!(presets.len(), 5);
        assert!(presets.iter().any(|p| p.id == "m1_button_1"));
        assert!(presets.iter().any(|p| p.id == "m1_fader_1_dec"));
        assert!(presets.iter().all(|p| p.category == "Blinder"));
    }

    #[test]
    fn executor_presets_have_fixed_shape() {
        let presets = generate_presets(&[], &[sample_executor()]);
        // four buttons plus rotary/inc/dec for the single fader
        assert_eq!(presets.len(), 7);
        let rotary = presets.iter().find(|p| p.id == "e1_fader").unwrap();
        assert!(rotary.rotary);
        assert_eq!(rotary.steps.rotate_right.len(), 1);
        assert_eq!(
            rotary.steps.rotate_right[0].action,
            ActionId::ExecutorIncrementFader
        );
    }

    #[test]
    fn button_presets_press_on_down_and_release_on_up() {
        let presets = generate_presets(&[sample_macro()], &[]);
        let button = presets.iter().find(|p| p.id == "m1_button_2").unwrap();
        assert_eq!(button.steps.down[0].action, ActionId::MacroPressButton);
        assert_eq!(button.steps.up[0].action, ActionId::MacroReleaseButton);
        // presets address entities by display name; the repository resolves it
        assert_eq!(button.steps.down[0].key, "Blinder");
    }

    #[test]
    fn empty_repositories_generate_no_presets() {
        assert!(generate_presets(&[], &[]).is_empty());
    }
}
