use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::protocol::{ExecutorDescriptor, MacroDescriptor};

/// The two controllable entity kinds a console exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Macro,
    Executor,
}

/// Capability set shared by macros and executors
///
/// Identity (`id`) never changes across updates; `name` is a secondary
/// lookup key that may be reassigned by the console at any time.
pub trait Entity: Clone + Send + 'static {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

/// A console-side programmable button/fader bank with a thumbnail image
#[derive(Debug, Clone, PartialEq)]
pub struct Macro {
    pub id: String,
    pub name: String,
    pub buttons: Vec<MacroButton>,
    pub faders: Vec<MacroFader>,
    /// Thumbnail PNG bytes, empty when the console sent none
    pub image: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroButton {
    pub number: u32,
    pub label: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroFader {
    pub number: u32,
    pub label: String,
    /// Normalized position in [0, 1]
    pub position: f64,
}

/// A console-side fixed-shape control bank: four buttons, one fader
#[derive(Debug, Clone, PartialEq)]
pub struct Executor {
    pub id: String,
    pub name: String,
    pub member_id: String,
    pub number: u32,
    pub buttons: [ExecutorButton; 4],
    pub fader: ExecutorFader,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutorButton {
    pub key: String,
    pub label: String,
    pub active: bool,
}

impl ExecutorButton {
    /// Display name, falling back to the key when no label is assigned
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.key
        } else {
            &self.label
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutorFader {
    pub key: String,
    pub label: String,
    /// Normalized position in [0, 1]
    pub position: f64,
}

impl ExecutorFader {
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.key
        } else {
            &self.label
        }
    }
}

impl Entity for Macro {
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

impl Entity for Executor {
    fn id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
}

impl From<MacroDescriptor> for Macro {
    fn from(descriptor: MacroDescriptor) -> Self {
        let image = descriptor
            .bitmap
            .as_deref()
            .map(|encoded| {
                STANDARD.decode(encoded).unwrap_or_else(|e| {
                    tracing::warn!("Discarding undecodable macro bitmap: {}", e);
                    Vec::new()
                })
            })
            .unwrap_or_default();

        Self {
            id: descriptor.id,
            name: descriptor.name,
            buttons: descriptor
                .buttons
                .into_iter()
                .map(|b| MacroButton {
                    number: b.number,
                    label: b.label,
                    active: b.active,
                })
                .collect(),
            faders: descriptor
                .faders
                .into_iter()
                .map(|f| MacroFader {
                    number: f.number,
                    label: f.label,
                    position: f.fader_position,
                })
                .collect(),
            image,
        }
    }
}

impl From<ExecutorDescriptor> for Executor {
    fn from(d: ExecutorDescriptor) -> Self {
        Self {
            id: d.id,
            name: d.name,
            member_id: d.executor_member_id,
            number: d.number,
            buttons: [
                ExecutorButton {
                    key: d.button1_key,
                    label: d.button1_display_name,
                    active: d.button1_active,
                },
                ExecutorButton {
                    key: d.button2_key,
                    label: d.button2_display_name,
                    active: d.button2_active,
                },
                ExecutorButton {
                    key: d.button3_key,
                    label: d.button3_display_name,
                    active: d.button3_active,
                },
                ExecutorButton {
                    key: d.button4_key,
                    label: d.button4_display_name,
                    active: d.button4_active,
                },
            ],
            fader: ExecutorFader {
                key: d.fader_key,
                label: d.fader_display_name,
                position: d.fader_position,
            },
        }
    }
}

/// Convert a user-facing percentage (0–100) to a normalized fader position.
///
/// Clamped to [0, 1]; percentages never leave this module boundary.
pub fn percent_to_position(percent: f64) -> f64 {
    (percent / 100.0).clamp(0.0, 1.0)
}

/// Convert a signed step percentage to a normalized increment in [-1, 1]
pub fn percent_to_delta(step_percent: f64) -> f64 {
    (step_percent / 100.0).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_conversion_clamps_at_bounds() {
        assert_eq!(percent_to_position(50.0), 0.5);
        assert_eq!(percent_to_position(150.0), 1.0);
        assert_eq!(percent_to_position(-10.0), 0.0);
        assert_eq!(percent_to_delta(-5.0), -0.05);
        assert_eq!(percent_to_delta(250.0), 1.0);
    }

    #[test]
    fn repeated_steps_stay_in_bounds() {
        // 21 steps of +5% from zero must not leave [0, 1]
        let mut position = 0.0f64;
        for _ in 0..21 {
            position = (position + percent_to_delta(5.0)).clamp(0.0, 1.0);
        }
        assert!(position <= 1.0);
        assert_eq!(position, 1.0);
    }

    #[test]
    fn executor_button_falls_back_to_key() {
        let button = ExecutorButton {
            key: "GO".into(),
            label: String::new(),
            active: false,
        };
        assert_eq!(button.display_label(), "GO");
    }

    #[test]
    fn bad_bitmap_becomes_empty_image() {
        let descriptor = MacroDescriptor {
            id: "m1".into(),
            name: "Blinder".into(),
            buttons: Vec::new(),
            faders: Vec::new(),
            bitmap: Some("not base64 !!!".into()),
        };
        let m: Macro = descriptor.into();
        assert!(m.image.is_empty());
    }
}
