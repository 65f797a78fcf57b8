use crate::actions::ActionDefinition;
use crate::feedbacks::{FeedbackDefinition, FeedbackId};
use crate::presets::PresetDefinition;
use crate::types::EntityKind;

/// Connection status surfaced to the hosting application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    Connecting,
    Ok,
    Disconnected,
    ConnectionFailure,
}

/// Variable schema entry; the console module currently defines none but
/// the registration call is part of the host contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDefinition {
    pub variable_id: String,
    pub name: String,
}

/// The surface this module presents its schema and status to
///
/// Implemented by the hosting control-surface application. All calls are
/// schema registrations or invalidation signals, never data pushes:
/// `check_feedbacks` asks the host to re-evaluate the named feedbacks
/// against current repository state.
pub trait CompanionHost: Send + Sync {
    fn update_status(&self, status: InstanceStatus);
    fn set_action_definitions(&self, actions: Vec<ActionDefinition>);
    fn set_feedback_definitions(&self, feedbacks: Vec<FeedbackDefinition>);
    fn set_preset_definitions(&self, presets: Vec<PresetDefinition>);
    fn set_variable_definitions(&self, variables: Vec<VariableDefinition>);
    fn check_feedbacks(&self, feedbacks: &[FeedbackId]);
}

/// Narrow capability handed to the entity clients
///
/// Topology changes (entity added/removed) warrant full preset
/// regeneration; value changes only warrant feedback re-evaluation.
pub trait StateListener: Send + Sync {
    fn topology_changed(&self, kind: EntityKind);
    fn values_changed(&self, kind: EntityKind);
}
