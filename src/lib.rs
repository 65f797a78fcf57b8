//! Rust library for bridging button/fader control surfaces to DMXControl
//! Umbra lighting consoles
//!
//! This library discovers an Umbra console on the network, logs in,
//! mirrors the console's live macro and executor state, and translates
//! surface input into remote state changes. It supports:
//!
//! - Console discovery via UDP multicast announcements, with a static
//!   host:port fallback
//! - Session lifecycle: login, readiness handshake, keepalive, user bind,
//!   ordered logoff
//! - Live macro/executor repositories fed by bulk fetch plus change
//!   streams
//! - Button press/release and fader increment/absolute control
//! - Action/feedback/preset schema generation for the hosting surface
//! - Automatic teardown and reconnect on connection loss
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use dmxc_umbra::{
//!     ActionDefinition, CompanionHost, FeedbackDefinition, FeedbackId, InstanceStatus,
//!     ModuleConfig, PresetDefinition, UmbraModule, VariableDefinition,
//! };
//!
//! struct PrintingHost;
//!
//! impl CompanionHost for PrintingHost {
//!     fn update_status(&self, status: InstanceStatus) {
//!         println!("status: {:?}", status);
//!     }
//!     fn set_action_definitions(&self, _actions: Vec<ActionDefinition>) {}
//!     fn set_feedback_definitions(&self, _feedbacks: Vec<FeedbackDefinition>) {}
//!     fn set_preset_definitions(&self, presets: Vec<PresetDefinition>) {
//!         println!("{} presets available", presets.len());
//!     }
//!     fn set_variable_definitions(&self, _variables: Vec<VariableDefinition>) {}
//!     fn check_feedbacks(&self, _feedbacks: &[FeedbackId]) {}
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let module = UmbraModule::new(Arc::new(PrintingHost));
//!     let config = ModuleConfig {
//!         netid: "UMBRA".to_string(),
//!         ..ModuleConfig::default()
//!     };
//!     module.init(config).await;
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     module.destroy().await;
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Module**: Host adapter owning the connect/reconnect cycle
//! - **Discovery**: Multicast listener matching console announcements
//! - **Session**: Login state machine, keepalive, routing, teardown
//! - **Entity clients**: Per-kind channels keeping repositories current
//! - **Repository**: Id-keyed mirror of remote state with name lookup
//! - **Presentation**: Action/feedback/preset schema derived from state
//! - **Protocol**: JSON message structures on the wire

mod actions;
mod auth;
mod config;
mod connection;
mod discovery;
mod error;
mod executor_client;
mod feedbacks;
mod host;
mod macro_client;
mod module;
mod presets;
pub mod protocol;
mod repository;
mod session;
mod types;

// Public exports
pub use actions::{
    action_definitions, ActionDefinition, ActionId, ActionInvocation, OptionField, OptionKind,
};
pub use auth::hash_password;
pub use config::{ModuleConfig, DEFAULT_UMBRA_PORT};
pub use discovery::{Discovery, SharedConfig, DISCOVERY_PORT, MULTICAST_GROUP};
pub use error::{Result, UmbraError};
pub use feedbacks::{
    feedback_definitions, FeedbackDefinition, FeedbackId, FeedbackKind, FeedbackQuery,
    FeedbackValue, EXECUTOR_FEEDBACKS, MACRO_FEEDBACKS,
};
pub use host::{CompanionHost, InstanceStatus, StateListener, VariableDefinition};
pub use module::UmbraModule;
pub use presets::{
    combine_rgb, generate_presets, PresetDefinition, PresetFeedback, PresetSteps, PresetStyle,
};
pub use repository::Repository;
pub use session::{
    ButtonStateRequest, FaderChange, FaderStateRequest, SessionManager, SessionState,
};
pub use types::{
    percent_to_delta, percent_to_position, Entity, EntityKind, Executor, ExecutorButton,
    ExecutorFader, Macro, MacroButton, MacroFader,
};
