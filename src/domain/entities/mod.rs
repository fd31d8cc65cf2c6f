//! Domain entities - Core objects shared by the base layer and fragments

pub mod user;
pub mod event;
pub mod namespace;
pub mod registration;
pub mod setting;

pub use user::User;
pub use event::{EventKind, InboundEvent, Origin, Payload};
pub use namespace::Namespace;
pub use registration::{RegistrationEntry, Trigger, TriggerKind};
pub use setting::{SettingKind, SettingScope, SettingSpec};
