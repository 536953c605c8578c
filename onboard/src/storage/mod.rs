//! Local storage: settings, layout and secrets

pub mod layout;
pub mod secrets;
pub mod settings;
