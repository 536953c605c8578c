//! Wire models for the onboarding backend API

pub mod models;

pub use models::*;
