//! Onboard Library
//!
//! Device onboarding pipeline: discovery of unpaired devices, credential
//! provisioning, backend registration and authenticated backend access.

pub mod app;
pub mod authn;
pub mod devicestate;
pub mod discovery;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod pairing;
pub mod provisioning;
pub mod registration;
pub mod storage;
pub mod utils;
