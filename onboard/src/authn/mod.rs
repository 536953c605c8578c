//! Authentication: token storage, refresh and account sessions

pub mod refresher;
pub mod service;
pub mod tokens;
