//! # reactorx sample application
//!
//! The modules of the sample app, exposed for integration testing.

pub mod form;
pub mod github;
pub mod lifecycle;
