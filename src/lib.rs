//! cpu-reveal library crate.
//!
//! This module exposes the internal components for integration testing.

pub mod cli;
pub mod config;
pub mod controller;
pub mod credential;
pub mod generation;
pub mod interactive;
pub mod presentation;
pub mod request;
pub mod session;
pub mod veo;
