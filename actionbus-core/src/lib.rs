//! Core types for actionbus
//!
//! This crate provides the action model, the ordered action bus, the
//! configuration surface, and the error types shared by all other
//! actionbus components.

pub mod action;
pub mod bus;
pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
