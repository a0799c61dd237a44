//! # symloc Common Library
//!
//! Shared code for the symptom localization evaluator:
//! - Data model (symptoms, annotations, knowledge, predictions, metrics)
//! - Configuration loading and validation
//! - Evaluation event types and EventBus
//! - Error types

pub mod config;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
