//! Stratus Core - Shared types for the Stratus result backend
//!
//! This crate provides the pieces every backend agrees on:
//! - Task identifiers, states and stored results
//! - Value serialization
//! - Application configuration (including transport options)
//! - Error types

pub mod config;
pub mod error;
pub mod serializer;
pub mod task;

pub use config::{AppConfig, TransportOptions};
pub use error::{Error, Result};
pub use serializer::Serializer;
pub use task::{TaskId, TaskMeta, TaskResult, TaskState};
