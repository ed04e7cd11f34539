//! # Task data model and handler abstractions.
//!
//! This module provides the core task-related types:
//! - [`ExecutionTask`] - a named unit of work submitted by a caller
//! - [`ExecutionRecord`] - the persisted lifecycle of one task
//! - [`ExecutionResult`] - the outcome of the most recent attempt
//! - [`TaskStatus`] - the record state machine's states
//! - [`ListFilter`] - query parameters for record listings
//! - [`Handler`] / [`HandlerFn`] / [`HandlerRegistry`] - the pluggable
//!   business-logic seam

mod handler;
mod task;

pub use handler::{BoxHandlerFuture, Handler, HandlerError, HandlerFn, HandlerRef, HandlerRegistry};
pub use task::{ExecutionRecord, ExecutionResult, ExecutionTask, ListFilter, TaskStatus};
