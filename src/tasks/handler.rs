//! # Handler abstraction and function-backed handler implementation.
//!
//! This module defines the [`Handler`] trait (the seam where business logic
//! plugs into the orchestrator) and a convenient function-backed
//! implementation [`HandlerFn`]. The common handle type is [`HandlerRef`],
//! an `Arc<dyn Handler>` suitable for sharing across the runtime.
//!
//! Dispatch is explicit: a [`HandlerRegistry`] maps task names to handlers
//! and is injected at orchestrator construction. A task whose name resolves
//! to nothing fails immediately as a configuration error.
//!
//! ## Example
//! ```
//! use serde_json::{json, Value};
//! use taskdock::{HandlerError, HandlerFn, HandlerRegistry};
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_fn("greet", |input: Value| async move {
//!     let name = input["name"].as_str().unwrap_or("world");
//!     Ok(json!({ "greeting": format!("hello, {name}") }))
//! });
//!
//! assert!(registry.contains("greet"));
//! assert!(registry.resolve("nope").is_none());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

/// Error returned by a task handler.
///
/// Carries a message and an optional stack/detail string; both are persisted
/// verbatim into the record's [`ExecutionResult`](crate::ExecutionResult).
#[derive(Clone, Debug)]
pub struct HandlerError {
    /// Failure message.
    pub message: String,
    /// Optional stack trace or extended detail.
    pub stack: Option<String>,
}

impl HandlerError {
    /// Creates an error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// Returns the error with a stack/detail string attached.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl std::error::Error for HandlerError {}

/// Future returned by [`Handler::invoke`].
pub type BoxHandlerFuture = BoxFuture<'static, Result<Value, HandlerError>>;

/// # Asynchronous task handler.
///
/// A handler receives the task's opaque JSON input and produces either an
/// output value or a [`HandlerError`]. Each invocation must create a fresh
/// future owning its own state; handlers are shared across attempts via
/// [`HandlerRef`].
pub trait Handler: Send + Sync + 'static {
    /// Runs the handler against one input payload.
    fn invoke(&self, input: Value) -> BoxHandlerFuture;
}

/// Shared handle to a handler.
pub type HandlerRef = Arc<dyn Handler>;

/// Function-backed handler implementation.
///
/// Wraps a closure that *creates* a new future per invocation, the same
/// shape business code usually has: `Fn(Value) -> impl Future`.
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    ///
    /// Prefer [`HandlerFn::arc`] when you immediately need a [`HandlerRef`].
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    fn invoke(&self, input: Value) -> BoxHandlerFuture {
        Box::pin((self.f)(input))
    }
}

/// Name-keyed map of handlers, injected at orchestrator construction.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, HandlerRef>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, handler: HandlerRef) -> &mut Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    /// Registers a closure under `name`.
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.register(name, HandlerFn::arc(f))
    }

    /// Looks up the handler for `name`.
    pub fn resolve(&self, name: &str) -> Option<HandlerRef> {
        self.handlers.get(name).cloned()
    }

    /// Whether a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Sorted list of registered handler names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
