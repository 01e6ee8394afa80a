//! # Error Types
//!
//! This module defines custom error types for the evolutionary search engine.
//! It provides specific error variants for the failure scenarios that may
//! occur while configuring and running an optimization.
//!
//! Individual-level evaluation failures (timeouts, crashed objective
//! functions) are *not* errors: they are recorded as
//! [`ObjectiveValue`](crate::objective::ObjectiveValue) markers in the
//! population store and sorted to the bottom of every selection ranking. Only
//! run-level failures surface through [`EvolveError`].
//!
//! ## Examples
//!
//! Using the `Result` type:
//!
//! ```rust
//! use pipevolve::error::{EvolveError, Result};
//!
//! fn some_function() -> Result<()> {
//!     // Function implementation
//!     Ok(())
//! }
//!
//! fn caller() {
//!     match some_function() {
//!         Ok(_) => println!("Success!"),
//!         Err(e) => println!("Error: {}", e),
//!     }
//! }
//! ```
//!
//! Using the `ResultExt` trait to add context to errors:
//!
//! ```rust
//! use pipevolve::error::{Result, ResultExt};
//! use std::fs::File;
//!
//! fn read_snapshot(path: &str) -> Result<()> {
//!     File::open(path).context("Failed to open checkpoint snapshot")
//!         .and_then(|_file| {
//!             // Read file contents
//!             Ok(())
//!         })
//! }
//! ```

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Represents run-level errors that can occur in the evolutionary search
/// engine.
///
/// Per-evaluation failures never appear here; they are data. See the module
/// documentation for the distinction.
#[derive(Error, Debug)]
pub enum EvolveError {
    /// Error that occurs when an invalid configuration is provided. Raised
    /// during the validation phase, before any evaluation starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error that occurs when an empty population is encountered.
    #[error("Empty population error: Cannot operate on an empty population")]
    EmptyPopulation,

    /// Error that occurs when a selection operation fails.
    #[error("Selection error: {0}")]
    Selection(String),

    /// Error that occurs when the worker pool or its result channel is lost
    /// mid-run. Fatal: the optimization aborts, but every evaluation recorded
    /// so far remains queryable in the population store.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// Error that occurs when a checkpoint snapshot cannot be read or
    /// decoded.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Error that occurs when an ordered fallback search exhausts every
    /// candidate without a success.
    #[error("No viable individual: {0}")]
    NoViableIndividual(String),

    /// Error that occurs when an I/O operation fails.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A generic error with a custom message.
    #[error("{0}")]
    Other(String),
}

/// A specialized Result type for evolutionary search operations.
///
/// This type is a convenience wrapper around `std::result::Result` with the
/// error type fixed to `EvolveError`.
pub type Result<T> = std::result::Result<T, EvolveError>;

/// Extension trait for Result to add context to errors.
///
/// This trait provides a convenient way to add context to errors when
/// converting from one error type to `EvolveError`.
///
/// ## Examples
///
/// ```rust
/// use pipevolve::error::ResultExt;
/// use std::fs::File;
///
/// fn read_file(path: &str) -> pipevolve::error::Result<()> {
///     File::open(path).context("Failed to open file")?;
///     Ok(())
/// }
/// ```
pub trait ResultExt<T, E> {
    /// Adds context to an error.
    ///
    /// This method converts the error to an `EvolveError` with the provided
    /// context.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display + Send + Sync + 'static;
}

impl<T, E> ResultExt<T, E> for std::result::Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| EvolveError::Other(format!("{}: {}", context, e)))
    }
}

/// Extension trait for Option to convert to Result with a custom error.
///
/// ## Examples
///
/// ```rust
/// use pipevolve::error::{EvolveError, OptionExt};
///
/// fn best_index(scores: &[i32]) -> pipevolve::error::Result<i32> {
///     scores.iter().max().cloned().ok_or_else_evolve(||
///         EvolveError::EmptyPopulation
///     )
/// }
/// ```
pub trait OptionExt<T> {
    /// Converts an Option to a Result using a closure to generate the error.
    fn ok_or_else_evolve<F>(self, err_fn: F) -> Result<T>
    where
        F: FnOnce() -> EvolveError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_else_evolve<F>(self, err_fn: F) -> Result<T>
    where
        F: FnOnce() -> EvolveError,
    {
        self.ok_or_else(err_fn)
    }
}
