//! Error types for the binding layer.
//!
//! Three tiers, mirroring how failures propagate across the boundary:
//!
//! - [`ConvertError`] - a script value could not be converted to an expected
//!   host type (or back). Always recoverable by the immediate caller; the
//!   overload dispatcher relies on this to try the next candidate.
//! - [`ScriptError`] - an error crossing a call boundary: a script exception,
//!   an exhausted overload group, or a host function that returned an error.
//! - [`RegistryError`] - a contract violation by the embedding host code,
//!   raised during registration/materialization and meant to halt start-up.

use std::error::Error;
use std::rc::Rc;

use thiserror::Error;

use super::dispatch::FnKind;

/// Errors that can occur when converting between script and host values.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The value's kind does not match the target type.
    #[error("cannot convert {actual} to {expected}")]
    TypeMismatch { expected: String, actual: String },

    /// `null`/`undefined` assigned to a target with no zero value.
    #[error("null is not assignable to {target}")]
    NullTarget { target: String },

    /// Integer does not fit in the target width.
    #[error("integer overflow: {value} does not fit in {target}")]
    IntegerOverflow { value: i64, target: &'static str },

    /// Float with a fractional part converted to an integer target.
    #[error("{value} has a fractional part and cannot become {target}")]
    FractionalInteger { value: f64, target: &'static str },

    /// One call argument failed to convert.
    #[error("argument {index}: {source}")]
    Argument {
        index: usize,
        #[source]
        source: Box<ConvertError>,
    },

    /// The method receiver failed to convert.
    #[error("receiver: {source}")]
    Receiver {
        #[source]
        source: Box<ConvertError>,
    },

    /// Every host field mapped under one exposed name rejected the value.
    #[error("no field of {type_name} accepts property \"{name}\": {detail}")]
    Field {
        type_name: &'static str,
        name: String,
        detail: String,
    },

    /// Structural object mapping was disabled for the target type.
    #[error("object mapping is disabled for {type_name}")]
    MappingDisabled { type_name: &'static str },

    /// A registered conversion override produced a value of the wrong type.
    #[error("conversion override for {type_name} returned an incompatible value")]
    BadOverride { type_name: &'static str },

    /// The host instance is already borrowed by an enclosing call.
    #[error("{type_name} is already borrowed by an enclosing host call")]
    Borrowed { type_name: &'static str },

    /// Generic conversion failure.
    #[error("conversion failed: {message}")]
    Failed { message: String },
}

impl ConvertError {
    /// Build a [`ConvertError::TypeMismatch`].
    pub fn mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        ConvertError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Build a generic conversion failure.
    pub fn failed(message: impl Into<String>) -> Self {
        ConvertError::Failed {
            message: message.into(),
        }
    }
}

/// One overload that was considered and rejected during dispatch.
#[derive(Debug)]
pub struct OverloadAttempt {
    /// Rendered signature, e.g. `f(i64, String)`.
    pub signature: String,
    /// Why this overload was rejected.
    pub reason: String,
}

/// Errors crossing the script/host call boundary.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// An exception surfaced by the script.
    #[error("{message}")]
    Exception { message: String },

    /// No overload in a group accepted the supplied arguments.
    #[error("{}", render_overload_failure(.name, .kind, .attempts))]
    Overload {
        name: String,
        kind: FnKind,
        attempts: Vec<OverloadAttempt>,
    },

    /// A host function returned an application error.
    ///
    /// The original error is retained so it can be recovered with
    /// [`ScriptError::downcast_host`] when it re-crosses the boundary.
    #[error("{message}")]
    Host {
        message: String,
        source: Option<Rc<dyn Error + 'static>>,
    },

    /// Argument or return conversion failed.
    #[error(transparent)]
    Convert(#[from] ConvertError),

    /// Write past the end of a host-backed array.
    #[error("index {index} is out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Array length set to a negative value.
    #[error("invalid array length {len}")]
    InvalidLength { len: i64 },

    /// A value called into a runtime that has been dropped.
    #[error("the runtime backing this value no longer exists")]
    RuntimeGone,
}

impl ScriptError {
    /// Build an exception-style error with the given message.
    pub fn exception(message: impl Into<String>) -> Self {
        ScriptError::Exception {
            message: message.into(),
        }
    }

    /// Wrap a host application error, retaining the original for downcast.
    pub fn host<E: Error + 'static>(err: E) -> Self {
        ScriptError::Host {
            message: err.to_string(),
            source: Some(Rc::new(err)),
        }
    }

    /// The retained host error, if this is a host application error.
    pub fn host_source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ScriptError::Host {
                source: Some(src), ..
            } => Some(src.as_ref()),
            _ => None,
        }
    }

    /// Recover the original host error type after a boundary round trip.
    pub fn downcast_host<E: Error + 'static>(&self) -> Option<&E> {
        self.host_source()?.downcast_ref::<E>()
    }
}

fn render_overload_failure(name: &str, kind: &FnKind, attempts: &[OverloadAttempt]) -> String {
    let mut out = format!("no overload of {kind} \"{name}\" accepts the supplied arguments");
    for attempt in attempts {
        out.push_str("\n  ");
        out.push_str(&attempt.signature);
        out.push_str(": ");
        out.push_str(&attempt.reason);
    }
    out
}

/// Contract violations by the embedding host code.
///
/// These abort [`Runtime::new`](crate::runtime::Runtime::new): they represent
/// a build-time-discoverable bug in the registrations, not a runtime
/// condition.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A field was declared that the type's descriptor does not carry.
    #[error("type {type_name} has no field \"{field}\"")]
    UnknownField {
        type_name: &'static str,
        field: String,
    },

    /// A method was declared that the type's descriptor does not carry.
    #[error("type {type_name} has no method \"{method}\"")]
    UnknownMethod {
        type_name: &'static str,
        method: String,
    },

    /// Fields or methods were selected on a type without a descriptor.
    #[error("type {type_name} carries no descriptor; only constructors, extension methods and conversions can be registered")]
    NotReflective { type_name: &'static str },

    /// A registered variable failed to convert to a script value.
    #[error("variable {namespace}.{name}: {source}")]
    Variable {
        namespace: String,
        name: String,
        #[source]
        source: ConvertError,
    },

    /// A namespace path segment collided with a non-namespace value.
    #[error("namespace path \"{path}\" collides with an existing value")]
    NamespaceCollision { path: String },
}
