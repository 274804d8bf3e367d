//! The boundary to the host-supplied script engine.
//!
//! This crate does not implement a scripting language. The runtime
//! materializes registrations into a global scope of [`Value`]s and hands it,
//! together with the script source and arguments, to a [`ScriptEngine`]
//! implementation. The engine evaluates the source, resolving identifiers
//! against the globals and routing property access and calls through the
//! proxy and dispatch types of [`crate::ffi`].

use crate::ffi::{ScriptError, ScriptObject, Value};

/// One script evaluation request.
pub struct Execution<'a> {
    /// The script source text.
    pub source: &'a str,
    /// The materialized global scope.
    pub globals: ScriptObject,
    /// Arguments passed to [`Runtime::run`](crate::runtime::Runtime::run).
    pub argv: Vec<Value>,
}

/// A script language implementation supplied by the host.
///
/// Exceptions raised by the script must surface as
/// [`ScriptError::Exception`] carrying the script-reported message; errors
/// produced by host functions ([`ScriptError::Host`] and friends) should
/// propagate unchanged so the original host error survives the round trip.
pub trait ScriptEngine {
    /// Evaluate a script and return its completion value.
    fn eval(&mut self, execution: &Execution<'_>) -> Result<Value, ScriptError>;
}

/// Engine that evaluates nothing; unit tests drive the binding surface
/// directly through the materialized globals.
#[cfg(test)]
pub(crate) struct NullEngine;

#[cfg(test)]
impl ScriptEngine for NullEngine {
    fn eval(&mut self, _execution: &Execution<'_>) -> Result<Value, ScriptError> {
        Ok(Value::Undefined)
    }
}
