//! Overload resolution across the boundary.
//!
//! Every exposed name resolves to a [`FunctionGroup`]: one or more host
//! callables registered under that name. A call walks the candidates in
//! descending declared-arity order (ties keep registration order, biasing
//! resolution toward the most specific overload), converts every argument
//! through the marshaller, and invokes the first candidate that converts
//! cleanly. When none does, the caller receives a single aggregated error
//! listing each overload's signature and its specific failure, most recently
//! tried first.

use std::fmt;
use std::rc::{Rc, Weak};

use super::error::{OverloadAttempt, ScriptError};
use super::function::HostFn;
use super::value::Value;
use crate::runtime::{Ctx, RuntimeCore};

/// What a function group constructs when called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnKind {
    /// A plain callable.
    Function,
    /// A callable producing a fresh object instance.
    Constructor,
}

impl fmt::Display for FnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FnKind::Function => write!(f, "function"),
            FnKind::Constructor => write!(f, "constructor"),
        }
    }
}

/// All host callables registered under one exposed name.
pub struct FunctionGroup {
    name: String,
    kind: FnKind,
    candidates: Vec<Rc<HostFn>>,
}

impl FunctionGroup {
    /// Create an empty group.
    pub(crate) fn new(name: impl Into<String>, kind: FnKind) -> Self {
        FunctionGroup {
            name: name.into(),
            kind,
            candidates: Vec::new(),
        }
    }

    /// Add a candidate, keeping registration order.
    pub(crate) fn push(&mut self, candidate: Rc<HostFn>) {
        self.candidates.push(candidate);
    }

    /// Order candidates for resolution: descending declared arity, stable.
    pub(crate) fn seal(&mut self) {
        self.candidates
            .sort_by(|a, b| b.arity().cmp(&a.arity()));
    }

    /// Exposed name of this group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Function or constructor.
    pub fn kind(&self) -> FnKind {
        self.kind
    }

    /// Number of overloads.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// True when the group has no candidates.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Resolve and invoke exactly one overload.
    pub fn dispatch(
        &self,
        cx: &Ctx,
        this: Option<&Value>,
        args: &[Value],
    ) -> Result<Value, ScriptError> {
        let mut attempts = Vec::with_capacity(self.candidates.len());

        for candidate in &self.candidates {
            if !candidate.accepts_arity(args.len()) {
                attempts.push(OverloadAttempt {
                    signature: candidate.signature(&self.name),
                    reason: format!(
                        "expects {} argument{}{}, got {}",
                        candidate.arity(),
                        if candidate.arity() == 1 { "" } else { "s" },
                        if candidate.is_variadic() { " or more" } else { "" },
                        args.len()
                    ),
                });
                continue;
            }
            match candidate.prepare(cx, this, args) {
                Ok(invoke) => return invoke(),
                Err(err) => attempts.push(OverloadAttempt {
                    signature: candidate.signature(&self.name),
                    reason: err.to_string(),
                }),
            }
        }

        // Most recently tried first, so the most specific overload leads.
        attempts.reverse();
        Err(ScriptError::Overload {
            name: self.name.clone(),
            kind: self.kind,
            attempts,
        })
    }
}

impl fmt::Debug for FunctionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionGroup")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("candidates", &self.candidates.len())
            .finish()
    }
}

/// A dispatchable group bound to an optional receiver, as handed to engines.
///
/// Property access on an object proxy mints one of these for each prototype
/// function, bound to that object; namespace materialization mints unbound
/// ones for free functions and constructors.
pub struct HostFunction {
    name: String,
    group: Rc<FunctionGroup>,
    this: Option<Value>,
    core: Weak<RuntimeCore>,
}

impl HostFunction {
    pub(crate) fn new(
        group: Rc<FunctionGroup>,
        this: Option<Value>,
        core: Weak<RuntimeCore>,
    ) -> Self {
        HostFunction {
            name: group.name().to_string(),
            group,
            this,
            core,
        }
    }

    /// Exposed name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Function or constructor.
    pub fn kind(&self) -> FnKind {
        self.group.kind()
    }

    /// Resolve and invoke with the bound receiver.
    pub fn call(&self, args: &[Value]) -> Result<Value, ScriptError> {
        let core = self.core.upgrade().ok_or(ScriptError::RuntimeGone)?;
        let cx = Ctx::new(core);
        self.group.dispatch(&cx, self.this.as_ref(), args)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("kind", &self.group.kind())
            .field("bound", &self.this.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    use crate::engine::NullEngine;
    use crate::ffi::error::ConvertError;
    use crate::ffi::function::Rest;
    use crate::registry::RegistryBuilder;
    use crate::runtime::Runtime;

    fn runtime() -> Runtime {
        Runtime::new(RegistryBuilder::new(), Box::new(NullEngine)).unwrap()
    }

    fn overloaded_group() -> FunctionGroup {
        let mut group = FunctionGroup::new("f", FnKind::Function);
        group.push(Rc::new(HostFn::new("f", |a: i64| a + 1)));
        group.push(Rc::new(HostFn::new("f", |a: i64, b: i64| a + b)));
        group.seal();
        group
    }

    #[test]
    fn arity_selects_the_matching_overload() {
        let rt = runtime();
        let cx = rt.ctx();
        let group = overloaded_group();

        let one = group.dispatch(&cx, None, &[Value::Int(41)]).unwrap();
        assert_eq!(one, Value::Int(42));

        let two = group
            .dispatch(&cx, None, &[Value::Int(40), Value::Int(2)])
            .unwrap();
        assert_eq!(two, Value::Int(42));
    }

    #[test]
    fn exhausted_group_reports_every_overload() {
        let rt = runtime();
        let cx = rt.ctx();
        let group = overloaded_group();

        let err = group
            .dispatch(&cx, None, &[Value::Int(1), Value::Int(2), Value::Int(3)])
            .unwrap_err();
        let ScriptError::Overload { name, attempts, .. } = &err else {
            panic!("expected an overload failure, got {err}");
        };
        assert_eq!(name, "f");
        assert_eq!(attempts.len(), 2);
        let text = err.to_string();
        assert!(text.contains("f(i64)"));
        assert!(text.contains("f(i64, i64)"));
        assert!(text.contains("got 3"));
    }

    #[test]
    fn conversion_failure_falls_through_to_the_next_candidate() {
        let rt = runtime();
        let cx = rt.ctx();
        let mut group = FunctionGroup::new("f", FnKind::Function);
        group.push(Rc::new(HostFn::new("f", |s: String| s.len() as i64)));
        group.push(Rc::new(HostFn::new("f", |n: i64| n * 10)));
        group.seal();

        // Same arity; the string overload rejects an int argument and the
        // int overload wins.
        assert_eq!(group.dispatch(&cx, None, &[Value::Int(4)]).unwrap(), Value::Int(40));
        assert_eq!(
            group.dispatch(&cx, None, &[Value::string("four")]).unwrap(),
            Value::Int(4)
        );
    }

    #[test]
    fn variadic_candidates_match_any_longer_call() {
        let rt = runtime();
        let cx = rt.ctx();
        let mut group = FunctionGroup::new("sum", FnKind::Function);
        group.push(Rc::new(HostFn::new("sum", |first: i64, rest: Rest<i64>| {
            first + rest.0.iter().sum::<i64>()
        })));
        group.seal();

        let out = group
            .dispatch(&cx, None, &[Value::Int(1), Value::Int(2), Value::Int(3)])
            .unwrap();
        assert_eq!(out, Value::Int(6));

        let err = group.dispatch(&cx, None, &[]).unwrap_err();
        assert!(err.to_string().contains("or more"));
    }

    #[test]
    fn host_errors_survive_the_boundary_for_downcast() {
        #[derive(Debug, Error)]
        #[error("quota exhausted")]
        struct Quota;

        let rt = runtime();
        let cx = rt.ctx();
        let mut group = FunctionGroup::new("apply", FnKind::Function);
        group.push(Rc::new(HostFn::new("apply", |ok: bool| -> Result<i64, Quota> {
            if ok { Ok(1) } else { Err(Quota) }
        })));
        group.seal();

        assert_eq!(group.dispatch(&cx, None, &[Value::Bool(true)]).unwrap(), Value::Int(1));
        let err = group.dispatch(&cx, None, &[Value::Bool(false)]).unwrap_err();
        assert_eq!(err.to_string(), "quota exhausted");
        assert!(err.downcast_host::<Quota>().is_some());
    }

    #[test]
    fn injected_context_is_excluded_from_arity() {
        let rt = runtime();
        let cx = rt.ctx();
        let f = HostFn::new("with_ctx", |cx: &Ctx, n: i64| cx.argv().len() as i64 + n);
        assert_eq!(f.arity(), 1);
        assert_eq!(f.signature("withCtx"), "withCtx(i64)");

        let mut group = FunctionGroup::new("withCtx", FnKind::Function);
        group.push(Rc::new(f));
        group.seal();
        assert_eq!(group.dispatch(&cx, None, &[Value::Int(5)]).unwrap(), Value::Int(5));
    }

    #[test]
    fn argument_failures_name_the_position() {
        let rt = runtime();
        let cx = rt.ctx();
        let f = HostFn::new("g", |_a: i64, _b: bool| ());
        let err = f
            .prepare(&cx, None, &[Value::Int(1), Value::Int(2)])
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, ConvertError::Argument { index: 2, .. }));
    }

    #[test]
    fn unit_returns_become_undefined() {
        let rt = runtime();
        let cx = rt.ctx();
        let mut group = FunctionGroup::new("touch", FnKind::Function);
        group.push(Rc::new(HostFn::new("touch", || {})));
        group.seal();
        assert_eq!(group.dispatch(&cx, None, &[]).unwrap(), Value::Undefined);
    }
}
