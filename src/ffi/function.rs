//! Type-erased host callables and the glue that builds them.
//!
//! A [`HostFn`] wraps one host callable behind a uniform two-phase interface:
//! `prepare` converts every argument (so the dispatcher can fall through to
//! the next overload on failure without side effects), and the returned
//! thunk performs the actual invocation and result conversion.
//!
//! The [`IntoHostFn`] trait turns ordinary Rust closures into `HostFn`s. It
//! is implemented for functions of up to six marshallable parameters, in four
//! return shapes (`R`, `()`, `Result<R, E>`, `Result<(), E>`), each with an
//! optional leading `&Ctx` parameter that is injected by the runtime and
//! excluded from the script-visible arity, plus variadic forms taking a
//! trailing [`Rest<T>`]. The `Args`/`Ret` marker parameters exist only to
//! keep the implementations coherent; callers never name them.

use std::any::Any;
use std::error::Error;
use std::rc::Rc;

use super::error::{ConvertError, ScriptError};
use super::handle::Handle;
use super::marshal::{FromValue, IntoValue};
use super::reflect::HostType;
use super::value::Value;
use crate::ffi::display_type_name;
use crate::runtime::Ctx;

/// Variadic tail of a host function signature.
///
/// A trailing `Rest<T>` parameter absorbs every remaining call argument,
/// converting each to `T`. During overload resolution a variadic candidate
/// matches any argument count at or above its fixed arity.
#[derive(Debug, Clone, Default)]
pub struct Rest<T>(pub Vec<T>);

impl<T> Rest<T> {
    /// The collected tail arguments.
    pub fn into_vec(self) -> Vec<T> {
        self.0
    }
}

/// Marker: the callable returns a plain marshallable value.
pub struct RetVal;
/// Marker: the callable returns nothing.
pub struct RetUnit;
/// Marker: the callable returns `Result<R, E>`.
pub struct RetResult;
/// Marker: the callable returns `Result<(), E>`.
pub struct RetResultUnit;
/// Marker: the callable takes an injected `&Ctx` first parameter.
pub struct Injected;

/// Deferred invocation produced by a successful `prepare`.
pub(crate) type Invoke = Box<dyn FnOnce() -> Result<Value, ScriptError>>;

type PrepareFn = Box<dyn Fn(&Ctx, Option<&Value>, &[Value]) -> Result<Invoke, ConvertError>>;

/// A type-erased host callable with its dispatch metadata.
pub struct HostFn {
    name: String,
    params: Vec<String>,
    arity: usize,
    variadic: bool,
    prepare: PrepareFn,
}

impl HostFn {
    /// Wrap a free function or closure.
    pub fn new<F, Args, Ret>(name: &str, f: F) -> HostFn
    where
        F: IntoHostFn<Args, Ret>,
    {
        f.into_host_fn(name)
    }

    /// Wrap a callable whose first parameter is the receiver.
    ///
    /// The receiver is taken from the call's `this` value instead of the
    /// argument list, and does not count toward the script-visible arity.
    pub fn method<F, Args, Ret>(name: &str, f: F) -> HostFn
    where
        F: IntoHostFn<Args, Ret>,
    {
        f.into_host_fn(name).bind_receiver()
    }

    /// Wrap a constructor: the result is boxed into a fresh [`Handle`] and
    /// wrapped as a new object instance.
    pub fn constructor<F, Args, Ret>(name: &str, f: F) -> HostFn
    where
        F: IntoHostCtor<Args, Ret>,
    {
        f.into_host_ctor(name)
    }

    pub(crate) fn from_parts(
        name: &str,
        params: Vec<String>,
        variadic: bool,
        prepare: PrepareFn,
    ) -> HostFn {
        let arity = params.len() - usize::from(variadic);
        HostFn {
            name: name.to_string(),
            params,
            arity,
            variadic,
            prepare,
        }
    }

    /// Host-side name, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of non-injected, non-variadic parameters.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// True when the callable absorbs a variadic tail.
    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    /// True when `count` supplied arguments can satisfy this callable.
    pub fn accepts_arity(&self, count: usize) -> bool {
        if self.variadic {
            count >= self.arity
        } else {
            count == self.arity
        }
    }

    /// Render `exposed(param, ...)` for aggregated dispatch errors.
    pub fn signature(&self, exposed: &str) -> String {
        format!("{exposed}({})", self.params.join(", "))
    }

    pub(crate) fn prepare(
        &self,
        cx: &Ctx,
        this: Option<&Value>,
        args: &[Value],
    ) -> Result<Invoke, ConvertError> {
        (self.prepare)(cx, this, args)
    }

    /// Redirect the first declared parameter to the call's `this` value.
    fn bind_receiver(mut self) -> HostFn {
        debug_assert!(self.arity > 0, "a method needs a receiver parameter");
        let inner = self.prepare;
        self.arity -= 1;
        self.params.remove(0);
        self.prepare = Box::new(move |cx, this, args| {
            let receiver = this.cloned().unwrap_or(Value::Undefined);
            let mut merged = Vec::with_capacity(args.len() + 1);
            merged.push(receiver);
            merged.extend_from_slice(args);
            inner(cx, None, &merged).map_err(|err| match err {
                ConvertError::Argument { index: 1, source } => ConvertError::Receiver { source },
                ConvertError::Argument { index, source } => ConvertError::Argument {
                    index: index - 1,
                    source,
                },
                other => other,
            })
        });
        self
    }
}

impl std::fmt::Debug for HostFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFn")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("variadic", &self.variadic)
            .finish()
    }
}

/// Conversion of a Rust callable into a [`HostFn`].
///
/// Implemented for closures of up to six marshallable parameters; see the
/// module docs for the supported shapes.
pub trait IntoHostFn<Args, Ret> {
    fn into_host_fn(self, name: &str) -> HostFn;
}

/// Conversion of a Rust callable into a constructor [`HostFn`].
///
/// The callable returns the host instance by value; the glue boxes it into a
/// fresh [`Handle`] and wraps it as a new object.
pub trait IntoHostCtor<Args, Ret> {
    /// The constructed host type.
    type Host: HostType;

    fn into_host_ctor(self, name: &str) -> HostFn;
}

/// Convert one argument, labeling failures with its 1-based position.
pub(crate) fn arg_at<T: FromValue>(
    args: &[Value],
    index: usize,
    cx: &Ctx,
) -> Result<T, ConvertError> {
    let value = args.get(index).unwrap_or(&Value::Undefined);
    T::from_value(value, cx).map_err(|e| ConvertError::Argument {
        index: index + 1,
        source: Box::new(e),
    })
}

/// Convert the variadic tail starting at `from`.
pub(crate) fn tail_from<T: FromValue>(
    args: &[Value],
    from: usize,
    cx: &Ctx,
) -> Result<Rest<T>, ConvertError> {
    let mut tail = Vec::with_capacity(args.len().saturating_sub(from));
    for (offset, value) in args.iter().skip(from).enumerate() {
        let elem = T::from_value(value, cx).map_err(|e| ConvertError::Argument {
            index: from + offset + 1,
            source: Box::new(e),
        })?;
        tail.push(elem);
    }
    Ok(Rest(tail))
}

/// Translate a host-returned error into a [`ScriptError`].
///
/// A `ScriptError` passes through unchanged; anything else becomes a host
/// application error retaining the original for downcast.
pub(crate) fn wrap_host_error<E: Error + 'static>(err: E) -> ScriptError {
    let message = err.to_string();
    let any: Box<dyn Any> = Box::new(err);
    match any.downcast::<ScriptError>() {
        Ok(inner) => *inner,
        Err(any) => ScriptError::Host {
            message,
            source: any
                .downcast::<E>()
                .ok()
                .map(|boxed| Rc::new(*boxed) as Rc<dyn Error>),
        },
    }
}

macro_rules! impl_into_host_fn {
    ($(($($A:ident),*))+) => {
        $(impl_into_host_fn!(@arity $($A),*);)+
    };

    (@arity $($A:ident),*) => {
        impl<FN, $($A,)* R> IntoHostFn<($($A,)*), (RetVal, R)> for FN
        where
            FN: Fn($($A),*) -> R + 'static,
            $($A: FromValue + 'static,)*
            R: IntoValue + 'static,
        {
            #[allow(non_snake_case, unused_mut)]
            fn into_host_fn(self, name: &str) -> HostFn {
                let f = Rc::new(self);
                HostFn::from_parts(
                    name,
                    vec![$(display_type_name::<$A>()),*],
                    false,
                    Box::new(move |cx, _this, args| {
                        let mut __i = 0usize;
                        $(let $A: $A = arg_at::<$A>(args, { let k = __i; __i += 1; k }, cx)?;)*
                        let _ = __i;
                        let f = Rc::clone(&f);
                        let cx = cx.clone();
                        Ok(Box::new(move || {
                            f($($A),*).into_value(&cx).map_err(ScriptError::from)
                        }) as Invoke)
                    }),
                )
            }
        }

        impl<FN, $($A,)*> IntoHostFn<($($A,)*), RetUnit> for FN
        where
            FN: Fn($($A),*) + 'static,
            $($A: FromValue + 'static,)*
        {
            #[allow(non_snake_case, unused_mut)]
            fn into_host_fn(self, name: &str) -> HostFn {
                let f = Rc::new(self);
                HostFn::from_parts(
                    name,
                    vec![$(display_type_name::<$A>()),*],
                    false,
                    Box::new(move |cx, _this, args| {
                        let mut __i = 0usize;
                        $(let $A: $A = arg_at::<$A>(args, { let k = __i; __i += 1; k }, cx)?;)*
                        let _ = (__i, cx);
                        let f = Rc::clone(&f);
                        Ok(Box::new(move || {
                            f($($A),*);
                            Ok(Value::Undefined)
                        }) as Invoke)
                    }),
                )
            }
        }

        impl<FN, $($A,)* R, E> IntoHostFn<($($A,)*), (RetResult, R, E)> for FN
        where
            FN: Fn($($A),*) -> Result<R, E> + 'static,
            $($A: FromValue + 'static,)*
            R: IntoValue + 'static,
            E: Error + 'static,
        {
            #[allow(non_snake_case, unused_mut)]
            fn into_host_fn(self, name: &str) -> HostFn {
                let f = Rc::new(self);
                HostFn::from_parts(
                    name,
                    vec![$(display_type_name::<$A>()),*],
                    false,
                    Box::new(move |cx, _this, args| {
                        let mut __i = 0usize;
                        $(let $A: $A = arg_at::<$A>(args, { let k = __i; __i += 1; k }, cx)?;)*
                        let _ = __i;
                        let f = Rc::clone(&f);
                        let cx = cx.clone();
                        Ok(Box::new(move || match f($($A),*) {
                            Ok(out) => out.into_value(&cx).map_err(ScriptError::from),
                            Err(err) => Err(wrap_host_error(err)),
                        }) as Invoke)
                    }),
                )
            }
        }

        impl<FN, $($A,)* E> IntoHostFn<($($A,)*), (RetResultUnit, E)> for FN
        where
            FN: Fn($($A),*) -> Result<(), E> + 'static,
            $($A: FromValue + 'static,)*
            E: Error + 'static,
        {
            #[allow(non_snake_case, unused_mut)]
            fn into_host_fn(self, name: &str) -> HostFn {
                let f = Rc::new(self);
                HostFn::from_parts(
                    name,
                    vec![$(display_type_name::<$A>()),*],
                    false,
                    Box::new(move |cx, _this, args| {
                        let mut __i = 0usize;
                        $(let $A: $A = arg_at::<$A>(args, { let k = __i; __i += 1; k }, cx)?;)*
                        let _ = (__i, cx);
                        let f = Rc::clone(&f);
                        Ok(Box::new(move || match f($($A),*) {
                            Ok(()) => Ok(Value::Undefined),
                            Err(err) => Err(wrap_host_error(err)),
                        }) as Invoke)
                    }),
                )
            }
        }

        impl<FN, $($A,)* R> IntoHostFn<(Injected, $($A,)*), (RetVal, R)> for FN
        where
            FN: Fn(&Ctx, $($A),*) -> R + 'static,
            $($A: FromValue + 'static,)*
            R: IntoValue + 'static,
        {
            #[allow(non_snake_case, unused_mut)]
            fn into_host_fn(self, name: &str) -> HostFn {
                let f = Rc::new(self);
                HostFn::from_parts(
                    name,
                    vec![$(display_type_name::<$A>()),*],
                    false,
                    Box::new(move |cx, _this, args| {
                        let mut __i = 0usize;
                        $(let $A: $A = arg_at::<$A>(args, { let k = __i; __i += 1; k }, cx)?;)*
                        let _ = __i;
                        let f = Rc::clone(&f);
                        let cx = cx.clone();
                        Ok(Box::new(move || {
                            f(&cx, $($A),*).into_value(&cx).map_err(ScriptError::from)
                        }) as Invoke)
                    }),
                )
            }
        }

        impl<FN, $($A,)*> IntoHostFn<(Injected, $($A,)*), RetUnit> for FN
        where
            FN: Fn(&Ctx, $($A),*) + 'static,
            $($A: FromValue + 'static,)*
        {
            #[allow(non_snake_case, unused_mut)]
            fn into_host_fn(self, name: &str) -> HostFn {
                let f = Rc::new(self);
                HostFn::from_parts(
                    name,
                    vec![$(display_type_name::<$A>()),*],
                    false,
                    Box::new(move |cx, _this, args| {
                        let mut __i = 0usize;
                        $(let $A: $A = arg_at::<$A>(args, { let k = __i; __i += 1; k }, cx)?;)*
                        let _ = __i;
                        let f = Rc::clone(&f);
                        let cx = cx.clone();
                        Ok(Box::new(move || {
                            f(&cx, $($A),*);
                            Ok(Value::Undefined)
                        }) as Invoke)
                    }),
                )
            }
        }

        impl<FN, $($A,)* R, E> IntoHostFn<(Injected, $($A,)*), (RetResult, R, E)> for FN
        where
            FN: Fn(&Ctx, $($A),*) -> Result<R, E> + 'static,
            $($A: FromValue + 'static,)*
            R: IntoValue + 'static,
            E: Error + 'static,
        {
            #[allow(non_snake_case, unused_mut)]
            fn into_host_fn(self, name: &str) -> HostFn {
                let f = Rc::new(self);
                HostFn::from_parts(
                    name,
                    vec![$(display_type_name::<$A>()),*],
                    false,
                    Box::new(move |cx, _this, args| {
                        let mut __i = 0usize;
                        $(let $A: $A = arg_at::<$A>(args, { let k = __i; __i += 1; k }, cx)?;)*
                        let _ = __i;
                        let f = Rc::clone(&f);
                        let cx = cx.clone();
                        Ok(Box::new(move || match f(&cx, $($A),*) {
                            Ok(out) => out.into_value(&cx).map_err(ScriptError::from),
                            Err(err) => Err(wrap_host_error(err)),
                        }) as Invoke)
                    }),
                )
            }
        }

        impl<FN, $($A,)* E> IntoHostFn<(Injected, $($A,)*), (RetResultUnit, E)> for FN
        where
            FN: Fn(&Ctx, $($A),*) -> Result<(), E> + 'static,
            $($A: FromValue + 'static,)*
            E: Error + 'static,
        {
            #[allow(non_snake_case, unused_mut)]
            fn into_host_fn(self, name: &str) -> HostFn {
                let f = Rc::new(self);
                HostFn::from_parts(
                    name,
                    vec![$(display_type_name::<$A>()),*],
                    false,
                    Box::new(move |cx, _this, args| {
                        let mut __i = 0usize;
                        $(let $A: $A = arg_at::<$A>(args, { let k = __i; __i += 1; k }, cx)?;)*
                        let _ = __i;
                        let f = Rc::clone(&f);
                        let cx = cx.clone();
                        Ok(Box::new(move || match f(&cx, $($A),*) {
                            Ok(()) => Ok(Value::Undefined),
                            Err(err) => Err(wrap_host_error(err)),
                        }) as Invoke)
                    }),
                )
            }
        }

        impl<FN, $($A,)* R> IntoHostCtor<($($A,)*), (RetVal, R)> for FN
        where
            FN: Fn($($A),*) -> R + 'static,
            $($A: FromValue + 'static,)*
            R: HostType,
        {
            type Host = R;

            #[allow(non_snake_case, unused_mut)]
            fn into_host_ctor(self, name: &str) -> HostFn {
                let f = Rc::new(self);
                HostFn::from_parts(
                    name,
                    vec![$(display_type_name::<$A>()),*],
                    false,
                    Box::new(move |cx, _this, args| {
                        let mut __i = 0usize;
                        $(let $A: $A = arg_at::<$A>(args, { let k = __i; __i += 1; k }, cx)?;)*
                        let _ = __i;
                        let f = Rc::clone(&f);
                        let cx = cx.clone();
                        Ok(Box::new(move || {
                            Handle::new(f($($A),*))
                                .into_value(&cx)
                                .map_err(ScriptError::from)
                        }) as Invoke)
                    }),
                )
            }
        }

        impl<FN, $($A,)* R, E> IntoHostCtor<($($A,)*), (RetResult, R, E)> for FN
        where
            FN: Fn($($A),*) -> Result<R, E> + 'static,
            $($A: FromValue + 'static,)*
            R: HostType,
            E: Error + 'static,
        {
            type Host = R;

            #[allow(non_snake_case, unused_mut)]
            fn into_host_ctor(self, name: &str) -> HostFn {
                let f = Rc::new(self);
                HostFn::from_parts(
                    name,
                    vec![$(display_type_name::<$A>()),*],
                    false,
                    Box::new(move |cx, _this, args| {
                        let mut __i = 0usize;
                        $(let $A: $A = arg_at::<$A>(args, { let k = __i; __i += 1; k }, cx)?;)*
                        let _ = __i;
                        let f = Rc::clone(&f);
                        let cx = cx.clone();
                        Ok(Box::new(move || match f($($A),*) {
                            Ok(out) => Handle::new(out)
                                .into_value(&cx)
                                .map_err(ScriptError::from),
                            Err(err) => Err(wrap_host_error(err)),
                        }) as Invoke)
                    }),
                )
            }
        }

        impl<FN, $($A,)* R, E> IntoHostCtor<(Injected, $($A,)*), (RetResult, R, E)> for FN
        where
            FN: Fn(&Ctx, $($A),*) -> Result<R, E> + 'static,
            $($A: FromValue + 'static,)*
            R: HostType,
            E: Error + 'static,
        {
            type Host = R;

            #[allow(non_snake_case, unused_mut)]
            fn into_host_ctor(self, name: &str) -> HostFn {
                let f = Rc::new(self);
                HostFn::from_parts(
                    name,
                    vec![$(display_type_name::<$A>()),*],
                    false,
                    Box::new(move |cx, _this, args| {
                        let mut __i = 0usize;
                        $(let $A: $A = arg_at::<$A>(args, { let k = __i; __i += 1; k }, cx)?;)*
                        let _ = __i;
                        let f = Rc::clone(&f);
                        let cx = cx.clone();
                        Ok(Box::new(move || match f(&cx, $($A),*) {
                            Ok(out) => Handle::new(out)
                                .into_value(&cx)
                                .map_err(ScriptError::from),
                            Err(err) => Err(wrap_host_error(err)),
                        }) as Invoke)
                    }),
                )
            }
        }

        impl<FN, $($A,)* R> IntoHostCtor<(Injected, $($A,)*), (RetVal, R)> for FN
        where
            FN: Fn(&Ctx, $($A),*) -> R + 'static,
            $($A: FromValue + 'static,)*
            R: HostType,
        {
            type Host = R;

            #[allow(non_snake_case, unused_mut)]
            fn into_host_ctor(self, name: &str) -> HostFn {
                let f = Rc::new(self);
                HostFn::from_parts(
                    name,
                    vec![$(display_type_name::<$A>()),*],
                    false,
                    Box::new(move |cx, _this, args| {
                        let mut __i = 0usize;
                        $(let $A: $A = arg_at::<$A>(args, { let k = __i; __i += 1; k }, cx)?;)*
                        let _ = __i;
                        let f = Rc::clone(&f);
                        let cx = cx.clone();
                        Ok(Box::new(move || {
                            Handle::new(f(&cx, $($A),*))
                                .into_value(&cx)
                                .map_err(ScriptError::from)
                        }) as Invoke)
                    }),
                )
            }
        }
    };
}

impl_into_host_fn! {
    ()
    (A1)
    (A1, A2)
    (A1, A2, A3)
    (A1, A2, A3, A4)
    (A1, A2, A3, A4, A5)
    (A1, A2, A3, A4, A5, A6)
}

macro_rules! impl_into_host_fn_variadic {
    ($(($($A:ident),*))+) => {
        $(impl_into_host_fn_variadic!(@arity $($A),*);)+
    };

    (@arity $($A:ident),*) => {
        impl<FN, $($A,)* T, R> IntoHostFn<($($A,)* Rest<T>,), (RetVal, R)> for FN
        where
            FN: Fn($($A,)* Rest<T>) -> R + 'static,
            $($A: FromValue + 'static,)*
            T: FromValue + 'static,
            R: IntoValue + 'static,
        {
            #[allow(non_snake_case, unused_mut)]
            fn into_host_fn(self, name: &str) -> HostFn {
                let f = Rc::new(self);
                let mut params = vec![$(display_type_name::<$A>()),*];
                params.push(format!("{}...", display_type_name::<T>()));
                HostFn::from_parts(
                    name,
                    params,
                    true,
                    Box::new(move |cx, _this, args| {
                        let mut __i = 0usize;
                        $(let $A: $A = arg_at::<$A>(args, { let k = __i; __i += 1; k }, cx)?;)*
                        let tail: Rest<T> = tail_from(args, __i, cx)?;
                        let f = Rc::clone(&f);
                        let cx = cx.clone();
                        Ok(Box::new(move || {
                            f($($A,)* tail).into_value(&cx).map_err(ScriptError::from)
                        }) as Invoke)
                    }),
                )
            }
        }

        impl<FN, $($A,)* T, R, E> IntoHostFn<($($A,)* Rest<T>,), (RetResult, R, E)> for FN
        where
            FN: Fn($($A,)* Rest<T>) -> Result<R, E> + 'static,
            $($A: FromValue + 'static,)*
            T: FromValue + 'static,
            R: IntoValue + 'static,
            E: Error + 'static,
        {
            #[allow(non_snake_case, unused_mut)]
            fn into_host_fn(self, name: &str) -> HostFn {
                let f = Rc::new(self);
                let mut params = vec![$(display_type_name::<$A>()),*];
                params.push(format!("{}...", display_type_name::<T>()));
                HostFn::from_parts(
                    name,
                    params,
                    true,
                    Box::new(move |cx, _this, args| {
                        let mut __i = 0usize;
                        $(let $A: $A = arg_at::<$A>(args, { let k = __i; __i += 1; k }, cx)?;)*
                        let tail: Rest<T> = tail_from(args, __i, cx)?;
                        let f = Rc::clone(&f);
                        let cx = cx.clone();
                        Ok(Box::new(move || match f($($A,)* tail) {
                            Ok(out) => out.into_value(&cx).map_err(ScriptError::from),
                            Err(err) => Err(wrap_host_error(err)),
                        }) as Invoke)
                    }),
                )
            }
        }
    };
}

impl_into_host_fn_variadic! {
    ()
    (A1)
    (A1, A2)
    (A1, A2, A3)
}
