//! Handler system for the tidings dispatcher.
//!
//! Handlers are plain async functions or closures. The [`Handler`] trait is
//! implemented for them through blanket implementations over their arity,
//! similar to Axum's handler system:
//!
//! ```rust,ignore
//! async fn on_text(text: String) {
//!     println!("got {text}");
//! }
//!
//! async fn on_count(n: i64) -> Result<(), String> {
//!     if n < 0 { Err("negative".into()) } else { Ok(()) }
//! }
//!
//! dispatcher.subscribe(on_text)?;
//! dispatcher.subscribe(on_count)?;
//! ```
//!
//! Only single-parameter handlers can be dispatched to. Handlers of any other
//! arity still implement [`Handler`] so that the mistake is reported as a
//! [`ValidationError::WrongArity`] at subscription time instead of vanishing
//! into a trait-bound error far away from the call site.
//!
//! # Identity
//!
//! Every handler has a [`HandlerId`] derived from its concrete type, not from
//! its captured state. Two clones of one closure share an identity; two
//! distinct closures or functions never do. Function *pointers* of the same
//! signature all share one type and therefore alias each other.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{HandlerFailure, ValidationError};

/// A type alias for a boxed, pinned future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A published value, shared by every invocation it fans out to.
pub type Payload = Arc<dyn Any + Send + Sync>;

// ============================================================================
// Type descriptors
// ============================================================================

/// Exact runtime type descriptor of a published value or handler parameter.
///
/// Equality is [`TypeId`] equality; the name is carried for diagnostics only.
#[derive(Debug, Clone, Copy)]
pub struct ParamType {
    id: TypeId,
    name: &'static str,
}

impl ParamType {
    /// Returns the descriptor of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Returns the underlying [`TypeId`].
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the type name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ParamType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ParamType {}

impl Hash for ParamType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Identity token of a handler, used to remove its registrations.
#[derive(Debug, Clone, Copy)]
pub struct HandlerId {
    id: TypeId,
    name: &'static str,
}

impl HandlerId {
    /// Returns the identity of handler type `H`.
    pub fn of<H: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<H>(),
            name: type_name::<H>(),
        }
    }

    /// Returns the identity of the given handler value.
    pub fn of_val<H: ?Sized + 'static>(_handler: &H) -> Self {
        Self::of::<H>()
    }

    /// Returns the handler's type name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for HandlerId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for HandlerId {}

impl Hash for HandlerId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ============================================================================
// HandlerOutput - Handle handler return values
// ============================================================================

/// A trait for values handlers may return.
pub trait HandlerOutput: Send {
    /// Converts the return value into an invocation outcome.
    fn into_outcome(self) -> Result<(), HandlerFailure>;
}

impl HandlerOutput for () {
    fn into_outcome(self) -> Result<(), HandlerFailure> {
        Ok(())
    }
}

/// On `Err`, the error's display text becomes a [`HandlerFailure::Returned`].
impl<T: HandlerOutput, E: fmt::Display + Send> HandlerOutput for Result<T, E> {
    fn into_outcome(self) -> Result<(), HandlerFailure> {
        match self {
            Ok(t) => t.into_outcome(),
            Err(e) => Err(HandlerFailure::Returned(e.to_string())),
        }
    }
}

impl<T: HandlerOutput> HandlerOutput for Option<T> {
    fn into_outcome(self) -> Result<(), HandlerFailure> {
        match self {
            Some(t) => t.into_outcome(),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// The core trait for subscribers of the dispatcher.
///
/// Implemented automatically for async functions and closures taking 0-4
/// parameters and returning a [`HandlerOutput`]. Only the single-parameter
/// implementation yields an [`ErasedHandler`]; the others exist so that
/// subscription can reject them with a [`ValidationError`].
pub trait Handler<Args>: Clone + Send + Sync + 'static {
    /// Number of parameters the handler declares.
    const ARITY: usize;

    /// Descriptors of the declared parameters, in order.
    fn parameters() -> Vec<ParamType>;

    /// Converts the handler into its type-erased form, if it can be dispatched to.
    fn into_erased(self) -> Option<BoxedHandler>;
}

/// A type-erased handler that can be stored in collections.
pub type BoxedHandler = Arc<dyn ErasedHandler>;

/// Type-erased handler trait for dynamic dispatch.
pub trait ErasedHandler: Send + Sync {
    /// Invokes the handler with a payload of the given runtime type.
    fn call(&self, payload: Payload, value_type: ParamType)
    -> BoxFuture<'static, Result<(), HandlerFailure>>;
}

/// Wraps a single-parameter handler function behind [`ErasedHandler`].
pub struct HandlerFn<F, T> {
    f: F,
    _marker: PhantomData<fn() -> T>,
}

impl<F, T> HandlerFn<F, T> {
    /// Creates a new handler function wrapper.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F, Fut, Res, T1> ErasedHandler for HandlerFn<F, (T1,)>
where
    F: FnOnce(T1) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Res> + Send + 'static,
    Res: HandlerOutput + 'static,
    T1: Clone + Send + Sync + 'static,
{
    fn call(
        &self,
        payload: Payload,
        value_type: ParamType,
    ) -> BoxFuture<'static, Result<(), HandlerFailure>> {
        let f = self.f.clone();
        Box::pin(async move {
            let Some(value) = (*payload).downcast_ref::<T1>().cloned() else {
                return Err(HandlerFailure::TypeMismatch {
                    expected: type_name::<T1>(),
                    found: value_type.name(),
                });
            };
            f(value).await.into_outcome()
        })
    }
}

impl<F, Fut, Res, T1> Handler<(T1,)> for F
where
    F: FnOnce(T1) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Res> + Send + 'static,
    Res: HandlerOutput + 'static,
    T1: Clone + Send + Sync + 'static,
{
    const ARITY: usize = 1;

    fn parameters() -> Vec<ParamType> {
        vec![ParamType::of::<T1>()]
    }

    fn into_erased(self) -> Option<BoxedHandler> {
        Some(Arc::new(HandlerFn::<F, (T1,)>::new(self)))
    }
}

/// Generates [`Handler`] implementations for arities that cannot be dispatched to.
macro_rules! impl_undispatchable_handler {
    (
        $arity:literal; $($ty:ident),*
    ) => {
        impl<F, Fut, Res, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Res> + Send + 'static,
            Res: HandlerOutput + 'static,
            $( $ty: 'static, )*
        {
            const ARITY: usize = $arity;

            fn parameters() -> Vec<ParamType> {
                vec![$(ParamType::of::<$ty>()),*]
            }

            fn into_erased(self) -> Option<BoxedHandler> {
                None
            }
        }
    };
}

impl_undispatchable_handler!(0;);
impl_undispatchable_handler!(2; T1, T2);
impl_undispatchable_handler!(3; T1, T2, T3);
impl_undispatchable_handler!(4; T1, T2, T3, T4);

// ============================================================================
// Subscriber - an unvalidated registration
// ============================================================================

/// A type-erased registration that has not been validated yet.
///
/// Built from any [`Handler`], regardless of arity. Useful when handlers are
/// collected from heterogeneous sources (for example a `Vec<Box<dyn Any + Send>>`
/// plugin table) and registered later through
/// [`Dispatcher::subscribe_any`](crate::Dispatcher::subscribe_any).
pub struct Subscriber {
    id: HandlerId,
    arity: usize,
    parameters: Vec<ParamType>,
    erased: Option<BoxedHandler>,
}

impl Subscriber {
    /// Captures a handler for later registration.
    pub fn new<H, Args>(handler: H) -> Self
    where
        H: Handler<Args>,
    {
        Self {
            id: HandlerId::of::<H>(),
            arity: H::ARITY,
            parameters: H::parameters(),
            erased: handler.into_erased(),
        }
    }

    /// Returns the identity token of the wrapped handler.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Returns the number of parameters the wrapped handler declares.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Returns the declared parameter types.
    pub fn parameters(&self) -> &[ParamType] {
        &self.parameters
    }

    /// Checks the registration contract and splits it into its parts.
    pub(crate) fn validate(self) -> Result<(HandlerId, ParamType, BoxedHandler), ValidationError> {
        let wrong_arity = ValidationError::WrongArity {
            handler: self.id.name(),
            found: self.arity,
        };
        if self.arity != 1 {
            return Err(wrong_arity);
        }
        match (self.parameters.first().copied(), self.erased) {
            (Some(parameter), Some(erased)) => Ok((self.id, parameter, erased)),
            _ => Err(wrong_arity),
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("arity", &self.arity)
            .field("parameters", &self.parameters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn takes_string(_s: String) {}

    async fn takes_i64(_n: i64) {}

    async fn takes_nothing() {}

    async fn takes_two(_a: String, _b: i64) {}

    fn payload<T: Any + Send + Sync>(value: T) -> (Payload, ParamType) {
        (Arc::new(value), ParamType::of::<T>())
    }

    #[test]
    fn test_arity_is_reported() {
        assert_eq!(Subscriber::new(takes_nothing).arity(), 0);
        assert_eq!(Subscriber::new(takes_string).arity(), 1);
        assert_eq!(Subscriber::new(takes_two).arity(), 2);
        assert_eq!(
            Subscriber::new(|_: u8, _: u8, _: u8| async {}).arity(),
            3
        );
    }

    #[test]
    fn test_parameters_are_exact_types() {
        let sub = Subscriber::new(takes_i64);
        assert_eq!(sub.parameters(), &[ParamType::of::<i64>()]);
        assert_ne!(sub.parameters()[0], ParamType::of::<i32>());
        assert_ne!(sub.parameters()[0], ParamType::of::<u64>());
    }

    #[test]
    fn test_validation_rejects_other_arities() {
        assert!(matches!(
            Subscriber::new(takes_nothing).validate(),
            Err(ValidationError::WrongArity { found: 0, .. })
        ));
        assert!(matches!(
            Subscriber::new(takes_two).validate(),
            Err(ValidationError::WrongArity { found: 2, .. })
        ));

        assert!(Subscriber::new(takes_string).validate().is_ok());
    }

    #[test]
    fn test_identity_follows_type_not_state() {
        let make = |tag: u32| {
            move |_: String| async move {
                let _ = tag;
            }
        };
        let a = make(1);
        let b = make(2);
        assert_eq!(HandlerId::of_val(&a), HandlerId::of_val(&b));

        let other = |_: String| async {};
        assert_ne!(HandlerId::of_val(&a), HandlerId::of_val(&other));
        assert_ne!(HandlerId::of_val(&takes_string), HandlerId::of_val(&takes_i64));
    }

    #[tokio::test]
    async fn test_erased_call_delivers_value() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handler = move |s: String| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(s);
            }
        };
        let erased = handler.into_erased().unwrap();
        let (value, value_type) = payload(String::from("hello"));
        assert_eq!(erased.call(value, value_type).await, Ok(()));
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_erased_call_reports_returned_error() {
        let erased = (|n: i64| async move {
            if n < 0 {
                Err(format!("negative: {n}"))
            } else {
                Ok(())
            }
        })
        .into_erased()
        .unwrap();

        let (value, value_type) = payload(-3_i64);
        assert_eq!(
            erased.call(value, value_type).await,
            Err(HandlerFailure::Returned("negative: -3".into()))
        );
        let (value, value_type) = payload(3_i64);
        assert_eq!(erased.call(value, value_type).await, Ok(()));
    }

    #[tokio::test]
    async fn test_erased_call_rejects_foreign_payload() {
        let erased = takes_i64.into_erased().unwrap();
        let (value, value_type) = payload(7_i32);
        let err = erased.call(value, value_type).await.unwrap_err();
        assert!(matches!(
            err,
            HandlerFailure::TypeMismatch { expected: "i64", found: "i32" }
        ));
    }

    #[test]
    fn test_option_output() {
        assert_eq!(None::<()>.into_outcome(), Ok(()));
        assert_eq!(
            Some(Err::<(), _>("boom")).into_outcome(),
            Err(HandlerFailure::Returned("boom".into()))
        );
    }
}
