use super::validation::{FieldContext, Validated};
use crate::error::ValidationError;
use crate::executor::{Executor, SharedExecutor};
use std::future::Future;
use std::sync::Arc;

pub(crate) type FromState<S, V> = Arc<dyn Fn(&S) -> V + Send + Sync>;
pub(crate) type ToState<S, V> = Arc<dyn Fn(&V) -> S + Send + Sync>;
pub(crate) type Compare<V> = Arc<dyn Fn(&V, &V) -> bool + Send + Sync>;
pub(crate) type Contract<S> = Arc<dyn Fn(&S) -> Result<(), ValidationError> + Send + Sync>;
pub(crate) type Validator<S, V> = Arc<dyn Fn(FieldContext<S, V>) -> Validated + Send + Sync>;

/// Configuration of a [`Field`](crate::Field).
///
/// `S` is the stored state, `V` the value projected from it. With the
/// default options both are the same type and the projection is the
/// identity:
///
/// ```ignore
/// let email = Field::new(
///     String::new(),
///     FieldOptions::default()
///         .name("email")
///         .contract(|s: &String| if s.is_empty() { Err("required") } else { Ok(()) })
///         .validate_on_blur(true),
/// );
/// ```
///
/// A projected field stores one type and exposes another:
///
/// ```ignore
/// let age = Field::new(
///     "42".to_string(),
///     FieldOptions::projected(|s: &String| s.parse::<u32>().ok(), |v: &Option<u32>| {
///         v.map(|n| n.to_string()).unwrap_or_default()
///     }),
/// );
/// ```
pub struct FieldOptions<S, V = S> {
    pub(crate) name: Option<String>,
    pub(crate) from_state: FromState<S, V>,
    pub(crate) to_state: ToState<S, V>,
    pub(crate) filter: Option<Compare<V>>,
    pub(crate) is_dirty: Compare<V>,
    pub(crate) contract: Option<Contract<S>>,
    pub(crate) validator: Option<Validator<S, V>>,
    pub(crate) validate_on_change: bool,
    pub(crate) validate_on_blur: bool,
    pub(crate) keep_error_during_validating: bool,
    pub(crate) keep_error_on_change: Option<bool>,
    pub(crate) executor: Option<SharedExecutor>,
}

impl<S: Clone + PartialEq + Send + Sync + 'static> Default for FieldOptions<S, S> {
    fn default() -> Self {
        Self::projected(S::clone, S::clone)
    }
}

impl<S, V> FieldOptions<S, V>
where
    S: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Options for a field whose value is a projection of its state
    pub fn projected<F, T>(from_state: F, to_state: T) -> Self
    where
        F: Fn(&S) -> V + Send + Sync + 'static,
        T: Fn(&V) -> S + Send + Sync + 'static,
    {
        Self {
            name: None,
            from_state: Arc::new(from_state),
            to_state: Arc::new(to_state),
            filter: None,
            is_dirty: Arc::new(|value: &V, init: &V| value != init),
            contract: None,
            validator: None,
            validate_on_change: false,
            validate_on_blur: false,
            keep_error_during_validating: false,
            keep_error_on_change: None,
            executor: None,
        }
    }

    /// Name of the field and prefix of its cells
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Accept or reject a change: `filter(new_value, previous_value)`
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&V, &V) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Decide dirtiness: `is_dirty(value, init_value)`; defaults to `!=`
    pub fn is_dirty<F>(mut self, is_dirty: F) -> Self
    where
        F: Fn(&V, &V) -> bool + Send + Sync + 'static,
    {
        self.is_dirty = Arc::new(is_dirty);
        self
    }

    /// Fast synchronous check of the raw state
    ///
    /// A failing contract becomes the field error right away and the
    /// validator is skipped. The parsed output, if any, is discarded.
    pub fn contract<F, O, E>(mut self, contract: F) -> Self
    where
        F: Fn(&S) -> Result<O, E> + Send + Sync + 'static,
        E: Into<ValidationError>,
    {
        self.contract = Some(Arc::new(move |state: &S| {
            contract(state).map(drop).map_err(Into::into)
        }));
        self
    }

    /// Synchronous validator
    pub fn validate<F, E>(self, validate: F) -> Self
    where
        F: Fn(FieldContext<S, V>) -> Result<(), E> + Send + Sync + 'static,
        E: Into<ValidationError>,
    {
        self.validate_with(move |ctx| validate(ctx).into())
    }

    /// Asynchronous validator
    ///
    /// The returned future runs on the field's executor; its result is
    /// committed only if no newer validation, change or reset happened in
    /// the meantime.
    pub fn validate_async<F, Fut, E>(self, validate: F) -> Self
    where
        F: Fn(FieldContext<S, V>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<ValidationError>,
    {
        self.validate_with(move |ctx| Validated::pending(validate(ctx)))
    }

    /// Validator that decides per call whether to answer now or later
    pub fn validate_with<F>(mut self, validate: F) -> Self
    where
        F: Fn(FieldContext<S, V>) -> Validated + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validate));
        self
    }

    /// Trigger validation after every accepted change
    pub fn validate_on_change(mut self, enabled: bool) -> Self {
        self.validate_on_change = enabled;
        self
    }

    /// Trigger validation when the field loses focus
    pub fn validate_on_blur(mut self, enabled: bool) -> Self {
        self.validate_on_blur = enabled;
        self
    }

    /// Keep the previous error visible while an async validation runs
    pub fn keep_error_during_validating(mut self, enabled: bool) -> Self {
        self.keep_error_during_validating = enabled;
        self
    }

    /// Keep the error (but not `triggered`) when the value changes
    ///
    /// Defaults to the `validate_on_change` setting.
    pub fn keep_error_on_change(mut self, enabled: bool) -> Self {
        self.keep_error_on_change = Some(enabled);
        self
    }

    /// Executor driving pending validator futures
    pub fn executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }
}

impl<S, V> FieldOptions<S, V> {
    pub(crate) fn has_validation(&self) -> bool {
        self.contract.is_some() || self.validator.is_some()
    }

    pub(crate) fn keeps_error_on_change(&self) -> bool {
        self.keep_error_on_change.unwrap_or(self.validate_on_change)
    }
}

impl<S, V> Clone for FieldOptions<S, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            from_state: self.from_state.clone(),
            to_state: self.to_state.clone(),
            filter: self.filter.clone(),
            is_dirty: self.is_dirty.clone(),
            contract: self.contract.clone(),
            validator: self.validator.clone(),
            validate_on_change: self.validate_on_change,
            validate_on_blur: self.validate_on_blur,
            keep_error_during_validating: self.keep_error_during_validating,
            keep_error_on_change: self.keep_error_on_change,
            executor: self.executor.clone(),
        }
    }
}

impl<S, V> std::fmt::Debug for FieldOptions<S, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldOptions")
            .field("name", &self.name)
            .field("contract", &self.contract.is_some())
            .field("validator", &self.validator.is_some())
            .field("validate_on_change", &self.validate_on_change)
            .field("validate_on_blur", &self.validate_on_blur)
            .field(
                "keep_error_during_validating",
                &self.keep_error_during_validating,
            )
            .field("keep_error_on_change", &self.keeps_error_on_change())
            .finish_non_exhaustive()
    }
}
