use crate::error::ValidationError;
use crate::field::Validated;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

pub(crate) type SubmitFn = Arc<dyn Fn(Value) -> Validated + Send + Sync>;
pub(crate) type FormValidateFn = Arc<dyn Fn(&Value) -> Validated + Send + Sync>;

/// Configuration of a [`Form`](crate::Form).
///
/// ```ignore
/// let options = FormOptions::default()
///     .name("signup")
///     .validate(|snapshot| {
///         if snapshot["password"] == snapshot["confirm"] { Ok(()) } else { Err("passwords differ") }
///     })
///     .on_submit_async(|snapshot| async move { api::register(snapshot).await });
/// ```
#[derive(Clone)]
pub struct FormOptions {
    pub(crate) name: Option<String>,
    pub(crate) on_submit: Option<SubmitFn>,
    pub(crate) validate: Option<FormValidateFn>,
    pub(crate) reset_on_submit: bool,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            name: None,
            on_submit: None,
            validate: None,
            reset_on_submit: true,
        }
    }
}

impl FormOptions {
    /// Name of the form, prefix of its cells and of its fields' names
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Called with the state snapshot once every check passed
    pub fn on_submit<F, E>(mut self, on_submit: F) -> Self
    where
        F: Fn(Value) -> Result<(), E> + Send + Sync + 'static,
        E: Into<ValidationError>,
    {
        self.on_submit = Some(Arc::new(move |snapshot: Value| Validated::from(on_submit(snapshot))));
        self
    }

    /// Asynchronous variant of [`on_submit`](Self::on_submit)
    pub fn on_submit_async<F, Fut, E>(mut self, on_submit: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<ValidationError>,
    {
        self.on_submit = Some(Arc::new(move |snapshot: Value| {
            Validated::pending(on_submit(snapshot))
        }));
        self
    }

    /// Cross-field check run before `on_submit`
    pub fn validate<F, E>(self, validate: F) -> Self
    where
        F: Fn(&Value) -> Result<(), E> + Send + Sync + 'static,
        E: Into<ValidationError>,
    {
        self.validate_with(move |snapshot| validate(snapshot).into())
    }

    /// Asynchronous variant of [`validate`](Self::validate)
    pub fn validate_async<F, Fut, E>(self, validate: F) -> Self
    where
        F: Fn(&Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<ValidationError>,
    {
        self.validate_with(move |snapshot| Validated::pending(validate(snapshot)))
    }

    /// Cross-field check answering now or later
    pub fn validate_with<F>(mut self, validate: F) -> Self
    where
        F: Fn(&Value) -> Validated + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }

    /// Reset all fields after a successful submit (default true)
    pub fn reset_on_submit(mut self, enabled: bool) -> Self {
        self.reset_on_submit = enabled;
        self
    }
}

impl std::fmt::Debug for FormOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormOptions")
            .field("name", &self.name)
            .field("on_submit", &self.on_submit.is_some())
            .field("validate", &self.validate.is_some())
            .field("reset_on_submit", &self.reset_on_submit)
            .finish()
    }
}
