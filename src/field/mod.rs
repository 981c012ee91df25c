//! Field engine
//!
//! A [`Field`] is one input's worth of reactive state:
//!
//! - `state`: the raw stored value (atom)
//! - `init_state`: dirty baseline and reset target (atom)
//! - `value`: projection of `state` through `from_state` (computed)
//! - `focus`: active/touched from interaction, dirty derived (computed)
//! - `validation`: error/triggered/validating (atom, written by actions)
//!
//! All writes go through named actions, so observers only ever see the
//! state after a whole operation. Async validation results are guarded by
//! a [`ValidationTicket`]: only the latest run may commit.

mod options;
mod status;
mod validation;

pub use options::FieldOptions;
pub use status::{FieldFocus, FieldValidation};
pub(crate) use status::Interaction;
pub use validation::{FieldContext, Validated, ValidationTicket};

use crate::atom::Atom;
use crate::computed::Computed;
use crate::error::{FormError, ValidationError};
use crate::executor::{DefaultExecutor, Executor, SharedExecutor};
use crate::names::auto_name;
use crate::observer::Reactive;
use crate::transaction::action;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use validation::TicketCounter;

/// Process-unique identity of a field, stable across clones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(u64);

static NEXT_FIELD_ID: AtomicU64 = AtomicU64::new(1);

impl FieldId {
    fn next() -> Self {
        Self(NEXT_FIELD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Reactive state of one form input.
///
/// Cloning yields another handle to the same field.
///
/// # Example
/// ```ignore
/// let name = Field::new(String::new(), FieldOptions::default().name("name"));
///
/// name.focus_in();
/// name.change("Ada".to_string());
/// name.focus_out();
///
/// assert!(name.focus().dirty);
/// assert!(name.focus().touched);
///
/// name.reset();
/// assert_eq!(name.state(), "");
/// ```
pub struct Field<S, V = S> {
    inner: Arc<FieldInner<S, V>>,
}

struct FieldInner<S, V> {
    id: FieldId,
    name: Arc<str>,
    state: Atom<S>,
    init_state: Atom<S>,
    value: Computed<V>,
    init_value: Computed<V>,
    interaction: Atom<Interaction>,
    focus: Computed<FieldFocus>,
    validation: Atom<FieldValidation>,
    initial_validation: FieldValidation,
    tickets: TicketCounter,
    executor: SharedExecutor,
    options: FieldOptions<S, V>,
}

impl<S, V> Clone for Field<S, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, V> Field<S, V>
where
    S: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Build a field starting (and resetting) to `init_state`
    pub fn new(init_state: S, options: FieldOptions<S, V>) -> Self {
        let name: Arc<str> = match &options.name {
            Some(name) => name.as_str().into(),
            None => auto_name("field").into(),
        };

        let state = Atom::new(init_state.clone(), format!("{name}.state"));
        let init_state = Atom::new(init_state, format!("{name}.initState"));

        let value = Computed::new(format!("{name}.value"), {
            let state = state.clone();
            let from_state = options.from_state.clone();
            move |_| state.with(|s| from_state(s))
        });
        let init_value = Computed::new(format!("{name}.initValue"), {
            let init_state = init_state.clone();
            let from_state = options.from_state.clone();
            move |_| init_state.with(|s| from_state(s))
        });

        let interaction = Atom::new(Interaction::default(), format!("{name}.interaction"));
        let focus = Computed::new(format!("{name}.focus"), {
            let interaction = interaction.clone();
            let value = value.clone();
            let init_value = init_value.clone();
            let is_dirty = options.is_dirty.clone();
            move |_| {
                let dirty = value.with(|v| init_value.with(|init| is_dirty(v, init)));
                interaction.get().with_dirty(dirty)
            }
        });

        let initial_validation = if options.has_validation() {
            FieldValidation::INITIAL
        } else {
            FieldValidation::VALIDATION_LESS
        };
        let validation = Atom::new(initial_validation.clone(), format!("{name}.validation"));

        let executor = options
            .executor
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultExecutor) as SharedExecutor);

        Self {
            inner: Arc::new(FieldInner {
                id: FieldId::next(),
                name,
                state,
                init_state,
                value,
                init_value,
                interaction,
                focus,
                validation,
                initial_validation,
                tickets: TicketCounter::default(),
                executor,
                options,
            }),
        }
    }

    /// Identity shared by every clone of this field
    pub fn id(&self) -> FieldId {
        self.inner.id
    }

    /// Name of the field, prefix of its cell names
    pub fn name(&self) -> Arc<str> {
        self.inner.name.clone()
    }

    /// Raw state (tracked)
    pub fn state(&self) -> S {
        self.inner.state.get()
    }

    /// Baseline state (tracked)
    pub fn init_state(&self) -> S {
        self.inner.init_state.get()
    }

    /// Projected value (tracked)
    pub fn value(&self) -> V {
        self.inner.value.get()
    }

    /// Projected baseline value (tracked)
    pub fn init_value(&self) -> V {
        self.inner.init_value.get()
    }

    /// Focus record (tracked)
    pub fn focus(&self) -> FieldFocus {
        self.inner.focus.get()
    }

    /// Validation record (tracked)
    pub fn validation(&self) -> FieldValidation {
        self.inner.validation.get()
    }

    /// Read-only view of the raw state
    ///
    /// Writes go through [`change`](Self::change) or
    /// [`set_state`](Self::set_state) so validation stays in step.
    pub fn state_cell(&self) -> &impl Reactive<S> {
        &self.inner.state
    }

    /// The baseline cell; writes to it keep `focus.dirty` current
    pub fn init_state_cell(&self) -> &Atom<S> {
        &self.inner.init_state
    }

    /// The projected value cell
    pub fn value_cell(&self) -> &Computed<V> {
        &self.inner.value
    }

    /// The focus cell
    pub fn focus_cell(&self) -> &Computed<FieldFocus> {
        &self.inner.focus
    }

    /// Read-only view of the validation record
    pub fn validation_cell(&self) -> &impl Reactive<FieldValidation> {
        &self.inner.validation
    }

    /// Apply a user edit and return the resulting value
    ///
    /// A change rejected by the filter leaves everything untouched and
    /// returns the previous value.
    pub fn change(&self, new_value: V) -> V {
        let inner = &self.inner;
        action(&format!("{}.change", inner.name), || {
            let previous = inner.value.get();
            if let Some(filter) = &inner.options.filter {
                if !filter(&new_value, &previous) {
                    return previous;
                }
            }
            inner.write_state((inner.options.to_state)(&new_value));
            inner.interaction.update(|i| i.touched = true);
            inner.value.get()
        })
    }

    /// Overwrite the raw state
    ///
    /// Goes through the same validation bookkeeping as [`change`](Self::change)
    /// but bypasses the filter and does not mark the field touched.
    pub fn set_state(&self, state: S) {
        let inner = &self.inner;
        action(&format!("{}.setState", inner.name), || inner.write_state(state));
    }

    /// Overwrite the baseline used for dirtiness and reset
    pub fn set_init_state(&self, init_state: S) {
        let inner = &self.inner;
        action(&format!("{}.initState", inner.name), || {
            inner.init_state.set(init_state)
        });
    }

    /// Mark the field active
    pub fn focus_in(&self) {
        let inner = &self.inner;
        action(&format!("{}.focus.in", inner.name), || {
            inner.interaction.update(|i| i.active = true);
        });
    }

    /// Blur: marks the field touched and, if configured, validates it
    pub fn focus_out(&self) {
        let inner = &self.inner;
        action(&format!("{}.focus.out", inner.name), || {
            inner.interaction.set(Interaction {
                active: false,
                touched: true,
            });
            if inner.options.validate_on_blur {
                inner.trigger();
            }
        });
    }

    /// Validate the current value, see [`FieldValidation`]
    ///
    /// A no-op returning the current record if it is already triggered.
    pub fn trigger(&self) -> FieldValidation {
        let inner = &self.inner;
        action(&format!("{}.validation.trigger", inner.name), || {
            inner.trigger()
        })
    }

    /// Restore `state`, focus and validation; cancels a running validation
    pub fn reset(&self) {
        let inner = &self.inner;
        action(&format!("{}.reset", inner.name), || inner.reset());
    }

    /// Re-hydrate from loaded data
    ///
    /// Writes the baseline. A pristine field (neither touched nor dirty)
    /// also takes the new state; fields with user edits keep them.
    pub fn hydrate(&self, init_state: S) {
        let inner = &self.inner;
        action(&format!("{}.hydrate", inner.name), || {
            let focus = inner.focus.get();
            let pristine = !focus.touched && !focus.dirty;
            inner.init_state.set(init_state.clone());
            if pristine {
                inner.write_state(init_state);
            }
        });
    }
}

impl<S, V> FieldInner<S, V>
where
    S: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// State write plus the bookkeeping every change implies
    ///
    /// Writing the current state again is not a change and leaves
    /// validation alone.
    fn write_state(self: &Arc<Self>, state: S) {
        if !self.state.set_if_changed(state) {
            return;
        }

        if self.options.keeps_error_on_change() {
            if self.options.has_validation() {
                self.cancel("change");
                self.validation.update(|v| {
                    v.triggered = false;
                    v.validating = false;
                });
            }
        } else {
            self.cancel("change");
            self.validation.set(self.initial_validation.clone());
        }

        if self.options.validate_on_change {
            self.trigger();
        }
    }

    fn cancel(&self, reason: &'static str) {
        if self.validation.with(|v| v.validating) {
            tracing::debug!(field = %self.name, reason, "cancelling pending validation");
        }
        self.tickets.cancel();
    }

    fn reset(&self) {
        self.cancel("reset");
        self.state.set(self.init_state.get());
        self.interaction.set(Interaction::default());
        self.validation.set(self.initial_validation.clone());
    }

    fn trigger(self: &Arc<Self>) -> FieldValidation {
        let current = self.validation.get();
        if current.triggered {
            return current;
        }
        if !self.options.has_validation() {
            let next = FieldValidation {
                triggered: true,
                ..current
            };
            self.validation.set(next.clone());
            return next;
        }

        let ticket = self.tickets.issue();
        let state = self.state.get();
        let contract = self
            .options
            .contract
            .as_ref()
            .map_or(Ok(()), |contract| contract(&state));

        let outcome = match (contract, &self.options.validator) {
            (Err(err), _) => Validated::Ready(Err(err)),
            (Ok(()), None) => Validated::ok(),
            (Ok(()), Some(validator)) => validator(FieldContext {
                state,
                value: self.value.get(),
                focus: self.focus.get(),
                validation: current.clone(),
            }),
        };

        match outcome {
            Validated::Ready(result) => {
                let next = FieldValidation {
                    error: result.err().map(|err| err.message().to_owned()),
                    triggered: true,
                    validating: false,
                };
                self.validation.set(next.clone());
                next
            }
            Validated::Pending(future) => {
                let next = FieldValidation {
                    error: if self.options.keep_error_during_validating {
                        current.error
                    } else {
                        None
                    },
                    triggered: true,
                    validating: true,
                };
                self.validation.set(next.clone());

                let field = Arc::downgrade(self);
                self.executor.spawn(Box::pin(async move {
                    let result = future.await;
                    settle(field, ticket, result);
                }));
                next
            }
        }
    }
}

/// Commit the result of a pending validation if its ticket is still current
fn settle<S, V>(
    field: Weak<FieldInner<S, V>>,
    ticket: ValidationTicket,
    result: Result<(), ValidationError>,
) where
    S: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    let Some(field) = field.upgrade() else {
        return;
    };
    let committed = action(&format!("{}.validation.settle", field.name), || {
        // Held until the write is done so a concurrent cancel cannot slip in.
        let Some(_claim) = field.tickets.claim(ticket) else {
            return false;
        };
        field.validation.set(FieldValidation {
            error: result.err().map(|err| err.message().to_owned()),
            triggered: true,
            validating: false,
        });
        true
    });
    if !committed {
        cov_mark::hit!(stale_validation_discarded);
        tracing::debug!(
            field = %field.name,
            ticket = ticket.generation(),
            "discarding stale validation result"
        );
    }
}

impl<S, V> std::fmt::Debug for Field<S, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

/// Type-erased view of a field, as stored in a form.
///
/// Implemented by every [`Field`] whose state can be (de)serialized. Reads
/// are tracked like the typed accessors.
pub trait FormField: Send + Sync + 'static {
    /// See [`Field::id`]
    fn id(&self) -> FieldId;

    /// See [`Field::name`]
    fn name(&self) -> Arc<str>;

    /// See [`Field::focus`]
    fn focus(&self) -> FieldFocus;

    /// See [`Field::validation`]
    fn validation(&self) -> FieldValidation;

    /// See [`Field::focus_in`]
    fn focus_in(&self);

    /// See [`Field::focus_out`]
    fn focus_out(&self);

    /// See [`Field::trigger`]
    fn trigger(&self) -> FieldValidation;

    /// See [`Field::reset`]
    fn reset(&self);

    /// Raw state as JSON
    fn state_json(&self) -> Result<serde_json::Value, FormError>;

    /// User edit given as a JSON state
    ///
    /// The state is projected to a value and applied like
    /// [`Field::change`], filter included. Fails without writing anything
    /// if the JSON does not fit the state type.
    fn change_json(&self, state: serde_json::Value) -> Result<(), FormError>;

    /// Overwrite the baseline from JSON, see [`Field::set_init_state`]
    fn set_init_state_json(&self, init_state: serde_json::Value) -> Result<(), FormError>;

    /// Deserialize `init_state` now, hydrate later
    ///
    /// Splitting the two lets a caller validate a whole batch before
    /// writing any of it.
    fn prepare_init(
        &self,
        init_state: serde_json::Value,
    ) -> Result<Box<dyn FnOnce() + Send>, FormError>;

    /// Downcast support for typed access
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a type-erased field
pub type FieldRef = Arc<dyn FormField>;

impl<S, V> FormField for Field<S, V>
where
    S: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn id(&self) -> FieldId {
        Field::id(self)
    }

    fn name(&self) -> Arc<str> {
        Field::name(self)
    }

    fn focus(&self) -> FieldFocus {
        Field::focus(self)
    }

    fn validation(&self) -> FieldValidation {
        Field::validation(self)
    }

    fn focus_in(&self) {
        Field::focus_in(self)
    }

    fn focus_out(&self) {
        Field::focus_out(self)
    }

    fn trigger(&self) -> FieldValidation {
        Field::trigger(self)
    }

    fn reset(&self) {
        Field::reset(self)
    }

    fn change_json(&self, state: serde_json::Value) -> Result<(), FormError> {
        let state: S = serde_json::from_value(state).map_err(|source| FormError::State {
            field: self.inner.name.to_string(),
            source,
        })?;
        Field::change(self, (self.inner.options.from_state)(&state));
        Ok(())
    }

    fn set_init_state_json(&self, init_state: serde_json::Value) -> Result<(), FormError> {
        let init_state: S =
            serde_json::from_value(init_state).map_err(|source| FormError::InitState {
                field: self.inner.name.to_string(),
                source,
            })?;
        Field::set_init_state(self, init_state);
        Ok(())
    }

    fn state_json(&self) -> Result<serde_json::Value, FormError> {
        self.inner
            .state
            .with(|state| serde_json::to_value(state))
            .map_err(|source| FormError::Snapshot {
                field: self.inner.name.to_string(),
                source,
            })
    }

    fn prepare_init(
        &self,
        init_state: serde_json::Value,
    ) -> Result<Box<dyn FnOnce() + Send>, FormError> {
        let init_state: S =
            serde_json::from_value(init_state).map_err(|source| FormError::InitState {
                field: self.inner.name.to_string(),
                source,
            })?;
        let field = self.clone();
        Ok(Box::new(move || field.hydrate(init_state)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<S, V> Field<S, V>
where
    S: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Type-erased handle for use in a form
    pub fn to_ref(&self) -> FieldRef {
        Arc::new(self.clone())
    }
}
