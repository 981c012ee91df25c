//! Form aggregation and submit
//!
//! A [`Form`] builds a field tree from a [`FormShape`], flattens it into a
//! [`FieldList`] and derives whole-form status from that list:
//!
//! - `focus`: any field active, dirty or touched
//! - `validation`: any field validating, all fields triggered, first error
//!   in list order
//! - `fields_state`: JSON snapshot of every field's raw state
//!
//! The aggregates are computed cells, so they only notify observers when
//! the folded record actually changes.

mod list;
mod options;
mod shape;
mod submit;

pub use list::{Detach, FieldList};
pub use options::FormOptions;
pub use shape::{FieldSpec, FormFieldOptions, FormFields, FormNode, FormShape};
pub use submit::SubmitState;

use crate::atom::Atom;
use crate::computed::Computed;
use crate::error::{FormError, SubmitError};
use crate::field::{FieldFocus, FieldValidation};
use crate::names::auto_name;
use crate::observer::Reactive;
use crate::transaction::action;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

/// Reactive form: field tree, aggregates and submit workflow.
///
/// Cloning yields another handle to the same form.
///
/// # Example
/// ```ignore
/// let form = Form::new(
///     FormShape::new()
///         .field("email", (json!(""), FormFieldOptions::default().contract(non_empty)))
///         .field("age", json!(0)),
///     FormOptions::default().on_submit(|snapshot| store(snapshot)),
/// );
///
/// form.fields().field("email").unwrap().focus_in();
/// let result = form.submit().await;
/// ```
#[derive(Clone)]
pub struct Form {
    inner: Arc<FormInner>,
}

struct FormInner {
    name: Arc<str>,
    fields: FormFields,
    list: FieldList,
    fields_state: Computed<Value>,
    focus: Computed<FieldFocus>,
    validation: Computed<FieldValidation>,
    submitted: Atom<bool>,
    submit_state: Atom<SubmitState>,
    submit_error: Atom<Option<SubmitError>>,
    in_flight: Mutex<Option<submit::InFlight>>,
    submit_generation: AtomicU64,
    options: FormOptions,
}

fn fold_focus(list: &FieldList) -> FieldFocus {
    list.get()
        .iter()
        .fold(FieldFocus::default(), |acc, field| {
            let focus = field.focus();
            FieldFocus {
                active: acc.active || focus.active,
                dirty: acc.dirty || focus.dirty,
                touched: acc.touched || focus.touched,
            }
        })
}

fn fold_validation(list: &FieldList) -> FieldValidation {
    list.get()
        .iter()
        .fold(FieldValidation::VALIDATION_LESS, |acc, field| {
            let validation = field.validation();
            FieldValidation {
                error: acc
                    .error
                    .or(validation.error.filter(|error| !error.is_empty())),
                triggered: acc.triggered && validation.triggered,
                validating: acc.validating || validation.validating,
            }
        })
}

impl Form {
    /// Build a form from a shape
    pub fn new(shape: FormShape, options: FormOptions) -> Self {
        let name: Arc<str> = match &options.name {
            Some(name) => name.as_str().into(),
            None => auto_name("form").into(),
        };

        let fields = shape.build(&format!("{name}.fields"));
        let list = FieldList::new(fields.leaves(), &name);

        let fields_state = Computed::new(format!("{name}.fieldsState"), {
            let fields = fields.clone();
            move |_| fields.snapshot()
        });
        let focus = Computed::new(format!("{name}.focus"), {
            let list = list.clone();
            move |_| fold_focus(&list)
        });
        let validation = Computed::new(format!("{name}.validation"), {
            let list = list.clone();
            move |_| fold_validation(&list)
        });

        tracing::debug!(form = %name, fields = list.len(), "form built");

        Self {
            inner: Arc::new(FormInner {
                submitted: Atom::new(false, format!("{name}.submitted")),
                submit_state: Atom::new(SubmitState::Idle, format!("{name}.submit.state")),
                submit_error: Atom::new(None, format!("{name}.submit.error")),
                in_flight: Mutex::new(None),
                submit_generation: AtomicU64::new(0),
                name,
                fields,
                list,
                fields_state,
                focus,
                validation,
                options,
            }),
        }
    }

    /// Build a form mirroring a JSON object, see [`FormShape::from_json`]
    pub fn from_json(shape: Value, options: FormOptions) -> Result<Self, FormError> {
        Ok(Self::new(FormShape::from_json(shape)?, options))
    }

    /// Name of the form, prefix of its cell and field names
    pub fn name(&self) -> Arc<str> {
        self.inner.name.clone()
    }

    /// The field tree
    pub fn fields(&self) -> &FormFields {
        &self.inner.fields
    }

    /// The fields the aggregates fold over
    pub fn fields_list(&self) -> &FieldList {
        &self.inner.list
    }

    /// JSON snapshot of the tree's raw states (tracked)
    pub fn fields_state(&self) -> Value {
        self.inner.fields_state.get()
    }

    /// The snapshot cell
    pub fn fields_state_cell(&self) -> &Computed<Value> {
        &self.inner.fields_state
    }

    /// Aggregated focus (tracked)
    pub fn focus(&self) -> FieldFocus {
        self.inner.focus.get()
    }

    /// The aggregated focus cell
    pub fn focus_cell(&self) -> &Computed<FieldFocus> {
        &self.inner.focus
    }

    /// Aggregated validation (tracked)
    pub fn validation(&self) -> FieldValidation {
        self.inner.validation.get()
    }

    /// The aggregated validation cell
    pub fn validation_cell(&self) -> &Computed<FieldValidation> {
        &self.inner.validation
    }

    /// True after a successful submit until the next reset
    pub fn submitted(&self) -> bool {
        self.inner.submitted.get()
    }

    /// Read-only view of the `submitted` flag
    pub fn submitted_cell(&self) -> &impl Reactive<bool> {
        &self.inner.submitted
    }

    /// Progress of the submit workflow (tracked)
    pub fn submit_state(&self) -> SubmitState {
        self.inner.submit_state.get()
    }

    /// Read-only view of the submit progress
    pub fn submit_state_cell(&self) -> &impl Reactive<SubmitState> {
        &self.inner.submit_state
    }

    /// Error of the last failed submit, cleared by success or reset
    pub fn submit_error(&self) -> Option<SubmitError> {
        self.inner.submit_error.get()
    }

    /// Read-only view of the submit error
    pub fn submit_error_cell(&self) -> &impl Reactive<Option<SubmitError>> {
        &self.inner.submit_error
    }

    /// Re-hydrate the baselines from loaded data
    ///
    /// `partial` is walked alongside the tree: nested objects recurse into
    /// groups, any other value becomes the init state of the field at that
    /// key. Unknown keys are ignored. Fields without user edits also take
    /// the new state. Nothing is written if any part of the payload does
    /// not fit the tree.
    pub fn init(&self, partial: &Value) -> Result<(), FormError> {
        let inner = &self.inner;
        let Value::Object(partial) = partial else {
            return Err(FormError::NotAnObject {
                path: String::new(),
            });
        };

        let mut staged = Vec::new();
        inner.fields.stage_init(partial, "", &mut staged)?;

        action(&format!("{}.init", inner.name), || {
            for apply in staged {
                apply();
            }
        });
        Ok(())
    }

    /// Reset every field, clear submit status and abort a running submit
    pub fn reset(&self) {
        let inner = &self.inner;
        action(&format!("{}.reset", inner.name), || {
            let aborted = inner.abort_in_flight();
            for field in inner.list.get() {
                field.reset();
            }
            inner.submitted.set(false);
            inner.submit_error.set(None);
            inner.submit_state.set(if aborted {
                SubmitState::Aborted
            } else {
                SubmitState::Idle
            });
        });
    }
}

impl std::fmt::Debug for Form {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Form")
            .field("name", &self.inner.name)
            .field("fields", &self.inner.fields)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Field, FieldOptions};
    use serde_json::json;

    fn required(value: &Value) -> Result<(), &'static str> {
        match value.as_str() {
            Some("") | None => Err("required"),
            Some(_) => Ok(()),
        }
    }

    fn login_form() -> Form {
        Form::new(
            FormShape::new()
                .field(
                    "email",
                    (json!(""), FormFieldOptions::default().contract(required)),
                )
                .field("password", (json!(""), FormFieldOptions::default().contract(required)))
                .field("remember", json!(false)),
            FormOptions::default().name("login"),
        )
    }

    #[test]
    fn aggregates_fold_over_fields() {
        let form = login_form();
        let email = form.fields().field("email").expect("email");

        assert_eq!(form.focus(), FieldFocus::default());
        assert!(!form.validation().triggered);

        email.focus_in();
        assert!(form.focus().active);

        email.trigger();
        let password = form.fields().field("password").expect("password");
        password.trigger();

        let validation = form.validation();
        assert!(validation.triggered);
        assert_eq!(validation.error.as_deref(), Some("required"));
    }

    #[test]
    fn first_error_in_list_order_wins() {
        let form = Form::new(
            FormShape::new()
                .field(
                    "a",
                    (json!(1), FormFieldOptions::default().validate(|_| Err::<(), _>("a failed"))),
                )
                .field(
                    "b",
                    (json!(2), FormFieldOptions::default().validate(|_| Err::<(), _>("b failed"))),
                ),
            FormOptions::default(),
        );
        let b = form.fields().field("b").expect("b");
        b.trigger();
        assert_eq!(form.validation().error.as_deref(), Some("b failed"));

        form.fields().field("a").expect("a").trigger();
        assert_eq!(form.validation().error.as_deref(), Some("a failed"));
    }

    #[test]
    fn empty_list_is_trivially_triggered() {
        let form = Form::new(FormShape::new(), FormOptions::default());
        assert_eq!(form.validation(), FieldValidation::VALIDATION_LESS);
        assert_eq!(form.fields_state(), json!({}));
    }

    #[test]
    fn aggregate_notifies_only_on_change() {
        let form = login_form();
        let notified = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let notified_clone = notified.clone();
        let _subscription = form
            .focus_cell()
            .subscribe(move |focus| notified_clone.lock().push(*focus));

        let email = form.fields().field("email").expect("email");
        let password = form.fields().field("password").expect("password");
        email.focus_in();
        password.focus_in();
        email.reset();

        // Only the first focus_in moved the aggregate.
        assert_eq!(notified.lock().len(), 1);
    }

    #[test]
    fn dynamic_fields_join_the_aggregates() {
        let form = login_form();
        let row = Field::new(
            String::new(),
            FieldOptions::default().contract(|s: &String| {
                if s.is_empty() { Err("row required") } else { Ok(()) }
            }),
        );

        let detach = form.fields_list().add(row.to_ref());
        form.fields_list().get().iter().for_each(|field| {
            field.trigger();
        });
        assert_eq!(form.validation().error.as_deref(), Some("required"));

        row.focus_in();
        assert!(form.focus().active);

        detach.detach();
        assert!(!form.focus().active);
    }

    #[test]
    fn fields_state_tracks_edits() {
        let form = login_form();
        let email = form
            .fields()
            .field_as::<Value, Value>("email")
            .expect("json field");
        email.change(json!("a@b.c"));
        assert_eq!(
            form.fields_state(),
            json!({ "email": "a@b.c", "password": "", "remember": false })
        );
    }

    #[test]
    fn init_only_touches_given_keys() {
        let form = Form::from_json(
            json!({ "profile": { "name": "", "age": 0 }, "note": "" }),
            FormOptions::default(),
        )
        .expect("object shape");
        let note = form.fields().field_as::<Value, Value>("note").expect("note");
        note.change(json!("draft"));

        form.init(&json!({ "profile": { "name": "Ada" }, "note": "loaded", "extra": 1 }))
            .expect("payload fits");

        let name = form.fields().field_as::<Value, Value>("profile.name").expect("name");
        assert_eq!(name.init_state(), json!("Ada"));
        assert_eq!(name.state(), json!("Ada"));

        let age = form.fields().field_as::<Value, Value>("profile.age").expect("age");
        assert_eq!(age.init_state(), json!(0));

        // Edited fields keep their state but get the new baseline.
        assert_eq!(note.state(), json!("draft"));
        assert_eq!(note.init_state(), json!("loaded"));
    }

    #[test]
    fn init_is_all_or_nothing() {
        let typed = Field::new(1_u32, FieldOptions::default());
        let form = Form::new(
            FormShape::new()
                .field("label", json!("a"))
                .field("count", typed.clone()),
            FormOptions::default(),
        );

        let err = form
            .init(&json!({ "label": "b", "count": "not a number" }))
            .unwrap_err();
        assert!(matches!(err, FormError::InitState { .. }));
        assert_eq!(form.fields_state(), json!({ "label": "a", "count": 1 }));

        assert!(form.init(&json!("scalar")).is_err());
    }

    #[test]
    fn reset_restores_every_field() {
        let form = login_form();
        let email = form.fields().field("email").expect("email");
        email.focus_in();
        email.trigger();
        form.fields()
            .field_as::<Value, Value>("password")
            .expect("password")
            .change(json!("secret"));

        form.reset();
        assert_eq!(form.focus(), FieldFocus::default());
        assert_eq!(form.validation(), FieldValidation::INITIAL);
        assert_eq!(form.submit_state(), SubmitState::Idle);
        assert!(!form.submitted());
        assert_eq!(
            form.fields_state(),
            json!({ "email": "", "password": "", "remember": false })
        );
    }
}
