#![deny(missing_docs)]

//! Reactive form state built on fine-grained reactivity.
//!
//! Every piece of form state lives in an observable cell. Derived state
//! (values, dirtiness, aggregate validation) is memoized and recomputed only
//! when something it read changed. Writes are grouped into actions so
//! observers never see half-applied updates.
//!
//! # Quick Start
//!
//! ```ignore
//! use reaktiv_form::{Field, FieldOptions, Form, FormOptions, FormShape};
//! use serde_json::json;
//!
//! let age = Field::new(
//!     String::from("0"),
//!     FieldOptions::projected(|s: &String| s.parse::<u32>().unwrap_or(0), |v| v.to_string())
//!         .validate_on_change(true)
//!         .validate(|ctx| if ctx.value >= 18 { Ok(()) } else { Err("too young") }),
//! );
//!
//! age.change(21);
//! assert!(age.focus().dirty);
//! assert!(age.validation().is_valid());
//!
//! let form = Form::new(
//!     FormShape::new()
//!         .field("email", json!(""))
//!         .field("address", FormShape::new().field("city", json!("Berlin"))),
//!     FormOptions::default().on_submit(|snapshot| {
//!         println!("{snapshot}");
//!         Ok::<(), String>(())
//!     }),
//! );
//! form.init(&json!({ "email": "a@b.com" }))?;
//! form.submit().await?;
//! ```
//!
//! # Core Types
//!
//! - [`Atom<T>`] - Writable observable cell.
//! - [`Computed<T>`] - Memoized derivation. Recomputes only when its sources changed.
//! - [`Transaction`] / [`action`] - Batch writes; observers run once at the end.
//! - [`Field`] - State, value projection, focus flags and validation of one input.
//! - [`Form`] - Field tree plus aggregates and the submit workflow.
//!
//! # Observing
//!
//! ```ignore
//! let subscription = field.validation_cell().subscribe(|v| println!("{v:?}"));
//! let settled = until(field.validation_cell(), |v| !v.validating).await;
//! drop(subscription);
//! ```
//!
//! Asynchronous validators run on an [`Executor`]. By default that is the
//! current tokio runtime when there is one, otherwise a small shared thread
//! pool.

// Internal modules
pub(crate) mod arena;
mod atom;
mod computed;
mod error;
mod executor;
mod field;
mod form;
mod hash;
mod names;
mod observer;
mod transaction;

// Core types
pub use atom::Atom;
pub use computed::Computed;
pub use observer::{Reactive, Subscription, until};
pub use transaction::Transaction;

// Key functions
pub use arena::untracked;
pub use names::reset_name_counter;
pub use transaction::{action, flush, is_transaction_active};

// Fields
pub use field::{
    Field, FieldContext, FieldFocus, FieldId, FieldOptions, FieldRef, FieldValidation, FormField,
    Validated, ValidationTicket,
};

// Forms
pub use form::{
    Detach, FieldList, FieldSpec, Form, FormFieldOptions, FormFields, FormNode, FormOptions,
    FormShape, SubmitState,
};

pub use error::{FormError, SubmitError, UNKNOWN_ERROR, ValidationError};

// Async executor integration
pub use executor::{DefaultExecutor, Executor, SharedExecutor, TokioExecutor};
