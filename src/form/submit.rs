// Submit workflow
//
// 1. trigger every field that is not triggered yet (one action)
// 2. wait for the validation aggregate to stop validating
// 3. fail with the first field error
// 4. run the form-level validate on the state snapshot
// 5. run on_submit with the snapshot
// 6. mark submitted; optionally reset everything as one action
//
// Only one submit runs at a time: starting a new one aborts the previous
// through its AbortHandle, and the aborted call resolves to
// SubmitError::Aborted without writing any form state.

use super::{Form, FormInner};
use crate::arena::untracked;
use crate::error::SubmitError;
use crate::field::FieldValidation;
use crate::observer::until;
use crate::transaction::action;
use futures::future::{AbortHandle, Abortable, Aborted};
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Progress of the submit workflow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SubmitState {
    /// No submit ran since construction or the last reset
    #[default]
    Idle,
    /// Waiting for field validation
    Validating,
    /// Form-level checks passed, `on_submit` is running
    Submitting,
    /// Last submit succeeded (only without `reset_on_submit`)
    Succeeded,
    /// Last submit failed, see [`Form::submit_error`]
    Failed,
    /// A reset aborted the running submit
    Aborted,
}

impl SubmitState {
    /// True while a submit is running
    pub fn is_pending(self) -> bool {
        matches!(self, SubmitState::Validating | SubmitState::Submitting)
    }
}

pub(super) struct InFlight {
    generation: u64,
    abort: AbortHandle,
}

/// Clears the in-flight slot when its submit ends, however it ends
struct InFlightGuard<'a> {
    form: &'a FormInner,
    generation: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.form.in_flight.lock();
        if slot
            .as_ref()
            .is_some_and(|in_flight| in_flight.generation == self.generation)
        {
            *slot = None;
        }
    }
}

impl Form {
    /// Validate and submit the form
    ///
    /// Resolves once the workflow finished. Failures are also stored in
    /// [`submit_error`](Form::submit_error). A newer `submit` or a
    /// [`reset`](Form::reset) makes this call resolve to
    /// [`SubmitError::Aborted`].
    pub async fn submit(&self) -> Result<(), SubmitError> {
        let inner = self.inner.clone();
        let (abort, registration) = AbortHandle::new_pair();
        let generation = inner.begin_submit(abort);
        let _guard = InFlightGuard {
            form: &inner,
            generation,
        };

        match Abortable::new(inner.clone().run_submit(), registration).await {
            Ok(result) => result,
            Err(Aborted) => {
                tracing::debug!(form = %inner.name, generation, "submit aborted");
                Err(SubmitError::Aborted)
            }
        }
    }
}

impl FormInner {
    fn begin_submit(&self, abort: AbortHandle) -> u64 {
        let generation = self.submit_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let mut slot = self.in_flight.lock();
        if let Some(previous) = slot.replace(InFlight { generation, abort }) {
            cov_mark::hit!(submit_superseded);
            tracing::debug!(
                form = %self.name,
                previous = previous.generation,
                "superseding running submit"
            );
            previous.abort.abort();
        }
        generation
    }

    /// Abort the running submit, if any; returns whether one was running
    pub(super) fn abort_in_flight(&self) -> bool {
        match self.in_flight.lock().take() {
            Some(in_flight) => {
                tracing::debug!(
                    form = %self.name,
                    generation = in_flight.generation,
                    "aborting running submit"
                );
                in_flight.abort.abort();
                true
            }
            None => false,
        }
    }

    async fn run_submit(self: Arc<Self>) -> Result<(), SubmitError> {
        action(&format!("{}.submit", self.name), || {
            self.submit_state.set(SubmitState::Validating);
            for field in self.list.get() {
                if !field.validation().triggered {
                    field.trigger();
                }
            }
        });

        if untracked(|| self.validation.get()).validating {
            until(&self.validation, |v: &FieldValidation| !v.validating).await;
        }

        if let Some(error) = untracked(|| self.validation.get()).error {
            return self.fail(SubmitError::Invalid(error));
        }

        let snapshot = untracked(|| self.fields_state.get());
        if let Some(validate) = &self.options.validate {
            if let Err(err) = validate(&snapshot).settle().await {
                return self.fail(SubmitError::Rejected(err.message().to_owned()));
            }
        }

        action(&format!("{}.submit.onSubmit", self.name), || {
            self.submit_state.set(SubmitState::Submitting);
        });
        if let Some(on_submit) = &self.options.on_submit {
            if let Err(err) = on_submit(snapshot).settle().await {
                return self.fail(SubmitError::Failed(err.message().to_owned()));
            }
        }

        action(&format!("{}.submitted", self.name), || {
            self.submitted.set(true);
        });

        if self.options.reset_on_submit {
            // Not `Form::reset`: that would abort this very submit.
            action(&format!("{}.submit.reset", self.name), || {
                for field in self.list.get() {
                    field.reset();
                }
                self.submit_error.set(None);
                self.submit_state.set(SubmitState::Idle);
                self.submitted.set(false);
            });
        } else {
            action(&format!("{}.submit.succeeded", self.name), || {
                self.submit_error.set(None);
                self.submit_state.set(SubmitState::Succeeded);
            });
        }
        tracing::debug!(form = %self.name, "submit succeeded");
        Ok(())
    }

    fn fail(&self, err: SubmitError) -> Result<(), SubmitError> {
        tracing::debug!(form = %self.name, %err, "submit failed");
        action(&format!("{}.submit.failed", self.name), || {
            self.submit_error.set(Some(err.clone()));
            self.submit_state.set(SubmitState::Failed);
        });
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{FormOptions, FormShape};
    use serde_json::{Value, json};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn failing_form_validate_rejects() {
        let form = Form::new(
            FormShape::new().field("a", json!(1)).field("b", json!(2)),
            FormOptions::default().validate(|snapshot: &Value| {
                if snapshot["a"] == snapshot["b"] { Ok(()) } else { Err("a and b differ") }
            }),
        );

        let result = form.submit().await;
        assert_eq!(result, Err(SubmitError::Rejected("a and b differ".into())));
        assert_eq!(form.submit_state(), SubmitState::Failed);
        assert_eq!(form.submit_error(), Some(SubmitError::Rejected("a and b differ".into())));
    }

    #[tokio::test]
    async fn failing_on_submit_reports_failure() {
        let form = Form::new(
            FormShape::new().field("a", json!(1)),
            FormOptions::default().on_submit_async(|_snapshot| async { Err::<(), _>("server down") }),
        );

        let result = form.submit().await;
        assert_eq!(result, Err(SubmitError::Failed("server down".into())));
        assert!(!form.submitted());
    }

    #[tokio::test]
    async fn pending_form_validate_is_awaited() {
        let (tx, rx) = oneshot::channel::<Result<(), String>>();
        let gate = Arc::new(parking_lot::Mutex::new(Some(rx)));
        let submitted = Arc::new(AtomicUsize::new(0));
        let submitted_clone = submitted.clone();
        let form = Form::new(
            FormShape::new().field("a", json!(1)),
            FormOptions::default()
                .validate_async(move |_snapshot: &Value| {
                    let rx = gate.lock().take();
                    async move {
                        match rx {
                            Some(rx) => rx.await.unwrap_or_else(|_| Err("gate dropped".into())),
                            None => Ok(()),
                        }
                    }
                })
                .on_submit(move |_snapshot| {
                    submitted_clone.fetch_add(1, Ordering::Relaxed);
                    Ok::<(), String>(())
                }),
        );

        let submit = form.submit();
        let release = async {
            tokio::task::yield_now().await;
            assert_eq!(submitted.load(Ordering::Relaxed), 0);
            tx.send(Err("rejected later".into())).expect("validate waiting");
        };
        let (result, ()) = tokio::join!(submit, release);

        assert_eq!(result, Err(SubmitError::Rejected("rejected later".into())));
        assert_eq!(submitted.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn new_submit_aborts_previous() {
        cov_mark::check!(submit_superseded);
        let gates = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let form = Form::new(
            FormShape::new().field("a", json!(1)),
            FormOptions::default()
                .reset_on_submit(false)
                .on_submit_async({
                    let gates = gates.clone();
                    let calls = calls.clone();
                    move |_snapshot| {
                        calls.fetch_add(1, Ordering::Relaxed);
                        let (tx, rx) = oneshot::channel::<()>();
                        gates.lock().push(tx);
                        async move { rx.await.map_err(|_| "gate dropped") }
                    }
                }),
        );

        let first = form.submit();
        let second = async {
            tokio::task::yield_now().await;
            form.submit().await
        };
        let release = async {
            // Wait until both submits reached on_submit.
            while calls.load(Ordering::Relaxed) < 2 {
                tokio::task::yield_now().await;
            }
            for gate in gates.lock().drain(..) {
                let _ = gate.send(());
            }
        };
        let (first, second, ()) = tokio::join!(first, second, release);

        assert_eq!(first, Err(SubmitError::Aborted));
        assert_eq!(second, Ok(()));
        assert_eq!(form.submit_state(), SubmitState::Succeeded);
        assert!(form.submitted());
    }

    #[tokio::test]
    async fn reset_aborts_running_submit() {
        let (_tx, rx) = oneshot::channel::<()>();
        let gate = Arc::new(parking_lot::Mutex::new(Some(rx)));
        let form = Form::new(
            FormShape::new().field("a", json!("")),
            FormOptions::default().on_submit_async(move |_snapshot| {
                let rx = gate.lock().take();
                async move {
                    match rx {
                        Some(rx) => rx.await.map_err(|_| "gate dropped"),
                        None => Ok(()),
                    }
                }
            }),
        );

        let submit = form.submit();
        let reset = async {
            while form.submit_state() != SubmitState::Submitting {
                tokio::task::yield_now().await;
            }
            form.reset();
        };
        let (result, ()) = tokio::join!(submit, reset);

        assert_eq!(result, Err(SubmitError::Aborted));
        assert_eq!(form.submit_state(), SubmitState::Aborted);
        assert_eq!(form.submit_error(), None);
    }

    #[test]
    fn pending_states() {
        assert!(SubmitState::Validating.is_pending());
        assert!(SubmitState::Submitting.is_pending());
        assert!(!SubmitState::Aborted.is_pending());
    }
}
