use crate::atom::Atom;
use crate::observer::Reactive;
use crate::field::{FieldId, FieldRef};
use crate::transaction::action;
use std::sync::Arc;

/// Ordered, mutable list of the fields a form aggregates over.
///
/// Starts as the depth-first linearization of the field tree. Fields can be
/// attached and detached at runtime without rebuilding the form, e.g. for
/// list-of-rows inputs.
#[derive(Clone)]
pub struct FieldList {
    cell: Atom<Vec<FieldRef>>,
}

impl FieldList {
    pub(crate) fn new(fields: Vec<FieldRef>, name: &str) -> Self {
        Self {
            cell: Atom::new(fields, format!("{name}.fieldsList")),
        }
    }

    /// Current fields (tracked)
    pub fn get(&self) -> Vec<FieldRef> {
        self.cell.get()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.cell.with(Vec::len)
    }

    /// True if no field is attached
    pub fn is_empty(&self) -> bool {
        self.cell.with(Vec::is_empty)
    }

    /// True if the field with `id` is attached
    pub fn contains(&self, id: FieldId) -> bool {
        self.cell.with(|fields| fields.iter().any(|field| field.id() == id))
    }

    /// Read-only view of the list; change it through `add` and `remove`
    pub fn cell(&self) -> &impl Reactive<Vec<FieldRef>> {
        &self.cell
    }

    /// Append `field`; the returned handle removes it again
    pub fn add(&self, field: FieldRef) -> Detach {
        action(&format!("{}.add", self.cell.name()), || {
            self.cell.update(|fields| fields.push(field.clone()));
        });
        Detach {
            list: self.clone(),
            field,
        }
    }

    /// Remove every occurrence of `field`, returning whether it was present
    pub fn remove(&self, field: &FieldRef) -> bool {
        let id = field.id();
        action(&format!("{}.remove", self.cell.name()), || {
            if !self.contains(id) {
                return false;
            }
            self.cell.update(|fields| fields.retain(|f| f.id() != id));
            true
        })
    }
}

impl std::fmt::Debug for FieldList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<Arc<str>> = self.cell.with(|fields| fields.iter().map(|f| f.name()).collect());
        f.debug_struct("FieldList").field("fields", &names).finish()
    }
}

/// Handle returned by [`FieldList::add`].
///
/// Detaching is explicit: dropping the handle keeps the field attached.
pub struct Detach {
    list: FieldList,
    field: FieldRef,
}

impl Detach {
    /// The field this handle detaches
    pub fn field(&self) -> &FieldRef {
        &self.field
    }

    /// Remove the field that was added
    pub fn detach(self) -> bool {
        self.list.remove(&self.field)
    }
}

impl std::fmt::Debug for Detach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detach")
            .field("field", &self.field.name())
            .finish_non_exhaustive()
    }
}
