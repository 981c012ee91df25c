/// Focus and interaction status of a field (or of a whole form).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldFocus {
    /// The field currently has focus
    pub active: bool,
    /// The value differs from the value of the init state
    pub dirty: bool,
    /// The field lost focus or was changed at least once
    pub touched: bool,
}

/// Validation status of a field (or of a whole form).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldValidation {
    /// Message of the last failed validation
    pub error: Option<String>,
    /// The status is current for the present value
    pub triggered: bool,
    /// An async validation is in flight
    pub validating: bool,
}

impl FieldValidation {
    /// Shape of a field that has a contract or validator: not yet validated
    pub const INITIAL: Self = Self {
        error: None,
        triggered: false,
        validating: false,
    };

    /// Shape of a field without contract or validator: trivially valid
    pub const VALIDATION_LESS: Self = Self {
        error: None,
        triggered: true,
        validating: false,
    };

    /// Validated, not running and without error
    pub fn is_valid(&self) -> bool {
        self.triggered && !self.validating && self.error.is_none()
    }
}

/// Stored part of the focus record; `dirty` is derived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Interaction {
    pub active: bool,
    pub touched: bool,
}

impl Interaction {
    pub fn with_dirty(self, dirty: bool) -> FieldFocus {
        FieldFocus {
            active: self.active,
            dirty,
            touched: self.touched,
        }
    }
}
