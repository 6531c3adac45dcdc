use super::{
    form_add_field, form_blur_field, form_destroy, form_end_submit, form_focus_field,
    form_initial, form_key, form_remove_field, form_set_errors, form_start_submit,
    form_update_field, get_value, pick_valid_values, AddField, FieldState, FormErrors, FormError,
    FormOpts, FormState, UpdateField,
};
use reactorx_core::{Connection, State, Store};
use serde_json::Value;
use tracing::{debug, instrument};

/// Dispatch helpers and state access for one form.
#[derive(Clone, Debug)]
pub struct FormClient {
    store: Store,
    name: String,
}

/// A field's flags together with its current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldView {
    pub state: FieldState,
    pub value: Value,
}

fn read_form(state: &State, key: &str) -> Option<FormState> {
    state
        .get(key)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

impl FormClient {
    pub fn new(store: &Store, name: impl Into<String>) -> Self {
        Self {
            store: store.clone(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> String {
        form_key(&self.name)
    }

    fn opts(&self, field: Option<&str>) -> FormOpts {
        FormOpts {
            form: self.name.clone(),
            field: field.map(str::to_string),
        }
    }

    // =========================================================================
    // Form
    // =========================================================================

    pub fn initial(&self, values: Value) -> Result<(), FormError> {
        form_initial().with(values, self.opts(None)).invoke(&self.store)?;
        Ok(())
    }

    pub fn destroy(&self) -> Result<(), FormError> {
        form_destroy().with((), self.opts(None)).invoke(&self.store)?;
        Ok(())
    }

    pub fn start_submit(&self) -> Result<(), FormError> {
        form_start_submit().with((), self.opts(None)).invoke(&self.store)?;
        Ok(())
    }

    pub fn end_submit(&self) -> Result<(), FormError> {
        form_end_submit().with((), self.opts(None)).invoke(&self.store)?;
        Ok(())
    }

    pub fn set_errors(&self, errors: FormErrors) -> Result<(), FormError> {
        form_set_errors().with(errors, self.opts(None)).invoke(&self.store)?;
        Ok(())
    }

    /// Marks every field visited and touched, then hands the cleaned values to
    /// `on_submit` if no field has an error. Returns whether it was called.
    #[instrument(skip_all, fields(form = %self.name))]
    pub fn submit<F>(&self, on_submit: F) -> Result<bool, FormError>
    where
        F: FnOnce(Value),
    {
        self.start_submit()?;
        let state = self
            .state()
            .ok_or_else(|| FormError::NotInitialised(self.name.clone()))?;

        if !state.is_valid() {
            debug!("Form has errors, submit skipped");
            self.end_submit()?;
            return Ok(false);
        }
        on_submit(pick_valid_values(&state.values));
        self.end_submit()?;
        Ok(true)
    }

    // =========================================================================
    // Fields
    // =========================================================================

    /// Registers a field. Its value comes from the initial values when present,
    /// `default_value` otherwise.
    pub fn add_field(
        &self,
        field: &str,
        default_value: Value,
        error: Option<String>,
    ) -> Result<(), FormError> {
        form_add_field()
            .with(AddField { default_value, error }, self.opts(Some(field)))
            .invoke(&self.store)?;
        Ok(())
    }

    pub fn update_field(
        &self,
        field: &str,
        value: Value,
        error: Option<String>,
    ) -> Result<(), FormError> {
        form_update_field()
            .with(UpdateField { value, error }, self.opts(Some(field)))
            .invoke(&self.store)?;
        Ok(())
    }

    pub fn remove_field(&self, field: &str) -> Result<(), FormError> {
        form_remove_field().with((), self.opts(Some(field))).invoke(&self.store)?;
        Ok(())
    }

    pub fn focus_field(&self, field: &str) -> Result<(), FormError> {
        form_focus_field().with((), self.opts(Some(field))).invoke(&self.store)?;
        Ok(())
    }

    pub fn blur_field(&self, field: &str) -> Result<(), FormError> {
        form_blur_field().with((), self.opts(Some(field))).invoke(&self.store)?;
        Ok(())
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn state(&self) -> Option<FormState> {
        read_form(&self.store.get_state(), &self.key())
    }

    pub fn values(&self) -> Value {
        self.state().map(|state| state.values).unwrap_or(Value::Null)
    }

    pub fn field(&self, field: &str) -> Option<FieldView> {
        let state = self.state()?;
        Some(FieldView {
            value: get_value(&state.values, field).cloned().unwrap_or(Value::Null),
            state: state.fields.get(field).cloned()?,
        })
    }

    /// Follows this form's state; notifies only when it changes.
    pub fn conn(&self) -> Connection<Option<FormState>> {
        let key = self.key();
        self.store.conn(move |state: &State| read_form(state, &key))
    }
}
