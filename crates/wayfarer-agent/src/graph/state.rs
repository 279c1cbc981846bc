/// The value that flows through the workflow.
///
/// Fields are read-only from outside; a stage produces its output with
/// [`StateRecord::derive`], which copies the record and overrides only the
/// fields named in the update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateRecord {
    input: String,
    response: String,
    summary: String,
    is_valid: bool,
}

/// Fields a stage may override. `None` keeps the prior value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdate {
    pub response: Option<String>,
    pub summary: Option<String>,
    pub is_valid: Option<bool>,
}

impl StateRecord {
    /// Initial record for a query: empty response and summary, not valid.
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// A new record equal to this one except for the fields set in `update`.
    pub fn derive(&self, update: StateUpdate) -> Self {
        Self {
            input: self.input.clone(),
            response: update.response.unwrap_or_else(|| self.response.clone()),
            summary: update.summary.unwrap_or_else(|| self.summary.clone()),
            is_valid: update.is_valid.unwrap_or(self.is_valid),
        }
    }

    /// Every field as `(name, rendered value)`, in declaration order.
    pub fn fields(&self) -> [(&'static str, String); 4] {
        [
            ("input", self.input.clone()),
            ("response", self.response.clone()),
            ("summary", self.summary.clone()),
            ("is_valid", self.is_valid.to_string()),
        ]
    }
}
