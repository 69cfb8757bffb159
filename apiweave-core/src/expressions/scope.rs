/// A named key/value scope active for one evaluation (a function's local
/// variables, a handler's captured variables, a webhook key's fields).
pub trait VariableScope: Send + Sync {
    /// Scope name used by dotted lookups (`{{var::section.name}}`).
    fn store_name(&self) -> &str;

    fn get(&self, name: &str) -> Option<String>;
}

/// API-level variable resolution, independent of the currently-active scope.
pub trait VariableResolver: Send + Sync {
    fn api_name(&self) -> &str;

    /// A variable persisted on the owning API.
    fn api_variable(&self, name: &str) -> Option<String>;

    fn function_exists(&self, name: &str) -> bool;

    /// A named function's local variable, published by its latest execution.
    fn function_variable(&self, function: &str, name: &str) -> Option<String>;
}

/// Everything an expression may read during evaluation.
pub struct EvalContext<'a> {
    /// The currently-active scope, if any. Dotted lookups try this first when
    /// the section matches its store name.
    pub scope: Option<&'a dyn VariableScope>,
    pub resolver: &'a dyn VariableResolver,
    /// The raw response text of the call being processed.
    pub response: Option<&'a str>,
    /// The current iteration item (a normalized JSON path or literal).
    pub item: Option<&'a str>,
}

impl<'a> EvalContext<'a> {
    pub fn new(resolver: &'a dyn VariableResolver) -> Self {
        Self {
            scope: None,
            resolver,
            response: None,
            item: None,
        }
    }

    pub fn with_scope(mut self, scope: &'a dyn VariableScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_response(mut self, response: &'a str) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_item(mut self, item: Option<&'a str>) -> Self {
        self.item = item;
        self
    }
}
