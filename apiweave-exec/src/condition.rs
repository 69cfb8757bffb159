use std::collections::HashMap;

use apiweave_core::condition::{compare_strings, matches_in};
use apiweave_core::types::{CaseSpec, OperatorSpec};
use apiweave_core::{EvalContext, ValueString};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::ExecError;
use crate::vars::value_to_string;

#[derive(Debug, Clone)]
pub enum CaseValue {
    Expr(ValueString),
    Literal(JsonValue),
}

/// A compiled comparison case used by run-if gates, branching function
/// actions and switch tag actions.
#[derive(Debug, Clone)]
pub struct Case {
    key: ValueString,
    operator: OperatorSpec,
    value: CaseValue,
    variables: HashMap<String, ValueString>,
}

impl Case {
    pub fn compile(spec: &CaseSpec) -> Result<Self, ExecError> {
        let value = match &spec.condition_value {
            JsonValue::String(text) => CaseValue::Expr(ValueString::parse(text)?),
            other => CaseValue::Literal(other.clone()),
        };
        let mut variables = HashMap::new();
        for v in &spec.variables {
            variables.insert(v.name.clone(), ValueString::parse(&v.value)?);
        }
        Ok(Self {
            key: ValueString::parse(&spec.condition_key)?,
            operator: spec.condition_operator,
            value,
            variables,
        })
    }

    pub fn from_parts(
        key: &str,
        operator: OperatorSpec,
        value: &JsonValue,
    ) -> Result<Self, ExecError> {
        let value = match value {
            JsonValue::String(text) => CaseValue::Expr(ValueString::parse(text)?),
            other => CaseValue::Literal(other.clone()),
        };
        Ok(Self {
            key: ValueString::parse(key)?,
            operator,
            value,
            variables: HashMap::new(),
        })
    }

    pub fn variable(&self, name: &str) -> Result<&ValueString, ExecError> {
        self.variables
            .get(name)
            .ok_or_else(|| ExecError::Processing(format!("variable '{name}' doesn't exist")))
    }

    pub fn matches(&self, ctx: &EvalContext<'_>) -> Result<bool, ExecError> {
        let key = self.key.value(ctx)?;

        if self.operator == OperatorSpec::In {
            let values = match &self.value {
                CaseValue::Expr(expr) => expr.values(ctx)?,
                CaseValue::Literal(JsonValue::Array(items)) => items
                    .iter()
                    .map(|v| Some(value_to_string(v)))
                    .collect(),
                CaseValue::Literal(other) => vec![Some(value_to_string(other))],
            };
            debug!(key = %key, candidates = values.len(), "checking 'in' condition");
            return Ok(matches_in(&key, &values));
        }

        let value = match &self.value {
            CaseValue::Expr(expr) => expr.value(ctx)?,
            CaseValue::Literal(other) => value_to_string(other),
        };
        debug!(key = %key, operator = self.operator.symbol(), value = %value, "checking condition");
        compare_strings(self.operator, &key, &value).map_err(ExecError::processing)
    }
}

/// An ordered case list; the first matching case wins.
#[derive(Debug, Clone, Default)]
pub struct Switch {
    cases: Vec<Case>,
}

impl Switch {
    pub fn compile(specs: &[CaseSpec]) -> Result<Self, ExecError> {
        let mut cases = Vec::new();
        for spec in specs {
            cases.push(Case::compile(spec)?);
        }
        Ok(Self { cases })
    }

    pub fn first_match(&self, ctx: &EvalContext<'_>) -> Result<Option<&Case>, ExecError> {
        for case in &self.cases {
            if case.matches(ctx)? {
                return Ok(Some(case));
            }
        }
        Ok(None)
    }
}
