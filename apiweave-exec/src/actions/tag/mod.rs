mod handler;
mod processor;

pub use handler::TagWriteHandler;

use std::sync::Arc;

use apiweave_core::types::{
    DataTypeSpec, DerivedSpec, RenameSpec, TagActionSpec, TagMode, TagSpec, UdtSpec,
};
use apiweave_core::{EvalContext, ValueString};
use apiweave_store::TagDataType;

use crate::condition::Switch;
use crate::error::ExecError;

use super::{CompileCtx, Dispatch, VariableAction};

/// Maps a response into the live-value store: plain text, switch cases, or
/// the recursive JSON walk with composite-group inference.
pub struct TagAction {
    pub(crate) mode: TagMode,
    pub(crate) path: ValueString,
    pub(crate) filter: Option<ValueString>,
    pub(crate) udts: Vec<Udt>,
    pub(crate) tags: Vec<TagDecl>,
    pub(crate) renames: Vec<Rename>,
    pub(crate) switch: Switch,
}

pub(crate) struct Udt {
    pub id: String,
    pub def_path: ValueString,
    pub items: ValueString,
    pub name: ValueString,
    pub tags: Vec<TagDecl>,
}

pub(crate) struct TagDecl {
    pub items: ValueString,
    pub path: ValueString,
    pub name: ValueString,
    pub data_type: TagDataType,
    pub default_value: Option<ValueString>,
    pub value: Option<ValueString>,
    pub expression: Option<String>,
    pub derived: Option<DerivedSpec>,
    pub handler: Option<Arc<TagHandlerDecl>>,
    pub add_if_not_exists: bool,
}

pub struct TagHandlerDecl {
    pub function: Option<String>,
    pub reset: bool,
    pub variables: Vec<VariableAction>,
}

impl TagHandlerDecl {
    /// A handler with no behavior degrades to the default echo write.
    pub fn is_trivial(&self) -> bool {
        self.function.is_none() && !self.reset && self.variables.is_empty()
    }
}

pub(crate) struct Rename {
    pub items: ValueString,
    pub name: ValueString,
}

impl TagAction {
    pub fn compile(spec: &TagActionSpec, ctx: CompileCtx<'_>) -> Result<Self, ExecError> {
        let mut udts = Vec::with_capacity(spec.udts.len());
        for udt in &spec.udts {
            udts.push(Udt::compile(udt, ctx)?);
        }

        Ok(Self {
            mode: spec.r#type,
            path: ValueString::parse(spec.path.as_deref().unwrap_or(ctx.api_name))?,
            filter: spec.filter.as_deref().map(ValueString::parse).transpose()?,
            udts,
            tags: TagDecl::compile_all(&spec.tags)?,
            renames: spec
                .rename
                .iter()
                .map(Rename::compile)
                .collect::<Result<_, _>>()?,
            switch: Switch::compile(&spec.cases)?,
        })
    }

    pub async fn handle(&self, d: &Dispatch<'_>) -> Result<(), ExecError> {
        processor::process(self, d).await
    }

    pub(crate) fn udt(&self, id: &str) -> Option<&Udt> {
        self.udts.iter().find(|u| u.id == id)
    }
}

impl Udt {
    fn compile(spec: &UdtSpec, ctx: CompileCtx<'_>) -> Result<Self, ExecError> {
        let def_path = spec
            .def_path
            .clone()
            .unwrap_or_else(|| format!("{}/{}", ctx.api_name, spec.id));
        Ok(Self {
            id: spec.id.clone(),
            def_path: ValueString::parse(&def_path)?,
            items: items_or_null(spec.items.as_deref())?,
            name: ValueString::parse(spec.name.as_deref().unwrap_or(&spec.id))?,
            tags: TagDecl::compile_all(&spec.tags)?,
        })
    }
}

impl TagDecl {
    fn compile_all(specs: &[TagSpec]) -> Result<Vec<Self>, ExecError> {
        specs.iter().map(Self::compile).collect()
    }

    fn compile(spec: &TagSpec) -> Result<Self, ExecError> {
        let handler = match &spec.handler {
            Some(h) => Some(Arc::new(TagHandlerDecl {
                function: h.function.clone(),
                reset: h.reset,
                variables: VariableAction::compile_all(&h.variables)?,
            })),
            None => None,
        };
        Ok(Self {
            items: items_or_null(spec.items.as_deref())?,
            path: ValueString::parse(spec.path.as_deref().unwrap_or(""))?,
            name: ValueString::parse(&spec.name)?,
            data_type: convert_data_type(spec.data_type),
            default_value: spec
                .default_value
                .as_deref()
                .map(ValueString::parse)
                .transpose()?,
            value: spec.value.as_deref().map(ValueString::parse).transpose()?,
            expression: spec.expression.clone(),
            derived: spec.derived.clone(),
            handler,
            add_if_not_exists: spec.add_if_not_exists,
        })
    }

    /// `<path>/<name>` with the leading segment omitted when empty.
    pub fn tag_path(&self, ctx: &EvalContext<'_>) -> Result<String, ExecError> {
        let path = self.path.value(ctx)?;
        let name = self.name.value(ctx)?;
        if path.is_empty() {
            Ok(name)
        } else {
            Ok(format!("{path}/{name}"))
        }
    }
}

impl Rename {
    fn compile(spec: &RenameSpec) -> Result<Self, ExecError> {
        Ok(Self {
            items: items_or_null(spec.items.as_deref())?,
            name: ValueString::parse(&spec.name)?,
        })
    }
}

fn items_or_null(items: Option<&str>) -> Result<ValueString, ExecError> {
    Ok(match items {
        Some(text) => ValueString::parse(text)?,
        None => ValueString::null_item(),
    })
}

pub(crate) fn convert_data_type(spec: DataTypeSpec) -> TagDataType {
    match spec {
        DataTypeSpec::String => TagDataType::String,
        DataTypeSpec::Int => TagDataType::Int,
        DataTypeSpec::Float => TagDataType::Float,
        DataTypeSpec::Boolean => TagDataType::Boolean,
        DataTypeSpec::DateTime => TagDataType::DateTime,
        DataTypeSpec::Json => TagDataType::Json,
    }
}
