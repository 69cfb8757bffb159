use std::collections::HashMap;

use apiweave_core::EvalContext;
use apiweave_store::{TagDataType, UdtDefinition, UdtInstance, UdtMember};
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use crate::actions::Dispatch;
use crate::error::ExecError;

use super::{TagAction, TagDecl, TagWriteHandler, Udt};
use apiweave_core::types::TagMode;

/// Lookup tables built before the walk, keyed by normalized JSON paths
/// (`$['a'][0]`) — the *original* structural locations, not final paths.
#[derive(Default)]
struct Lookups {
    renames: HashMap<String, String>,
    udts: HashMap<String, UdtRef>,
}

struct UdtRef {
    id: String,
    name: String,
}

impl UdtRef {
    fn display_name(&self) -> Option<&str> {
        (!self.name.is_empty()).then_some(self.name.as_str())
    }
}

/// One node of the computed tree: target path, source location, leaf value,
/// group id, children.
struct ParseNode {
    tag_path: String,
    value: Option<JsonValue>,
    udt: Option<String>,
    children: Vec<ParseNode>,
}

/// Rename substitutions discovered during the walk: original location →
/// (original path, renamed path), applied to declared-field targets.
type RenameSubs = HashMap<String, (String, String)>;

#[derive(Default)]
struct UdtBuild {
    /// Definitions in first-seen (leaf-first) order to support composition.
    defs: Vec<(String, UdtDefinition)>,
    instances: Vec<UdtInstance>,
    /// Every group occurrence (id, instance path), nested included.
    configured: Vec<(String, String)>,
}

pub(super) async fn process(action: &TagAction, d: &Dispatch<'_>) -> Result<(), ExecError> {
    let base_ctx = d.eval_ctx();
    let prefix = action.path.value(&base_ctx)?;
    let parent_path = normalize_parent(&prefix);

    debug!(prefix = %prefix, "processing tags");

    let mut response = d.response.to_string();
    if let Some(filter) = &action.filter {
        match filter.value_as_json(&base_ctx) {
            Ok(value) => {
                response = render_filter(value);
                debug!(response = %response, "filtered response");
            }
            Err(e) => {
                debug!(error = %e, "skipping response, error with filter");
                return Ok(());
            }
        }
    }

    match action.mode {
        TagMode::Text => {
            d.api
                .ctx
                .tags
                .tag_update(&format!("{parent_path}Value"), json!(response))
                .await?;
        }
        TagMode::Switch => {
            let ctx = ctx_with(d, &response, None);
            if let Some(case) = action.switch.first_match(&ctx)? {
                let path = case.variable("path")?.value(&ctx)?;
                let value = case.variable("value")?.value(&ctx)?;
                d.api
                    .ctx
                    .tags
                    .tag_update(&format!("{parent_path}{path}"), json!(value))
                    .await?;
            }
        }
        TagMode::Jsonexpand | TagMode::Jsonwrite => {
            process_json(action, d, &prefix, &parent_path, &response).await?;
        }
    }
    Ok(())
}

async fn process_json(
    action: &TagAction,
    d: &Dispatch<'_>,
    prefix: &str,
    parent_path: &str,
    response: &str,
) -> Result<(), ExecError> {
    let expand = action.mode == TagMode::Jsonexpand;
    let lookups = build_lookups(action, d, response)?;

    let doc: JsonValue = serde_json::from_str(response)
        .unwrap_or_else(|_| JsonValue::String(response.to_string()));

    let mut subs = RenameSubs::new();
    let nodes = build_tree(prefix, parent_path, &doc, expand, &lookups, &mut subs);

    let mut build = UdtBuild::default();
    if !lookups.udts.is_empty() {
        let ctx = ctx_with(d, response, None);
        create_udts(action, &ctx, d, response, &nodes, false, &subs, &mut build)?;

        // Definitions before instances, in first-seen order, so composed
        // parents resolve their nested members.
        for (_, def) in &build.defs {
            d.api.ctx.tags.register_udt_definition(def.clone()).await?;
        }
        for instance in &build.instances {
            d.api.ctx.tags.register_udt_instance(instance.clone()).await?;
        }
    }

    let mut writes = Vec::new();
    collect_writes(&nodes, &mut writes);
    for (path, value) in writes {
        d.api.ctx.tags.tag_update(&path, value).await?;
    }

    for (id, instance_path) in &build.configured {
        if let Some(udt) = action.udt(id) {
            register_tags(d, response, instance_path, &udt.tags, false, &subs).await?;
        }
    }

    register_tags(
        d,
        response,
        parent_path.trim_end_matches('/'),
        &action.tags,
        true,
        &subs,
    )
    .await?;

    Ok(())
}

fn build_lookups(
    action: &TagAction,
    d: &Dispatch<'_>,
    response: &str,
) -> Result<Lookups, ExecError> {
    let mut lookups = Lookups::default();
    let ctx = ctx_with(d, response, None);

    for rename in &action.renames {
        for item in rename.items.values(&ctx)? {
            let Some(item) = item else { continue };
            let item_ctx = ctx_with(d, response, Some(&item));
            match rename.name.value(&item_ctx) {
                Ok(name) => {
                    lookups.renames.insert(item, name);
                }
                Err(e) => debug!(error = %e, "error getting rename name value"),
            }
        }
    }

    for udt in &action.udts {
        for item in udt.items.values(&ctx)? {
            let Some(item) = item else { continue };
            let item_ctx = ctx_with(d, response, Some(&item));
            let name = udt.name.value(&item_ctx)?;
            lookups.udts.insert(
                item,
                UdtRef {
                    id: udt.id.clone(),
                    name,
                },
            );
        }
    }

    debug!(
        renames = lookups.renames.len(),
        udts = lookups.udts.len(),
        "built lookup tables"
    );
    Ok(lookups)
}

/// Pure pass: turn the (filtered) document into the node tree, applying
/// rename/group display names and recording rename path substitutions.
fn build_tree(
    prefix: &str,
    parent_path: &str,
    doc: &JsonValue,
    expand: bool,
    lookups: &Lookups,
    subs: &mut RenameSubs,
) -> Vec<ParseNode> {
    // A group declared at the document root wraps everything beneath one
    // named node.
    if let Some(udt) = lookups.udts.get("$") {
        let fallback = lookups
            .renames
            .get("$")
            .map(String::as_str)
            .unwrap_or("value");
        let name = udt.display_name().unwrap_or(fallback);
        let new_prefix = format!("{parent_path}{name}");
        if lookups.renames.contains_key("$") {
            let orig = format!("{parent_path}{}", udt.display_name().unwrap_or("value"));
            subs.insert("$".to_string(), (orig, new_prefix.clone()));
        }
        return vec![ParseNode {
            tag_path: new_prefix.clone(),
            value: None,
            udt: Some(udt.id.clone()),
            children: walk_children(&new_prefix, "$", doc, true, lookups, subs),
        }];
    }

    walk_children(prefix, "$", doc, expand, lookups, subs)
}

fn walk_children(
    prefix: &str,
    json_path: &str,
    input: &JsonValue,
    expand: bool,
    lookups: &Lookups,
    subs: &mut RenameSubs,
) -> Vec<ParseNode> {
    let parent = normalize_parent(prefix);
    let mut nodes = Vec::new();

    match input {
        JsonValue::Object(map) => {
            for (key, value) in map {
                let child_path = format!("{json_path}['{key}']");
                push_node(&mut nodes, &parent, &child_path, key, value, expand, lookups, subs);
            }
        }
        JsonValue::Array(items) => {
            for (i, value) in items.iter().enumerate() {
                let child_path = format!("{json_path}[{i}]");
                let key = i.to_string();
                push_node(&mut nodes, &parent, &child_path, &key, value, expand, lookups, subs);
            }
        }
        scalar => {
            if expand {
                let name = lookups
                    .renames
                    .get(json_path)
                    .map(String::as_str)
                    .unwrap_or("value");
                let new_prefix = format!("{parent}{name}");
                if lookups.renames.contains_key(json_path) {
                    subs.insert(
                        json_path.to_string(),
                        (format!("{parent}value"), new_prefix.clone()),
                    );
                }
                nodes.push(ParseNode {
                    tag_path: new_prefix,
                    value: (!scalar.is_null()).then(|| scalar.clone()),
                    udt: None,
                    children: Vec::new(),
                });
            }
        }
    }

    nodes
}

#[allow(clippy::too_many_arguments)]
fn push_node(
    nodes: &mut Vec<ParseNode>,
    parent: &str,
    json_path: &str,
    key: &str,
    value: &JsonValue,
    expand: bool,
    lookups: &Lookups,
    subs: &mut RenameSubs,
) {
    let udt = lookups.udts.get(json_path);
    let renamed = lookups.renames.get(json_path).map(String::as_str);
    let name = udt
        .and_then(UdtRef::display_name)
        .or(renamed)
        .unwrap_or(key);
    let new_prefix = format!("{parent}{name}");

    if lookups.renames.contains_key(json_path) {
        let orig_name = udt.and_then(UdtRef::display_name).unwrap_or(key);
        subs.insert(
            json_path.to_string(),
            (format!("{parent}{orig_name}"), new_prefix.clone()),
        );
    }

    let effective_expand = expand || udt.is_some();

    if value.is_object() || value.is_array() {
        let children = walk_children(&new_prefix, json_path, value, effective_expand, lookups, subs);
        nodes.push(ParseNode {
            tag_path: new_prefix,
            value: None,
            udt: udt.map(|u| u.id.clone()),
            children,
        });
    } else if effective_expand {
        nodes.push(ParseNode {
            tag_path: new_prefix,
            value: (!value.is_null()).then(|| value.clone()),
            udt: None,
            children: Vec::new(),
        });
    }
}

/// Bottom-up group inference: leaf groups first, parents composed from
/// nested definitions rather than flattened members.
#[allow(clippy::too_many_arguments)]
fn create_udts(
    action: &TagAction,
    ctx: &EvalContext<'_>,
    d: &Dispatch<'_>,
    response: &str,
    nodes: &[ParseNode],
    parent_is_udt: bool,
    subs: &RenameSubs,
    build: &mut UdtBuild,
) -> Result<(), ExecError> {
    for node in nodes {
        if !node.children.is_empty() {
            create_udts(
                action,
                ctx,
                d,
                response,
                &node.children,
                parent_is_udt || node.udt.is_some(),
                subs,
                build,
            )?;
        }

        let Some(id) = &node.udt else { continue };
        let Some(udt) = action.udt(id) else { continue };

        let def_path = udt.def_path.value(ctx)?;

        let mut members = Vec::new();
        collect_members(
            action,
            ctx,
            &format!("{}/", node.tag_path),
            &node.children,
            &mut members,
            &mut build.configured,
        )?;
        declared_members(udt, d, response, subs, &mut members)?;

        let def = match build.defs.iter_mut().find(|(i, _)| i == id) {
            Some((_, def)) => def,
            None => {
                build.defs.push((id.clone(), UdtDefinition::new(def_path.clone())));
                &mut build.defs.last_mut().expect("just pushed").1
            }
        };
        for member in members {
            add_member(def, member);
        }

        build.configured.push((id.clone(), node.tag_path.clone()));

        if !parent_is_udt {
            build.instances.push(UdtInstance {
                def_path,
                path: node.tag_path.clone(),
            });
        }
    }
    Ok(())
}

/// Fields of one group definition: non-group descendant leaves, plus nested
/// group boundaries as composed members.
fn collect_members(
    action: &TagAction,
    ctx: &EvalContext<'_>,
    remove_path: &str,
    children: &[ParseNode],
    members: &mut Vec<UdtMember>,
    configured: &mut Vec<(String, String)>,
) -> Result<(), ExecError> {
    for child in children {
        if let Some(id) = &child.udt {
            if let Some(udt) = action.udt(id) {
                let def_path = udt.def_path.value(ctx)?;
                members.push(UdtMember::Nested {
                    def_path,
                    path: relative_path(&child.tag_path, remove_path),
                });
                configured.push((id.clone(), child.tag_path.clone()));
            }
        } else if !child.children.is_empty() {
            collect_members(action, ctx, remove_path, &child.children, members, configured)?;
        } else if let Some(value) = &child.value {
            members.push(UdtMember::Value {
                path: relative_path(&child.tag_path, remove_path),
                data_type: TagDataType::of_value(value),
                default: None,
            });
        }
    }
    Ok(())
}

/// Group-local declared fields, with rename substitution applied to their
/// own targets.
fn declared_members(
    udt: &Udt,
    d: &Dispatch<'_>,
    response: &str,
    subs: &RenameSubs,
    members: &mut Vec<UdtMember>,
) -> Result<(), ExecError> {
    for tag in &udt.tags {
        let ctx = ctx_with(d, response, None);
        for item in tag.items.values(&ctx)? {
            let item_ctx = ctx_with(d, response, item.as_deref());
            let mut tag_path = tag.tag_path(&item_ctx)?;
            if let Some((orig, new)) = item.as_deref().and_then(|i| subs.get(i)) {
                tag_path = tag_path.replace(orig.as_str(), new.as_str());
            }

            let member = if let Some(expression) = &tag.expression {
                UdtMember::Expression {
                    path: tag_path,
                    data_type: tag.data_type,
                    expression: expression.clone(),
                }
            } else if let Some(derived) = &tag.derived {
                UdtMember::Derived {
                    path: tag_path,
                    data_type: tag.data_type,
                    source: derived.source.clone(),
                    read: derived.read.clone(),
                    write: derived.write.clone(),
                }
            } else {
                let default = tag
                    .default_value
                    .as_ref()
                    .map(|v| v.value(&item_ctx))
                    .transpose()?
                    .map(JsonValue::String);
                UdtMember::Value {
                    path: tag_path,
                    data_type: tag.data_type,
                    default,
                }
            };
            members.push(member);
        }
    }
    Ok(())
}

fn add_member(def: &mut UdtDefinition, member: UdtMember) {
    if def.members.iter().any(|m| m.path() == member.path()) {
        return;
    }
    def.members.push(member);
}

fn collect_writes(nodes: &[ParseNode], out: &mut Vec<(String, JsonValue)>) {
    for node in nodes {
        if let Some(value) = &node.value {
            out.push((node.tag_path.clone(), value.clone()));
        }
        collect_writes(&node.children, out);
    }
}

/// Declared (non-group) fields of the action, honoring add-if-not-exists
/// and installing write handlers.
async fn register_tags(
    d: &Dispatch<'_>,
    response: &str,
    parent_path: &str,
    tags: &[TagDecl],
    configure: bool,
    subs: &RenameSubs,
) -> Result<(), ExecError> {
    let parent = parent_path.trim_end_matches('/');

    for tag in tags {
        let ctx = ctx_with(d, response, None);
        for item in tag.items.values(&ctx)? {
            let item_ctx = ctx_with(d, response, item.as_deref());
            let relative = tag.tag_path(&item_ctx)?;
            let mut full = if parent.is_empty() {
                relative
            } else {
                format!("{parent}/{relative}")
            };
            if let Some((orig, new)) = item.as_deref().and_then(|i| subs.get(i)) {
                full = full.replace(orig.as_str(), new.as_str());
            }

            if !tag.add_if_not_exists && !d.api.ctx.tags.tag_exists(&full).await {
                continue;
            }

            if configure && tag.add_if_not_exists {
                d.api
                    .ctx
                    .tags
                    .configure_tag(&full, tag.data_type, None)
                    .await?;
            }

            if let Some(handler) = &tag.handler {
                if !handler.is_trivial() {
                    d.api
                        .ctx
                        .tags
                        .register_write_handler(
                            &full,
                            TagWriteHandler::install(d.api, parent, handler.clone()),
                        )
                        .await?;
                }
            }

            let write_default =
                tag.default_value.is_some() && d.api.ctx.tags.tag_is_null(&full).await;
            if write_default || tag.value.is_some() {
                let chosen = tag.default_value.as_ref().or(tag.value.as_ref());
                if let Some(chosen) = chosen {
                    let value = chosen.value(&item_ctx)?;
                    d.api.ctx.tags.tag_update(&full, json!(value)).await?;
                }
            }
        }
    }
    Ok(())
}

fn ctx_with<'a>(d: &'a Dispatch<'_>, response: &'a str, item: Option<&'a str>) -> EvalContext<'a> {
    EvalContext {
        scope: d.scope.as_deref(),
        resolver: d.api.as_ref(),
        response: Some(response),
        item,
    }
}

fn normalize_parent(prefix: &str) -> String {
    if prefix.is_empty() {
        String::new()
    } else if prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

fn relative_path(path: &str, remove: &str) -> String {
    path.strip_prefix(remove).unwrap_or(path).to_string()
}

fn render_filter(value: JsonValue) -> String {
    match value {
        JsonValue::String(s) => s,
        other => other.to_string(),
    }
}
