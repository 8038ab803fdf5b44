//! AST transforms for pipeline graphs.
//!
//! Processes the pipeline graph after parsing: applies stylesheets, inlines prompt files,
//! and expands variable references, in that order.

use std::collections::HashMap;

use attractor_dot::AttributeValue;

use crate::graph::{PipelineGraph, PipelineNode};
use crate::stylesheet::{apply_stylesheet, parse_stylesheet};

/// Apply all transforms to a pipeline graph in the correct order.
pub fn apply_transforms(graph: &mut PipelineGraph) -> attractor_types::Result<()> {
    apply_model_stylesheet(graph)?;
    inline_prompt_files(graph)?;
    expand_all_variables(graph);
    Ok(())
}

/// Apply model stylesheet from graph attributes.
fn apply_model_stylesheet(graph: &mut PipelineGraph) -> attractor_types::Result<()> {
    let stylesheet_str = graph
        .attrs
        .get("model_stylesheet")
        .and_then(|v| match v {
            AttributeValue::String(s) => Some(s.clone()),
            _ => None,
        });

    if let Some(css) = stylesheet_str {
        let stylesheet = parse_stylesheet(&css)?;
        apply_stylesheet(graph, &stylesheet);
    }

    Ok(())
}

/// Inline `@path`-prefixed prompts by reading the referenced file's contents.
///
/// `path` is resolved relative to `graph._prompt_base` if set, else the process's cwd.
/// A missing file is a hard error, per node, surfaced immediately.
fn inline_prompt_files(graph: &mut PipelineGraph) -> attractor_types::Result<()> {
    let base = match graph.attrs.get("_prompt_base") {
        Some(AttributeValue::String(s)) => std::path::PathBuf::from(s),
        _ => std::env::current_dir().unwrap_or_default(),
    };

    for node in graph.all_nodes_mut() {
        let Some(prompt) = node.prompt.clone() else {
            continue;
        };
        if let Some(rel) = prompt.strip_prefix('@') {
            let path = base.join(rel);
            let contents = std::fs::read_to_string(&path).map_err(attractor_types::AttractorError::Io)?;
            node.prompt = Some(contents);
        }
    }

    Ok(())
}

/// Build a string-valued substitution map from a typed attribute bag.
fn attrs_to_vars(attrs: &HashMap<String, AttributeValue>) -> HashMap<String, String> {
    attrs
        .iter()
        .filter_map(|(k, v)| match v {
            AttributeValue::String(s) => Some((k.clone(), s.clone())),
            AttributeValue::Integer(i) => Some((k.clone(), i.to_string())),
            AttributeValue::Boolean(b) => Some((k.clone(), b.to_string())),
            AttributeValue::Float(f) => Some((k.clone(), f.to_string())),
            AttributeValue::Duration(_) => None,
        })
        .collect()
}

/// Write an expanded value back into the node's known typed field, if `key` names one.
/// Unrecognized keys still land in `raw_attrs`, which the caller updates separately.
fn sync_known_node_field(node: &mut PipelineNode, key: &str, value: &str) {
    match key {
        "label" => node.label = value.to_string(),
        "prompt" => node.prompt = Some(value.to_string()),
        "llm_model" => node.llm_model = Some(value.to_string()),
        "llm_provider" => node.llm_provider = Some(value.to_string()),
        "reasoning_effort" => node.reasoning_effort = Some(value.to_string()),
        "retry_target" => node.retry_target = Some(value.to_string()),
        "fallback_retry_target" => node.fallback_retry_target = Some(value.to_string()),
        "fidelity" | "fidelity.mode" => node.fidelity = Some(value.to_string()),
        "thread_id" | "fidelity.thread_id" => node.thread_id = Some(value.to_string()),
        _ => {}
    }
}

/// Expand `$key`/`${key}` across every string-typed attribute on every node and edge.
///
/// Each node resolves its own attributes first, falling back to the graph's. Edges only carry
/// a handful of typed string fields (no raw attribute bag), so those are expanded directly.
fn expand_all_variables(graph: &mut PipelineGraph) {
    let graph_vars = attrs_to_vars(&graph.attrs);

    for node in graph.all_nodes_mut() {
        let mut vars = graph_vars.clone();
        vars.extend(attrs_to_vars(&node.raw_attrs));

        let keys: Vec<String> = node.raw_attrs.keys().cloned().collect();
        for key in keys {
            let Some(AttributeValue::String(current)) = node.raw_attrs.get(&key).cloned() else {
                continue;
            };
            let expanded = expand_variables(&current, &vars);
            if expanded != current {
                node.raw_attrs
                    .insert(key.clone(), AttributeValue::String(expanded.clone()));
                sync_known_node_field(node, &key, &expanded);
            }
        }
    }

    let node_vars: HashMap<String, HashMap<String, String>> = graph
        .all_nodes()
        .map(|n| (n.id.clone(), attrs_to_vars(&n.raw_attrs)))
        .collect();

    for edge in graph.all_edges_mut() {
        let mut vars = graph_vars.clone();
        if let Some(from_node_vars) = node_vars.get(&edge.from) {
            vars.extend(from_node_vars.clone());
        }
        if let Some(label) = &edge.label {
            edge.label = Some(expand_variables(label, &vars));
        }
        if let Some(condition) = &edge.condition {
            edge.condition = Some(expand_variables(condition, &vars));
        }
    }
}

fn is_key_start(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Expand `$key` and `${key}` patterns in a string.
///
/// Replaces each occurrence with the corresponding value from `vars`. Variables that do not
/// appear in `vars` are left as the literal `$key` (or `${key}`) text — unknown keys are not
/// an error.
pub fn expand_variables(template: &str, vars: &HashMap<String, String>) -> String {
    let chars: Vec<char> = template.chars().collect();
    let mut result = String::with_capacity(template.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '$' {
            result.push(chars[i]);
            i += 1;
            continue;
        }

        if chars.get(i + 1) == Some(&'{') {
            if let Some(rel_end) = chars[i + 2..].iter().position(|&c| c == '}') {
                let key: String = chars[i + 2..i + 2 + rel_end].iter().collect();
                match vars.get(&key) {
                    Some(v) => result.push_str(v),
                    None => {
                        result.push_str("${");
                        result.push_str(&key);
                        result.push('}');
                    }
                }
                i = i + 2 + rel_end + 1;
                continue;
            }
        } else if chars.get(i + 1).copied().is_some_and(is_key_start) {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && is_key_char(chars[end]) {
                end += 1;
            }
            let key: String = chars[start..end].iter().collect();
            match vars.get(&key) {
                Some(v) => result.push_str(v),
                None => {
                    result.push('$');
                    result.push_str(&key);
                }
            }
            i = end;
            continue;
        }

        result.push('$');
        i += 1;
    }

    result
}
