use std::path::Path;

use kdl::{KdlDocument, KdlNode};

use crate::privilege::errors::PrivilegeError;
use crate::privilege::types::PolicyEntry;

/// Load the ordered privilege entries for one object from a `.kdl` file.
pub fn load_entries(path: &Path) -> Result<Vec<PolicyEntry>, PrivilegeError> {
    let contents = std::fs::read_to_string(path).map_err(|source| PrivilegeError::PolicyLoad {
        path: path.display().to_string(),
        source,
    })?;
    let entries = parse_entries(&contents)?;

    tracing::info!(
        path = %path.display(),
        entries = entries.len(),
        "Loaded privilege policy entries"
    );

    Ok(entries)
}

/// Parse a KDL document of `entry` nodes, keeping document order.
///
/// ```kdl
/// entry "allow-local-admins" disabled=#true
/// entry "client-admins" value="alice,EXAMPLE\\bob"
/// entry "client-admins" {
///     - "%sales team"
/// }
/// ```
pub fn parse_entries(source: &str) -> Result<Vec<PolicyEntry>, PrivilegeError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| PrivilegeError::KdlParse(e.to_string()))?;

    let mut entries = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "entry" => entries.push(parse_entry(node)?),
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(entries)
}

fn parse_entry(node: &KdlNode) -> Result<PolicyEntry, PrivilegeError> {
    let key = first_string_arg(node).ok_or_else(|| {
        PrivilegeError::InvalidEntry(
            "entry node requires a key argument (e.g. entry \"client-admins\")".into(),
        )
    })?;

    let disabled = match node.get("disabled") {
        None => false,
        Some(v) => v.as_bool().ok_or_else(|| {
            PrivilegeError::InvalidEntry(format!(
                "entry `{key}` has a non-boolean `disabled` property (use #true or #false)"
            ))
        })?,
    };

    let mut lines = Vec::new();
    match node.get("value") {
        None => {}
        Some(v) => {
            let value = v.as_string().ok_or_else(|| {
                PrivilegeError::InvalidEntry(format!("entry `{key}` has a non-string `value`"))
            })?;
            lines.push(value.to_string());
        }
    }
    lines.extend(dash_list(node));

    Ok(PolicyEntry::new(&key, lines.join("\n"), disabled))
}

fn first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Children named `-` with a string argument, in order.
fn dash_list(node: &KdlNode) -> Vec<String> {
    let Some(children) = node.children() else {
        return Vec::new();
    };
    children
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "-")
        .filter_map(first_string_arg)
        .collect()
}
