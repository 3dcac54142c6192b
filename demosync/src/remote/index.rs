//! Per-directory `index.json` files
//!
//! Each directory of the store gets an object mapping child names to file
//! sizes, with `{}` standing in for sub-directories.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::{RemoteNode, RemoteResult, RemoteStore};
use crate::logger;

pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Default)]
struct DirState {
    /// `None` for the store base
    mtime: Option<f64>,
    index_mtime: Option<f64>,
    children: Vec<RemoteNode>,
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn name_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

fn depth_of(path: &str) -> usize {
    if path.is_empty() {
        0
    } else {
        path.matches('/').count() + 1
    }
}

fn collect_dirs(nodes: &[RemoteNode]) -> BTreeMap<String, DirState> {
    let mut dirs: BTreeMap<String, DirState> = BTreeMap::new();
    dirs.insert(String::new(), DirState::default());
    for node in nodes.iter().filter(|n| n.is_dir) {
        dirs.entry(node.path.clone()).or_default().mtime = Some(node.mtime);
    }
    for node in nodes {
        let parent = dirs.entry(parent_of(&node.path).to_string()).or_default();
        if name_of(&node.path) == INDEX_FILE && !node.is_dir {
            parent.index_mtime = Some(node.mtime);
        } else {
            parent.children.push(node.clone());
        }
    }
    dirs
}

fn is_stale(state: &DirState) -> bool {
    let Some(index_mtime) = state.index_mtime else {
        return true;
    };
    state.mtime.is_some_and(|m| m > index_mtime)
        || state.children.iter().any(|child| child.mtime > index_mtime)
}

fn index_document(children: &[RemoteNode]) -> Value {
    let mut map = Map::new();
    for child in children {
        let name = name_of(&child.path);
        let value = if child.is_dir {
            Value::Object(Map::new())
        } else {
            Value::from(child.size)
        };
        map.insert(name.to_string(), value);
    }
    Value::Object(map)
}

/// Directories whose index must be regenerated
fn plan(nodes: &[RemoteNode], transferred: &[String]) -> Vec<(String, Value)> {
    let dirs = collect_dirs(nodes);
    let mut touched: BTreeSet<&str> = BTreeSet::new();
    for name in transferred {
        touched.insert("");
        let mut path = name.as_str();
        while !path.is_empty() {
            touched.insert(path);
            path = parent_of(path);
        }
    }

    let mut selected: Vec<(&String, &DirState)> = dirs
        .iter()
        .filter(|(path, state)| touched.contains(path.as_str()) || is_stale(state))
        .collect();
    // Deepest first: writing a child index touches the parent's listing
    selected.sort_by(|(a, _), (b, _)| depth_of(b).cmp(&depth_of(a)).then_with(|| a.cmp(b)));

    selected
        .into_iter()
        .map(|(path, state)| (path.clone(), index_document(&state.children)))
        .collect()
}

/// Rebuild out-of-date indexes; returns how many were written
pub async fn rebuild_indexes(store: &dyn RemoteStore, transferred: &[String]) -> RemoteResult<usize> {
    let nodes = store.walk().await?;
    let updates = plan(&nodes, transferred);

    for (dir, document) in &updates {
        let target = if dir.is_empty() {
            INDEX_FILE.to_string()
        } else {
            format!("{}/{}", dir, INDEX_FILE)
        };
        crate::log_debug!(&format!("Writing {}", target), "index");
        store
            .write_file(&target, document.to_string().as_bytes())
            .await?;
    }

    logger::log_info(
        &format!("Rebuilt {} directory indexes", updates.len()),
        Some("index"),
    );
    Ok(updates.len())
}
