//! Path operations on a JSON tree.
//!
//! Shared by the store backends: the memory store keeps one tree for the
//! whole database, the SQLite store keeps one tree per record.

use serde_json::{Map, Value};

use super::types::is_deletion;

/// Split a slash-separated path into its segments, ignoring empty ones.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Join a patch root and a relative path.
pub fn join(root: &str, relative: &str) -> String {
    let root = root.trim_matches('/');
    let relative = relative.trim_matches('/');
    match (root.is_empty(), relative.is_empty()) {
        (true, _) => relative.to_string(),
        (false, true) => root.to_string(),
        (false, false) => format!("{}/{}", root, relative),
    }
}

pub fn get<'a>(root: &'a Value, segs: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for seg in segs {
        node = node.as_object()?.get(*seg)?;
    }
    Some(node)
}

/// Write `value` at `segs`, creating intermediate objects. Writing a
/// deletion value removes the path instead.
pub fn set(root: &mut Value, segs: &[&str], value: Value) {
    if is_deletion(&value) {
        remove(root, segs);
        return;
    }
    let Some((last, parents)) = segs.split_last() else {
        *root = value;
        return;
    };
    let mut node = root;
    for seg in parents {
        node = ensure_object(node)
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(node).insert(last.to_string(), value);
}

/// Remove the value at `segs` and prune ancestors left empty.
pub fn remove(root: &mut Value, segs: &[&str]) {
    let Some((first, rest)) = segs.split_first() else {
        *root = Value::Object(Map::new());
        return;
    };
    let Some(map) = root.as_object_mut() else {
        return;
    };
    if rest.is_empty() {
        map.remove(*first);
        return;
    }
    let emptied = match map.get_mut(*first) {
        Some(child) => {
            remove(child, rest);
            is_deletion(child)
        }
        None => false,
    };
    if emptied {
        map.remove(*first);
    }
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced by an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut root = json!({});
        set(&mut root, &["cls", "1-1", "voted"], json!(true));
        assert_eq!(root, json!({"cls": {"1-1": {"voted": true}}}));
    }

    #[test]
    fn test_set_deletion_value_removes() {
        let mut root = json!({"jobs_queued": {"a": true, "b": true}});
        set(&mut root, &["jobs_queued", "a"], json!({}));
        assert_eq!(root, json!({"jobs_queued": {"b": true}}));
    }

    #[test]
    fn test_remove_prunes_empty_parents() {
        let mut root = json!({"cls_pending": {"1-1": true}, "jobs": {}});
        remove(&mut root, &["cls_pending", "1-1"]);
        assert!(get(&root, &["cls_pending"]).is_none());
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut root = json!({"a": {"b": 1}});
        remove(&mut root, &["a", "c", "d"]);
        assert_eq!(root, json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "cls/1-1"), "cls/1-1");
        assert_eq!(join("cls", "1-1/voted"), "cls/1-1/voted");
        assert_eq!(join("/cls/", ""), "cls");
    }
}
