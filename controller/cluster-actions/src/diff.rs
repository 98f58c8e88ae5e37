//! Structural diff over JSON-shaped Kubernetes objects

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffType {
    Added,
    Removed,
    Changed,
}

/// A single difference between two values, addressed by its path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffDetail {
    pub path: Vec<String>,
    pub formatted_path: String,
    pub diff_type: DiffType,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// Diff `old` against `new`, with paths rooted at `root`.
///
/// Objects are compared key by key, arrays index by index. Scalars and
/// mismatched types are reported as a single change at their path.
pub fn diff_values(root: &str, old: &Value, new: &Value) -> Vec<DiffDetail> {
    let mut diffs = Vec::new();
    let mut path = vec![root.to_string()];
    walk(&mut path, old, new, &mut diffs);
    diffs
}

fn walk(path: &mut Vec<String>, old: &Value, new: &Value, out: &mut Vec<DiffDetail>) {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            for (key, old_value) in old_map {
                path.push(key.clone());
                match new_map.get(key) {
                    Some(new_value) => walk(path, old_value, new_value, out),
                    None => out.push(detail(path, DiffType::Removed, Some(old_value), None)),
                }
                path.pop();
            }
            for (key, new_value) in new_map {
                if !old_map.contains_key(key) {
                    path.push(key.clone());
                    out.push(detail(path, DiffType::Added, None, Some(new_value)));
                    path.pop();
                }
            }
        }
        (Value::Array(old_items), Value::Array(new_items)) => {
            let len = old_items.len().max(new_items.len());
            for index in 0..len {
                path.push(format!("[{}]", index));
                match (old_items.get(index), new_items.get(index)) {
                    (Some(o), Some(n)) => walk(path, o, n, out),
                    (Some(o), None) => out.push(detail(path, DiffType::Removed, Some(o), None)),
                    (None, Some(n)) => out.push(detail(path, DiffType::Added, None, Some(n))),
                    (None, None) => {}
                }
                path.pop();
            }
        }
        _ if old != new => out.push(detail(path, DiffType::Changed, Some(old), Some(new))),
        _ => {}
    }
}

fn detail(
    path: &[String],
    diff_type: DiffType,
    old: Option<&Value>,
    new: Option<&Value>,
) -> DiffDetail {
    DiffDetail {
        path: path.to_vec(),
        formatted_path: format_path(path),
        diff_type,
        old: old.cloned(),
        new: new.cloned(),
    }
}

/// `["spec", "template", "containers", "[0]", "image"]` -> `spec.template.containers[0].image`
pub fn format_path(path: &[String]) -> String {
    let mut formatted = String::new();
    for segment in path {
        if !formatted.is_empty() && !segment.starts_with('[') {
            formatted.push('.');
        }
        formatted.push_str(segment);
    }
    formatted
}

/// A diff matches when any pattern is a substring of its formatted path.
pub fn is_matching_diff(diff: &DiffDetail, patterns: &[String]) -> bool {
    patterns
        .iter()
        .any(|pattern| diff.formatted_path.contains(pattern.as_str()))
}

/// True when `new_spec` differs from `old_spec` outside the ignored patterns.
/// A missing previous spec always counts as a change.
pub fn spec_changed(new_spec: &Value, old_spec: Option<&Value>, ignored_changes: &[String]) -> bool {
    let Some(old_spec) = old_spec else {
        return true;
    };

    diff_values("spec", old_spec, new_spec)
        .iter()
        .any(|diff| !is_matching_diff(diff, ignored_changes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_changes_are_addressed_by_path() {
        let old = json!({
            "replicas": 2,
            "template": { "containers": [{ "image": "web:1" }] }
        });
        let new = json!({
            "replicas": 3,
            "template": { "containers": [{ "image": "web:2" }, { "image": "sidecar:1" }] },
            "paused": true
        });

        let diffs = diff_values("spec", &old, &new);
        let paths: Vec<&str> = diffs.iter().map(|d| d.formatted_path.as_str()).collect();

        assert!(paths.contains(&"spec.replicas"));
        assert!(paths.contains(&"spec.template.containers[0].image"));
        assert!(paths.contains(&"spec.template.containers[1]"));
        assert!(paths.contains(&"spec.paused"));
        assert_eq!(diffs.len(), 4);

        let replicas = diffs
            .iter()
            .find(|d| d.formatted_path == "spec.replicas")
            .unwrap();
        assert_eq!(replicas.diff_type, DiffType::Changed);
        assert_eq!(replicas.old, Some(json!(2)));
        assert_eq!(replicas.new, Some(json!(3)));
    }

    #[test]
    fn test_removed_keys_are_reported() {
        let diffs = diff_values("spec", &json!({ "a": 1, "b": 2 }), &json!({ "a": 1 }));
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].diff_type, DiffType::Removed);
        assert_eq!(diffs[0].formatted_path, "spec.b");
    }

    #[test]
    fn test_identical_values_have_no_diff() {
        let value = json!({ "maxReplicas": 5, "scaleTargetRef": { "name": "web" } });
        assert!(diff_values("spec", &value, &value).is_empty());
    }

    #[test]
    fn test_spec_changed_respects_ignored_patterns() {
        let old = json!({ "replicas": 2, "image": "web:1" });
        let new = json!({ "replicas": 3, "image": "web:1" });

        assert!(spec_changed(&new, Some(&old), &[]));
        assert!(!spec_changed(&new, Some(&old), &["replicas".to_string()]));
        assert!(spec_changed(&new, None, &["replicas".to_string()]));
    }
}
