//! Parameter tree document and flattening
//!
//! The endpoint describes its address space as a recursive JSON document:
//!
//! ```text
//! { "CONTENTS": { "avatar": { "CONTENTS": { "change": { "TYPE": "s", "VALUE": ["avtr_..."] },
//!                                           "parameters": { "CONTENTS": { ... } } } } } }
//! ```
//!
//! A node carrying `CONTENTS` is internal; anything else is a leaf with
//! `TYPE`/`DEFAULT`/`RANGE`/`TAGS`/`VALUE`. The document comes from another
//! process and its depth is unbounded, so the walk uses an explicit stack.
//! Child order is the document's order (`serde_json` is built with
//! `preserve_order`).

use crate::error::{FitCheckError, Result};
use serde_json::{Map, Value};

const CONTENTS: &str = "CONTENTS";

/// A leaf of the parameter tree with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TreeLeaf {
    /// Prefix joined with every ancestor segment by `/`
    pub path: String,
    pub type_tag: Option<Value>,
    pub default: Option<Value>,
    pub range: Option<Value>,
    pub tags: Option<Value>,
    pub value: Option<Value>,
}

impl TreeLeaf {
    fn from_node(path: String, node: &Map<String, Value>) -> Self {
        Self {
            path,
            type_tag: node.get("TYPE").cloned(),
            default: node.get("DEFAULT").cloned(),
            range: node.get("RANGE").cloned(),
            tags: node.get("TAGS").cloned(),
            value: node.get("VALUE").cloned(),
        }
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Snapshot of the endpoint's parameter tree
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterTree {
    root: Value,
}

impl ParameterTree {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// Parse a tree document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Navigate `CONTENTS` mappings by segment name
    ///
    /// Fails with [`FitCheckError::TreeShape`] naming the first absent segment.
    pub fn node(&self, segments: &[&str]) -> Result<&Value> {
        let mut node = &self.root;
        let mut walked = String::new();
        for segment in segments {
            walked.push('/');
            walked.push_str(segment);
            node = node
                .get(CONTENTS)
                .and_then(|contents| contents.get(*segment))
                .ok_or_else(|| FitCheckError::TreeShape {
                    path: walked.clone(),
                    reason: "segment absent".to_string(),
                })?;
        }
        Ok(node)
    }
}

/// Flatten a tree node into its leaves, depth-first in document order
///
/// `prefix` is prepended to every path; with an empty prefix the first
/// segment is emitted without a leading `/`. Children that are not JSON
/// objects make the document malformed.
pub fn flatten(node: &Value, prefix: &str) -> Result<Vec<TreeLeaf>> {
    let mut leaves = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(prefix.to_string(), node)];

    while let Some((path, node)) = stack.pop() {
        let object = node.as_object().ok_or_else(|| FitCheckError::TreeShape {
            path: path.clone(),
            reason: "node is not an object".to_string(),
        })?;

        match object.get(CONTENTS) {
            Some(Value::Object(children)) => {
                // Reverse so the first child is popped first
                for (name, child) in children.iter().rev() {
                    let child_path = if path.is_empty() {
                        name.clone()
                    } else {
                        format!("{}/{}", path, name)
                    };
                    stack.push((child_path, child));
                }
            }
            Some(_) => {
                return Err(FitCheckError::TreeShape {
                    path,
                    reason: "CONTENTS is not a mapping".to_string(),
                });
            }
            None => leaves.push(TreeLeaf::from_node(path, object)),
        }
    }

    Ok(leaves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tree() -> Value {
        json!({
            "CONTENTS": {
                "avatar": {
                    "CONTENTS": {
                        "change": { "TYPE": "s", "VALUE": ["avtr_1"] },
                        "parameters": {
                            "CONTENTS": {
                                "Smile": { "TYPE": "T", "VALUE": [true] },
                                "FT": {
                                    "CONTENTS": {
                                        "v2": {
                                            "CONTENTS": {
                                                "EyeX": { "TYPE": "f", "VALUE": [0.5], "RANGE": [{"MIN": -1, "MAX": 1}] }
                                            }
                                        }
                                    }
                                },
                                "Hue": { "TYPE": "f", "VALUE": [0.25] }
                            }
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_flatten_document_order_and_paths() {
        let tree = ParameterTree::new(sample_tree());
        let params = tree.node(&["avatar", "parameters"]).unwrap();
        let leaves = flatten(params, "/avatar/parameters").unwrap();

        let paths: Vec<&str> = leaves.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/avatar/parameters/Smile",
                "/avatar/parameters/FT/v2/EyeX",
                "/avatar/parameters/Hue",
            ]
        );
        assert_eq!(leaves[1].name(), "EyeX");
        assert_eq!(leaves[1].range, Some(json!([{"MIN": -1, "MAX": 1}])));
        assert_eq!(leaves[0].type_tag, Some(json!("T")));
    }

    #[test]
    fn test_flatten_without_prefix() {
        let leaves = flatten(&sample_tree(), "").unwrap();
        assert_eq!(leaves[0].path, "avatar/change");
        assert_eq!(leaves.len(), 4);
    }

    #[test]
    fn test_flatten_leaf_root() {
        let leaves = flatten(&json!({"TYPE": "i", "VALUE": [1]}), "/single").unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].path, "/single");
    }

    #[test]
    fn test_flatten_is_deterministic_for_same_document() {
        let text = sample_tree().to_string();
        let a = flatten(&serde_json::from_str::<Value>(&text).unwrap(), "").unwrap();
        let b = flatten(&serde_json::from_str::<Value>(&text).unwrap(), "").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_flatten_deep_document_does_not_recurse() {
        // Built bottom-up so construction itself stays iterative
        let mut node = json!({"TYPE": "i", "VALUE": [7]});
        for _ in 0..50_000 {
            node = json!({ "CONTENTS": { "n": node } });
        }
        let leaves = flatten(&node, "").unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].value, Some(json!([7])));
        // Value's recursive Drop would overflow on this depth
        std::mem::forget(node);
    }

    #[test]
    fn test_flatten_rejects_non_object_child() {
        let doc = json!({"CONTENTS": {"a": 3}});
        assert!(matches!(flatten(&doc, ""), Err(FitCheckError::TreeShape { .. })));
    }

    #[test]
    fn test_node_missing_segment() {
        let tree = ParameterTree::new(json!({"CONTENTS": {"avatar": {"CONTENTS": {}}}}));
        match tree.node(&["avatar", "change"]) {
            Err(FitCheckError::TreeShape { path, .. }) => assert_eq!(path, "/avatar/change"),
            other => panic!("expected TreeShape, got {:?}", other),
        }
    }
}
