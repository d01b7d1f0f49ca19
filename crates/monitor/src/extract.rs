//! Structured output extraction from a job record.
//!
//! Turns the heterogeneous per-node `outputs` payload into a stable
//! [`ExtractionResult`]: a flattened list of artifact filenames plus a
//! per-node view. A node that only produced images gets a bare filename
//! list; as soon as any other output kind is present the node's entry
//! becomes a mapping with `"images"` holding the filename list.
//!
//! Extraction is purely structural -- no artifact is downloaded or
//! validated here.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use promptwatch_comfyui::history::{ImageRef, JobRecord};

/// Structured outputs of one completed job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionResult {
    /// Every artifact filename, in node-then-image encounter order.
    pub output_files: Vec<String>,

    /// Per-node outputs in first-insertion order of node ids. Nodes
    /// that produced nothing are omitted.
    pub per_node: IndexMap<String, NodeArtifacts>,
}

/// Outputs of a single node.
///
/// Serializes untagged, so a bare file list renders as a JSON array and
/// a mixed node as an object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NodeArtifacts {
    /// The node's only output kind was `"images"`.
    Files(Vec<String>),

    /// The node produced additional output kinds. When images are
    /// present, the `"images"` key holds their filename list; other
    /// kinds keep their raw values.
    Mixed(IndexMap<String, Value>),
}

/// Extract the structured outputs of one job record.
///
/// Absent or empty `outputs` produce an empty result. Within a node,
/// `"images"` entries missing a `filename` are skipped, and a non-array
/// `"images"` value contributes no filenames.
pub fn extract_outputs(record: &JobRecord) -> ExtractionResult {
    let mut output_files = Vec::new();
    let mut per_node = IndexMap::new();

    for (node_id, node_output) in &record.outputs {
        let mut node_files = Vec::new();
        if let Some(Value::Array(images)) = node_output.get("images") {
            for image in images {
                if let Some(filename) = image.get("filename").and_then(Value::as_str) {
                    node_files.push(filename.to_string());
                    output_files.push(filename.to_string());
                }
            }
        }

        let mut entry = if node_files.is_empty() {
            None
        } else {
            Some(NodeArtifacts::Files(node_files))
        };

        for (kind, value) in node_output {
            if kind == "images" {
                continue;
            }
            // Any non-image kind promotes the entry to a mapping, with
            // previously collected filenames preserved under "images".
            let mut map = match entry.take() {
                Some(NodeArtifacts::Files(files)) => {
                    let mut map = IndexMap::new();
                    map.insert("images".to_string(), Value::from(files));
                    map
                }
                Some(NodeArtifacts::Mixed(map)) => map,
                None => IndexMap::new(),
            };
            map.insert(kind.clone(), value.clone());
            entry = Some(NodeArtifacts::Mixed(map));
        }

        if let Some(artifacts) = entry {
            per_node.insert(node_id.clone(), artifacts);
        }
    }

    ExtractionResult {
        output_files,
        per_node,
    }
}

/// Collect every artifact reference in a record's outputs, in
/// node-then-image encounter order.
///
/// Feeds the `/view` download step after extraction. Entries that do
/// not deserialize as an [`ImageRef`] (missing `filename`, wrong type)
/// are skipped, mirroring the filename rule in [`extract_outputs`].
pub fn collect_image_refs(record: &JobRecord) -> Vec<ImageRef> {
    let mut refs = Vec::new();
    for node_output in record.outputs.values() {
        if let Some(Value::Array(images)) = node_output.get("images") {
            for image in images {
                if let Ok(image) = serde_json::from_value::<ImageRef>(image.clone()) {
                    refs.push(image);
                }
            }
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn record(json: &str) -> JobRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn absent_outputs_yield_empty_result() {
        let result = extract_outputs(&record("{}"));
        assert!(result.output_files.is_empty());
        assert!(result.per_node.is_empty());
    }

    #[test]
    fn image_only_node_becomes_bare_file_list() {
        let result = extract_outputs(&record(
            r#"{"outputs": {"9": {"images": [{"filename": "a.png", "subfolder": "", "type": "output"}]}}}"#,
        ));
        assert_eq!(result.output_files, ["a.png"]);
        assert_eq!(
            result.per_node["9"],
            NodeArtifacts::Files(vec!["a.png".to_string()])
        );
    }

    #[test]
    fn extra_kind_promotes_entry_to_mapping() {
        let result = extract_outputs(&record(
            r#"{"outputs": {"9": {
                "images": [{"filename": "a.png"}],
                "text": ["hi"]
            }}}"#,
        ));
        assert_eq!(result.output_files, ["a.png"]);
        assert_eq!(
            serde_json::to_value(&result.per_node["9"]).unwrap(),
            serde_json::json!({"images": ["a.png"], "text": ["hi"]}),
        );
    }

    #[test]
    fn non_image_only_node_becomes_mapping_without_images() {
        let result = extract_outputs(&record(
            r#"{"outputs": {"4": {"text": ["caption"]}}}"#,
        ));
        assert!(result.output_files.is_empty());
        assert_eq!(
            serde_json::to_value(&result.per_node["4"]).unwrap(),
            serde_json::json!({"text": ["caption"]}),
        );
    }

    #[test]
    fn empty_node_is_omitted() {
        let result = extract_outputs(&record(r#"{"outputs": {"7": {}}}"#));
        assert!(result.per_node.is_empty());
    }

    #[test]
    fn image_entries_without_filename_are_skipped() {
        let result = extract_outputs(&record(
            r#"{"outputs": {"9": {"images": [
                {"subfolder": "x"},
                {"filename": "keep.png"},
                {"filename": 42}
            ]}}}"#,
        ));
        assert_eq!(result.output_files, ["keep.png"]);
        assert_eq!(
            result.per_node["9"],
            NodeArtifacts::Files(vec!["keep.png".to_string()])
        );
    }

    #[test]
    fn filenameless_images_with_no_other_kinds_omit_the_node() {
        let result = extract_outputs(&record(
            r#"{"outputs": {"9": {"images": [{"subfolder": "x"}]}}}"#,
        ));
        assert!(result.output_files.is_empty());
        assert!(result.per_node.is_empty());
    }

    #[test]
    fn non_array_images_value_contributes_nothing() {
        let result = extract_outputs(&record(
            r#"{"outputs": {"9": {"images": "oops", "text": ["x"]}}}"#,
        ));
        assert!(result.output_files.is_empty());
        assert_matches!(result.per_node["9"], NodeArtifacts::Mixed(_));
    }

    #[test]
    fn image_refs_carry_subfolder_and_folder_type() {
        let refs = collect_image_refs(&record(
            r#"{"outputs": {
                "3": {"images": [{"filename": "a.png", "subfolder": "batch", "type": "output"}]},
                "5": {"images": [{"filename": "b.png"}], "text": ["hi"]}
            }}"#,
        ));
        assert_eq!(
            refs,
            [
                ImageRef {
                    filename: "a.png".to_string(),
                    subfolder: "batch".to_string(),
                    folder_type: "output".to_string(),
                },
                ImageRef {
                    filename: "b.png".to_string(),
                    subfolder: String::new(),
                    folder_type: String::new(),
                },
            ]
        );
    }

    #[test]
    fn malformed_image_refs_are_skipped() {
        let refs = collect_image_refs(&record(
            r#"{"outputs": {"9": {"images": [
                {"subfolder": "x"},
                {"filename": 42},
                {"filename": "keep.png"}
            ]}}}"#,
        ));
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].filename, "keep.png");
    }

    #[test]
    fn flattened_order_is_node_then_image() {
        let result = extract_outputs(&record(
            r#"{"outputs": {
                "3": {"images": [{"filename": "a.png"}, {"filename": "b.png"}]},
                "5": {"images": [{"filename": "c.png"}]}
            }}"#,
        ));
        assert_eq!(result.output_files, ["a.png", "b.png", "c.png"]);
        let nodes: Vec<_> = result.per_node.keys().cloned().collect();
        assert_eq!(nodes, ["3", "5"]);
    }
}
