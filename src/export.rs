//! Snapshot export: reads a completed graph's commit/file/symbol surface
//! back out of a `GraphStore` and writes deterministic GraphML/JSON/CSV
//! artifacts. Peripheral to ingestion; never on the hot ingest path.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::errors::IngestError;

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotNode {
    pub id: String,
    pub label: String,
    pub attributes: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEdge {
    pub source: String,
    pub target: String,
    pub label: String,
    pub attributes: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub nodes: Vec<SnapshotNode>,
    pub edges: Vec<SnapshotEdge>,
}

/// Escapes text for use inside an XML attribute value.
pub fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn base_name(export_dir: &Path, snapshot_id: &str) -> PathBuf {
    export_dir.join(format!("graph_snapshot_{snapshot_id}"))
}

pub async fn write_graphml(
    export_dir: &Path,
    snapshot_id: &str,
    snapshot: &Snapshot,
) -> Result<PathBuf, IngestError> {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\">\n");
    out.push_str("  <graph id=\"G\" edgedefault=\"directed\">\n");
    for node in &snapshot.nodes {
        out.push_str(&format!(
            "    <node id=\"{}\" labels=\":{}\">\n",
            xml_escape(&node.id),
            xml_escape(&node.label)
        ));
        for (key, value) in &node.attributes {
            out.push_str(&format!(
                "      <data key=\"{}\">{}</data>\n",
                xml_escape(key),
                xml_escape(value)
            ));
        }
        out.push_str("    </node>\n");
    }
    for (idx, edge) in snapshot.edges.iter().enumerate() {
        out.push_str(&format!(
            "    <edge id=\"e{idx}\" source=\"{}\" target=\"{}\" label=\"{}\">\n",
            xml_escape(&edge.source),
            xml_escape(&edge.target),
            xml_escape(&edge.label)
        ));
        for (key, value) in &edge.attributes {
            out.push_str(&format!(
                "      <data key=\"{}\">{}</data>\n",
                xml_escape(key),
                xml_escape(value)
            ));
        }
        out.push_str("    </edge>\n");
    }
    out.push_str("  </graph>\n</graphml>\n");

    let path = base_name(export_dir, snapshot_id).with_extension("graphml");
    write_file(&path, out.as_bytes()).await?;
    Ok(path)
}

pub async fn write_json(
    export_dir: &Path,
    snapshot_id: &str,
    snapshot: &Snapshot,
) -> Result<PathBuf, IngestError> {
    let path = base_name(export_dir, snapshot_id).with_extension("json");
    let body =
        serde_json::to_vec_pretty(snapshot).map_err(|e| IngestError::Other(e.to_string()))?;
    write_file(&path, &body).await?;
    Ok(path)
}

pub async fn write_csv(
    export_dir: &Path,
    snapshot_id: &str,
    snapshot: &Snapshot,
) -> Result<(PathBuf, PathBuf), IngestError> {
    let base = base_name(export_dir, snapshot_id);
    let nodes_path = PathBuf::from(format!("{}_nodes.csv", base.display()));
    let edges_path = PathBuf::from(format!("{}_edges.csv", base.display()));

    let mut nodes_csv = String::from("id,label,attributes\n");
    for node in &snapshot.nodes {
        nodes_csv.push_str(&format!(
            "{},{},{}\n",
            csv_field(&node.id),
            csv_field(&node.label),
            csv_field(&encode_attrs(&node.attributes))
        ));
    }

    let mut edges_csv = String::from("source,target,label,attributes\n");
    for edge in &snapshot.edges {
        edges_csv.push_str(&format!(
            "{},{},{},{}\n",
            csv_field(&edge.source),
            csv_field(&edge.target),
            csv_field(&edge.label),
            csv_field(&encode_attrs(&edge.attributes))
        ));
    }

    write_file(&nodes_path, nodes_csv.as_bytes()).await?;
    write_file(&edges_path, edges_csv.as_bytes()).await?;
    Ok((nodes_path, edges_path))
}

fn encode_attrs(attrs: &[(String, String)]) -> String {
    attrs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";")
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

async fn write_file(path: &Path, body: &[u8]) -> Result<(), IngestError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, body).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_escape_covers_the_five_entities() {
        assert_eq!(xml_escape("a<b>&\"'"), "a&lt;b&gt;&amp;&quot;&apos;");
    }

    #[tokio::test]
    async fn writes_graphml_and_json_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot {
            nodes: vec![SnapshotNode {
                id: "a.py::foo::Function".to_string(),
                label: "Symbol".to_string(),
                attributes: vec![("name".to_string(), "foo".to_string())],
            }],
            edges: vec![],
        };
        let graphml_path = write_graphml(dir.path(), "snap1", &snapshot).await.unwrap();
        assert!(graphml_path.exists());
        let json_path = write_json(dir.path(), "snap1", &snapshot).await.unwrap();
        assert!(json_path.exists());
        let (nodes_path, edges_path) = write_csv(dir.path(), "snap1", &snapshot).await.unwrap();
        assert!(nodes_path.exists());
        assert!(edges_path.exists());
    }
}
