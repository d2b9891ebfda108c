//! Graph XML generation for the processing engine.
//!
//! Every engine invocation is described by a small XML graph. The graphs are
//! written under the output tree's `_reproducibility/` folder so a finished
//! run documents exactly what was executed.

use std::path::Path;

use quick_xml::events::BytesText;
use quick_xml::Writer;

use crate::error::Result;

/// Placeholder substituted by the engine with the invocation's source file.
pub const SOURCE_PLACEHOLDER: &str = "${sourceFile}";
/// Placeholder substituted by the engine with the invocation's target file.
pub const OUTPUT_PLACEHOLDER: &str = "${outputFile}";

/// One operator node of a processing graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub operator: String,
    /// Upstream node id; the graph's source product when unset.
    pub source: Option<String>,
    pub parameters: Vec<(String, String)>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, operator: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            operator: operator.into(),
            source: None,
            parameters: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((key.into(), value.into()));
        self
    }
}

/// Serialize a graph to XML and write it to `path`, creating parents.
pub fn write_graph(path: &Path, graph_id: &str, nodes: &[GraphNode]) -> Result<()> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .create_element("graph")
        .with_attribute(("id", graph_id))
        .write_inner_content(|w| -> std::result::Result<(), quick_xml::Error> {
            w.create_element("version")
                .write_text_content(BytesText::new("1.0"))?;
            for node in nodes {
                write_node(w, node)?;
            }
            Ok(())
        })?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, writer.into_inner())?;
    Ok(())
}

fn write_node(
    writer: &mut Writer<Vec<u8>>,
    node: &GraphNode,
) -> std::result::Result<(), quick_xml::Error> {
    writer
        .create_element("node")
        .with_attribute(("id", node.id.as_str()))
        .write_inner_content(|w| -> std::result::Result<(), quick_xml::Error> {
            w.create_element("operator")
                .write_text_content(BytesText::new(&node.operator))?;
            w.create_element("sources").write_inner_content(|w| -> std::result::Result<(), quick_xml::Error> {
                match &node.source {
                    Some(source) => {
                        w.create_element("source")
                            .write_text_content(BytesText::new(source))?;
                    }
                    None => {
                        w.create_element("sourceProduct")
                            .write_text_content(BytesText::new(SOURCE_PLACEHOLDER))?;
                    }
                }
                Ok(())
            })?;
            w.create_element("parameters").write_inner_content(|w| -> std::result::Result<(), quick_xml::Error> {
                for (key, value) in &node.parameters {
                    w.create_element(key.as_str())
                        .write_text_content(BytesText::new(value))?;
                }
                Ok(())
            })?;
            Ok(())
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_graph_with_chained_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("_reproducibility").join("graph.xml");

        let nodes = vec![
            GraphNode::new("correction", "c2rcc.olci")
                .param("validPixelExpression", "!quality_flags.invalid")
                .param("salinity", "0.05"),
            GraphNode::new("write", "Write")
                .with_source("correction")
                .param("file", OUTPUT_PLACEHOLDER)
                .param("formatName", "NetCDF4-CF"),
        ];
        write_graph(&path, "atmcorr-netcdf", &nodes).unwrap();

        let xml = std::fs::read_to_string(&path).unwrap();
        assert!(xml.contains("<graph id=\"atmcorr-netcdf\">"));
        assert!(xml.contains("<operator>c2rcc.olci</operator>"));
        assert!(xml.contains("<sourceProduct>${sourceFile}</sourceProduct>"));
        assert!(xml.contains("<source>correction</source>"));
        assert!(xml.contains("<salinity>0.05</salinity>"));
        assert!(xml.contains("<file>${outputFile}</file>"));
    }
}
