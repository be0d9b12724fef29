//! `logtree tree` command handler

use std::io::Write;

use serde::Serialize;

use logtree_classifier::CompiledTree;

use crate::cli::TreeArgs;
use crate::commands::{LoadedConfig, build_classifier};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `tree` command.
pub async fn execute(
    args: TreeArgs,
    loaded: LoadedConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let classifier = build_classifier(&loaded, &args.patterns, false).await?;
    let snapshot = classifier.snapshot();
    let report = TreeReport::from_tree(snapshot.tree(), args.fields);
    writer.render(&report)?;
    Ok(())
}

/// Compiled tree report.
///
/// Text output is the `+`-indented hierarchy; JSON output lists the nodes.
#[derive(Debug, Serialize)]
pub struct TreeReport {
    pub pattern_count: usize,
    pub nodes: Vec<TreeNodeEntry>,
    #[serde(skip)]
    pub rendered: String,
}

#[derive(Debug, Serialize)]
pub struct TreeNodeEntry {
    pub name: String,
    pub parents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    pub match_field: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

impl TreeReport {
    pub fn from_tree(tree: &CompiledTree, with_fields: bool) -> Self {
        let nodes = tree
            .nodes()
            .map(|(_, node)| TreeNodeEntry {
                name: node.name().to_owned(),
                parents: node.parent_names().to_vec(),
                order: node.order(),
                match_field: node.match_field().to_owned(),
                fields: if with_fields {
                    node.fields().keys().cloned().collect()
                } else {
                    Vec::new()
                },
            })
            .collect();

        Self {
            pattern_count: tree.len(),
            nodes,
            rendered: tree.pretty_print(with_fields),
        }
    }
}

impl Render for TreeReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "{} ({} patterns)", "Pattern tree".bold(), self.pattern_count)?;
        write!(w, "{}", self.rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logtree_classifier::{CompileOptions, PatternSources, compile};

    #[test]
    fn builtin_tree_report() {
        let tree = compile(&PatternSources::new(), &CompileOptions::default()).unwrap();
        let report = TreeReport::from_tree(&tree, true);
        assert_eq!(report.pattern_count, 2);

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("+ events = data\n"));
        assert!(output.contains("++ logevents = "));
    }

    #[test]
    fn json_report_lists_parents() {
        let tree = compile(&PatternSources::new(), &CompileOptions::default()).unwrap();
        let report = TreeReport::from_tree(&tree, false);
        let json = serde_json::to_value(&report).unwrap();

        let nodes = json["nodes"].as_array().unwrap();
        let logevents = nodes.iter().find(|n| n["name"] == "logevents").unwrap();
        assert_eq!(logevents["parents"][0], "events");
        assert!(logevents.get("fields").is_none());
        assert!(json.get("rendered").is_none());
    }
}
