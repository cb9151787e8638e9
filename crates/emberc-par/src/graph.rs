//! Graphviz dump of the AST.
//!
//! Informational output behind `--verbose`; nothing in the compiler reads
//! it back. One vertex per node named `<kind><id>`, labeled with the token
//! value and flags, with `lhs`/`rhs` ports and plain edges for the ordered
//! child list.

use std::io::{self, Write};

use crate::ast::{AstBuilder, AstNodeId};

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn vertex_name(builder: &AstBuilder, id: AstNodeId) -> String {
    format!("{}{}", builder.node(id).name(), builder.node(id).id)
}

/// Write the tree rooted at `root` as a Graphviz `digraph`.
pub fn write_ast_graph<W: Write>(
    builder: &AstBuilder,
    root: AstNodeId,
    title: &str,
    writer: &mut W,
) -> io::Result<()> {
    writeln!(writer, "digraph {{")?;
    writeln!(writer, "    graph [ fontsize=22 ];")?;
    writeln!(writer, "    labelloc=\"t\";")?;
    writeln!(writer, "    label=\"{}\";", escape(title))?;

    let mut stack = vec![root];
    let mut edges = Vec::new();
    while let Some(id) = stack.pop() {
        let node = builder.node(id);
        let name = vertex_name(builder, id);

        let mut details = Vec::new();
        if !node.token.value.is_empty() {
            details.push(format!("token: {}", escape(&node.token.value)));
        }
        if node.is_pointer() {
            details.push("ptr".to_string());
        }
        if node.is_array() {
            details.push("array".to_string());
        }
        if node.is_spread() {
            details.push("spread".to_string());
        }
        let detail_text = if details.is_empty() {
            String::new()
        } else {
            format!("|{}", details.join("\\n"))
        };

        writeln!(
            writer,
            "    {name} [ shape=record; label=\"<f0>lhs|<f1>{}{}|<f2>rhs\"; ];",
            node.name(),
            detail_text
        )?;

        if let Some(lhs) = node.lhs {
            edges.push(format!("{name}:f0 -> {}:f1;", vertex_name(builder, lhs)));
            stack.push(lhs);
        }
        if let Some(rhs) = node.rhs {
            edges.push(format!("{name}:f2 -> {}:f1;", vertex_name(builder, rhs)));
            stack.push(rhs);
        }
        for &child in &node.children {
            edges.push(format!("{name}:f1 -> {}:f1;", vertex_name(builder, child)));
            stack.push(child);
        }
    }

    for edge in edges {
        writeln!(writer, "    {edge}")?;
    }
    writeln!(writer, "}}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use emberc_util::{Handler, SourceBuffer};

    #[test]
    fn test_graph_contains_all_nodes() {
        let buffer = SourceBuffer::from_string("test.em", "a := 1 + 2;");
        let handler = Handler::new();
        let mut parser = Parser::new(&buffer, &handler);
        let root = parser.parse().unwrap();
        let builder = parser.into_builder();

        let mut output = Vec::new();
        write_ast_graph(&builder, root, "AST Graph: test.em", &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();

        assert!(text.starts_with("digraph {"));
        assert!(text.contains("module0"));
        assert!(text.contains("binary_operator"));
        assert!(text.contains("token: +"));
        assert!(text.trim_end().ends_with('}'));
    }
}
