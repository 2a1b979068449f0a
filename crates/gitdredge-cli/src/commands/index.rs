use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};
use bytesize::ByteSize;

use gitdredge_index::Index;

use crate::commands::ExitStatus;
use crate::printer::Printer;

/// Offline inspector for a downloaded `.git/index`: tracked paths by
/// default, or a tree / raw / csv view.
pub(crate) fn index(
    path: &Path,
    tree: bool,
    raw: bool,
    csv: bool,
    mut printer: Printer,
) -> Result<ExitStatus> {
    let data =
        fs_err::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let index = Index::decode(&data)
        .with_context(|| format!("{} is not a git index file", path.display()))?;

    writeln!(
        printer,
        "Index file '{}' (version {}, {} entries)",
        path.display(),
        index.version,
        index.entries.len(),
    )?;

    if tree {
        write!(
            printer,
            "{}",
            render_tree(index.entries.iter().map(|entry| entry.name.as_str()))
        )?;
    } else if raw {
        for entry in &index.entries {
            writeln!(
                printer,
                "{}\t{}\tctime {}\tmtime {}\t{}",
                entry.id,
                ByteSize::b(entry.size.into()),
                entry.ctime,
                entry.mtime,
                entry.name,
            )?;
        }
    } else if csv {
        writeln!(printer, "name;hash;size;created_at;modified_at")?;
        for entry in &index.entries {
            writeln!(
                printer,
                "{};{};{};{};{}",
                entry.name,
                entry.id,
                ByteSize::b(entry.size.into()),
                entry.ctime,
                entry.mtime,
            )?;
        }
    } else {
        for entry in &index.entries {
            writeln!(printer, "{}", entry.name)?;
        }
    }

    Ok(ExitStatus::Success)
}

/// Nested view of the tracked paths, one indent step per directory level.
fn render_tree<'a>(paths: impl Iterator<Item = &'a str>) -> String {
    #[derive(Default)]
    struct Node(BTreeMap<String, Node>);

    let mut root = Node::default();
    for path in paths {
        let mut node = &mut root;
        for part in path.split('/') {
            node = node.0.entry(part.to_string()).or_default();
        }
    }

    fn walk(node: &Node, depth: usize, out: &mut String) {
        for (name, child) in &node.0 {
            out.push_str(&"    ".repeat(depth));
            out.push_str(name);
            out.push('\n');
            walk(child, depth + 1, out);
        }
    }

    let mut out = String::new();
    walk(&root, 0, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_view_nests_directories() {
        let rendered = render_tree(
            ["src/main.rs", "src/commands/mod.rs", "README.md"]
                .iter()
                .copied(),
        );
        insta::assert_snapshot!(rendered, @r###"
        README.md
        src
            commands
                mod.rs
            main.rs
        "###);
    }
}
