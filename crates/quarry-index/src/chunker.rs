//! Tree-sitter extraction of function and class chunks from Python source.
//!
//! Chunks live in a flat arena addressed by index, with a `parent`
//! back-reference for nesting (methods under their class, classes under
//! their enclosing class). Node dispatch goes through the closed [`NodeKind`]
//! set rather than string comparisons at each call site.

use tree_sitter::{Node, Parser};

use crate::error::{IndexError, Result};

/// What a chunk is, as indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Function,
    Class,
}

/// One extracted definition. `parent` points into the owning
/// [`FileChunks`] arena; `None` marks a top-level definition.
#[derive(Debug, Clone)]
pub struct ChunkNode {
    pub kind: ChunkKind,
    pub name: String,
    pub decorator: String,
    pub body: String,
    pub parent: Option<usize>,
}

/// An import statement: `import module as alias` or
/// `from module import members`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module: String,
    pub alias: String,
    pub members: Vec<String>,
}

/// All chunks extracted from one source file.
#[derive(Debug, Clone)]
pub struct FileChunks {
    pub path: String,
    pub imports: Vec<Import>,
    nodes: Vec<ChunkNode>,
}

/// Closed set of syntax-node kinds the extractor reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Function,
    Class,
    Import,
    ImportFrom,
    Decorated,
    Other,
}

impl NodeKind {
    fn of(node: &Node<'_>) -> Self {
        match node.kind() {
            "function_definition" => Self::Function,
            "class_definition" => Self::Class,
            "import_statement" => Self::Import,
            "import_from_statement" => Self::ImportFrom,
            "decorated_definition" => Self::Decorated,
            _ => Self::Other,
        }
    }
}

impl FileChunks {
    #[must_use]
    pub fn nodes(&self) -> &[ChunkNode] {
        &self.nodes
    }

    /// Dotted container path of a chunk, e.g. `Outer.Inner.method`.
    #[must_use]
    pub fn qualified_name(&self, idx: usize) -> String {
        let mut parts = vec![self.nodes[idx].name.as_str()];
        let mut cursor = self.nodes[idx].parent;
        while let Some(p) = cursor {
            parts.push(self.nodes[p].name.as_str());
            cursor = self.nodes[p].parent;
        }
        parts.reverse();
        parts.join(".")
    }

    /// Indexes of chunks that become indexed records: every class at any
    /// nesting depth, plus top-level functions. Methods stay inside their
    /// class body rather than being hoisted to records of their own.
    #[must_use]
    pub fn record_indices(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| match n.kind {
                ChunkKind::Class => true,
                ChunkKind::Function => n.parent.is_none(),
            })
            .map(|(i, _)| i)
            .collect()
    }
}

/// Parse one Python source file into its chunk arena.
///
/// # Errors
///
/// Returns `IndexError::Parse` if tree-sitter cannot parse the source.
/// Callers skip the file; one unparsable file never aborts a repository scan.
pub fn parse_file(source: &str, path: &str) -> Result<FileChunks> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| IndexError::Parse(format!("set_language failed: {e}")))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| IndexError::Parse(format!("parse failed for {path}")))?;

    let mut chunks = FileChunks {
        path: path.to_owned(),
        imports: Vec::new(),
        nodes: Vec::new(),
    };
    traverse(source, &tree.root_node(), &mut chunks);
    Ok(chunks)
}

fn node_text<'a>(source: &'a str, node: &Node<'_>) -> &'a str {
    &source[node.byte_range()]
}

fn field_text(source: &str, node: &Node<'_>, field: &str) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| node_text(source, &n).to_owned())
}

fn traverse(source: &str, node: &Node<'_>, out: &mut FileChunks) {
    match NodeKind::of(node) {
        NodeKind::Function => {
            push_function(source, node, None, String::new(), out);
        }
        NodeKind::Class => {
            push_class(source, node, None, String::new(), out);
        }
        NodeKind::Import => {
            if let Some(import) = parse_import(source, node) {
                out.imports.push(import);
            }
        }
        NodeKind::ImportFrom => {
            if let Some(import) = parse_import_from(source, node) {
                out.imports.push(import);
            }
        }
        NodeKind::Decorated => {
            push_decorated(source, node, None, out);
        }
        NodeKind::Other => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                traverse(source, &child, out);
            }
        }
    }
}

fn push_function(
    source: &str,
    node: &Node<'_>,
    parent: Option<usize>,
    decorator: String,
    out: &mut FileChunks,
) {
    let Some(name) = field_text(source, node, "name") else {
        return;
    };
    out.nodes.push(ChunkNode {
        kind: ChunkKind::Function,
        name,
        decorator,
        body: node_text(source, node).to_owned(),
        parent,
    });
}

fn push_class(
    source: &str,
    node: &Node<'_>,
    parent: Option<usize>,
    decorator: String,
    out: &mut FileChunks,
) {
    let Some(name) = field_text(source, node, "name") else {
        return;
    };
    let idx = out.nodes.len();
    out.nodes.push(ChunkNode {
        kind: ChunkKind::Class,
        name,
        decorator,
        body: node_text(source, node).to_owned(),
        parent,
    });

    let Some(body) = node.child_by_field_name("body") else {
        return;
    };
    let mut cursor = body.walk();
    for child in body.children(&mut cursor) {
        match NodeKind::of(&child) {
            NodeKind::Function => {
                push_function(source, &child, Some(idx), String::new(), out);
            }
            NodeKind::Class => {
                push_class(source, &child, Some(idx), String::new(), out);
            }
            NodeKind::Decorated => {
                push_decorated(source, &child, Some(idx), out);
            }
            _ => {}
        }
    }
}

/// A decorated definition keeps the decorator text but is classified by the
/// kind of the definition underneath it.
fn push_decorated(source: &str, node: &Node<'_>, parent: Option<usize>, out: &mut FileChunks) {
    let mut decorators = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "decorator" {
            decorators.push(node_text(source, &child).to_owned());
        }
    }
    let decorator = decorators.join("\n");

    let Some(def) = node.child_by_field_name("definition") else {
        return;
    };
    match NodeKind::of(&def) {
        NodeKind::Function => push_function(source, &def, parent, decorator, out),
        NodeKind::Class => push_class(source, &def, parent, decorator, out),
        _ => {}
    }
}

fn module_name(source: &str, node: &Node<'_>) -> (String, String) {
    if node.kind() == "aliased_import" {
        (
            field_text(source, node, "name").unwrap_or_default(),
            field_text(source, node, "alias").unwrap_or_default(),
        )
    } else {
        (node_text(source, node).to_owned(), String::new())
    }
}

fn parse_import(source: &str, node: &Node<'_>) -> Option<Import> {
    let name = node.child_by_field_name("name")?;
    let (module, alias) = module_name(source, &name);
    Some(Import {
        module,
        alias,
        members: Vec::new(),
    })
}

fn parse_import_from(source: &str, node: &Node<'_>) -> Option<Import> {
    let module_node = node.child_by_field_name("module_name")?;
    let (module, alias) = module_name(source, &module_node);
    let mut cursor = node.walk();
    let members = node
        .children_by_field_name("name", &mut cursor)
        .map(|n| node_text(source, &n).to_owned())
        .collect();
    Some(Import {
        module,
        alias,
        members,
    })
}
