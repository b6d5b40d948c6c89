//! Tree-sitter boundary classification.

use tree_sitter::{Node, Parser};

use super::{ChunkType, Span, normalize};
use crate::languages::{GrammarSpec, Lang, chunk_type_for_kind};

/// Function-valued declarator kinds that promote a top-level `const` to a boundary.
const FUNCTION_VALUES: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
];

const CONSTRUCTOR_NAMES: &[&str] = &["constructor", "__init__"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeClass {
    Header,
    Boundary,
    Attachment,
    Other,
}

struct Ctx<'a> {
    source: &'a str,
    spec: &'static GrammarSpec,
}

/// Split `source` into normalized spans. Returns `None` when no grammar is
/// available, parsing fails or the file has no boundary declarations; the
/// caller then falls back to a single whole-file chunk.
pub(crate) fn split(source: &str, lang: Lang) -> Option<Vec<Span>> {
    let spec = lang.spec()?;
    let grammar = lang.grammar()?;

    let mut parser = Parser::new();
    parser.set_language(&grammar).ok()?;
    let tree = parser.parse(source, None)?;
    let root = tree.root_node();
    if root.has_error() {
        tracing::debug!(lang = lang.id(), "syntax errors present, chunking recovered tree");
    }

    let ctx = Ctx { source, spec };
    let last_row = source.lines().count().saturating_sub(1);

    let mut spans: Vec<Span> = Vec::new();
    let mut header_end: Option<usize> = None;
    let mut pending_start: Option<usize> = None;
    let mut pending_annotations: Vec<String> = Vec::new();
    let mut statement: Option<Span> = None;
    let mut boundary_seen = false;

    for node in named_children(root) {
        match ctx.classify(node) {
            NodeClass::Attachment => {
                pending_start.get_or_insert(node.start_position().row);
                if ctx.spec.annotation.contains(&node.kind()) {
                    pending_annotations.push(ctx.text(node).trim().to_owned());
                }
            }
            NodeClass::Boundary => {
                if let Some(s) = statement.take() {
                    spans.push(s);
                }
                let start = pending_start.take().unwrap_or(node.start_position().row);
                let mut annotations = std::mem::take(&mut pending_annotations);
                annotations.extend(ctx.annotations_of(node));

                let first = !boundary_seen;
                boundary_seen = true;
                if let Some(class_spans) = ctx.split_class(node, start) {
                    let ClassSplit {
                        header_rows,
                        mut members,
                    } = class_spans;
                    if let Some((class_start, class_end)) = header_rows {
                        if first {
                            header_end = Some(header_end.map_or(class_end, |h| h.max(class_end)));
                        } else {
                            let decl = ctx.unwrap(node);
                            let mut span = Span::new(class_start, class_end, ctx.chunk_type(node))
                                .named(ctx.name_of(decl));
                            span.parent_symbol = ctx.parent_symbol(decl);
                            span.annotations = annotations;
                            spans.push(span);
                        }
                    }
                    spans.append(&mut members);
                } else {
                    let decl = ctx.unwrap(node);
                    let mut span = Span::new(start, end_row(node), ctx.chunk_type(node))
                        .named(ctx.name_of(decl));
                    span.parent_symbol = ctx.parent_symbol(decl);
                    span.annotations = annotations;
                    spans.push(span);
                }
            }
            NodeClass::Header | NodeClass::Other if !boundary_seen => {
                header_end = Some(end_row(node));
                pending_start = None;
                pending_annotations.clear();
            }
            NodeClass::Header | NodeClass::Other => {
                let start = pending_start.take().unwrap_or(node.start_position().row);
                pending_annotations.clear();
                match statement.as_mut() {
                    Some(s) => s.end = end_row(node),
                    None => statement = Some(Span::new(start, end_row(node), ChunkType::Statement)),
                }
            }
        }
    }
    if let Some(s) = statement.take() {
        spans.push(s);
    }

    if !boundary_seen {
        return None;
    }
    if let Some(end) = header_end {
        spans.push(Span::new(0, end, ChunkType::Header));
    }
    Some(normalize(spans, last_row))
}

struct ClassSplit {
    /// Rows of the class declaration and fields up to the first method.
    header_rows: Option<(usize, usize)>,
    members: Vec<Span>,
}

impl Ctx<'_> {
    fn text(&self, node: Node<'_>) -> &str {
        &self.source[node.byte_range()]
    }

    fn classify(&self, node: Node<'_>) -> NodeClass {
        let kind = node.kind();
        if self.spec.comment.contains(&kind) || self.spec.annotation.contains(&kind) {
            NodeClass::Attachment
        } else if self.spec.boundary.contains(&kind) || self.is_function_const(node) {
            NodeClass::Boundary
        } else if self.spec.header.contains(&kind) {
            NodeClass::Header
        } else {
            NodeClass::Other
        }
    }

    /// `const handler = () => {}` declares a function even though it is a variable.
    fn is_function_const(&self, node: Node<'_>) -> bool {
        if !matches!(node.kind(), "lexical_declaration" | "variable_declaration") {
            return false;
        }
        named_children(node).any(|d| {
            d.kind() == "variable_declarator"
                && d.child_by_field_name("value")
                    .is_some_and(|v| FUNCTION_VALUES.contains(&v.kind()))
        })
    }

    /// Follow wrapper nodes (`export`, decorated definitions) to the declaration.
    fn unwrap<'t>(&self, node: Node<'t>) -> Node<'t> {
        let mut current = node;
        while let Some((_, field)) = self
            .spec
            .wrappers
            .iter()
            .find(|(kind, _)| *kind == current.kind())
        {
            match current.child_by_field_name(field) {
                Some(inner) => current = inner,
                None => break,
            }
        }
        current
    }

    fn is_class_like(&self, node: Node<'_>) -> bool {
        self.spec.class_like.contains(&node.kind())
    }

    fn chunk_type(&self, node: Node<'_>) -> ChunkType {
        let decl = self.unwrap(node);
        if self.is_function_const(decl) {
            return ChunkType::Function;
        }
        chunk_type_for_kind(decl.kind())
    }

    fn name_of(&self, node: Node<'_>) -> Option<String> {
        if let Some(name) = node
            .child_by_field_name("name")
            .or_else(|| node.child_by_field_name("type"))
        {
            return Some(self.text(name).to_owned());
        }
        if matches!(node.kind(), "lexical_declaration" | "variable_declaration") {
            return named_children(node)
                .find(|d| d.kind() == "variable_declarator")
                .and_then(|d| d.child_by_field_name("name"))
                .map(|n| self.text(n).to_owned());
        }
        None
    }

    /// Name of the nearest enclosing class-like declaration.
    fn parent_symbol(&self, node: Node<'_>) -> Option<String> {
        let mut current = node.parent();
        while let Some(p) = current {
            if self.is_class_like(p) {
                return self.name_of(p);
            }
            current = p.parent();
        }
        None
    }

    /// Annotations held inside the node: Java `modifiers`, decorators on
    /// classes and decorated definitions.
    fn annotations_of(&self, node: Node<'_>) -> Vec<String> {
        let mut out = Vec::new();
        let decl = self.unwrap(node);
        let holders = if decl == node { vec![node] } else { vec![node, decl] };
        for holder in holders {
            for child in named_children(holder) {
                if self.spec.annotation.contains(&child.kind()) {
                    out.push(self.text(child).trim().to_owned());
                } else if child.kind() == "modifiers" {
                    out.extend(
                        named_children(child)
                            .filter(|m| self.spec.annotation.contains(&m.kind()))
                            .map(|m| self.text(m).trim().to_owned()),
                    );
                }
            }
        }
        out
    }

    fn member_type(&self, decl: Node<'_>) -> ChunkType {
        let name = self.name_of(decl);
        if name
            .as_deref()
            .is_some_and(|n| CONSTRUCTOR_NAMES.contains(&n))
        {
            return ChunkType::Constructor;
        }
        match chunk_type_for_kind(decl.kind()) {
            ChunkType::Function | ChunkType::Other => ChunkType::Method,
            other => other,
        }
    }

    /// Class members, flattening containers such as Java enum body declarations.
    fn members<'t>(&self, body: Node<'t>) -> Vec<Node<'t>> {
        let mut out = Vec::new();
        for child in named_children(body) {
            if self.spec.member_containers.contains(&child.kind()) {
                out.extend(named_children(child));
            } else {
                out.push(child);
            }
        }
        out
    }

    /// Split a class-like boundary into its header rows and one span per method.
    /// Returns `None` when the node is not class-like or has no methods.
    fn split_class(&self, node: Node<'_>, start: usize) -> Option<ClassSplit> {
        let decl = self.unwrap(node);
        if !self.is_class_like(decl) {
            return None;
        }
        let body = decl.child_by_field_name("body")?;
        let class_name = self.name_of(decl);

        let mut members: Vec<Span> = Vec::new();
        let mut nested: Vec<Span> = Vec::new();
        let mut first_method_start: Option<usize> = None;
        let mut pending_start: Option<usize> = None;
        let mut pending_annotations: Vec<String> = Vec::new();

        for member in self.members(body) {
            let kind = member.kind();
            let row = member.start_position().row;
            if self.spec.comment.contains(&kind) || self.spec.annotation.contains(&kind) {
                pending_start.get_or_insert(row);
                if self.spec.annotation.contains(&kind) {
                    pending_annotations.push(self.text(member).trim().to_owned());
                }
                continue;
            }

            let inner = self.unwrap(member);
            if self.spec.methods.contains(&inner.kind()) {
                let member_start = pending_start.take().unwrap_or(row);
                first_method_start.get_or_insert(member_start);
                let mut annotations = std::mem::take(&mut pending_annotations);
                annotations.extend(self.annotations_of(member));
                let mut span = Span::new(member_start, end_row(member), self.member_type(inner))
                    .named(self.name_of(inner));
                span.parent_symbol.clone_from(&class_name);
                span.annotations = annotations;
                members.push(span);
            } else if self.is_class_like(inner) && first_method_start.is_some() {
                let member_start = pending_start.take().unwrap_or(row);
                pending_annotations.clear();
                let mut span =
                    Span::new(member_start, end_row(member), chunk_type_for_kind(inner.kind()))
                        .named(self.name_of(inner));
                span.parent_symbol.clone_from(&class_name);
                span.annotations = self.annotations_of(member);
                nested.push(span);
            } else if first_method_start.is_some() {
                // fields between methods travel with the next method
                pending_start.get_or_insert(row);
                pending_annotations.clear();
            } else {
                pending_start = None;
                pending_annotations.clear();
            }
        }

        let first = first_method_start?;
        if let Some(last) = members.last_mut() {
            last.end = last.end.max(end_row(node));
        }
        members.append(&mut nested);

        let header_rows = (first > start).then(|| (start, first - 1));
        Some(ClassSplit {
            header_rows,
            members,
        })
    }
}

/// Last row covered by `node`, excluding a trailing newline.
fn end_row(node: Node<'_>) -> usize {
    let start = node.start_position();
    let end = node.end_position();
    if end.column == 0 && end.row > start.row {
        end.row - 1
    } else {
        end.row
    }
}

fn named_children(node: Node<'_>) -> impl Iterator<Item = Node<'_>> {
    let count = u32::try_from(node.named_child_count()).unwrap_or(u32::MAX);
    (0..count).filter_map(move |i| node.named_child(i))
}
