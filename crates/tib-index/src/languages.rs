//! Language detection and tree-sitter grammar registry.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Supported language. Decided purely by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Java,
    TypeScript,
    JavaScript,
    Python,
    Rust,
    Vue,
    Sql,
    Markdown,
}

/// Static node-kind table driving the AST chunker for one grammar.
#[derive(Debug)]
pub struct GrammarSpec {
    /// Top-level nodes every other chunk needs to see (imports, package declarations).
    pub header: &'static [&'static str],
    /// Declarations worth their own chunk.
    pub boundary: &'static [&'static str],
    /// Boundaries whose body is split into one chunk per method.
    pub class_like: &'static [&'static str],
    /// Method-like members of a class body.
    pub methods: &'static [&'static str],
    /// Body children whose own children are class members (Java enum bodies).
    pub member_containers: &'static [&'static str],
    /// Annotation or decorator nodes that attach to the following declaration.
    pub annotation: &'static [&'static str],
    pub comment: &'static [&'static str],
    /// `(wrapper kind, field)` pairs whose field holds the real declaration.
    pub wrappers: &'static [(&'static str, &'static str)],
}

static JAVA: GrammarSpec = GrammarSpec {
    header: &[
        "package_declaration",
        "import_declaration",
        "module_declaration",
    ],
    boundary: &[
        "class_declaration",
        "interface_declaration",
        "enum_declaration",
        "record_declaration",
        "annotation_type_declaration",
    ],
    class_like: &[
        "class_declaration",
        "interface_declaration",
        "enum_declaration",
        "record_declaration",
    ],
    methods: &[
        "method_declaration",
        "constructor_declaration",
        "compact_constructor_declaration",
    ],
    member_containers: &["enum_body_declarations"],
    annotation: &["marker_annotation", "annotation"],
    comment: &["line_comment", "block_comment"],
    wrappers: &[],
};

static TYPESCRIPT: GrammarSpec = GrammarSpec {
    header: &["import_statement"],
    boundary: &[
        "function_declaration",
        "generator_function_declaration",
        "class_declaration",
        "abstract_class_declaration",
        "interface_declaration",
        "enum_declaration",
        "type_alias_declaration",
        "internal_module",
        "export_statement",
    ],
    class_like: &["class_declaration", "abstract_class_declaration", "class"],
    methods: &[
        "method_definition",
        "abstract_method_signature",
        "method_signature",
    ],
    member_containers: &[],
    annotation: &["decorator"],
    comment: &["comment"],
    wrappers: &[("export_statement", "declaration")],
};

static PYTHON: GrammarSpec = GrammarSpec {
    header: &[
        "import_statement",
        "import_from_statement",
        "future_import_statement",
    ],
    boundary: &[
        "function_definition",
        "class_definition",
        "decorated_definition",
    ],
    class_like: &["class_definition"],
    methods: &["function_definition"],
    member_containers: &[],
    annotation: &["decorator"],
    comment: &["comment"],
    wrappers: &[("decorated_definition", "definition")],
};

static RUST: GrammarSpec = GrammarSpec {
    header: &[
        "use_declaration",
        "extern_crate_declaration",
        "inner_attribute_item",
        "mod_item",
    ],
    boundary: &[
        "function_item",
        "struct_item",
        "enum_item",
        "union_item",
        "trait_item",
        "impl_item",
        "type_item",
        "const_item",
        "static_item",
        "macro_definition",
    ],
    class_like: &["impl_item", "trait_item"],
    methods: &["function_item", "function_signature_item"],
    member_containers: &[],
    annotation: &["attribute_item"],
    comment: &["line_comment", "block_comment"],
    wrappers: &[],
};

impl Lang {
    /// Identifier used in the point payload and in query filters.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Java => "java",
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Rust => "rust",
            Self::Vue => "vue",
            Self::Sql => "sql",
            Self::Markdown => "markdown",
        }
    }

    /// Get the tree-sitter grammar. Returns `None` for languages chunked
    /// without a parser or when the corresponding feature is not enabled.
    #[must_use]
    pub fn grammar(self) -> Option<tree_sitter::Language> {
        match self {
            #[cfg(feature = "lang-java")]
            Self::Java => Some(tree_sitter_java::LANGUAGE.into()),
            #[cfg(feature = "lang-js")]
            Self::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            #[cfg(feature = "lang-js")]
            Self::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            #[cfg(feature = "lang-python")]
            Self::Python => Some(tree_sitter_python::LANGUAGE.into()),
            #[cfg(feature = "lang-rust")]
            Self::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    /// Node-kind table for AST chunking.
    #[must_use]
    pub fn spec(self) -> Option<&'static GrammarSpec> {
        match self {
            Self::Java => Some(&JAVA),
            Self::TypeScript | Self::JavaScript => Some(&TYPESCRIPT),
            Self::Python => Some(&PYTHON),
            Self::Rust => Some(&RUST),
            Self::Vue | Self::Sql | Self::Markdown => None,
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Detect language from file extension.
#[must_use]
pub fn detect_language(path: &Path) -> Option<Lang> {
    let ext = path.extension()?.to_str()?;
    match ext {
        "java" => Some(Lang::Java),
        "ts" | "tsx" | "mts" | "cts" => Some(Lang::TypeScript),
        "js" | "jsx" | "mjs" | "cjs" => Some(Lang::JavaScript),
        "py" | "pyi" => Some(Lang::Python),
        "rs" => Some(Lang::Rust),
        "vue" => Some(Lang::Vue),
        "sql" => Some(Lang::Sql),
        "md" | "markdown" => Some(Lang::Markdown),
        _ => None,
    }
}

/// Map a declaration kind to its chunk type.
#[must_use]
pub fn chunk_type_for_kind(kind: &str) -> crate::chunker::ChunkType {
    use crate::chunker::ChunkType;
    match kind {
        "class_declaration" | "abstract_class_declaration" | "class_definition" | "class"
        | "impl_item" | "struct_item" | "union_item" => ChunkType::Class,
        "interface_declaration" | "annotation_type_declaration" | "trait_item" => {
            ChunkType::Interface
        }
        "enum_declaration" | "enum_item" => ChunkType::Enum,
        "record_declaration" => ChunkType::Record,
        "function_declaration"
        | "generator_function_declaration"
        | "function_definition"
        | "function_item"
        | "macro_definition" => ChunkType::Function,
        "method_declaration"
        | "method_definition"
        | "abstract_method_signature"
        | "method_signature"
        | "function_signature_item" => ChunkType::Method,
        "constructor_declaration" | "compact_constructor_declaration" => ChunkType::Constructor,
        "type_alias_declaration" | "type_item" => ChunkType::Type,
        "lexical_declaration" | "variable_declaration" | "const_item" | "static_item" => {
            ChunkType::Const
        }
        "export_statement" => ChunkType::Export,
        _ => ChunkType::Other,
    }
}
