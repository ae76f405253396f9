//! Rust language scanner using tree-sitter.

use super::routes::{normalize_method, normalize_route, route_symbol_name};
use super::*;
use regex::Regex;
use std::sync::LazyLock;

/// `#[get("/users/{id}")]`, `#[route("/x", method = "GET")]`
static ROUTE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^#\[\s*(?:[A-Za-z_]+::)*(get|post|put|patch|delete|head|options|route)\s*\(\s*"([^"]*)""#)
        .expect("valid route attribute regex")
});

/// Rust source code scanner.
pub struct RustScanner {
    // Parser instance is created per-scan since it's not Sync
}

impl RustScanner {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for RustScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageScanner for RustScanner {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn extensions(&self) -> &[&'static str] {
        &["rs"]
    }

    fn scan(&self, file: &SourceFile) -> Result<FileFragment, ParseFailure> {
        let tree = parse_tree(tree_sitter_rust::LANGUAGE.into(), &file.text, &file.path)?;
        let mut walker = RustWalker::new(file);
        walker.walk_items(tree.root_node());
        Ok(walker.builder.finish())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Extract the type identifier for an impl item (`Foo` from `Foo<T>`).
fn impl_type_ident(bytes: &[u8], impl_node: Node) -> Option<String> {
    let ty = impl_node.child_by_field_name("type")?;
    let text = text_of(bytes, ty);
    let head = text.split('<').next().unwrap_or(text);
    last_ident(head)
}

/// Trait name of an `impl Trait for Type` block.
fn impl_trait_ident(bytes: &[u8], impl_node: Node) -> Option<String> {
    let tr = impl_node.child_by_field_name("trait")?;
    let text = text_of(bytes, tr);
    last_ident(text.split('<').next().unwrap_or(text))
}

/// Attributes from preceding siblings, in source order.
fn extract_attributes(bytes: &[u8], node: Node) -> Vec<String> {
    let mut attrs = Vec::new();
    let mut cur = node.prev_sibling();
    while let Some(sib) = cur {
        match sib.kind() {
            "attribute_item" => attrs.push(text_of(bytes, sib).trim().to_string()),
            "line_comment" | "block_comment" => {}
            _ => break,
        }
        cur = sib.prev_sibling();
    }
    attrs.reverse();
    attrs
}

fn is_test_attr(attr: &str) -> bool {
    let compact: String = attr.chars().filter(|c| !c.is_whitespace()).collect();
    compact.starts_with("#[test")
        || compact.starts_with("#[tokio::test")
        || compact.starts_with("#[rstest")
        || compact.starts_with("#[bench")
        || compact == "#[cfg(test)]"
}

/// `pub` only; restricted visibility does not export.
fn is_pub(bytes: &[u8], node: Node) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .any(|c| c.kind() == "visibility_modifier" && text_of(bytes, c).trim() == "pub")
}

// ============================================================================
// Walker
// ============================================================================

struct ImplContext {
    type_name: String,
    type_key: Option<String>,
    /// Methods reachable through a trait (trait impls and trait definitions)
    via_trait: bool,
    exported: bool,
}

struct RustWalker<'a> {
    bytes: &'a [u8],
    builder: FragmentBuilder,
    /// Keys of enclosing modules/functions; the bottom is the file module
    scope: Vec<String>,
    /// Key of the symbol that references are attributed to
    source: Vec<String>,
    impls: Vec<ImplContext>,
    test_depth: usize,
    /// (scope key, type name) -> key of the declared type
    types: HashMap<(String, String), String>,
}

impl<'a> RustWalker<'a> {
    fn new(file: &'a SourceFile) -> Self {
        Self {
            bytes: file.text.as_bytes(),
            builder: FragmentBuilder::new(&file.path, Language::Rust, &file.text),
            scope: vec![MODULE_KEY.to_string()],
            source: vec![MODULE_KEY.to_string()],
            impls: Vec::new(),
            test_depth: 0,
            types: HashMap::new(),
        }
    }

    fn scope_key(&self) -> String {
        self.scope.last().cloned().unwrap_or_else(|| MODULE_KEY.to_string())
    }

    fn source_key(&self) -> String {
        self.source.last().cloned().unwrap_or_else(|| MODULE_KEY.to_string())
    }

    fn self_type(&self) -> Option<&str> {
        self.impls.last().map(|i| i.type_name.as_str())
    }

    /// Walk the items of a container; impl blocks go last so their type is
    /// already declared.
    fn walk_items(&mut self, container: Node) {
        let mut cursor = container.walk();
        let children: Vec<Node> = container.named_children(&mut cursor).collect();
        for child in children.iter().filter(|c| c.kind() != "impl_item") {
            self.visit_item(*child);
        }
        for child in children.iter().filter(|c| c.kind() == "impl_item") {
            self.visit_impl(*child);
        }
    }

    fn visit_item(&mut self, node: Node) {
        match node.kind() {
            "mod_item" => self.visit_mod(node),
            "use_declaration" => self.visit_use(node),
            "function_item" | "function_signature_item" => self.visit_function(node),
            "struct_item" | "enum_item" | "union_item" | "type_item" => {
                self.visit_type(node, SymbolKind::Class)
            }
            "trait_item" => self.visit_trait(node),
            "const_item" | "static_item" => self.visit_constant(node),
            "impl_item" => self.visit_impl(node),
            "attribute_item" | "inner_attribute_item" | "line_comment" | "block_comment" => {}
            _ => self.walk_exprs(node),
        }
    }

    fn push_item(&mut self, node: Node, name: String, kind: SymbolKind, exported: bool) -> String {
        let attrs = extract_attributes(self.bytes, node);
        let in_test = self.test_depth > 0 || attrs.iter().any(|a| is_test_attr(a));
        let impl_ctx = self.impls.last();
        let (parent, owner) = match impl_ctx {
            Some(ctx) if kind == SymbolKind::Method || kind == SymbolKind::Constant => (
                ctx.type_key.clone().or_else(|| Some(self.scope_key())),
                Some(ctx.type_name.clone()),
            ),
            _ => (Some(self.scope_key()), None),
        };
        let signature = match kind {
            SymbolKind::Function | SymbolKind::Method => signature_of(self.bytes, node),
            _ => None,
        };
        let key = self.builder.push(
            LocalSymbol::new(name, kind, lines_of(node))
                .exported(exported)
                .test(in_test)
                .signature(signature)
                .parent(parent)
                .owner(owner),
        );
        if matches!(kind, SymbolKind::Function | SymbolKind::Method) {
            for attr in &attrs {
                self.route_from_attribute(attr, &key, node);
            }
        }
        key
    }

    fn visit_mod(&mut self, node: Node) {
        let Some(name) = node
            .child_by_field_name("name")
            .and_then(|n| last_ident_of(self.bytes, n))
        else {
            return;
        };
        let Some(body) = node.child_by_field_name("body") else {
            // `mod foo;` pulls in a sibling file
            self.builder.edge(
                MODULE_KEY,
                TargetDescriptor::module(format!("mod {name}")),
                DependencyKind::Import,
                line_of(node),
            );
            return;
        };

        let attrs = extract_attributes(self.bytes, node);
        let is_test = attrs.iter().any(|a| is_test_attr(a));
        let key = self.push_item(node, name, SymbolKind::Module, is_pub(self.bytes, node));
        if is_test {
            self.test_depth += 1;
        }
        self.scope.push(key.clone());
        self.source.push(key);
        self.walk_items(body);
        self.source.pop();
        self.scope.pop();
        if is_test {
            self.test_depth -= 1;
        }
    }

    fn visit_use(&mut self, node: Node) {
        let Some(arg) = node.child_by_field_name("argument") else {
            return;
        };
        let mut paths = Vec::new();
        collect_use_paths(arg, self.bytes, "", &mut paths);
        for path in paths {
            let first = path.split("::").next().unwrap_or("");
            // External crates cannot resolve inside the project
            if matches!(first, "crate" | "self" | "super") {
                self.builder.edge(
                    MODULE_KEY,
                    TargetDescriptor::module(path),
                    DependencyKind::Import,
                    line_of(node),
                );
            }
        }
    }

    fn visit_function(&mut self, node: Node) {
        let Some(name) = node
            .child_by_field_name("name")
            .and_then(|n| last_ident_of(self.bytes, n))
        else {
            return;
        };
        let (kind, exported) = match self.impls.last() {
            Some(ctx) => (SymbolKind::Method, ctx.via_trait || (ctx.exported && is_pub(self.bytes, node))),
            None => (SymbolKind::Function, is_pub(self.bytes, node)),
        };
        let key = self.push_item(node, name, kind, exported);

        if let Some(body) = node.child_by_field_name("body") {
            // Items nested in a function body belong to the function
            self.scope.push(key.clone());
            self.source.push(key);
            self.walk_exprs(body);
            self.source.pop();
            self.scope.pop();
        }
    }

    fn visit_type(&mut self, node: Node, kind: SymbolKind) {
        let Some(name) = node
            .child_by_field_name("name")
            .and_then(|n| last_ident_of(self.bytes, n))
        else {
            return;
        };
        let scope = self.scope_key();
        let key = self.push_item(node, name.clone(), kind, is_pub(self.bytes, node));
        self.types.entry((scope, name)).or_insert(key);
    }

    fn visit_trait(&mut self, node: Node) {
        let Some(name) = node
            .child_by_field_name("name")
            .and_then(|n| last_ident_of(self.bytes, n))
        else {
            return;
        };
        let exported = is_pub(self.bytes, node);
        let scope = self.scope_key();
        let key = self.push_item(node, name.clone(), SymbolKind::Interface, exported);
        self.types.entry((scope, name.clone())).or_insert_with(|| key.clone());

        if let Some(body) = node.child_by_field_name("body") {
            self.impls.push(ImplContext {
                type_name: name,
                type_key: Some(key),
                via_trait: exported,
                exported,
            });
            self.walk_items(body);
            self.impls.pop();
        }
    }

    fn visit_constant(&mut self, node: Node) {
        let Some(name) = node
            .child_by_field_name("name")
            .and_then(|n| last_ident_of(self.bytes, n))
        else {
            return;
        };
        let exported = is_pub(self.bytes, node);
        let key = self.push_item(node, name, SymbolKind::Constant, exported);
        if let Some(value) = node.child_by_field_name("value") {
            self.source.push(key);
            self.walk_exprs(value);
            self.source.pop();
        }
    }

    fn visit_impl(&mut self, node: Node) {
        let Some(type_name) = impl_type_ident(self.bytes, node) else {
            return;
        };
        let trait_name = impl_trait_ident(self.bytes, node);
        let type_key = self.types.get(&(self.scope_key(), type_name.clone())).cloned();

        if let Some(trait_name) = &trait_name {
            let source = type_key.clone().unwrap_or_else(|| MODULE_KEY.to_string());
            self.builder.edge(
                &source,
                TargetDescriptor::name(trait_name.clone()),
                DependencyKind::Implements,
                line_of(node),
            );
        }

        let exported = type_key
            .as_deref()
            .and_then(|k| self.builder.get_mut(k).map(|s| s.exported))
            .unwrap_or(true);
        let in_test = extract_attributes(self.bytes, node).iter().any(|a| is_test_attr(a));
        if in_test {
            self.test_depth += 1;
        }
        self.impls.push(ImplContext {
            type_name,
            type_key,
            via_trait: trait_name.is_some(),
            exported,
        });
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_items(body);
        }
        self.impls.pop();
        if in_test {
            self.test_depth -= 1;
        }
    }

    // ========================================================================
    // References
    // ========================================================================

    fn walk_exprs(&mut self, node: Node) {
        match node.kind() {
            "function_item" | "struct_item" | "enum_item" | "union_item" | "type_item"
            | "trait_item" | "const_item" | "static_item" | "mod_item" | "use_declaration" => {
                let saved = std::mem::take(&mut self.impls);
                self.visit_item(node);
                self.impls = saved;
                return;
            }
            "impl_item" => {
                self.visit_impl(node);
                return;
            }
            "call_expression" => self.visit_call(node),
            "struct_expression" => self.visit_struct_literal(node),
            "identifier" => {
                let source = self.source_key();
                self.builder
                    .reference(&source, text_of(self.bytes, node), line_of(node));
                return;
            }
            _ => {}
        }

        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            self.walk_exprs(child);
        }
    }

    fn visit_call(&mut self, node: Node) {
        let Some(mut fun) = node.child_by_field_name("function") else {
            return;
        };
        if fun.kind() == "generic_function" {
            if let Some(inner) = fun.child_by_field_name("function") {
                fun = inner;
            }
        }
        let line = line_of(node);
        let source = self.source_key();

        match fun.kind() {
            "identifier" => {
                let name = text_of(self.bytes, fun).to_string();
                self.builder
                    .edge(&source, TargetDescriptor::name(name), DependencyKind::Call, line);
            }
            "scoped_identifier" => {
                let Some(name) = field_text(self.bytes, fun, "name").map(str::to_string) else {
                    return;
                };
                let qualifier = fun
                    .child_by_field_name("path")
                    .and_then(|p| last_ident_of(self.bytes, p))
                    .map(|q| match (q.as_str(), self.self_type()) {
                        ("Self", Some(ty)) => ty.to_string(),
                        _ => q,
                    });
                match qualifier {
                    Some(q) if is_capitalized(&q) => {
                        self.builder.edge(
                            &source,
                            TargetDescriptor::qualified(name, q.clone()),
                            DependencyKind::Call,
                            line,
                        );
                        self.builder
                            .edge(&source, TargetDescriptor::name(q), DependencyKind::Instantiates, line);
                    }
                    Some(q) if !matches!(q.as_str(), "crate" | "self" | "super") => {
                        // module::function
                        self.builder
                            .edge(&source, TargetDescriptor::name(name), DependencyKind::Call, line);
                    }
                    _ => {
                        self.builder
                            .edge(&source, TargetDescriptor::name(name), DependencyKind::Call, line);
                    }
                }
            }
            "field_expression" => {
                let Some(method) = field_text(self.bytes, fun, "field").map(str::to_string) else {
                    return;
                };
                let receiver = field_text(self.bytes, fun, "value").unwrap_or("");
                let reference = match self.self_type() {
                    Some(ty) if receiver == "self" => TargetDescriptor::qualified(method.clone(), ty),
                    _ => TargetDescriptor::name(method.clone()),
                };
                self.builder.edge(&source, reference, DependencyKind::Call, line);
                if method == "route" {
                    self.route_from_router_call(node);
                }
            }
            _ => {}
        }
    }

    fn visit_struct_literal(&mut self, node: Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let text = text_of(self.bytes, name_node);
        let Some(mut name) = last_ident(text.split('<').next().unwrap_or(text)) else {
            return;
        };
        if name == "Self" {
            match self.self_type() {
                Some(ty) => name = ty.to_string(),
                None => return,
            }
        }
        let source = self.source_key();
        self.builder.edge(
            &source,
            TargetDescriptor::name(name),
            DependencyKind::Instantiates,
            line_of(node),
        );
    }

    // ========================================================================
    // Routes
    // ========================================================================

    /// actix/rocket style: `#[get("/users/{id}")] async fn handler()`.
    fn route_from_attribute(&mut self, attr: &str, handler_key: &str, node: Node) {
        let Some(caps) = ROUTE_ATTR.captures(attr) else {
            return;
        };
        let (Some(method), Some(path)) = (caps.get(1), caps.get(2)) else {
            return;
        };
        let (Some(method), Some(path)) = (normalize_method(method.as_str()), normalize_route(path.as_str()))
        else {
            return;
        };
        let route_key = self.push_route(&method, &path, attr, node);
        self.builder.edge(
            &route_key,
            TargetDescriptor::local(handler_key),
            DependencyKind::Call,
            line_of(node),
        );
    }

    /// axum style: `.route("/users/:id", get(show).post(update))`.
    fn route_from_router_call(&mut self, call: Node) {
        let Some(args) = call.child_by_field_name("arguments") else {
            return;
        };
        let mut cursor = args.walk();
        let named: Vec<Node> = args.named_children(&mut cursor).collect();
        let (Some(path_node), Some(handlers)) = (named.first(), named.get(1)) else {
            return;
        };
        if path_node.kind() != "string_literal" {
            return;
        }
        let raw = string_content(self.bytes, *path_node);
        let Some(path) = normalize_route(&raw) else {
            return;
        };
        let mut found = Vec::new();
        collect_method_router(*handlers, self.bytes, &mut found);
        for (method, handler) in found {
            let route_key = self.push_route(&method, &path, &raw, call);
            self.builder.edge(
                &route_key,
                TargetDescriptor::name(handler),
                DependencyKind::Call,
                line_of(call),
            );
        }
    }

    fn push_route(&mut self, method: &str, path: &str, raw: &str, node: Node) -> String {
        self.builder.push(
            LocalSymbol::new(route_symbol_name(method, path), SymbolKind::Route, lines_of(node))
                .exported(true)
                .test(self.test_depth > 0)
                .signature(Some(raw.to_string())),
        )
    }
}

/// Collect `(METHOD, handler)` pairs from `get(a).post(b)` chains.
fn collect_method_router(node: Node, bytes: &[u8], out: &mut Vec<(String, String)>) {
    if node.kind() == "call_expression" {
        if let Some(fun) = node.child_by_field_name("function") {
            let method_name = match fun.kind() {
                "identifier" | "scoped_identifier" => last_ident_of(bytes, fun),
                "field_expression" => field_text(bytes, fun, "field").map(str::to_string),
                _ => None,
            };
            if let Some(method) = method_name.as_deref().and_then(normalize_method) {
                let handler = node.child_by_field_name("arguments").and_then(|args| {
                    let mut cursor = args.walk();
                    let first = args.named_children(&mut cursor).next();
                    first.and_then(|a| last_ident_of(bytes, a))
                });
                if let Some(handler) = handler {
                    out.push((method, handler));
                }
            }
            if fun.kind() == "field_expression" {
                if let Some(receiver) = fun.child_by_field_name("value") {
                    collect_method_router(receiver, bytes, out);
                }
            }
        }
    }
}

/// Flatten a use tree into full paths (`crate::a::{b, c::D}` -> two paths).
fn collect_use_paths(node: Node, bytes: &[u8], prefix: &str, out: &mut Vec<String>) {
    let join = |rest: &str| {
        if prefix.is_empty() {
            rest.to_string()
        } else {
            format!("{prefix}::{rest}")
        }
    };
    match node.kind() {
        "scoped_identifier" | "identifier" | "crate" | "self" | "super" => {
            out.push(join(text_of(bytes, node)));
        }
        "use_as_clause" => {
            if let Some(path) = node.child_by_field_name("path") {
                out.push(join(text_of(bytes, path)));
            }
        }
        "use_wildcard" => {
            let text = text_of(bytes, node);
            let base = text.trim_end_matches('*').trim_end_matches("::");
            if !base.is_empty() {
                out.push(join(base));
            } else if !prefix.is_empty() {
                out.push(prefix.to_string());
            }
        }
        "scoped_use_list" => {
            let next = node
                .child_by_field_name("path")
                .map(|p| join(text_of(bytes, p)))
                .unwrap_or_else(|| prefix.to_string());
            if let Some(list) = node.child_by_field_name("list") {
                collect_use_paths(list, bytes, &next, out);
            }
        }
        "use_list" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                collect_use_paths(child, bytes, prefix, out);
            }
        }
        _ => {}
    }
}
