//! TypeScript/TSX/JavaScript scanner using tree-sitter.
//!
//! `.ts`, `.mts` and `.cts` use the TypeScript grammar; JSX-bearing and plain
//! JavaScript files use the TSX grammar. The walker is shared with the Vue
//! scanner for `<script>` blocks.

use super::routes::{normalize_method, normalize_route, route_symbol_name};
use super::*;

/// Receivers whose member calls never point into the project.
const GLOBAL_OBJECTS: &[&str] = &[
    "console", "Math", "JSON", "Object", "Array", "Promise", "Date", "Number", "String",
    "Reflect", "Symbol", "window", "document", "process",
];

/// Free functions that issue HTTP requests with a URL first argument.
const HTTP_CLIENT_FNS: &[&str] = &["fetch", "axios", "ky", "$fetch", "useFetch"];

/// Objects whose `get`/`post`/... members are client calls, never routes.
const HTTP_CLIENT_OBJECTS: &[&str] = &["axios", "ky", "http", "$http", "httpClient", "client"];

/// TypeScript/TSX/JavaScript source code scanner.
pub struct TypeScriptScanner;

impl TypeScriptScanner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TypeScriptScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageScanner for TypeScriptScanner {
    fn name(&self) -> &'static str {
        "typescript"
    }

    fn extensions(&self) -> &[&'static str] {
        &["ts", "mts", "cts", "tsx", "js", "jsx", "mjs", "cjs"]
    }

    fn scan(&self, file: &SourceFile) -> Result<FileFragment, ParseFailure> {
        let ext = file.extension().unwrap_or_default();
        let language = if matches!(ext.as_str(), "ts" | "mts" | "cts" | "tsx") {
            Language::TypeScript
        } else {
            Language::JavaScript
        };
        let mut builder = FragmentBuilder::new(&file.path, language, &file.text);
        scan_script(&mut builder, &file.text, grammar_for(&ext), MODULE_KEY)?;
        builder.propagate_exports();
        Ok(builder.finish())
    }
}

/// Grammar for a script with the given extension (or Vue `lang`).
pub(crate) fn grammar_for(ext: &str) -> tree_sitter::Language {
    match ext {
        "ts" | "mts" | "cts" => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        _ => tree_sitter_typescript::LANGUAGE_TSX.into(),
    }
}

/// Scan a script into `builder`. References from module-level code are
/// attributed to `top_source`.
pub(crate) fn scan_script(
    builder: &mut FragmentBuilder,
    source: &str,
    grammar: tree_sitter::Language,
    top_source: &str,
) -> Result<(), ParseFailure> {
    let path = builder.path().to_path_buf();
    let tree = parse_tree(grammar, source, &path)?;
    let mut walker = TsWalker {
        bytes: source.as_bytes(),
        builder,
        source: vec![top_source.to_string()],
        scope: vec![MODULE_KEY.to_string()],
        classes: Vec::new(),
        exporting: false,
        pending_exports: Vec::new(),
    };
    walker.walk(tree.root_node());
    let pending = std::mem::take(&mut walker.pending_exports);
    for name in pending {
        walker.builder.mark_exported(&name);
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Value of a string or template literal argument.
fn string_value(bytes: &[u8], node: Node) -> Option<String> {
    match node.kind() {
        "string" | "template_string" => Some(string_content(bytes, node)),
        _ => None,
    }
}

fn contains_jsx(node: Node) -> bool {
    if matches!(
        node.kind(),
        "jsx_element" | "jsx_self_closing_element" | "jsx_fragment"
    ) {
        return true;
    }
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).any(contains_jsx);
    found
}

fn is_function_value(node: Node) -> bool {
    matches!(
        node.kind(),
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
}

fn is_relative_specifier(spec: &str) -> bool {
    spec.starts_with("./")
        || spec.starts_with("../")
        || spec.starts_with("@/")
        || spec.starts_with("~/")
        || spec == "."
        || spec == ".."
}

fn arguments(node: Node) -> Vec<Node> {
    node.child_by_field_name("arguments")
        .map(|args| {
            let mut cursor = args.walk();
            args.named_children(&mut cursor)
                .filter(|n| n.kind() != "comment")
                .collect()
        })
        .unwrap_or_default()
}

/// HTTP method from a `{ method: "POST" }` options object.
fn method_from_options(bytes: &[u8], node: Node) -> Option<String> {
    if node.kind() != "object" {
        return None;
    }
    let mut cursor = node.walk();
    for pair in node.named_children(&mut cursor) {
        if pair.kind() != "pair" {
            continue;
        }
        let key = field_text(bytes, pair, "key")?.trim_matches(|c| c == '"' || c == '\'');
        if key == "method" {
            let value = pair.child_by_field_name("value")?;
            return string_value(bytes, value).and_then(|m| normalize_method(&m));
        }
    }
    None
}

// ============================================================================
// Walker
// ============================================================================

struct TsWalker<'a, 'b> {
    bytes: &'a [u8],
    builder: &'b mut FragmentBuilder,
    source: Vec<String>,
    scope: Vec<String>,
    classes: Vec<String>,
    /// Set while visiting the declaration of an `export` statement
    exporting: bool,
    pending_exports: Vec<String>,
}

impl TsWalker<'_, '_> {
    fn source_key(&self) -> String {
        self.source.last().cloned().unwrap_or_else(|| MODULE_KEY.to_string())
    }

    fn scope_key(&self) -> String {
        self.scope.last().cloned().unwrap_or_else(|| MODULE_KEY.to_string())
    }

    fn at_top_level(&self) -> bool {
        self.scope.len() == 1 && self.classes.is_empty()
    }

    fn edge(&mut self, reference: TargetDescriptor, kind: DependencyKind, node: Node) {
        let source = self.source_key();
        self.builder.edge(&source, reference, kind, line_of(node));
    }

    fn walk_children(&mut self, node: Node) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            self.walk(child);
        }
    }

    /// Walk `node` with references attributed to `key`.
    fn walk_as(&mut self, key: &str, node: Node) {
        self.source.push(key.to_string());
        self.scope.push(key.to_string());
        self.walk(node);
        self.scope.pop();
        self.source.pop();
    }

    fn take_exporting(&mut self) -> bool {
        std::mem::replace(&mut self.exporting, false)
    }

    fn walk(&mut self, node: Node) {
        match node.kind() {
            "import_statement" => self.visit_import(node),
            "export_statement" => self.visit_export(node),
            "function_declaration" | "generator_function_declaration" | "function_signature" => {
                self.declare_function(node)
            }
            "class_declaration" | "abstract_class_declaration" => self.declare_class(node),
            "interface_declaration" => self.declare_interface(node),
            "enum_declaration" | "type_alias_declaration" => self.declare_type(node),
            "lexical_declaration" | "variable_declaration" if self.at_top_level() => {
                self.declare_variables(node)
            }
            "call_expression" => self.visit_call(node),
            "new_expression" => self.visit_new(node),
            "jsx_opening_element" | "jsx_self_closing_element" => self.visit_jsx(node),
            "assignment_expression" => self.visit_assignment(node),
            "identifier" | "shorthand_property_identifier" => {
                let source = self.source_key();
                self.builder
                    .reference(&source, text_of(self.bytes, node), line_of(node));
            }
            _ => self.walk_children(node),
        }
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    fn push(&mut self, node: Node, name: String, kind: SymbolKind, exported: bool) -> String {
        let parent = self.scope_key();
        let signature = match kind {
            SymbolKind::Function | SymbolKind::Method | SymbolKind::Component => {
                signature_of(self.bytes, node)
            }
            _ => None,
        };
        self.builder.push(
            LocalSymbol::new(name, kind, lines_of(node))
                .exported(exported)
                .signature(signature)
                .parent(Some(parent)),
        )
    }

    fn declare_function(&mut self, node: Node) {
        let exported = self.take_exporting();
        let name = field_text(self.bytes, node, "name")
            .map(str::to_string)
            .unwrap_or_else(|| "default".to_string());
        let body = node.child_by_field_name("body");
        let kind = if is_capitalized(&name) && body.is_some_and(contains_jsx) {
            SymbolKind::Component
        } else {
            SymbolKind::Function
        };
        let key = self.push(node, name, kind, exported);
        if let Some(body) = body {
            self.walk_as(&key, body);
        }
    }

    fn declare_class(&mut self, node: Node) {
        let exported = self.take_exporting();
        let name = field_text(self.bytes, node, "name")
            .map(str::to_string)
            .unwrap_or_else(|| "default".to_string());
        let key = self.push(node, name.clone(), SymbolKind::Class, exported);

        let mut cursor = node.walk();
        let heritage: Vec<Node> = node
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "class_heritage")
            .collect();
        for clause_parent in heritage {
            let mut cursor = clause_parent.walk();
            let clauses: Vec<Node> = clause_parent.named_children(&mut cursor).collect();
            for clause in clauses {
                let kind = match clause.kind() {
                    "extends_clause" => DependencyKind::Extends,
                    "implements_clause" => DependencyKind::Implements,
                    // JavaScript grammar: `class A extends B` has a bare expression
                    _ => DependencyKind::Extends,
                };
                let mut cursor = clause.walk();
                let targets: Vec<Node> = if clause.kind().ends_with("_clause") {
                    clause.named_children(&mut cursor).collect()
                } else {
                    vec![clause]
                };
                for target in targets {
                    if target.kind() == "type_arguments" {
                        continue;
                    }
                    let text = text_of(self.bytes, target);
                    if let Some(base) = last_ident(text.split('<').next().unwrap_or(text)) {
                        self.builder.edge(
                            &key,
                            TargetDescriptor::name(base),
                            kind,
                            line_of(target),
                        );
                    }
                }
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.classes.push(name);
            self.source.push(key.clone());
            self.scope.push(key.clone());
            self.visit_class_body(body, &key);
            self.scope.pop();
            self.source.pop();
            self.classes.pop();
        }
    }

    fn visit_class_body(&mut self, body: Node, class_key: &str) {
        let mut cursor = body.walk();
        let members: Vec<Node> = body.named_children(&mut cursor).collect();
        for member in members {
            match member.kind() {
                "method_definition" | "method_signature" | "abstract_method_signature" => {
                    let Some(name) = field_text(self.bytes, member, "name").map(str::to_string)
                    else {
                        continue;
                    };
                    let body = member.child_by_field_name("body");
                    if name == "constructor" {
                        // Constructor work belongs to the class itself
                        if let Some(body) = body {
                            self.walk(body);
                        }
                        continue;
                    }
                    let key = self.push(member, name, SymbolKind::Method, false);
                    if let Some(body) = body {
                        self.walk_as(&key, body);
                    }
                }
                "public_field_definition" | "field_definition" => {
                    let name = field_text(self.bytes, member, "name")
                        .or_else(|| field_text(self.bytes, member, "property"))
                        .map(str::to_string);
                    let value = member.child_by_field_name("value");
                    match (name, value) {
                        (Some(name), Some(value)) if is_function_value(value) => {
                            let key = self.push(member, name, SymbolKind::Method, false);
                            self.walk_as(&key, value);
                        }
                        (_, Some(value)) => {
                            self.source.push(class_key.to_string());
                            self.walk(value);
                            self.source.pop();
                        }
                        _ => {}
                    }
                }
                _ => self.walk(member),
            }
        }
    }

    fn declare_interface(&mut self, node: Node) {
        let exported = self.take_exporting();
        let Some(name) = field_text(self.bytes, node, "name").map(str::to_string) else {
            return;
        };
        let key = self.push(node, name, SymbolKind::Interface, exported);
        let mut cursor = node.walk();
        let clauses: Vec<Node> = node
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "extends_type_clause")
            .collect();
        for clause in clauses {
            let mut cursor = clause.walk();
            let targets: Vec<Node> = clause.named_children(&mut cursor).collect();
            for target in targets {
                let text = text_of(self.bytes, target);
                if let Some(base) = last_ident(text.split('<').next().unwrap_or(text)) {
                    self.builder
                        .edge(&key, TargetDescriptor::name(base), DependencyKind::Extends, line_of(target));
                }
            }
        }
    }

    fn declare_type(&mut self, node: Node) {
        let exported = self.take_exporting();
        if let Some(name) = field_text(self.bytes, node, "name").map(str::to_string) {
            self.push(node, name, SymbolKind::Class, exported);
        }
    }

    fn declare_variables(&mut self, node: Node) {
        let exported = self.take_exporting();
        let is_const = node
            .child(0)
            .is_some_and(|c| text_of(self.bytes, c) == "const");
        let mut cursor = node.walk();
        let declarators: Vec<Node> = node
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "variable_declarator")
            .collect();

        for declarator in declarators {
            let value = declarator.child_by_field_name("value");
            let name_node = declarator.child_by_field_name("name");
            let name = match name_node {
                Some(n) if n.kind() == "identifier" => text_of(self.bytes, n).to_string(),
                _ => {
                    // Destructuring: no symbol, but the initializer still runs
                    if let Some(value) = value {
                        self.walk(value);
                    }
                    continue;
                }
            };

            let kind = match value {
                Some(v) if is_function_value(v) => {
                    if is_capitalized(&name) && contains_jsx(v) {
                        SymbolKind::Component
                    } else {
                        SymbolKind::Function
                    }
                }
                Some(v) if v.kind() == "class" => SymbolKind::Class,
                _ if is_const && is_upper_snake(&name) => SymbolKind::Constant,
                _ => SymbolKind::Variable,
            };
            let key = self.push(declarator, name, kind, exported);
            if let Some(value) = value {
                self.walk_as(&key, value);
            }
        }
    }

    // ========================================================================
    // Module Structure
    // ========================================================================

    fn visit_import(&mut self, node: Node) {
        if let Some(source) = node.child_by_field_name("source") {
            let spec = string_content(self.bytes, source);
            if is_relative_specifier(&spec) {
                self.builder.edge(
                    MODULE_KEY,
                    TargetDescriptor::module(spec),
                    DependencyKind::Import,
                    line_of(node),
                );
            }
        }
    }

    fn visit_export(&mut self, node: Node) {
        if let Some(source) = node.child_by_field_name("source") {
            // Re-export: `export { a } from './a'`
            let spec = string_content(self.bytes, source);
            if is_relative_specifier(&spec) {
                self.builder.edge(
                    MODULE_KEY,
                    TargetDescriptor::module(spec),
                    DependencyKind::Import,
                    line_of(node),
                );
            }
            return;
        }

        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "export_clause" => {
                    let mut cursor = child.walk();
                    let specifiers: Vec<Node> = child.named_children(&mut cursor).collect();
                    for spec in specifiers {
                        if let Some(name) = field_text(self.bytes, spec, "name") {
                            self.pending_exports.push(name.to_string());
                        }
                    }
                }
                "identifier" => self.pending_exports.push(text_of(self.bytes, child).to_string()),
                "function_declaration" | "generator_function_declaration" | "class_declaration"
                | "abstract_class_declaration" | "interface_declaration" | "enum_declaration"
                | "type_alias_declaration" | "lexical_declaration" | "variable_declaration"
                | "function_signature" => {
                    self.exporting = true;
                    self.walk(child);
                    self.exporting = false;
                }
                "arrow_function" | "function_expression" | "function" | "class" => {
                    // `export default () => ...`
                    let kind = if child.kind() == "class" {
                        SymbolKind::Class
                    } else if contains_jsx(child) {
                        SymbolKind::Component
                    } else {
                        SymbolKind::Function
                    };
                    let key = self.push(child, "default".to_string(), kind, true);
                    self.walk_as(&key, child);
                }
                "comment" | "decorator" => {}
                _ => self.walk(child),
            }
        }
    }

    /// CommonJS: `module.exports = { a, b }`, `exports.c = c`.
    fn visit_assignment(&mut self, node: Node) {
        let left = node.child_by_field_name("left");
        let right = node.child_by_field_name("right");
        if let Some(left) = left {
            let target = text_of(self.bytes, left);
            if target == "module.exports" {
                if let Some(right) = right {
                    match right.kind() {
                        "identifier" => self.pending_exports.push(text_of(self.bytes, right).to_string()),
                        "object" => {
                            let mut cursor = right.walk();
                            let entries: Vec<Node> = right.named_children(&mut cursor).collect();
                            for entry in entries {
                                let name = match entry.kind() {
                                    "shorthand_property_identifier" => Some(text_of(self.bytes, entry)),
                                    "pair" => entry
                                        .child_by_field_name("value")
                                        .filter(|v| v.kind() == "identifier")
                                        .map(|v| text_of(self.bytes, v)),
                                    _ => None,
                                };
                                if let Some(name) = name {
                                    self.pending_exports.push(name.to_string());
                                }
                            }
                        }
                        _ => {}
                    }
                }
            } else if let Some(name) = target.strip_prefix("exports.") {
                self.pending_exports.push(name.to_string());
                if let Some(right) = right.filter(|r| r.kind() == "identifier") {
                    self.pending_exports.push(text_of(self.bytes, right).to_string());
                }
            }
        }
        if let Some(right) = right {
            self.walk(right);
        }
    }

    // ========================================================================
    // References
    // ========================================================================

    fn visit_call(&mut self, node: Node) {
        let Some(fun) = node.child_by_field_name("function") else {
            return self.walk_children(node);
        };
        let args = arguments(node);

        match fun.kind() {
            "import" => {
                // `import('./lazy')`
                if let Some(spec) = args.first().and_then(|a| string_value(self.bytes, *a)) {
                    if is_relative_specifier(&spec) {
                        self.edge(TargetDescriptor::module(spec), DependencyKind::Import, node);
                    }
                }
                return;
            }
            "identifier" => {
                let name = text_of(self.bytes, fun).to_string();
                if name == "require" {
                    if let Some(spec) = args.first().and_then(|a| string_value(self.bytes, *a)) {
                        if is_relative_specifier(&spec) {
                            self.edge(TargetDescriptor::module(spec), DependencyKind::Import, node);
                        }
                    }
                    return;
                }
                if HTTP_CLIENT_FNS.contains(&name.as_str()) && self.client_call(node, &args, None) {
                    return;
                }
                self.edge(TargetDescriptor::name(name), DependencyKind::Call, node);
            }
            "member_expression" => {
                let object = fun.child_by_field_name("object");
                let property = field_text(self.bytes, fun, "property").unwrap_or("").to_string();
                let object_text = object.map(|o| text_of(self.bytes, o)).unwrap_or("");

                if let Some(method) = normalize_method(&property) {
                    if !HTTP_CLIENT_OBJECTS.contains(&object_text)
                        && self.route_definition(node, &args, &method)
                    {
                        return;
                    }
                    if self.client_call(node, &args, Some(method)) {
                        self.walk_children(fun);
                        return;
                    }
                }

                if !GLOBAL_OBJECTS.contains(&object_text) && !property.is_empty() {
                    let reference = match (object_text, self.classes.last()) {
                        ("this", Some(class)) => TargetDescriptor::qualified(property, class.clone()),
                        (obj, _) if is_capitalized(obj) && !obj.contains(['.', '(']) => {
                            TargetDescriptor::qualified(property, obj)
                        }
                        _ => TargetDescriptor::name(property),
                    };
                    self.edge(reference, DependencyKind::Call, node);
                }
                if let Some(object) = object {
                    self.walk(object);
                }
            }
            _ => self.walk(fun),
        }

        if let Some(arg_list) = node.child_by_field_name("arguments") {
            self.walk(arg_list);
        }
    }

    /// `fetch("/api/users")`, `axios.post(`/api/users/${id}`)`. Returns false
    /// when the first argument is not a route literal.
    fn client_call(&mut self, node: Node, args: &[Node], method: Option<String>) -> bool {
        let Some(path) = args
            .first()
            .and_then(|a| string_value(self.bytes, *a))
            .and_then(|raw| normalize_route(&raw))
        else {
            return false;
        };
        let method = method.or_else(|| {
            let options = args.get(1).and_then(|o| method_from_options(self.bytes, *o));
            let callee = field_text(self.bytes, node, "function").unwrap_or("");
            options.or_else(|| (callee == "fetch").then(|| "GET".to_string()))
        });
        self.edge(TargetDescriptor::Route { method, path }, DependencyKind::RouteInvocation, node);
        for arg in args.iter().skip(1) {
            self.walk(*arg);
        }
        true
    }

    /// Express style: `app.get("/users/:id", auth, show)`. The route needs a
    /// path literal and at least one handler argument.
    fn route_definition(&mut self, node: Node, args: &[Node], method: &str) -> bool {
        if args.len() < 2 {
            return false;
        }
        let Some(raw) = string_value(self.bytes, args[0]) else {
            return false;
        };
        if raw.contains("${") {
            return false;
        }
        let handlers = &args[1..];
        let is_handler = |n: &Node| {
            is_function_value(*n) || matches!(n.kind(), "identifier" | "member_expression")
        };
        if !handlers.iter().all(is_handler) {
            return false;
        }
        let Some(path) = normalize_route(&raw) else {
            return false;
        };

        let route_key = self.builder.push(
            LocalSymbol::new(route_symbol_name(method, &path), SymbolKind::Route, lines_of(node))
                .exported(true)
                .signature(Some(format!("{method} {raw}"))),
        );
        for handler in handlers {
            if is_function_value(*handler) {
                self.source.push(route_key.clone());
                self.walk(*handler);
                self.source.pop();
            } else if let Some(name) = last_ident_of(self.bytes, *handler) {
                self.builder.edge(
                    &route_key,
                    TargetDescriptor::name(name),
                    DependencyKind::Call,
                    line_of(*handler),
                );
            }
        }
        true
    }

    fn visit_new(&mut self, node: Node) {
        if let Some(ctor) = node.child_by_field_name("constructor") {
            let text = text_of(self.bytes, ctor);
            if let Some(name) = last_ident(text) {
                self.edge(TargetDescriptor::name(name), DependencyKind::Instantiates, node);
            }
        }
        if let Some(args) = node.child_by_field_name("arguments") {
            self.walk(args);
        }
    }

    fn visit_jsx(&mut self, node: Node) {
        if let Some(name_node) = node.child_by_field_name("name") {
            let text = text_of(self.bytes, name_node);
            if let Some(name) = last_ident(text) {
                if is_capitalized(&name) {
                    self.edge(TargetDescriptor::template(name), DependencyKind::TemplateReference, node);
                }
            }
        }
        let mut cursor = node.walk();
        let attrs: Vec<Node> = node
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "jsx_attribute")
            .collect();
        for attr in attrs {
            self.walk_children(attr);
        }
    }
}
