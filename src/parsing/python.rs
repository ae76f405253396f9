//! Python scanner using tree-sitter.
//!
//! Exports follow `__all__` when a module declares it; otherwise only the
//! public top-level names of a package `__init__.py` count as exported.
//! Flask/FastAPI route decorators become route symbols and `requests`/`httpx`
//! style calls with a path literal become route invocations.

use super::routes::{ANY_METHOD, normalize_method, normalize_route, route_symbol_name};
use super::*;

/// Builtins never resolved against project symbols.
const BUILTINS: &[&str] = &[
    "print", "len", "range", "str", "int", "float", "bool", "bytes", "list", "dict", "set",
    "tuple", "isinstance", "issubclass", "super", "getattr", "setattr", "hasattr", "enumerate",
    "zip", "sorted", "reversed", "open", "type", "min", "max", "sum", "any", "all", "repr",
    "iter", "next", "map", "filter", "abs", "round", "vars", "id", "hash", "format",
    "callable", "staticmethod", "classmethod", "property",
];

/// Standard library receivers whose attribute calls never point into the project.
const STDLIB_OBJECTS: &[&str] = &[
    "os", "os.path", "sys", "json", "re", "logging", "math", "time", "datetime", "subprocess",
    "shutil", "itertools", "functools", "collections", "typing", "asyncio", "random", "pathlib",
];

/// Python source code scanner.
pub struct PythonScanner;

impl PythonScanner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PythonScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageScanner for PythonScanner {
    fn name(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &[&'static str] {
        &["py"]
    }

    fn scan(&self, file: &SourceFile) -> Result<FileFragment, ParseFailure> {
        let tree = parse_tree(tree_sitter_python::LANGUAGE.into(), &file.text, &file.path)?;
        let mut builder = FragmentBuilder::new(&file.path, Language::Python, &file.text);

        let mut walker = PyWalker {
            bytes: file.text.as_bytes(),
            builder: &mut builder,
            source: vec![MODULE_KEY.to_string()],
            scope: vec![Scope {
                key: MODULE_KEY.to_string(),
                class: None,
            }],
            test_depth: 0,
            all_names: None,
            top_level: Vec::new(),
        };
        walker.walk(tree.root_node());
        let all_names = walker.all_names.take();
        let top_level = std::mem::take(&mut walker.top_level);

        match all_names {
            Some(names) => {
                for name in names {
                    builder.mark_exported(&name);
                }
            }
            None if is_package_init(&file.path) => {
                for name in top_level.iter().filter(|n| !n.starts_with('_')) {
                    builder.mark_exported(name);
                }
            }
            None => {}
        }
        builder.propagate_exports();
        Ok(builder.finish())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn is_package_init(path: &Path) -> bool {
    path.file_name().is_some_and(|n| n == "__init__.py")
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect()
}

/// Strings of a `["a", "b"]` or `("a", "b")` literal.
fn string_list(bytes: &[u8], node: Node) -> Vec<String> {
    if !matches!(node.kind(), "list" | "tuple") {
        return Vec::new();
    }
    named_children(node)
        .into_iter()
        .filter(|n| n.kind() == "string")
        .map(|n| string_content(bytes, n))
        .collect()
}

/// Value of the keyword argument `name` in an argument list.
fn keyword_value<'t>(bytes: &[u8], args: &[Node<'t>], name: &str) -> Option<Node<'t>> {
    args.iter()
        .filter(|a| a.kind() == "keyword_argument")
        .find(|a| field_text(bytes, **a, "name") == Some(name))
        .and_then(|a| a.child_by_field_name("value"))
}

fn call_arguments(node: Node) -> Vec<Node> {
    node.child_by_field_name("arguments")
        .map(named_children)
        .unwrap_or_default()
}

/// Module specifier of an imported name: `from .models import User` gives
/// `.models.User`, `from . import views` gives `.views`.
fn from_import_specifier(module: &str, name: &str) -> String {
    if module.ends_with('.') {
        format!("{module}{name}")
    } else {
        format!("{module}.{name}")
    }
}

fn imported_name<'a>(bytes: &'a [u8], node: Node) -> &'a str {
    match node.kind() {
        "aliased_import" => field_text(bytes, node, "name").unwrap_or(""),
        _ => text_of(bytes, node),
    }
}

// ============================================================================
// Walker
// ============================================================================

struct Scope {
    key: String,
    /// Class name when this scope is a class body
    class: Option<String>,
}

struct PyWalker<'a, 'b> {
    bytes: &'a [u8],
    builder: &'b mut FragmentBuilder,
    source: Vec<String>,
    scope: Vec<Scope>,
    /// Nesting depth inside test functions and test classes
    test_depth: usize,
    all_names: Option<Vec<String>>,
    top_level: Vec<String>,
}

impl PyWalker<'_, '_> {
    fn source_key(&self) -> String {
        self.source.last().cloned().unwrap_or_else(|| MODULE_KEY.to_string())
    }

    fn scope_key(&self) -> String {
        self.scope
            .last()
            .map(|s| s.key.clone())
            .unwrap_or_else(|| MODULE_KEY.to_string())
    }

    fn at_top_level(&self) -> bool {
        self.scope.len() == 1
    }

    fn in_class_body(&self) -> bool {
        self.scope.last().is_some_and(|s| s.class.is_some())
    }

    fn enclosing_class(&self) -> Option<String> {
        self.scope.iter().rev().find_map(|s| s.class.clone())
    }

    fn edge(&mut self, reference: TargetDescriptor, kind: DependencyKind, node: Node) {
        let source = self.source_key();
        self.builder.edge(&source, reference, kind, line_of(node));
    }

    fn walk_children(&mut self, node: Node) {
        for child in named_children(node) {
            self.walk(child);
        }
    }

    /// Walk `node` as the body of the symbol `key`.
    fn walk_as(&mut self, key: &str, class: Option<String>, node: Node) {
        self.source.push(key.to_string());
        self.scope.push(Scope {
            key: key.to_string(),
            class,
        });
        self.walk(node);
        self.scope.pop();
        self.source.pop();
    }

    fn walk(&mut self, node: Node) {
        match node.kind() {
            "import_statement" => self.visit_import(node),
            "import_from_statement" => self.visit_import_from(node),
            "future_import_statement" | "comment" | "lambda_parameters" => {}
            "decorated_definition" => self.visit_decorated(node),
            "function_definition" => self.declare_function(node, &[]),
            "class_definition" => self.declare_class(node, &[]),
            "assignment" | "augmented_assignment" => self.visit_assignment(node),
            "call" => self.visit_call(node),
            "attribute" => {
                if let Some(object) = node.child_by_field_name("object") {
                    self.walk(object);
                }
            }
            "keyword_argument" => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.walk(value);
                }
            }
            "identifier" => {
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

    fn push(&mut self, node: Node, name: &str, kind: SymbolKind, exported: bool, in_test: bool) -> String {
        let signature = match kind {
            SymbolKind::Function | SymbolKind::Method | SymbolKind::Class => {
                signature_of(self.bytes, node)
            }
            _ => None,
        };
        let parent = self.scope_key();
        if self.at_top_level() {
            self.top_level.push(name.to_string());
        }
        self.builder.push(
            LocalSymbol::new(name, kind, lines_of(node))
                .exported(exported)
                .test(in_test)
                .signature(signature)
                .parent(Some(parent)),
        )
    }

    fn visit_decorated(&mut self, node: Node) {
        let decorators: Vec<Node> = named_children(node)
            .into_iter()
            .filter(|n| n.kind() == "decorator")
            .collect();
        match node.child_by_field_name("definition") {
            Some(def) if def.kind() == "function_definition" => self.declare_function(def, &decorators),
            Some(def) if def.kind() == "class_definition" => self.declare_class(def, &decorators),
            Some(def) => self.walk(def),
            None => {}
        }
    }

    fn declare_function(&mut self, node: Node, decorators: &[Node]) {
        let Some(name) = field_text(self.bytes, node, "name").map(str::to_string) else {
            return self.walk_children(node);
        };
        let in_class = self.in_class_body();
        let kind = if in_class {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };
        let is_fixture = decorators
            .iter()
            .any(|d| text_of(self.bytes, *d).contains("fixture"));
        let in_test = self.test_depth > 0 || name.starts_with("test_") || is_fixture;
        // Dunder methods are invoked by the runtime
        let exported = in_class && is_dunder(&name);
        let key = self.push(node, &name, kind, exported, in_test);

        self.visit_decorators(&key, decorators);
        if in_test {
            self.test_depth += 1;
        }
        if let Some(params) = node.child_by_field_name("parameters") {
            self.source.push(key.clone());
            self.visit_parameters(params);
            self.source.pop();
        }
        if let Some(ret) = node.child_by_field_name("return_type") {
            self.source.push(key.clone());
            self.walk(ret);
            self.source.pop();
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_as(&key, None, body);
        }
        if in_test {
            self.test_depth -= 1;
        }
    }

    /// Only annotations and default values; parameter names bind nothing
    /// outside the function.
    fn visit_parameters(&mut self, params: Node) {
        for param in named_children(params) {
            for field in ["type", "value"] {
                if let Some(child) = param.child_by_field_name(field) {
                    self.walk(child);
                }
            }
        }
    }

    fn declare_class(&mut self, node: Node, decorators: &[Node]) {
        let Some(name) = field_text(self.bytes, node, "name").map(str::to_string) else {
            return self.walk_children(node);
        };
        let in_test = self.test_depth > 0 || name.starts_with("Test");
        let key = self.push(node, &name, SymbolKind::Class, false, in_test);

        if let Some(bases) = node.child_by_field_name("superclasses") {
            for base in named_children(bases) {
                match base.kind() {
                    "identifier" | "attribute" | "subscript" => {
                        let text = text_of(self.bytes, base);
                        let head = text.split('[').next().unwrap_or(text);
                        if let Some(base_name) = last_ident(head).filter(|b| b != "object") {
                            self.builder.edge(
                                &key,
                                TargetDescriptor::name(base_name),
                                DependencyKind::Extends,
                                line_of(base),
                            );
                        }
                    }
                    _ => {
                        // `metaclass=Meta` and friends
                        self.source.push(key.clone());
                        self.walk(base);
                        self.source.pop();
                    }
                }
            }
        }

        self.visit_decorators(&key, decorators);
        if in_test {
            self.test_depth += 1;
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_as(&key, Some(name), body);
        }
        if in_test {
            self.test_depth -= 1;
        }
    }

    fn visit_decorators(&mut self, key: &str, decorators: &[Node]) {
        for decorator in decorators {
            let Some(expr) = decorator.named_child(0) else {
                continue;
            };
            if expr.kind() == "call" && self.route_decorator(key, expr) {
                continue;
            }
            self.source.push(key.to_string());
            self.walk(expr);
            self.source.pop();
        }
    }

    fn visit_assignment(&mut self, node: Node) {
        let left = node.child_by_field_name("left");
        let right = node.child_by_field_name("right");
        let target = left
            .filter(|l| l.kind() == "identifier")
            .map(|l| text_of(self.bytes, l).to_string());

        if let Some(name) = target.filter(|_| self.at_top_level()) {
            if name == "__all__" {
                let names = right.map(|r| string_list(self.bytes, r)).unwrap_or_default();
                self.all_names.get_or_insert_with(Vec::new).extend(names);
                return;
            }
            if !is_dunder(&name) && node.kind() == "assignment" {
                let kind = match right {
                    Some(r) if r.kind() == "lambda" => SymbolKind::Function,
                    _ if is_upper_snake(&name) => SymbolKind::Constant,
                    _ => SymbolKind::Variable,
                };
                let key = self.push(node, &name, kind, false, self.test_depth > 0);
                self.source.push(key.clone());
                if let Some(annotation) = node.child_by_field_name("type") {
                    self.walk(annotation);
                }
                self.source.pop();
                if let Some(right) = right {
                    self.walk_as(&key, None, right);
                }
                return;
            }
        }

        if let Some(left) = left.filter(|l| l.kind() != "identifier") {
            self.walk(left);
        }
        if let Some(annotation) = node.child_by_field_name("type") {
            self.walk(annotation);
        }
        if let Some(right) = right {
            self.walk(right);
        }
    }

    // ========================================================================
    // Module Structure
    // ========================================================================

    fn import_edge(&mut self, spec: String, node: Node) {
        self.builder.edge(
            MODULE_KEY,
            TargetDescriptor::module(spec),
            DependencyKind::Import,
            line_of(node),
        );
    }

    /// `import pkg.util as util`
    fn visit_import(&mut self, node: Node) {
        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let spec = imported_name(self.bytes, name).to_string();
            if !spec.is_empty() {
                self.import_edge(spec, node);
            }
        }
    }

    /// `from .models import User, Base`; each name may itself be a submodule,
    /// so the specifier carries it and the linker falls back to the longest
    /// resolvable prefix.
    fn visit_import_from(&mut self, node: Node) {
        let Some(module) = field_text(self.bytes, node, "module_name").map(str::to_string) else {
            return;
        };
        if module == "__future__" {
            return;
        }
        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        if names.is_empty() {
            // `from x import *`
            self.import_edge(module, node);
            return;
        }
        for name in names {
            let imported = imported_name(self.bytes, name);
            if !imported.is_empty() {
                let spec = from_import_specifier(&module, imported);
                self.import_edge(spec, node);
            }
        }
    }

    // ========================================================================
    // References
    // ========================================================================

    fn visit_call(&mut self, node: Node) {
        let Some(fun) = node.child_by_field_name("function") else {
            return self.walk_children(node);
        };
        let args = call_arguments(node);

        match fun.kind() {
            "identifier" => {
                let name = text_of(self.bytes, fun).to_string();
                if !BUILTINS.contains(&name.as_str()) {
                    let kind = if is_capitalized(&name) {
                        DependencyKind::Instantiates
                    } else {
                        DependencyKind::Call
                    };
                    self.edge(TargetDescriptor::name(name), kind, node);
                }
            }
            "attribute" => {
                let object = fun.child_by_field_name("object");
                let attr = field_text(self.bytes, fun, "attribute").unwrap_or("").to_string();
                let object_text = object.map(|o| text_of(self.bytes, o)).unwrap_or("");

                if let Some(method) = normalize_method(&attr) {
                    if self.client_call(node, &args, method) {
                        if let Some(object) = object {
                            self.walk(object);
                        }
                        return;
                    }
                }

                let skip = attr.is_empty()
                    || is_dunder(&attr)
                    || STDLIB_OBJECTS.contains(&object_text)
                    || object.is_some_and(|o| o.kind() == "string");
                if !skip {
                    let reference = match (object_text, self.enclosing_class()) {
                        ("self" | "cls", Some(class)) => TargetDescriptor::qualified(attr, class),
                        (obj, _) if is_capitalized(obj) && object.is_some_and(|o| o.kind() == "identifier") => {
                            TargetDescriptor::qualified(attr, obj)
                        }
                        _ => TargetDescriptor::name(attr),
                    };
                    self.edge(reference, DependencyKind::Call, node);
                }
                if let Some(object) = object {
                    self.walk(object);
                }
            }
            _ => self.walk(fun),
        }

        for arg in args {
            self.walk(arg);
        }
    }

    /// `requests.post(f"{API}/users", json=body)`. Returns false when the
    /// first argument is not a route literal.
    fn client_call(&mut self, node: Node, args: &[Node], method: String) -> bool {
        let Some(path) = args
            .first()
            .filter(|a| a.kind() == "string")
            .and_then(|a| normalize_route(&string_content(self.bytes, *a)))
        else {
            return false;
        };
        let method = (method != ANY_METHOD).then_some(method);
        self.edge(TargetDescriptor::Route { method, path }, DependencyKind::RouteInvocation, node);
        for arg in args.iter().skip(1) {
            self.walk(*arg);
        }
        true
    }

    /// `@app.get("/users/{id}")`, `@bp.route("/users/<id>", methods=["POST"])`.
    /// Each method becomes a route symbol calling the decorated handler.
    fn route_decorator(&mut self, handler: &str, call: Node) -> bool {
        let Some(fun) = call.child_by_field_name("function").filter(|f| f.kind() == "attribute") else {
            return false;
        };
        let attr = field_text(self.bytes, fun, "attribute").unwrap_or("");
        let args = call_arguments(call);
        let literal = args
            .first()
            .copied()
            .filter(|a| a.kind() == "string")
            .or_else(|| keyword_value(self.bytes, &args, "path"))
            .or_else(|| keyword_value(self.bytes, &args, "rule"))
            .filter(|v| v.kind() == "string");
        let Some(raw) = literal.map(|v| string_content(self.bytes, v)) else {
            return false;
        };
        let Some(path) = normalize_route(&raw) else {
            return false;
        };

        let declared: Vec<String> = keyword_value(self.bytes, &args, "methods")
            .map(|v| string_list(self.bytes, v))
            .unwrap_or_default()
            .iter()
            .filter_map(|m| normalize_method(m))
            .collect();
        let methods = if !declared.is_empty() {
            declared
        } else if attr == "route" {
            // Flask registers GET unless told otherwise
            vec!["GET".to_string()]
        } else {
            match normalize_method(attr) {
                Some(method) => vec![method],
                None => return false,
            }
        };

        let object = fun.child_by_field_name("object");
        for method in methods {
            let route_key = self.builder.push(
                LocalSymbol::new(route_symbol_name(&method, &path), SymbolKind::Route, lines_of(call))
                    .exported(true)
                    .signature(Some(format!("{method} {raw}"))),
            );
            self.builder.edge(
                &route_key,
                TargetDescriptor::local(handler),
                DependencyKind::Call,
                line_of(call),
            );
            // The app/router object and any keyword arguments belong to the route
            self.source.push(route_key);
            if let Some(object) = object {
                self.walk(object);
            }
            for arg in args.iter().filter(|a| a.kind() == "keyword_argument") {
                self.walk(*arg);
            }
            self.source.pop();
        }
        true
    }
}
