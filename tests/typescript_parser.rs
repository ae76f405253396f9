use polyindex::parsing::typescript::TypeScriptScanner;
use polyindex::parsing::{LanguageScanner, SourceFile};
use polyindex::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn typescript_scanner_reusable() {
    let scanner = TypeScriptScanner::new();
    let file = SourceFile::new("src/alpha.ts", "export function greet() { return 'hi'; }");
    let first = scanner.scan(&file).expect("first scan");
    let second = scanner.scan(&file).expect("second scan");
    assert_eq!(first.symbols, second.symbols);
    assert_eq!(first.edges, second.edges);
}

#[tokio::test]
async fn typescript_qualified_names_use_workspace_relative_path() {
    let temp = TempDir::new().expect("tempdir");
    let root = temp.path();
    fs::write(root.join("package.json"), "{}").expect("package.json");
    fs::create_dir_all(root.join("src")).expect("src dir");
    fs::write(
        root.join("src/alpha.ts"),
        "export function greet() { return 'hi'; }\n",
    )
    .expect("alpha.ts");

    let graph = ProjectScanner::new(IndexConfig::default())
        .scan(root)
        .await
        .expect("scan")
        .graph;

    let greet = graph
        .find_by_qualified_name("src/alpha.ts::greet")
        .unwrap_or_else(|| {
            let names: Vec<_> = graph.symbols().map(|s| s.qualified_name.clone()).collect();
            panic!("expected workspace-relative name, got: {names:?}")
        });
    assert!(greet.exported);
    assert_eq!(greet.language, Language::TypeScript);
}

#[test]
fn client_objects_never_define_routes() {
    let source = r#"
export async function save(id: string, payload: object) {
    await axios.post(`/api/users/${id}`, payload);
    await client.get("/api/health", options);
}
"#;
    let fragment = TypeScriptScanner::new()
        .scan(&SourceFile::new("src/save.ts", source))
        .expect("scan");

    assert!(fragment.symbols.iter().all(|s| s.kind != SymbolKind::Route));
    let routes: Vec<&TargetDescriptor> = fragment
        .edges
        .iter()
        .filter(|e| e.kind == DependencyKind::RouteInvocation)
        .map(|e| &e.reference)
        .collect();
    assert_eq!(
        routes,
        vec![
            &TargetDescriptor::Route {
                method: Some("POST".into()),
                path: "/api/users/{}".into()
            },
            &TargetDescriptor::Route {
                method: Some("GET".into()),
                path: "/api/health".into()
            },
        ]
    );
}

#[test]
fn javascript_files_use_javascript_language() {
    let fragment = TypeScriptScanner::new()
        .scan(&SourceFile::new("lib/util.js", "export const twice = (x) => x * 2;\n"))
        .expect("scan");
    assert_eq!(fragment.language, Language::JavaScript);
    let twice = fragment.symbol("twice").expect("arrow function symbol");
    assert!(twice.exported);
}

#[test]
fn typescript_syntax_error_reports_file() {
    let failure = TypeScriptScanner::new()
        .scan(&SourceFile::new("src/broken.ts", "export function (\n"))
        .unwrap_err();
    assert_eq!(failure.path, std::path::PathBuf::from("src/broken.ts"));
}
