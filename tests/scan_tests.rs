//! End-to-end scans of small multi-language projects.

use polyindex::*;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("mixed")
}

fn copy_fixture() -> tempfile::TempDir {
    let src_root = fixture_root();
    let temp = tempfile::tempdir().expect("tempdir");

    for entry in walkdir::WalkDir::new(&src_root) {
        let entry = entry.expect("walkdir entry");
        let path = entry.path();
        let rel = path.strip_prefix(&src_root).expect("strip prefix");
        let dest = temp.path().join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).expect("create dir");
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).expect("create parent");
            }
            fs::copy(path, &dest).expect("copy file");
        }
    }

    temp
}

async fn scan(root: &Path) -> ScanReport {
    ProjectScanner::new(IndexConfig::default())
        .scan(root)
        .await
        .expect("scan should succeed")
}

fn symbol<'a>(graph: &'a ProjectGraph, qualified: &str) -> &'a Symbol {
    graph
        .find_by_qualified_name(qualified)
        .unwrap_or_else(|| panic!("missing symbol {qualified}"))
}

#[tokio::test]
async fn scan_mixed_project() {
    let temp = copy_fixture();
    let report = scan(temp.path()).await;
    let graph = &report.graph;

    assert!(report.parse_failures.is_empty(), "{:?}", report.parse_failures);
    assert_eq!(graph.file_count(), 7);

    let languages: Vec<Language> = graph.files().map(|(_, info)| info.language).collect();
    for language in [Language::Rust, Language::TypeScript, Language::Python, Language::Vue] {
        assert!(languages.contains(&language), "no {language} file scanned");
    }

    let entries: Vec<&str> = graph
        .entry_files()
        .iter()
        .map(|p| p.to_str().unwrap())
        .collect();
    for expected in ["api/main.py", "src/main.rs", "web/src/App.vue", "web/src/main.ts"] {
        assert!(entries.contains(&expected), "{expected} not an entry file: {entries:?}");
    }

    let store = symbol(graph, "src/store.rs::Store");
    assert_eq!(store.kind, SymbolKind::Class);
    assert!(store.exported);
}

#[tokio::test]
async fn client_call_links_to_python_route() {
    let temp = copy_fixture();
    let graph = scan(temp.path()).await.graph;

    let client = symbol(&graph, "web/src/api.ts::createOrder");
    let route = symbol(&graph, "api/main.py::POST /api/orders/{}");
    assert_eq!(route.kind, SymbolKind::Route);

    let edges: Vec<&Dependency> = graph
        .outgoing(client.id)
        .into_iter()
        .filter(|e| e.target == Some(route.id))
        .collect();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].kind, DependencyKind::RouteInvocation);
    assert_eq!(edges[0].confidence, Confidence::Heuristic);
    assert!(edges[0].cross_language);

    // The route keeps its handler alive
    let handler = symbol(&graph, "api/main.py::create_order");
    assert!(graph.incoming(handler.id).iter().any(|e| e.source == route.id));
}

#[tokio::test]
async fn vue_template_links_component() {
    let temp = copy_fixture();
    let graph = scan(temp.path()).await.graph;

    let app = symbol(&graph, "web/src/App.vue::App");
    let list = symbol(&graph, "web/src/components/OrderList.vue::OrderList");
    let edge = graph
        .outgoing(app.id)
        .into_iter()
        .find(|e| e.target == Some(list.id))
        .expect("App -> OrderList edge");
    assert_eq!(edge.kind, DependencyKind::TemplateReference);
}

#[tokio::test]
async fn rust_module_calls_resolve_exactly() {
    let temp = copy_fixture();
    let graph = scan(temp.path()).await.graph;

    let main = symbol(&graph, "src/main.rs::main");
    let save = symbol(&graph, "src/store.rs::Store::save");
    let edge = graph
        .outgoing(main.id)
        .into_iter()
        .find(|e| e.target == Some(save.id))
        .expect("main -> save edge");
    assert_eq!(edge.confidence, Confidence::Exact);
    assert!(!edge.cross_language);
}

#[tokio::test]
async fn rescan_is_idempotent() {
    let temp = copy_fixture();
    let first = scan(temp.path()).await.graph;
    let second = scan(temp.path()).await.graph;

    let symbols = |g: &ProjectGraph| {
        g.symbols()
            .map(|s| (s.id, s.qualified_name.clone(), s.kind))
            .collect::<Vec<_>>()
    };
    assert_eq!(symbols(&first), symbols(&second));
    assert_eq!(first.edges(), second.edges());
    assert_eq!(first.stats(), second.stats());
}

#[tokio::test]
async fn one_broken_file_among_ten() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    for i in 0..9 {
        fs::write(root.join(format!("mod{i}.rs")), format!("pub fn item{i}() {{}}\n")).unwrap();
    }
    fs::write(root.join("broken.rs"), "pub fn broken( {\n").unwrap();

    let report = scan(root).await;
    assert_eq!(report.parse_failures.len(), 1);
    assert_eq!(report.parse_failures[0].path, PathBuf::from("broken.rs"));

    let graph = &report.graph;
    assert_eq!(graph.file_count(), 10);
    for i in 0..9 {
        assert_eq!(graph.find_by_name(&format!("item{i}")).len(), 1);
    }
    assert!(graph.symbols_in_file(Path::new("broken.rs")).is_empty());
    assert!(!graph.file_info(Path::new("broken.rs")).unwrap().parsed);
}

#[tokio::test]
async fn empty_project_scans_to_empty_graph() {
    let temp = tempfile::tempdir().unwrap();
    let report = scan(temp.path()).await;
    assert!(report.graph.is_empty());
    assert!(report.parse_failures.is_empty());
}

#[tokio::test]
async fn missing_root_fails_the_call() {
    let temp = tempfile::tempdir().unwrap();
    let err = ProjectScanner::new(IndexConfig::default())
        .scan(&temp.path().join("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::Enumeration { .. }));
}

#[tokio::test]
async fn unique_only_policy_leaves_ambiguous_calls_dangling() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("a")).unwrap();
    fs::create_dir_all(root.join("b")).unwrap();
    fs::write(root.join("a/util.py"), "def shared():\n    pass\n").unwrap();
    fs::write(root.join("b/util.py"), "def shared():\n    pass\n").unwrap();
    fs::write(root.join("run.py"), "def go():\n    shared()\n").unwrap();

    let config = IndexConfig {
        ambiguity: AmbiguityPolicy::UniqueOnly,
        ..Default::default()
    };
    let graph = ProjectScanner::new(config).scan(root).await.unwrap().graph;
    let go = symbol(&graph, "run.py::go");
    let calls = graph.outgoing(go.id);
    assert_eq!(calls.len(), 1);
    assert!(calls[0].is_dangling());

    let config = IndexConfig {
        ambiguity: AmbiguityPolicy::KeepAll,
        ..Default::default()
    };
    let graph = ProjectScanner::new(config).scan(root).await.unwrap().graph;
    let go = symbol(&graph, "run.py::go");
    let targets: Vec<_> = graph.outgoing(go.id).iter().map(|e| e.target).collect();
    assert_eq!(targets.len(), 2);
    assert!(targets.iter().all(Option::is_some));
}
