//! Benchmarks for polyindex scanning and analysis.
//!
//! ## Scanning
//! - Single file scanning latency per language vs raw tree-sitter
//! - Full project scan throughput (symbols/sec) and scaling with size
//!
//! ## Queries
//! - Symbol lookup by name and qualified name
//! - Incoming/outgoing edge resolution
//!
//! ## Analysis
//! - Dead code analysis scaling
//! - Session boost scoring
//!
//! ## Infrastructure
//! - File discovery
//! - Route normalization

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use polyindex::parsing::python::PythonScanner;
use polyindex::parsing::routes::normalize_route;
use polyindex::parsing::rust::RustScanner;
use polyindex::parsing::typescript::TypeScriptScanner;
use polyindex::parsing::{LanguageScanner, SourceFile};
use polyindex::{
    DeadCodeAnalyzer, FileDiscovery, IndexConfig, ProjectGraph, ProjectScanner, SessionStore,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tree_sitter::Parser;

// ============================================================================
// Test Fixture Generation
// ============================================================================

/// Generate a Rust module with structs, methods and free functions.
/// Returns (code, estimated_symbols).
fn generate_rust_file(num_functions: usize, num_structs: usize, lines_per_fn: usize) -> (String, usize) {
    let mut code = String::with_capacity(num_functions * lines_per_fn * 50);
    code.push_str("use std::collections::HashMap;\n\n");

    for i in 0..num_structs {
        code.push_str(&format!(
            r#"#[derive(Debug, Clone, Default)]
pub struct BenchStruct{i} {{
    pub field: i32,
    pub items: Vec<u64>,
}}

impl BenchStruct{i} {{
    pub fn new() -> Self {{
        Self::default()
    }}

    pub fn get_field(&self) -> i32 {{
        self.field
    }}
}}

"#
        ));
    }

    for i in 0..num_functions {
        let vis = if i % 4 == 0 { "" } else { "pub " };
        code.push_str(&format!("{vis}fn bench_function_{i}(input: i32) -> i32 {{\n"));
        code.push_str("    let mut result = input;\n");
        for j in 1..lines_per_fn.saturating_sub(1) {
            code.push_str(&format!("    result = result.wrapping_add({});\n", j % 100));
        }
        if i > 0 {
            code.push_str(&format!("    result = bench_function_{}(result);\n", i - 1));
        }
        code.push_str("    result\n}\n\n");
    }

    (code, num_functions + num_structs * 3 + 1)
}

fn generate_ts_file(index: usize, num_functions: usize) -> String {
    let mut code = String::from("import axios from \"axios\";\n\n");
    for i in 0..num_functions {
        code.push_str(&format!(
            "export async function load{index}_{i}(id: string) {{\n    \
             const res = await fetch(`/api/items{index}/${{id}}/part{i}`);\n    \
             return res.json();\n}}\n\n"
        ));
    }
    code.push_str(&format!(
        "export function save{index}(body: object) {{\n    return axios.post(\"/api/items{index}\", body);\n}}\n"
    ));
    code
}

fn generate_python_file(index: usize, num_routes: usize) -> String {
    let mut code = String::from("from fastapi import FastAPI\n\napp = FastAPI()\n\n");
    for i in 0..num_routes {
        code.push_str(&format!(
            "@app.get(\"/api/items{index}/{{item_id}}/part{i}\")\ndef read_{index}_{i}(item_id: str):\n    return helper_{index}(item_id)\n\n"
        ));
    }
    code.push_str(&format!(
        "def helper_{index}(value):\n    return value\n\ndef unused_{index}():\n    pass\n"
    ));
    code
}

/// Create a project with Rust, TypeScript and Python files.
fn create_test_repo(num_files: usize, symbols_per_file: usize) -> (TempDir, usize) {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let root = temp.path();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::create_dir_all(root.join("web/src")).unwrap();
    fs::create_dir_all(root.join("api")).unwrap();

    fs::write(root.join("Cargo.toml"), "[package]\nname = \"bench\"\nversion = \"0.1.0\"\n").unwrap();
    let mut lib = String::new();
    for i in 0..num_files {
        lib.push_str(&format!("pub mod module_{i};\n"));
    }
    fs::write(root.join("src/lib.rs"), lib).unwrap();

    let mut total_symbols = 0;
    for i in 0..num_files {
        let (code, syms) = generate_rust_file(symbols_per_file / 2, symbols_per_file / 8, 8);
        total_symbols += syms;
        fs::write(root.join(format!("src/module_{i}.rs")), code).unwrap();

        let per_lang = (symbols_per_file / 8).max(1);
        fs::write(root.join(format!("web/src/client{i}.ts")), generate_ts_file(i, per_lang)).unwrap();
        fs::write(root.join(format!("api/routes{i}.py")), generate_python_file(i, per_lang)).unwrap();
        total_symbols += per_lang * 3 + 3;
    }

    (temp, total_symbols)
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn scan_graph(rt: &Runtime, root: &Path) -> ProjectGraph {
    rt.block_on(async {
        ProjectScanner::new(IndexConfig::default())
            .scan(root)
            .await
            .unwrap()
            .graph
    })
}

// ============================================================================
// Scanning Benchmarks - Single File
// ============================================================================

fn bench_single_file_scanning(c: &mut Criterion) {
    let mut group = c.benchmark_group("scanning/single_file");

    for (funcs, structs, lines, label) in [(10, 5, 10, "small"), (50, 20, 15, "medium"), (200, 80, 25, "large")] {
        let (code, symbol_count) = generate_rust_file(funcs, structs, lines);
        group.throughput(Throughput::Bytes(code.len() as u64));

        // Baseline: raw tree-sitter parsing only
        group.bench_with_input(BenchmarkId::new("tree_sitter_parse", label), &code, |b, code| {
            let mut parser = Parser::new();
            parser
                .set_language(&tree_sitter_rust::LANGUAGE.into())
                .unwrap();
            b.iter(|| {
                let tree = parser.parse(code, None).unwrap();
                black_box(tree.root_node().child_count())
            });
        });

        let file = SourceFile::new("src/module.rs", code.clone());
        group.bench_with_input(BenchmarkId::new("rust_scanner", label), &file, |b, file| {
            let scanner = RustScanner::new();
            b.iter(|| {
                let fragment = scanner.scan(file).unwrap();
                black_box(fragment.symbols.len())
            });
        });

        println!("\n  {label}: {} lines, ~{symbol_count} symbols", code.lines().count());
    }

    let ts = SourceFile::new("web/src/client.ts", generate_ts_file(0, 50));
    group.bench_with_input(BenchmarkId::new("typescript_scanner", "50fn"), &ts, |b, file| {
        let scanner = TypeScriptScanner::new();
        b.iter(|| black_box(scanner.scan(file).unwrap().edges.len()));
    });

    let py = SourceFile::new("api/routes.py", generate_python_file(0, 50));
    group.bench_with_input(BenchmarkId::new("python_scanner", "50routes"), &py, |b, file| {
        let scanner = PythonScanner::new();
        b.iter(|| black_box(scanner.scan(file).unwrap().symbols.len()));
    });

    group.finish();
}

// ============================================================================
// Scanning Benchmarks - Full Project
// ============================================================================

fn bench_full_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scanning/full_project");
    group.sample_size(10);
    let rt = runtime();

    for (files, symbols_per_file, label) in [(5, 40, "tiny"), (20, 60, "small"), (50, 80, "medium")] {
        let (temp, total_symbols) = create_test_repo(files, symbols_per_file);
        group.throughput(Throughput::Elements(total_symbols as u64));

        group.bench_with_input(BenchmarkId::new("scan", label), &temp, |b, temp| {
            b.to_async(&rt).iter(|| async {
                let report = ProjectScanner::new(IndexConfig::default())
                    .scan(temp.path())
                    .await
                    .unwrap();
                black_box(report.graph.stats())
            });
        });

        println!("\n  {label} project: {} files, ~{total_symbols} symbols", files * 3 + 2);
    }

    group.finish();
}

// ============================================================================
// Query Benchmarks
// ============================================================================

fn bench_symbol_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("query/lookup");
    let rt = runtime();
    let (temp, _) = create_test_repo(20, 60);
    let graph = scan_graph(&rt, temp.path());

    group.bench_function("find_by_name", |b| {
        b.iter(|| black_box(graph.find_by_name("bench_function_10").len()))
    });

    group.bench_function("find_by_qualified_name", |b| {
        b.iter(|| black_box(graph.find_by_qualified_name("src/module_7.rs::BenchStruct3::new")))
    });

    let target = graph.find_by_name("bench_function_5")[0].id;
    group.bench_function("incoming_edges", |b| {
        b.iter(|| black_box(graph.incoming(target).len()))
    });
    group.bench_function("outgoing_edges", |b| {
        b.iter(|| black_box(graph.outgoing(target).len()))
    });

    group.finish();
}

// ============================================================================
// Analysis Benchmarks
// ============================================================================

fn bench_dead_code_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("analysis/dead_code");
    group.sample_size(20);
    let rt = runtime();

    for files in [10, 25, 50] {
        let (temp, total_symbols) = create_test_repo(files, 50);
        let graph = scan_graph(&rt, temp.path());
        let label = format!("{files}files_{total_symbols}sym");

        group.bench_with_input(BenchmarkId::new("analyze", &label), &graph, |b, graph| {
            b.iter(|| {
                let report = DeadCodeAnalyzer::new().analyze(graph);
                black_box(report.unreachable.len())
            });
        });
    }

    group.finish();
}

fn bench_session_boost(c: &mut Criterion) {
    let mut group = c.benchmark_group("analysis/session");
    let store = SessionStore::new("/work", &IndexConfig::default()).unwrap();
    store.open("bench");
    for i in 0..50 {
        store.add_file("bench", Path::new(&format!("src/f{i}.rs"))).unwrap();
    }
    for i in 0..20 {
        store.add_query("bench", &format!("where is f{i} used")).unwrap();
    }

    group.bench_function("boost_recent", |b| {
        b.iter(|| black_box(store.boost_score("bench", Path::new("src/f49.rs"))))
    });
    group.bench_function("boost_untouched", |b| {
        b.iter(|| black_box(store.boost_score("bench", Path::new("src/other.rs"))))
    });
    group.bench_function("add_file", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i += 1;
            store.add_file("bench", Path::new(&format!("src/g{}.rs", i % 200))).unwrap();
        })
    });

    group.finish();
}

// ============================================================================
// Infrastructure Benchmarks
// ============================================================================

fn bench_file_discovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("infrastructure/discovery");

    for files in [20, 50, 100] {
        let (temp, _) = create_test_repo(files, 20);
        let label = format!("{files}files");

        group.bench_with_input(BenchmarkId::new("discover", &label), &temp, |b, temp| {
            b.iter(|| {
                let discovery = FileDiscovery::new();
                let files = discovery.discover(temp.path()).unwrap();
                black_box(files.len())
            });
        });
    }

    group.finish();
}

fn bench_route_normalization(c: &mut Criterion) {
    let mut group = c.benchmark_group("infrastructure/routes");
    let routes = [
        "/api/users/:id",
        "https://example.com/api/orders/{order_id}/items?page=2",
        "${BASE_URL}/api/users/${id}/posts",
        "/api/v1/sessions/123e4567-e89b-12d3-a456-426614174000",
    ];
    group.throughput(Throughput::Elements(routes.len() as u64));
    group.bench_function("normalize_route", |b| {
        b.iter(|| {
            for route in &routes {
                black_box(normalize_route(route));
            }
        })
    });
    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(
    name = scanning_benches;
    config = Criterion::default()
        .significance_level(0.05)
        .noise_threshold(0.02)
        .warm_up_time(std::time::Duration::from_millis(500))
        .measurement_time(std::time::Duration::from_secs(3));
    targets = bench_single_file_scanning, bench_full_scan
);

criterion_group!(
    name = query_benches;
    config = Criterion::default()
        .significance_level(0.05)
        .warm_up_time(std::time::Duration::from_millis(300))
        .measurement_time(std::time::Duration::from_secs(2));
    targets = bench_symbol_lookup
);

criterion_group!(
    name = analysis_benches;
    config = Criterion::default()
        .significance_level(0.05)
        .sample_size(30)
        .warm_up_time(std::time::Duration::from_millis(300))
        .measurement_time(std::time::Duration::from_secs(3));
    targets = bench_dead_code_analysis, bench_session_boost
);

criterion_group!(
    name = infra_benches;
    config = Criterion::default()
        .significance_level(0.05)
        .warm_up_time(std::time::Duration::from_millis(200))
        .measurement_time(std::time::Duration::from_secs(2));
    targets = bench_file_discovery, bench_route_normalization
);

criterion_main!(scanning_benches, query_benches, analysis_benches, infra_benches);
