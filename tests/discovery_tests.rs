use polyindex::FileDiscovery;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("mixed")
}

/// The mixed fixture plus build output, vendored packages and hidden
/// directories that discovery must skip.
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

    for (rel, contents) in [
        ("target/debug/build/generated.rs", "pub fn generated() {}\n"),
        ("web/node_modules/left-pad/index.js", "module.exports = () => {};\n"),
        ("web/dist/bundle.min.js", "var a=1;\n"),
        ("api/__pycache__/main.py", "x = 1\n"),
        (".hidden/secret.rs", "fn secret() {}\n"),
        ("web/src/types.d.ts", "declare const x: number;\n"),
        ("notes/ignored.py", "def ignored():\n    pass\n"),
    ] {
        write(temp.path(), rel, contents);
    }
    write(temp.path(), ".gitignore", "notes/\n");

    temp
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).expect("create parent");
    fs::write(path, contents).expect("write file");
}

fn rels(root: &Path, files: Vec<PathBuf>) -> HashSet<String> {
    files
        .into_iter()
        .filter_map(|p| {
            p.strip_prefix(root)
                .ok()
                .map(|r| r.to_string_lossy().replace('\\', "/"))
        })
        .collect()
}

fn source_discovery() -> FileDiscovery {
    FileDiscovery::new().with_extensions(["rs", "ts", "tsx", "js", "jsx", "py", "vue"])
}

#[test]
fn discovery_excludes_defaults() {
    let temp = copy_fixture();
    let root = temp.path();
    let files = source_discovery().discover(root).expect("discover should work");
    let rel = rels(root, files);

    for expected in [
        "src/main.rs",
        "src/store.rs",
        "web/src/main.ts",
        "web/src/api.ts",
        "web/src/App.vue",
        "web/src/components/OrderList.vue",
        "api/main.py",
    ] {
        assert!(rel.contains(expected), "missing {expected}");
    }
    assert_eq!(rel.len(), 7, "{rel:?}");

    assert!(!rel.contains("target/debug/build/generated.rs"));
    assert!(!rel.contains("web/node_modules/left-pad/index.js"));
    assert!(!rel.contains("web/dist/bundle.min.js"));
    assert!(!rel.contains("api/__pycache__/main.py"));
    assert!(!rel.contains(".hidden/secret.rs"));
    assert!(!rel.contains("web/src/types.d.ts"));
    assert!(!rel.contains("notes/ignored.py"));
    assert!(!rel.contains("Cargo.toml"));
}

#[test]
fn discovery_include_can_override_default_excludes() {
    let temp = copy_fixture();
    let root = temp.path();
    let files = source_discovery()
        .with_include("target/**")
        .discover(root)
        .expect("discover should work");
    let rel = rels(root, files);

    assert!(rel.contains("target/debug/build/generated.rs"));
    assert!(!rel.contains("web/node_modules/left-pad/index.js"));
}

#[test]
fn discovery_user_excludes() {
    let temp = copy_fixture();
    let root = temp.path();
    let files = source_discovery()
        .with_exclude("web/**")
        .discover(root)
        .expect("discover should work");
    let rel = rels(root, files);

    assert!(rel.iter().all(|f| !f.starts_with("web/")));
    assert!(rel.contains("api/main.py"));
}

#[test]
fn discovery_output_is_sorted() {
    let temp = copy_fixture();
    let files = source_discovery().discover(temp.path()).unwrap();
    let mut sorted = files.clone();
    sorted.sort();
    assert_eq!(files, sorted);
}

#[test]
fn discovery_rejects_missing_root() {
    let temp = tempfile::tempdir().unwrap();
    let result = FileDiscovery::new().discover(&temp.path().join("missing"));
    assert!(matches!(result, Err(polyindex::IndexError::Enumeration { .. })));
}
