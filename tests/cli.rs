//! End-to-end tests for the `mcbench` binary against an on-disk corpus.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

struct Fixture {
    home: TempDir,
    data_root: PathBuf,
    store: PathBuf,
}

/// `count` for statements, one per logical line
fn loops_xml(count: usize) -> String {
    let mut xml = String::from("<CompilationUnits><Script><StmtList>\n");
    for i in 0..count {
        xml.push_str(&format!("  <ForStmt line=\"{}\"/>\n", i + 1));
    }
    xml.push_str("</StmtList></Script></CompilationUnits>\n");
    xml
}

fn loops_source(count: usize) -> String {
    (0..count).map(|i| format!("for k{i} = 1:3, end\n")).collect()
}

fn write_file(root: &Path, benchmark: &str, name: &str, xml: &str, source: &str) {
    let dir = root.join(benchmark);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{name}.xml")), xml).unwrap();
    fs::write(dir.join(format!("{name}.m")), source).unwrap();
}

/// Benchmark A holds 16 loops across two files, B holds none
fn fixture() -> Fixture {
    let home = TempDir::new().unwrap();
    let data_root = home.path().join("corpus");
    write_file(&data_root, "A", "drv", &loops_xml(9), &loops_source(9));
    write_file(&data_root, "A", "helper", &loops_xml(7), &loops_source(7));
    write_file(
        &data_root,
        "B",
        "plain",
        "<CompilationUnits><Script><StmtList/></Script></CompilationUnits>",
        "x = 1;\n",
    );
    let store = home.path().join("queries.json");
    Fixture {
        home,
        data_root,
        store,
    }
}

fn run(fx: &Fixture, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_mcbench"))
        .arg("--data-root")
        .arg(&fx.data_root)
        .arg("--store")
        .arg(&fx.store)
        .args(["--workers", "2", "--color", "never"])
        .args(args)
        .env("HOME", fx.home.path())
        .env("XDG_DATA_HOME", fx.home.path().join("share"))
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run mcbench");

    (
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
        output.status.success(),
    )
}

#[test]
fn test_search_ranks_benchmarks() {
    let fx = fixture();
    let (stdout, _, ok) = run(&fx, &["search", "//ForStmt"]);
    assert!(ok);
    assert_eq!(stdout, "A  16\n16 matches in 1 benchmark\n");

    // second run is served from the store
    let (stdout, _, ok) = run(&fx, &["search", "//ForStmt"]);
    assert!(ok);
    assert!(stdout.ends_with("(cached)\n"), "{stdout}");
}

#[test]
fn test_search_json() {
    let fx = fixture();
    let (stdout, _, ok) = run(&fx, &["search", "--json", "//ForStmt"]);
    assert!(ok);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["total_matches"], 16);
    assert_eq!(value["matches"][0]["name"], "A");
    assert_eq!(value["cached"], false);
}

#[test]
fn test_malformed_query_reports_cause() {
    let fx = fixture();
    let (stdout, stderr, ok) = run(&fx, &["search", "\\ForStmt"]);
    assert!(!ok);
    assert!(stdout.is_empty());
    assert!(stderr.starts_with("error: XPathSyntaxError: "), "{stderr}");
    assert!(stderr.contains("\\ForStmt"));
}

#[test]
fn test_list_includes_benchmarks_without_matches() {
    let fx = fixture();
    let (stdout, _, ok) = run(&fx, &["list"]);
    assert!(ok);
    assert_eq!(stdout, "A\nB\n");
}

#[test]
fn test_benchmark_lines() {
    let fx = fixture();
    let (stdout, _, ok) = run(&fx, &["benchmark", "A", "--query", "//ForStmt[@line <= 2]"]);
    assert!(ok);
    assert_eq!(
        stdout,
        "drv\n1:for k0 = 1:3, end\n2:for k1 = 1:3, end\n\nhelper\n1:for k0 = 1:3, end\n2:for k1 = 1:3, end\n"
    );
}

#[test]
fn test_unknown_benchmark_fails() {
    let fx = fixture();
    let (_, stderr, ok) = run(&fx, &["benchmark", "missing", "--query", "//ForStmt"]);
    assert!(!ok);
    assert!(stderr.contains("benchmark does not exist: missing"), "{stderr}");
}

#[test]
fn test_save_and_delete() {
    let fx = fixture();
    let (_, stderr, ok) = run(&fx, &["save", "//ForStmt", "For loops"]);
    assert!(!ok, "saving a query that never ran should fail");
    assert!(stderr.contains("no such query"), "{stderr}");

    run(&fx, &["search", "//ForStmt"]);
    let (_, _, ok) = run(&fx, &["save", "//ForStmt", "For loops"]);
    assert!(ok);
    let (stdout, _, _) = run(&fx, &["queries"]);
    assert_eq!(stdout, "For loops  16\n    //ForStmt\n");

    let (stdout, _, ok) = run(&fx, &["delete", "//ForStmt"]);
    assert!(ok);
    assert_eq!(stdout, "Unsaved: For loops\n");
    let (stdout, _, _) = run(&fx, &["queries"]);
    assert!(stdout.is_empty());
    let (stdout, _, _) = run(&fx, &["queries", "--all"]);
    assert_eq!(stdout, "//ForStmt  16\n");

    let (stdout, _, _) = run(&fx, &["purge"]);
    assert_eq!(stdout, "Purged 1 unsaved queries\n");
}

#[test]
fn test_seed_and_refresh() {
    let fx = fixture();
    let (stdout, _, ok) = run(&fx, &["seed"]);
    assert!(ok);
    assert_eq!(stdout, "Seeded 5 example queries\n");

    let (stdout, _, _) = run(&fx, &["queries"]);
    assert!(stdout.contains("Calls to eval  0\n"), "{stdout}");
    assert!(stdout.contains("Functions with multiple return values  0\n"));

    let (stdout, _, ok) = run(&fx, &["refresh"]);
    assert!(ok);
    assert_eq!(stdout, "Refreshed 5 queries\n");
}
