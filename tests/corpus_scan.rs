//! Scanning an on-disk corpus through the library API.

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use mcbench::corpus::{CorpusScanner, CorpusSource, DataRoot, ScanError, matching_lines};
use mcbench::query::{ExtensionRegistry, QueryErrorKind, compile};
use mcbench::store::EXAMPLE_QUERIES;

const COPY_LOOP: &str = r#"<CompilationUnits><Script><StmtList>
<ForStmt line="1">
  <AssignStmt line="1">
    <NameExpr kind="VAR"><Name nameId="i"/></NameExpr>
    <RangeExpr><IntLiteralExpr value="1"/><IntLiteralExpr value="3"/></RangeExpr>
  </AssignStmt>
  <StmtList>
    <AssignStmt line="2">
      <NameExpr kind="VAR"><Name nameId="a"/></NameExpr>
      <NameExpr kind="VAR"><Name nameId="b"/></NameExpr>
    </AssignStmt>
  </StmtList>
</ForStmt>
</StmtList></Script></CompilationUnits>"#;

const PLAIN_LOOP: &str = r#"<CompilationUnits><Script><StmtList>
<ForStmt line="1">
  <AssignStmt line="1">
    <NameExpr kind="VAR"><Name nameId="i"/></NameExpr>
    <RangeExpr><IntLiteralExpr value="1"/><IntLiteralExpr value="3"/></RangeExpr>
  </AssignStmt>
  <StmtList>
    <AssignStmt line="2">
      <NameExpr kind="VAR"><Name nameId="a"/></NameExpr>
      <NameExpr kind="FUN"><Name nameId="rand"/></NameExpr>
    </AssignStmt>
  </StmtList>
</ForStmt>
</StmtList></Script></CompilationUnits>"#;

const CALLS: &str = r#"<CompilationUnits><Script><StmtList>
<ExprStmt line="1">
  <ParameterizedExpr line="1">
    <NameExpr kind="FUN"><Name nameId="eval"/></NameExpr>
    <StringLiteralExpr value="x = 1"/>
  </ParameterizedExpr>
</ExprStmt>
<ExprStmt line="2">
  <ParameterizedExpr line="2">
    <NameExpr kind="FUN"><Name nameId="feval"/></NameExpr>
    <StringLiteralExpr value="sin"/>
  </ParameterizedExpr>
</ExprStmt>
</StmtList></Script></CompilationUnits>"#;

fn write(root: &Path, rel: &str, xml: &str) {
    let xml_path = root.join(format!("{rel}.xml"));
    fs::create_dir_all(xml_path.parent().unwrap()).unwrap();
    fs::write(&xml_path, xml).unwrap();
    fs::write(root.join(format!("{rel}.m")), "% source\n").unwrap();
}

fn corpus() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "loops/copy", COPY_LOOP);
    write(dir.path(), "loops/sub/plain", PLAIN_LOOP);
    write(dir.path(), "loops/calls", CALLS);
    write(dir.path(), "other/calls", CALLS);
    // hidden directories are not benchmarks
    write(dir.path(), ".cache/stale", COPY_LOOP);
    dir
}

fn example(name: &str) -> &'static str {
    EXAMPLE_QUERIES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, q)| *q)
        .unwrap()
}

#[test]
fn test_benchmarks_and_files() {
    let dir = corpus();
    let source = DataRoot::new(dir.path());
    let benchmarks = source.benchmarks().unwrap();
    let names: Vec<_> = benchmarks.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, ["loops", "other"]);

    let files = source.files(&benchmarks[0]).unwrap();
    let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["calls", "copy", "sub/plain"]);
}

#[test]
fn test_copy_in_loop_matches_once() {
    let dir = corpus();
    let registry = ExtensionRegistry::with_builtins();
    let query = compile(example("Copy statements inside loops"), &registry).unwrap();

    let scanner = CorpusScanner::new(DataRoot::new(dir.path()), 2).unwrap();
    let result = scanner.scan_all(&query).unwrap();
    assert_eq!(result.total_matches, 1);
    assert_eq!(result.count_for("loops"), 1);
    assert_eq!(result.count_for("other"), 0);

    let lines = matching_lines(
        scanner.source(),
        &scanner.source().benchmark("loops").unwrap().unwrap(),
        Some(&query),
    )
    .unwrap();
    assert_eq!(lines.keys().collect::<Vec<_>>(), ["copy"]);
    assert_eq!(lines["copy"].lines, [2]);
}

#[test]
fn test_eval_not_feval() {
    let dir = corpus();
    let registry = ExtensionRegistry::with_builtins();
    let eval = compile(example("Calls to eval"), &registry).unwrap();
    let feval = compile(example("Calls to feval with a string literal target"), &registry).unwrap();

    let scanner = CorpusScanner::new(DataRoot::new(dir.path()), 0).unwrap();
    let result = scanner.scan_all(&eval).unwrap();
    assert_eq!(result.total_matches, 2);
    assert_eq!(result.ordered_benchmarks.len(), 2);
    // tie keeps corpus order
    assert_eq!(result.ordered_benchmarks[0].name, "loops");

    assert_eq!(scanner.scan_all(&feval).unwrap().total_matches, 2);
}

#[test]
fn test_unexpected_context_surfaces_from_workers() {
    let dir = corpus();
    let registry = ExtensionRegistry::with_builtins();
    let query = compile("//ForStmt[lhs()]", &registry).unwrap();

    let scanner = CorpusScanner::new(DataRoot::new(dir.path()), 4).unwrap();
    match scanner.scan_all(&query) {
        Err(ScanError::Query(e)) => {
            assert_eq!(e.kind, QueryErrorKind::UnexpectedContext);
            assert!(e.message.contains("ForStmt"), "{}", e.message);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_missing_xml_is_a_load_error() {
    let dir = corpus();
    fs::remove_file(dir.path().join("other/calls.xml")).unwrap();
    let registry = ExtensionRegistry::with_builtins();
    let query = compile("//ForStmt", &registry).unwrap();

    let scanner = CorpusScanner::new(DataRoot::new(dir.path()), 2).unwrap();
    assert!(matches!(scanner.scan_all(&query), Err(ScanError::Load(_))));
}

#[cfg(unix)]
#[test]
fn test_broken_link_is_a_load_error() {
    let dir = corpus();
    std::os::unix::fs::symlink(
        dir.path().join("other/deleted.m"),
        dir.path().join("other/dangling.m"),
    )
    .unwrap();
    let registry = ExtensionRegistry::with_builtins();
    let query = compile("//ForStmt", &registry).unwrap();

    let scanner = CorpusScanner::new(DataRoot::new(dir.path()), 2).unwrap();
    assert!(matches!(scanner.scan_all(&query), Err(ScanError::Load(_))));
}

#[test]
fn test_duplicate_benchmarks_count_once() {
    let dir = corpus();
    let registry = ExtensionRegistry::with_builtins();
    let query = compile("//ForStmt", &registry).unwrap();

    let scanner = CorpusScanner::new(DataRoot::new(dir.path()), 2).unwrap();
    let loops = scanner.source().benchmark("loops").unwrap().unwrap();
    let result = scanner.scan(&query, &[loops.clone(), loops]).unwrap();
    assert_eq!(result.total_matches, 2);
    assert_eq!(result.count_for("loops"), 2);
    assert_eq!(result.ordered_benchmarks.len(), 1);
}
