#![no_main]

use libfuzzer_sys::fuzz_target;
use mcbench::query::{ExtensionRegistry, compile};

const TREE: &str = r#"<Script><StmtList><ForStmt line="1"><AssignStmt><NameExpr kind="VAR"><Name nameId="x"/></NameExpr><NameExpr kind="VAR"><Name nameId="y"/></NameExpr></AssignStmt></ForStmt></StmtList></Script>"#;

fuzz_target!(|data: &str| {
    // Compiling and running arbitrary text must fail with an error, never panic
    let registry = ExtensionRegistry::with_builtins();
    if let Ok(query) = compile(data, &registry)
        && let Ok(tree) = mcbench::tree::parse_xml(TREE)
    {
        let _ = query.execute(&tree);
    }
});
