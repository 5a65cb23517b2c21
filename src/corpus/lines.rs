//! Per-file matched lines for one benchmark, used to highlight sources.

use std::collections::BTreeMap;

use super::scan::ScanError;
use super::source::CorpusSource;
use super::types::{Benchmark, FileMatches};
use crate::query::CompiledQuery;

/// Lines matched by `query` in each file of `benchmark`.
///
/// `None` means no query was requested and yields an empty map. Files
/// without matches are left out.
pub fn matching_lines<S: CorpusSource + ?Sized>(
    source: &S,
    benchmark: &Benchmark,
    query: Option<&CompiledQuery>,
) -> Result<BTreeMap<String, FileMatches>, ScanError> {
    let mut lines = BTreeMap::new();
    let Some(query) = query else {
        return Ok(lines);
    };

    for file in source.files(benchmark)? {
        let tree = source.load_tree(&file)?;
        let matches = query.execute(&tree)?;
        if matches.is_empty() {
            continue;
        }
        let mut entry = FileMatches::default();
        for node in matches {
            let element = node.element();
            entry.lines.push(tree.line(element));
            entry.source_lines.push(tree.source_line(element));
        }
        lines.insert(file.name, entry);
    }

    tracing::debug!(
        benchmark = %benchmark.name,
        query = query.source(),
        files = lines.len(),
        "collected matching lines"
    );
    Ok(lines)
}
