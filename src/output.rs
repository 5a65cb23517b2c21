//! Terminal output for query results, saved queries and matched lines

use std::collections::BTreeMap;
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::corpus::{Benchmark, FileMatches};
use crate::query::QueryError;
use crate::store::{QueryRecord, QueryResults};

pub fn stdout(choice: ColorChoice) -> StandardStream {
    StandardStream::stdout(choice)
}

pub fn stderr(choice: ColorChoice) -> StandardStream {
    StandardStream::stderr(choice)
}

/// Benchmarks by match count, then a summary line
pub fn print_ranked<W: WriteColor>(out: &mut W, results: &QueryResults) -> io::Result<()> {
    let width = results
        .matches
        .iter()
        // `{:<width$}` pads by characters
        .map(|m| m.name.chars().count())
        .max()
        .unwrap_or(0);

    for m in &results.matches {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
        write!(out, "{:<width$}", m.name)?;
        out.reset()?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        writeln!(out, "  {}", m.count)?;
        out.reset()?;
    }

    let plural = if results.matches.len() == 1 { "" } else { "s" };
    write!(
        out,
        "{} matches in {} benchmark{plural}",
        results.total_matches,
        results.matches.len()
    )?;
    if results.cached {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
        write!(out, " (cached)")?;
        out.reset()?;
    }
    writeln!(out)
}

pub fn print_benchmarks<W: WriteColor>(out: &mut W, benchmarks: &[Benchmark]) -> io::Result<()> {
    for b in benchmarks {
        writeln!(out, "{}", b.name)?;
    }
    Ok(())
}

/// Saved queries with their cached totals, if any
pub fn print_queries<'a, W: WriteColor>(
    out: &mut W,
    queries: impl IntoIterator<Item = &'a QueryRecord>,
) -> io::Result<()> {
    for q in queries {
        out.set_color(ColorSpec::new().set_bold(true))?;
        write!(out, "{}", q.label())?;
        out.reset()?;
        match &q.matches {
            Some(matches) => {
                let total: usize = matches.iter().map(|m| m.count).sum();
                out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
                writeln!(out, "  {total}")?;
                out.reset()?;
            }
            None => writeln!(out)?,
        }
        if q.is_saved() {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
            writeln!(out, "    {}", q.xpath)?;
            out.reset()?;
        }
    }
    Ok(())
}

/// Matched lines per file, ripgrep heading style. `sources` maps a file name
/// to its text; files missing from it print line numbers only.
pub fn print_matching_lines<W: WriteColor>(
    out: &mut W,
    lines: &BTreeMap<String, FileMatches>,
    sources: &BTreeMap<String, String>,
) -> io::Result<()> {
    let mut first = true;
    for (file, matches) in lines {
        if !first {
            // Add blank line between files
            writeln!(out)?;
        }
        first = false;

        out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
        writeln!(out, "{file}")?;
        out.reset()?;

        let text: Vec<&str> = sources
            .get(file)
            .map(|s| s.lines().collect())
            .unwrap_or_default();

        let mut seen = Vec::with_capacity(matches.lines.len());
        for &line in &matches.lines {
            if seen.contains(&line) {
                continue;
            }
            seen.push(line);

            out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
            write!(out, "{line}")?;
            out.reset()?;
            match text.get((line as usize).wrapping_sub(1)) {
                Some(content) => writeln!(out, ":{content}")?,
                None => writeln!(out)?,
            }
        }
    }
    Ok(())
}

/// `error: <cause>: <message>` followed by the query text
pub fn print_query_error<W: WriteColor>(out: &mut W, error: &QueryError) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
    write!(out, "error")?;
    out.reset()?;
    writeln!(out, ": {}: {}", error.cause, error.message)?;
    writeln!(out, "  {}", error.source_text)?;
    if let Some(position) = error.position {
        let column = error
            .source_text
            .get(..position)
            .map_or(0, |prefix| prefix.chars().count());
        out.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
        writeln!(out, "  {:>width$}", "^", width = column + 1)?;
        out.reset()?;
    }
    Ok(())
}
