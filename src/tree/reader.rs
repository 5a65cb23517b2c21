//! XML to [`Tree`] loading.
//!
//! The McLab front end serializes every AST node as one element whose
//! attributes carry the node's properties. Start tag positions are mapped
//! back to 1-based XML lines so matches can be highlighted against the raw
//! file as well as against the logical `line` attribute.

use super::types::{Tree, TreeBuilder};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to produce a tree for a corpus file
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML in {} at line {line}: {message}", path.display())]
    Xml {
        path: PathBuf,
        line: u32,
        message: String,
    },

    #[error("no root element in {}", path.display())]
    Empty { path: PathBuf },
}

/// Parse an AST file from disk
pub fn parse_xml_file(path: &Path) -> Result<Tree, LoadError> {
    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_xml_named(&content, path)
}

/// Parse an in-memory AST document
pub fn parse_xml(content: &str) -> Result<Tree, LoadError> {
    parse_xml_named(content, Path::new("<memory>"))
}

pub(crate) fn parse_xml_named(content: &str, path: &Path) -> Result<Tree, LoadError> {
    let lines = LineMap::new(content.as_bytes());
    let mut reader = Reader::from_str(content);
    let mut builder = TreeBuilder::new();

    let xml_error = |offset: usize, message: String| LoadError::Xml {
        path: path.to_path_buf(),
        line: lines.line_of(offset),
        message,
    };

    loop {
        let offset = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let (tag, attributes) =
                    read_start(&start).map_err(|message| xml_error(offset, message))?;
                builder.open_owned(tag, attributes, lines.line_of(offset));
            }
            Ok(Event::Empty(start)) => {
                let (tag, attributes) =
                    read_start(&start).map_err(|message| xml_error(offset, message))?;
                builder.open_owned(tag, attributes, lines.line_of(offset));
                builder.close();
            }
            Ok(Event::End(_)) => builder.close(),
            Ok(Event::Text(text)) => {
                let text = text
                    .unescape()
                    .map_err(|e| xml_error(offset, e.to_string()))?;
                if builder.depth() > 0 && !text.trim().is_empty() {
                    builder.text(&text);
                }
            }
            Ok(Event::CData(data)) => {
                if builder.depth() > 0 {
                    builder.text(&String::from_utf8_lossy(&data));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                let at = reader.error_position() as usize;
                return Err(xml_error(at, e.to_string()));
            }
        }
    }

    if builder.depth() > 0 {
        return Err(xml_error(content.len(), "unexpected end of document".to_string()));
    }

    let tree = builder.finish();
    if tree.root().is_none() {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(tree)
}

type StartTag = (String, Vec<(String, String)>);

fn read_start(start: &BytesStart<'_>) -> Result<StartTag, String> {
    let tag = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| e.to_string())?
        .to_string();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| e.to_string())?
            .to_string();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
        attributes.push((key, value));
    }

    Ok((tag, attributes))
}

/// Byte offset to line number map
struct LineMap {
    /// Offsets at which each line starts
    starts: Vec<usize>,
}

impl LineMap {
    fn new(content: &[u8]) -> Self {
        let mut starts = vec![0];
        starts.extend(memchr::memchr_iter(b'\n', content).map(|i| i + 1));
        Self { starts }
    }

    /// 1-based line containing `offset`
    fn line_of(&self, offset: usize) -> u32 {
        self.starts.partition_point(|&start| start <= offset) as u32
    }
}
