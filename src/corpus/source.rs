//! Corpus suppliers: where benchmarks, files and trees come from.

use ignore::WalkBuilder;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::types::{Benchmark, SourceFile};
use crate::tree::{LoadError, Tree, parse_xml_file, reader::parse_xml_named};

const SOURCE_EXT: &str = "m";
const XML_EXT: &str = "xml";

/// Supplies benchmarks in a stable order and loads their trees.
///
/// Shared by scan workers, so implementations must be `Sync`.
pub trait CorpusSource: Sync {
    fn benchmarks(&self) -> Result<Vec<Benchmark>, LoadError>;

    /// Files of one benchmark, in a stable order
    fn files(&self, benchmark: &Benchmark) -> Result<Vec<SourceFile>, LoadError>;

    fn load_tree(&self, file: &SourceFile) -> Result<Tree, LoadError>;

    /// MATLAB source text of a file
    fn read_source(&self, file: &SourceFile) -> Result<String, LoadError>;

    fn benchmark(&self, name: &str) -> Result<Option<Benchmark>, LoadError> {
        Ok(self.benchmarks()?.into_iter().find(|b| b.name == name))
    }
}

/// Benchmarks laid out on disk as `<root>/<benchmark>/**/<file>.m`, each
/// source next to its `<file>.xml` AST
#[derive(Debug, Clone)]
pub struct DataRoot {
    root: PathBuf,
}

impl DataRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> LoadError + '_ {
        move |source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn walk_error(root: &Path) -> impl FnOnce(ignore::Error) -> LoadError + '_ {
        move |err| LoadError::Io {
            path: root.to_path_buf(),
            source: std::io::Error::other(err),
        }
    }
}

impl CorpusSource for DataRoot {
    fn benchmarks(&self) -> Result<Vec<Benchmark>, LoadError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(Self::io_error(&self.root))? {
            let entry = entry.map_err(Self::io_error(&self.root))?;
            let is_dir = entry
                .file_type()
                .map_err(Self::io_error(&entry.path()))?
                .is_dir();
            if !is_dir {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names.into_iter().map(Benchmark::new).collect())
    }

    fn files(&self, benchmark: &Benchmark) -> Result<Vec<SourceFile>, LoadError> {
        let root = self.root.join(&benchmark.name);
        if !root.is_dir() {
            return Err(LoadError::Io {
                path: root,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "benchmark directory not found",
                ),
            });
        }

        // Corpus directories are data, not repositories: ignore files do not apply
        let walker = WalkBuilder::new(&root)
            .standard_filters(false)
            .hidden(true)
            .follow_links(true)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            // Unreadable directories and broken links fail the whole listing
            let entry = entry.map_err(Self::walk_error(&root))?;
            if !entry.file_type().is_some_and(|t| t.is_file())
                || !entry.path().extension().is_some_and(|ext| ext == SOURCE_EXT)
            {
                continue;
            }
            let source_path = entry.path().to_path_buf();
            let Ok(rel) = source_path.strip_prefix(&root) else {
                continue;
            };
            let name = rel
                .with_extension("")
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            files.push(SourceFile {
                benchmark: benchmark.name.clone(),
                name,
                xml_path: source_path.with_extension(XML_EXT),
                source_path,
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    fn load_tree(&self, file: &SourceFile) -> Result<Tree, LoadError> {
        parse_xml_file(&file.xml_path)
    }

    fn read_source(&self, file: &SourceFile) -> Result<String, LoadError> {
        let bytes = fs::read(&file.source_path).map_err(Self::io_error(&file.source_path))?;
        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            // Old corpus files are often Latin-1, one code point per byte
            Err(err) => Ok(err.into_bytes().into_iter().map(char::from).collect()),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryFile {
    xml: String,
    source: String,
}

/// Benchmarks held in memory as XML documents
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    /// Insertion order is corpus order
    benchmarks: Vec<(String, BTreeMap<String, MemoryFile>)>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, creating its benchmark on first use
    pub fn add_file(&mut self, benchmark: &str, name: &str, xml: impl Into<String>) -> &mut Self {
        self.add_file_with_source(benchmark, name, xml, String::new())
    }

    pub fn add_file_with_source(
        &mut self,
        benchmark: &str,
        name: &str,
        xml: impl Into<String>,
        source: impl Into<String>,
    ) -> &mut Self {
        let file = MemoryFile {
            xml: xml.into(),
            source: source.into(),
        };
        match self.benchmarks.iter_mut().find(|(b, _)| b == benchmark) {
            Some((_, files)) => {
                files.insert(name.to_string(), file);
            }
            None => self
                .benchmarks
                .push((benchmark.to_string(), BTreeMap::from([(name.to_string(), file)]))),
        }
        self
    }

    /// Add a benchmark with no files
    pub fn add_benchmark(&mut self, benchmark: &str) -> &mut Self {
        if !self.benchmarks.iter().any(|(b, _)| b == benchmark) {
            self.benchmarks.push((benchmark.to_string(), BTreeMap::new()));
        }
        self
    }

    fn entry(&self, file: &SourceFile) -> Result<&MemoryFile, LoadError> {
        self.benchmarks
            .iter()
            .find(|(b, _)| *b == file.benchmark)
            .and_then(|(_, files)| files.get(&file.name))
            .ok_or_else(|| LoadError::Io {
                path: file.xml_path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file in corpus"),
            })
    }
}

impl CorpusSource for MemoryCorpus {
    fn benchmarks(&self) -> Result<Vec<Benchmark>, LoadError> {
        Ok(self
            .benchmarks
            .iter()
            .map(|(name, _)| Benchmark::new(name.clone()))
            .collect())
    }

    fn files(&self, benchmark: &Benchmark) -> Result<Vec<SourceFile>, LoadError> {
        let Some((_, files)) = self.benchmarks.iter().find(|(b, _)| *b == benchmark.name) else {
            return Err(LoadError::Io {
                path: PathBuf::from(&benchmark.name),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "benchmark not found"),
            });
        };
        Ok(files
            .keys()
            .cloned()
            .map(|name| {
                let base = Path::new(&benchmark.name).join(&name);
                SourceFile {
                    benchmark: benchmark.name.clone(),
                    source_path: base.with_extension(SOURCE_EXT),
                    xml_path: base.with_extension(XML_EXT),
                    name,
                }
            })
            .collect())
    }

    fn load_tree(&self, file: &SourceFile) -> Result<Tree, LoadError> {
        parse_xml_named(&self.entry(file)?.xml, &file.xml_path)
    }

    fn read_source(&self, file: &SourceFile) -> Result<String, LoadError> {
        Ok(self.entry(file)?.source.clone())
    }
}
