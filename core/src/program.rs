//! Program loading
//!
//! A program is a set of source files compiled together: every file is
//! parsed, all parsed files go through entry point registration, then each
//! file is analyzed on its own. A file that fails at any stage is recorded
//! and left out; the rest of the program stays usable.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::analyzer::{analyze_file, AnalyzedDefinition, AnalyzedFile};
use crate::ast::ParsedFile;
use crate::entry_points::EntryPointRegistry;
use crate::error::DslError;
use crate::ids;
use crate::parser::parse_file;
use crate::types::Registry;


/// A loaded source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub source: String,
    /// Hex SHA-256 of `source`
    pub digest: String,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            path: path.into(),
            digest: format!("{:x}", Sha256::digest(source.as_bytes())),
            source,
        }
    }

    /// Source that does not come from disk, named `memory-<n>.dng` with `n`
    /// from the process-wide id generator
    pub fn in_memory(source: impl Into<String>) -> Self {
        Self::new(format!("memory-{}.dng", ids::global().next_id()), source)
    }

    pub fn file_name(&self) -> Arc<str> {
        Arc::from(self.path.display().to_string())
    }
}

/// Read every source file under `paths`.
///
/// Directories are searched recursively for files ending in `.{extension}`;
/// files named directly are read whatever their extension. Within a directory
/// files are loaded in path order.
pub fn load_sources(paths: &[PathBuf], extension: &str) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found = Vec::new();
            collect_files(path, extension, &mut found)?;
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }

    files
        .into_iter()
        .map(|path| {
            let source = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read source file {}", path.display()))?;
            debug!(path = %path.display(), bytes = source.len(), "Loaded source file");
            Ok(SourceFile::new(path, source))
        })
        .collect()
}

fn collect_files(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
            .path();
        if path.is_dir() {
            collect_files(&path, extension, out)?;
        } else if path.extension().is_some_and(|ext| ext == extension) {
            out.push(path);
        }
    }
    Ok(())
}

/// A compiled set of source files
#[derive(Debug)]
pub struct Program {
    sources: Vec<SourceFile>,
    entries: EntryPointRegistry,
    analyzed: Vec<AnalyzedFile>,
    /// Definition name to (file, definition) position in `analyzed`
    index: HashMap<String, (usize, usize)>,
    failures: Vec<(Arc<str>, DslError)>,
}

impl Program {
    pub fn compile(registry: &Registry, sources: Vec<SourceFile>) -> Self {
        let mut failures = Vec::new();
        let mut parsed: Vec<ParsedFile> = Vec::with_capacity(sources.len());
        for source in &sources {
            match parse_file(&source.path, &source.source) {
                Ok(file) => parsed.push(file),
                Err(err) => {
                    warn!(file = %source.path.display(), error = %err, "Source file failed to parse");
                    failures.push((source.file_name(), DslError::from(err)));
                }
            }
        }

        let entries = EntryPointRegistry::register_all(&parsed, registry);

        let mut analyzed = Vec::with_capacity(parsed.len());
        for file in &parsed {
            match analyze_file(file, registry, &entries) {
                Ok(result) => {
                    info!(
                        file = %result.file,
                        definitions = result.definitions.len(),
                        "Source file analyzed"
                    );
                    analyzed.push(result);
                }
                Err(err) => {
                    warn!(file = %file.path.display(), error = %err, "Source file rejected");
                    failures.push((file.file_name(), DslError::from(err)));
                }
            }
        }

        let mut index = HashMap::new();
        for (file_index, file) in analyzed.iter().enumerate() {
            for (def_index, definition) in file.definitions.iter().enumerate() {
                index.insert(definition.name.clone(), (file_index, def_index));
            }
        }

        info!(
            files = sources.len(),
            entry_points = entries.len(),
            failed = failures.len(),
            "Program compiled"
        );

        Self {
            sources,
            entries,
            analyzed,
            index,
            failures,
        }
    }

    /// Compile a single source file
    pub fn from_source(registry: &Registry, path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self::compile(registry, vec![SourceFile::new(path, source)])
    }

    pub fn sources(&self) -> &[SourceFile] {
        &self.sources
    }

    pub fn entry_points(&self) -> &EntryPointRegistry {
        &self.entries
    }

    /// Files that passed analysis, in load order
    pub fn files(&self) -> &[AnalyzedFile] {
        &self.analyzed
    }

    /// Analyzed definition of an entry point; `None` if the name is unknown
    /// or its file was rejected
    pub fn definition(&self, name: &str) -> Option<&AnalyzedDefinition> {
        let &(file, def) = self.index.get(name)?;
        self.analyzed.get(file)?.definitions.get(def)
    }

    pub fn failures(&self) -> &[(Arc<str>, DslError)] {
        &self.failures
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}
