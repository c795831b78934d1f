//! Entry Point Registry
//!
//! First pass over every loaded file: each top-level definition becomes an
//! entry point before any body is analyzed, so definitions may reference each
//! other across files regardless of load order.
//!
//! Names are global. When two files define the same name, the file loaded
//! first keeps it and the later file fails with a duplicate symbol error.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::analyzer::SemanticError;
use crate::ast::{Definition, Location, ParsedFile};
use crate::symbols::SymbolTable;
use crate::types::{DslType, Registry};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub name: String,
    pub location: Location,
    pub ty: DslType,
    pub definition: Definition,
}

impl EntryPoint {
    pub fn file(&self) -> &Arc<str> {
        &self.location.file
    }
}

#[derive(Debug, Default)]
pub struct EntryPointRegistry {
    /// In load order
    entries: Vec<EntryPoint>,
    index: HashMap<String, usize>,
    /// First registration failure per file
    failures: Vec<(Arc<str>, SemanticError)>,
}

impl EntryPointRegistry {
    /// Register the top-level definitions of all files, in order
    pub fn register_all(files: &[ParsedFile], registry: &Registry) -> Self {
        let mut entries = Self::default();
        for file in files {
            let file_name = file.file_name();
            for definition in &file.document.definitions {
                if let Err(err) = entries.register(&file_name, definition, registry) {
                    warn!(file = %file_name, error = %err, "Entry point rejected");
                    entries.fail(&file_name, err);
                }
            }
        }
        debug!(
            entries = entries.entries.len(),
            files = files.len(),
            "Registered entry points"
        );
        entries
    }

    fn register(
        &mut self,
        file: &Arc<str>,
        definition: &Definition,
        registry: &Registry,
    ) -> Result<(), SemanticError> {
        let name = definition.name();
        let location = Location::new(file.clone(), name.span);

        let ty = match definition {
            Definition::Graph(_) => DslType::GRAPH,
            Definition::Object(def) => registry.lookup_type(&def.type_name.name).ok_or_else(|| {
                SemanticError::UnresolvedSymbol {
                    name: def.type_name.name.clone(),
                    location: Location::new(file.clone(), def.type_name.span),
                }
            })?,
        };

        if let Some(&existing) = self.index.get(&name.name) {
            return Err(SemanticError::DuplicateSymbol {
                name: name.name.clone(),
                location,
                previous: Some(self.entries[existing].location.clone()),
            });
        }

        debug!(name = %name.name, ty = %ty, file = %file, "Registered entry point");
        self.index.insert(name.name.clone(), self.entries.len());
        self.entries.push(EntryPoint {
            name: name.name.clone(),
            location,
            ty,
            definition: definition.clone(),
        });
        Ok(())
    }

    fn fail(&mut self, file: &Arc<str>, err: SemanticError) {
        if self.failure(file).is_none() {
            self.failures.push((file.clone(), err));
        }
    }

    pub fn get(&self, name: &str) -> Option<&EntryPoint> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Like [`EntryPointRegistry::get`], reporting an unknown name at `location`
    pub fn resolve(&self, name: &str, location: &Location) -> Result<&EntryPoint, SemanticError> {
        self.get(name).ok_or_else(|| SemanticError::UnresolvedSymbol {
            name: name.to_string(),
            location: location.clone(),
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = &EntryPoint> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registration failure of `file`, if any
    pub fn failure(&self, file: &str) -> Option<&SemanticError> {
        self.failures
            .iter()
            .find(|(f, _)| &**f == file)
            .map(|(_, err)| err)
    }

    pub fn failures(&self) -> &[(Arc<str>, SemanticError)] {
        &self.failures
    }

    /// Global scope holding every entry point
    pub fn global_scope<T>(&self, mut bind: impl FnMut(&EntryPoint) -> T) -> SymbolTable<T> {
        let mut scope = SymbolTable::new();
        for entry in &self.entries {
            // Names are unique by construction
            let _ = scope.declare_global(entry.name.clone(), bind(entry));
        }
        scope
    }
}
