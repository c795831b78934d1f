//! Symbol Table / Scopes
//!
//! A stack of frames over a global frame. Each frame's parent is the frame
//! below it, so resolution walks innermost to outermost and a popped frame's
//! bindings are never visible to a sibling pushed later. The table is generic
//! over what a name is bound to: the analyzer binds types, the interpreter
//! binds values.

use std::collections::HashMap;


#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    #[error("'{name}' is already declared in this scope")]
    DuplicateSymbol { name: String },

    #[error("unresolved symbol '{name}'")]
    UnresolvedSymbol { name: String },
}

#[derive(Debug, Clone)]
pub struct SymbolTable<T> {
    /// `frames[0]` is the global scope and is never popped
    frames: Vec<HashMap<String, T>>,
}

impl<T> Default for SymbolTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SymbolTable<T> {
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// Drop the innermost scope; the global scope stays
    pub fn pop_scope(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Number of scopes above the global one
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// Bind `name` in the current scope. Shadowing an outer binding is fine.
    pub fn declare(&mut self, name: impl Into<String>, binding: T) -> Result<(), SymbolError> {
        let name = name.into();
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| SymbolError::UnresolvedSymbol { name: name.clone() })?;
        if frame.contains_key(&name) {
            return Err(SymbolError::DuplicateSymbol { name });
        }
        frame.insert(name, binding);
        Ok(())
    }

    /// Bind `name` in the global scope
    pub fn declare_global(&mut self, name: impl Into<String>, binding: T) -> Result<(), SymbolError> {
        let name = name.into();
        let global = &mut self.frames[0];
        if global.contains_key(&name) {
            return Err(SymbolError::DuplicateSymbol { name });
        }
        global.insert(name, binding);
        Ok(())
    }

    /// Nearest enclosing binding of `name`
    pub fn resolve(&self, name: &str) -> Result<&T, SymbolError> {
        self.lookup(name).ok_or_else(|| SymbolError::UnresolvedSymbol {
            name: name.to_string(),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<&T> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Binding of `name` in the current scope only
    pub fn lookup_current(&self, name: &str) -> Option<&T> {
        self.frames.last().and_then(|frame| frame.get(name))
    }
}
