//! Ordered collection of shading programs with cyclic navigation.
//!
//! Insertion order is discovery order and defines navigation order. An empty
//! catalog is legal but terminal for rendering: every operation returns `None`.

use std::sync::Arc;

use crate::logi;

/// A named, immutable fragment program text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadingProgram {
    pub name: String,
    pub source: Arc<str>,
}

impl ShadingProgram {
    pub fn new(name: impl Into<String>, source: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShaderCatalog {
    programs: Vec<ShadingProgram>,
    index: usize,
}

impl ShaderCatalog {
    pub fn new(programs: Vec<ShadingProgram>) -> Self {
        Self { programs, index: 0 }
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn index(&self) -> Option<usize> {
        if self.programs.is_empty() {
            None
        } else {
            Some(self.index)
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.programs.iter().map(|p| p.name.as_str())
    }

    pub fn current(&self) -> Option<&ShadingProgram> {
        self.programs.get(self.index)
    }

    pub fn next(&mut self) -> Option<&ShadingProgram> {
        let len = self.programs.len();
        if len == 0 {
            return None;
        }
        self.index = (self.index + 1) % len;
        self.log_switch();
        self.current()
    }

    pub fn previous(&mut self) -> Option<&ShadingProgram> {
        let len = self.programs.len();
        if len == 0 {
            return None;
        }
        self.index = (self.index + len - 1) % len;
        self.log_switch();
        self.current()
    }

    /// Out-of-range indices are a silent no-op.
    pub fn select_index(&mut self, index: usize) -> Option<&ShadingProgram> {
        if index >= self.programs.len() {
            return None;
        }
        self.index = index;
        self.log_switch();
        self.current()
    }

    fn log_switch(&self) {
        if let Some(p) = self.programs.get(self.index) {
            logi!("SHADER", "switched to: {} ({} / {})", p.name, self.index + 1, self.programs.len());
        }
    }
}
