//! Lexically nested symbol environments.
//!
//! Each environment keeps three keyed maps: ordinary identifiers (variables,
//! functions), typedef aliases, and record tags. Tags never collide with the
//! other two; ordinary names and typedef aliases share the identifier
//! namespace, so lookups and redefinition checks consult both, ordinary
//! first (an inner `int T;` shadows an outer `typedef int T;`).

use crate::types::Type;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Variable or function
    Object,
    Typedef,
    Tag,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub ty: Type,
    pub name: String,
}

#[derive(Default)]
struct Env {
    ordinary: HashMap<String, Symbol>,
    typedefs: HashMap<String, Symbol>,
    tags: HashMap<String, Symbol>,
}

pub struct Scope {
    envs: Vec<Env>,
}

impl Scope {
    /// Starts with the global environment already in place.
    pub fn new() -> Self {
        Scope {
            envs: vec![Env::default()],
        }
    }

    pub fn enter(&mut self) {
        self.envs.push(Env::default());
    }

    pub fn exit(&mut self) {
        assert!(self.envs.len() > 1, "popped the global scope");
        self.envs.pop();
    }

    pub fn depth(&self) -> usize {
        self.envs.len()
    }

    fn find_in(env: &Env, name: &str) -> Option<Symbol> {
        env.ordinary
            .get(name)
            .or_else(|| env.typedefs.get(name))
            .cloned()
    }

    /// Walk outward through the identifier namespace.
    pub fn find_name(&self, name: &str) -> Option<Symbol> {
        self.envs
            .iter()
            .rev()
            .find_map(|env| Self::find_in(env, name))
    }

    /// Identifier lookup restricted to the innermost environment.
    pub fn find_name_current(&self, name: &str) -> Option<Symbol> {
        Self::find_in(self.envs.last().expect("scope stack empty"), name)
    }

    pub fn add_ordinary(&mut self, ty: Type, name: &str) {
        let env = self.envs.last_mut().expect("scope stack empty");
        env.ordinary.insert(
            name.to_string(),
            Symbol {
                kind: SymbolKind::Object,
                ty,
                name: name.to_string(),
            },
        );
    }

    pub fn add_typedef(&mut self, ty: Type, name: &str) {
        let env = self.envs.last_mut().expect("scope stack empty");
        env.typedefs.insert(
            name.to_string(),
            Symbol {
                kind: SymbolKind::Typedef,
                ty,
                name: name.to_string(),
            },
        );
    }

    pub fn find_tag(&self, name: &str) -> Option<Symbol> {
        self.envs
            .iter()
            .rev()
            .find_map(|env| env.tags.get(name).cloned())
    }

    pub fn find_tag_current(&self, name: &str) -> Option<Symbol> {
        self.envs
            .last()
            .expect("scope stack empty")
            .tags
            .get(name)
            .cloned()
    }

    pub fn add_tag(&mut self, ty: Type, name: &str) {
        let env = self.envs.last_mut().expect("scope stack empty");
        env.tags.insert(
            name.to_string(),
            Symbol {
                kind: SymbolKind::Tag,
                ty,
                name: name.to_string(),
            },
        );
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outward_lookup() {
        let mut scope = Scope::new();
        scope.add_ordinary(Type::Int, "a");
        scope.enter();
        assert!(scope.find_name("a").is_some());
        assert!(scope.find_name_current("a").is_none());
        scope.exit();
    }

    #[test]
    fn test_shadowing() {
        let mut scope = Scope::new();
        scope.add_ordinary(Type::Int, "a");
        scope.enter();
        scope.add_ordinary(Type::Double, "a");
        assert_eq!(scope.find_name("a").unwrap().ty, Type::Double);
        scope.exit();
        assert_eq!(scope.find_name("a").unwrap().ty, Type::Int);
    }

    #[test]
    fn test_tags_are_a_separate_namespace() {
        let mut scope = Scope::new();
        scope.add_ordinary(Type::Int, "foo");
        scope.add_tag(Type::Int, "foo");
        assert_eq!(scope.find_name("foo").unwrap().kind, SymbolKind::Object);
        assert_eq!(scope.find_tag("foo").unwrap().kind, SymbolKind::Tag);
    }

    #[test]
    fn test_typedefs_share_identifier_namespace() {
        let mut scope = Scope::new();
        scope.add_typedef(Type::Int, "T");
        // A current-env identifier lookup sees the typedef — Sema uses this
        // to flag `typedef int T; int T;` as a redefinition.
        let sym = scope.find_name_current("T").unwrap();
        assert_eq!(sym.kind, SymbolKind::Typedef);
    }

    #[test]
    fn test_inner_object_shadows_outer_typedef() {
        let mut scope = Scope::new();
        scope.add_typedef(Type::Int, "T");
        scope.enter();
        scope.add_ordinary(Type::Double, "T");
        assert_eq!(scope.find_name("T").unwrap().kind, SymbolKind::Object);
        scope.exit();
        assert_eq!(scope.find_name("T").unwrap().kind, SymbolKind::Typedef);
    }

    #[test]
    fn test_exit_restores_tags() {
        let mut scope = Scope::new();
        scope.enter();
        scope.add_tag(Type::Int, "S");
        assert!(scope.find_tag_current("S").is_some());
        scope.exit();
        assert!(scope.find_tag("S").is_none());
    }
}
