//! Symbol table for the Monkey compiler.
//!
//! Names are resolved to a storage class and a dense index at compile time;
//! the VM never sees a name.  The table is a **stack of lexical scopes**: the
//! bottom scope is the global one, and each function literal pushes a new
//! scope for the duration of its body.
//!
//! # Free-variable promotion
//!
//! Resolving a name that is bound as a local (or already as a free variable)
//! of an *enclosing* function promotes it: every scope between the binding
//! and the reference records the captured symbol in its `free_symbols` list
//! and re-exposes it as a `Free` symbol.  This threading through the
//! intermediate scopes is what makes nested closures work — each closure in
//! the chain captures from its immediate parent, never further out.
//! Globals, builtins, and the function's own name are addressed directly and
//! are never promoted.

use std::collections::HashMap;

// ─────────────────────────────────────────────────────────────────────────────
// Symbol
// ─────────────────────────────────────────────────────────────────────────────

/// The storage class a name resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    /// A slot in the VM's globals vector.
    Global,
    /// A slot above the current frame's base pointer.
    Local,
    /// An entry in the fixed builtin registry.
    Builtin,
    /// A value captured into the current closure.
    Free,
    /// The name of the function currently being compiled (self-reference).
    Function,
}

/// A resolved name: its storage class plus a dense per-class index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Scope
// ─────────────────────────────────────────────────────────────────────────────

/// One lexical scope on the scope stack.
#[derive(Debug, Default)]
struct Scope {
    store: HashMap<String, Symbol>,
    /// Count of `Global`/`Local` definitions; the next definition's index.
    num_definitions: usize,
    /// The original (outer-scope) symbols captured by this scope, in capture
    /// order.  Index `i` here corresponds to `Free` index `i` inside.
    free_symbols: Vec<Symbol>,
}

impl Scope {
    /// Record a capture of `original` and expose it as a `Free` symbol.
    fn define_free(&mut self, original: Symbol) -> Symbol {
        let free = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len(),
        };
        self.free_symbols.push(original);
        self.store.insert(free.name.clone(), free.clone());
        free
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SymbolTable
// ─────────────────────────────────────────────────────────────────────────────

/// A stack of lexical scopes; the last element is the innermost.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Create a table holding only the global scope.
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope::default()],
        }
    }

    /// Open a new innermost scope (entering a function body).
    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Close the innermost scope (leaving a function body).
    ///
    /// The global scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Number of `Global`/`Local` definitions in the innermost scope.
    pub fn num_definitions(&self) -> usize {
        self.innermost().num_definitions
    }

    /// The symbols captured by the innermost scope, in capture order.
    pub fn free_symbols(&self) -> &[Symbol] {
        &self.innermost().free_symbols
    }

    fn innermost(&self) -> &Scope {
        self.scopes.last().expect("scope stack is never empty")
    }

    fn innermost_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("scope stack is never empty")
    }

    /// Define `name` in the innermost scope and return its symbol.
    ///
    /// Re-defining an existing name is allowed (`let` re-binding); the new
    /// definition shadows the old one but still consumes a fresh slot.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.scopes.len() == 1 {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let inner = self.innermost_mut();
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: inner.num_definitions,
        };
        inner.num_definitions += 1;
        inner.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Pre-define a builtin at a fixed registry index in the global scope.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.scopes[0].store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Bind the current function's own name in the innermost scope.
    ///
    /// Does not consume a local slot; the VM materialises the reference with
    /// `OpCurrentClosure` instead of a load.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.innermost_mut()
            .store
            .insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Resolve `name`, searching from the innermost scope outwards.
    ///
    /// A hit on a `Local` or `Free` binding of an enclosing scope is promoted
    /// to a `Free` symbol in every scope between the binding and the current
    /// one (see the module docs).  `Global`, `Builtin`, and `Function`
    /// symbols are returned unchanged.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        let innermost = self.scopes.len() - 1;
        let (depth, mut symbol) = self
            .scopes
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, scope)| scope.store.get(name).map(|s| (i, s.clone())))?;

        if depth == innermost
            || matches!(
                symbol.scope,
                SymbolScope::Global | SymbolScope::Builtin | SymbolScope::Function
            )
        {
            return Some(symbol);
        }

        // A Local or Free binding of an enclosing function: thread the
        // capture through every intervening scope.
        for i in depth + 1..=innermost {
            symbol = self.scopes[i].define_free(symbol);
        }
        Some(symbol)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str, scope: SymbolScope, index: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            scope,
            index,
        }
    }

    #[test]
    fn test_define() {
        let mut table = SymbolTable::new();
        assert_eq!(table.define("a"), symbol("a", SymbolScope::Global, 0));
        assert_eq!(table.define("b"), symbol("b", SymbolScope::Global, 1));

        table.push_scope();
        assert_eq!(table.define("c"), symbol("c", SymbolScope::Local, 0));
        assert_eq!(table.define("d"), symbol("d", SymbolScope::Local, 1));

        table.push_scope();
        assert_eq!(table.define("e"), symbol("e", SymbolScope::Local, 0));
        assert_eq!(table.define("f"), symbol("f", SymbolScope::Local, 1));
    }

    #[test]
    fn test_resolve_global() {
        let mut table = SymbolTable::new();
        table.define("a");
        table.define("b");
        assert_eq!(
            table.resolve("a"),
            Some(symbol("a", SymbolScope::Global, 0))
        );
        assert_eq!(
            table.resolve("b"),
            Some(symbol("b", SymbolScope::Global, 1))
        );
        assert_eq!(table.resolve("c"), None);
    }

    #[test]
    fn test_resolve_local_and_global_through_scopes() {
        let mut table = SymbolTable::new();
        table.define("a");
        table.push_scope();
        table.define("b");
        table.push_scope();
        table.define("c");

        // Global resolves unchanged from two scopes in.
        assert_eq!(
            table.resolve("a"),
            Some(symbol("a", SymbolScope::Global, 0))
        );
        // Innermost local resolves unchanged.
        assert_eq!(table.resolve("c"), Some(symbol("c", SymbolScope::Local, 0)));
    }

    #[test]
    fn test_resolve_free() {
        let mut table = SymbolTable::new();
        table.define("a");
        table.define("b");
        table.push_scope();
        table.define("c");
        table.define("d");
        table.push_scope();
        table.define("e");
        table.define("f");

        assert_eq!(
            table.resolve("a"),
            Some(symbol("a", SymbolScope::Global, 0))
        );
        assert_eq!(
            table.resolve("b"),
            Some(symbol("b", SymbolScope::Global, 1))
        );
        assert_eq!(table.resolve("c"), Some(symbol("c", SymbolScope::Free, 0)));
        assert_eq!(table.resolve("d"), Some(symbol("d", SymbolScope::Free, 1)));
        assert_eq!(table.resolve("e"), Some(symbol("e", SymbolScope::Local, 0)));
        assert_eq!(table.resolve("f"), Some(symbol("f", SymbolScope::Local, 1)));

        // The captured originals are recorded in capture order.
        assert_eq!(
            table.free_symbols(),
            &[
                symbol("c", SymbolScope::Local, 0),
                symbol("d", SymbolScope::Local, 1),
            ]
        );
    }

    #[test]
    fn test_resolve_free_is_recorded_once() {
        let mut table = SymbolTable::new();
        table.push_scope();
        table.define("a");
        table.push_scope();

        assert_eq!(table.resolve("a"), Some(symbol("a", SymbolScope::Free, 0)));
        // Resolving again finds the already-promoted Free symbol.
        assert_eq!(table.resolve("a"), Some(symbol("a", SymbolScope::Free, 0)));
        assert_eq!(table.free_symbols().len(), 1);
    }

    #[test]
    fn test_resolve_nested_free_threads_intermediate_scope() {
        // a is local two functions out; the middle scope must capture it too.
        let mut table = SymbolTable::new();
        table.push_scope();
        table.define("a");
        table.push_scope();
        table.push_scope();

        assert_eq!(table.resolve("a"), Some(symbol("a", SymbolScope::Free, 0)));
        table.pop_scope();
        // The middle scope captured the original local.
        assert_eq!(
            table.free_symbols(),
            &[symbol("a", SymbolScope::Local, 0)]
        );
    }

    #[test]
    fn test_unresolvable_free() {
        let mut table = SymbolTable::new();
        table.define("a");
        table.push_scope();
        table.define("c");
        table.push_scope();
        table.define("e");
        table.define("f");

        assert!(table.resolve("a").is_some());
        assert!(table.resolve("c").is_some());
        assert!(table.resolve("e").is_some());
        assert!(table.resolve("f").is_some());
        assert_eq!(table.resolve("b"), None);
        assert_eq!(table.resolve("d"), None);
    }

    #[test]
    fn test_define_and_resolve_builtins() {
        let mut table = SymbolTable::new();
        table.define_builtin(0, "len");
        table.define_builtin(1, "puts");

        for _ in 0..2 {
            assert_eq!(
                table.resolve("len"),
                Some(symbol("len", SymbolScope::Builtin, 0))
            );
            assert_eq!(
                table.resolve("puts"),
                Some(symbol("puts", SymbolScope::Builtin, 1))
            );
            table.push_scope();
        }
    }

    #[test]
    fn test_define_and_resolve_function_name() {
        let mut table = SymbolTable::new();
        table.push_scope();
        table.define_function_name("a");
        assert_eq!(
            table.resolve("a"),
            Some(symbol("a", SymbolScope::Function, 0))
        );
    }

    #[test]
    fn test_shadowing_function_name() {
        let mut table = SymbolTable::new();
        table.push_scope();
        table.define_function_name("a");
        table.define("a");
        assert_eq!(table.resolve("a"), Some(symbol("a", SymbolScope::Local, 0)));
    }

    #[test]
    fn test_let_rebinding_consumes_fresh_slot() {
        let mut table = SymbolTable::new();
        table.define("x");
        assert_eq!(table.define("x"), symbol("x", SymbolScope::Global, 1));
        assert_eq!(table.num_definitions(), 2);
    }
}
