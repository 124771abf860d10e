// File: src/symbol.rs
//
// Symbol tables for the Adder compiler.
// Tables form a chain via `outer`; tables opened for function literals are
// function boundaries, tables opened for `if`/loop bodies are not. The scope
// a name resolves to decides which load/store opcode the compiler emits.

use ahash::AHashMap;

/// Storage classification of a resolved name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    /// Top-level slot in the VM's globals array.
    Global,
    /// Slot relative to the current frame's base pointer.
    Local,
    /// Captured by value into the current closure's free array.
    Free,
    /// Fixed index into the builtin registry.
    Builtin,
    /// Local of an enclosing block/loop frame, reached through `depth`
    /// frames without crossing a function boundary.
    Block,
    /// The name of the function currently being compiled (recursion).
    Function,
    /// Slot in the VM's class definition table.
    Class,
}

/// A resolved name. `index` is the slot within the scope's storage; `depth`
/// is only meaningful for `Block` symbols and counts how many enclosing
/// frames to skip.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
    pub depth: usize,
}

/// One scope's worth of definitions. `free_symbols` records, in resolution
/// order, the origin symbols this scope captures; the compiler loads them in
/// exactly this order before emitting `Closure`, so the order must never be
/// shuffled.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    store: AHashMap<String, Symbol>,
    pub free_symbols: Vec<Symbol>,
    pub num_definitions: usize,
    outer: Option<Box<SymbolTable>>,
    is_function_boundary: bool,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn enclosed(outer: Box<SymbolTable>, is_function_boundary: bool) -> Self {
        SymbolTable {
            store: AHashMap::new(),
            free_symbols: Vec::new(),
            num_definitions: 0,
            outer: Some(outer),
            is_function_boundary,
        }
    }

    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    /// Detach and return the enclosing table when leaving a scope.
    pub fn take_outer(&mut self) -> Option<Box<SymbolTable>> {
        self.outer.take()
    }

    /// Allocate the next slot for `name` in this scope.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_none() { SymbolScope::Global } else { SymbolScope::Local };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
            depth: 0,
        };
        self.num_definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol =
            Symbol { name: name.to_string(), scope: SymbolScope::Builtin, index, depth: 0 };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Register the name of the function whose body is being compiled; loads
    /// of it become `CurrentClosure`.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol =
            Symbol { name: name.to_string(), scope: SymbolScope::Function, index: 0, depth: 0 };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Bind a class name to its slot in the class definition table.
    pub fn define_class(&mut self, name: &str, class_index: usize) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Class,
            index: class_index,
            depth: 0,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Record `origin` as a free variable of this scope and return the
    /// reclassified symbol.
    fn define_free(&mut self, origin: Symbol) -> Symbol {
        self.free_symbols.push(origin.clone());
        let symbol = Symbol {
            name: origin.name,
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
            depth: 0,
        };
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Resolve `name`, walking outward through the table chain.
    ///
    /// Globals, builtins, and classes pass through unchanged from any depth.
    /// A local of an enclosing scope reached without crossing a function
    /// boundary becomes a `Block` symbol whose depth counts the frames in
    /// between, so stores reach the original slot. Anything reached across a
    /// function boundary is captured by value as a free variable.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }
        let outer = self.outer.as_mut()?;
        let symbol = outer.resolve(name)?;
        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin | SymbolScope::Class => Some(symbol),
            SymbolScope::Local | SymbolScope::Block if !self.is_function_boundary => {
                let reclassified = Symbol {
                    name: symbol.name,
                    scope: SymbolScope::Block,
                    index: symbol.index,
                    depth: symbol.depth + 1,
                };
                self.store.insert(reclassified.name.clone(), reclassified.clone());
                Some(reclassified)
            }
            _ => Some(self.define_free(symbol)),
        }
    }

    /// All names visible from this table, innermost first. Used for
    /// "did you mean" suggestions on unknown identifiers.
    pub fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.store.keys().cloned().collect();
        if let Some(outer) = &self.outer {
            names.extend(outer.visible_names());
        }
        names
    }
}
