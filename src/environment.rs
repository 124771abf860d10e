// File: src/environment.rs
//
// Environments for the tree-walking evaluator.
// Closures make environment chains cyclic (a function value lives in the
// environment it captured), so records live in an arena owned by the
// evaluator and refer to each other by index instead of by reference count.

use crate::value::Value;
use ahash::AHashMap;

/// Index of an environment record in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvId(usize);

#[derive(Debug)]
struct EnvRecord {
    store: AHashMap<String, Value>,
    outer: Option<EnvId>,
    /// Bound `this` for method bodies; resolved by walking outward.
    instance: Option<Value>,
}

/// Arena of environment records. Records are never freed; the whole arena is
/// dropped with the evaluator.
#[derive(Debug)]
pub struct Environments {
    records: Vec<EnvRecord>,
}

impl Environments {
    pub fn new() -> Self {
        Environments {
            records: vec![EnvRecord { store: AHashMap::new(), outer: None, instance: None }],
        }
    }

    pub fn root(&self) -> EnvId {
        EnvId(0)
    }

    /// Open a new scope nested in `outer`.
    pub fn push(&mut self, outer: EnvId) -> EnvId {
        self.records.push(EnvRecord {
            store: AHashMap::new(),
            outer: Some(outer),
            instance: None,
        });
        EnvId(self.records.len() - 1)
    }

    /// Open a new scope with a bound instance (a method body).
    pub fn push_bound(&mut self, outer: EnvId, instance: Value) -> EnvId {
        self.records.push(EnvRecord {
            store: AHashMap::new(),
            outer: Some(outer),
            instance: Some(instance),
        });
        EnvId(self.records.len() - 1)
    }

    /// Introduce (or shadow) a binding in `env` itself.
    pub fn declare(&mut self, env: EnvId, name: &str, value: Value) {
        self.records[env.0].store.insert(name.to_string(), value);
    }

    /// Read a binding, searching outward.
    pub fn get(&self, env: EnvId, name: &str) -> Option<Value> {
        let mut current = Some(env);
        while let Some(id) = current {
            let record = &self.records[id.0];
            if let Some(value) = record.store.get(name) {
                return Some(value.clone());
            }
            current = record.outer;
        }
        None
    }

    /// Overwrite an existing binding, searching outward. Returns false when
    /// the name was never declared.
    pub fn assign(&mut self, env: EnvId, name: &str, value: Value) -> bool {
        let mut current = Some(env);
        while let Some(id) = current {
            let record = &mut self.records[id.0];
            if record.store.contains_key(name) {
                record.store.insert(name.to_string(), value);
                return true;
            }
            current = record.outer;
        }
        false
    }

    /// The nearest bound instance, searching outward.
    pub fn instance(&self, env: EnvId) -> Option<Value> {
        let mut current = Some(env);
        while let Some(id) = current {
            let record = &self.records[id.0];
            if let Some(instance) = &record.instance {
                return Some(instance.clone());
            }
            current = record.outer;
        }
        None
    }
}

impl Default for Environments {
    fn default() -> Self {
        Self::new()
    }
}
