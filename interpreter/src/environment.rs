use std::collections::HashMap;

use crate::builtins;
use crate::counters::Counters;
use crate::runtime_value::RuntimeValue;

/// Variables visible at one nesting level.
pub type Scope = HashMap<String, RuntimeValue>;

/// Name resolution for one generation: a global namespace (builtins plus the
/// caller's variables) under a stack of local scopes.
///
/// The stack is never empty. Lookups consult only the top scope, then the
/// globals; a pushed scope starts as a copy of the one below it, so bindings
/// made inside a `$FOR` or `$IF` vanish when it ends.
#[derive(Debug, Clone)]
pub struct Environment {
    globals: Scope,
    current: Scope,
    saved: Vec<Scope>,
    counters: Counters,
}

impl Environment {
    /// A fresh environment whose globals are the builtins overlaid with
    /// `variables`.
    pub fn new(variables: Scope) -> Self {
        let mut globals = builtins::namespace();
        globals.extend(variables);
        Environment {
            globals,
            current: Scope::new(),
            saved: Vec::new(),
            counters: Counters::new(),
        }
    }

    /// Use `counters` for `COUNTER` instead of a fresh registry.
    pub fn with_counters(mut self, counters: Counters) -> Self {
        self.counters = counters;
        self
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Look up a name in the top scope, then in the globals.
    pub fn get_variable(&self, name: &str) -> Option<&RuntimeValue> {
        self.current.get(name).or_else(|| self.globals.get(name))
    }

    /// Bind a name in the top scope.
    pub fn set_variable(&mut self, name: &str, value: RuntimeValue) {
        log::trace!("bind {name} at depth {}", self.depth());
        self.current.insert(name.to_string(), value);
    }

    /// Push a copy of the top scope.
    pub fn push_scope(&mut self) {
        self.saved.push(self.current.clone());
        log::trace!("push scope, depth {}", self.depth());
    }

    /// Discard the top scope. The bottom scope is never removed; popping it
    /// returns `None`.
    pub fn pop_scope(&mut self) -> Option<Scope> {
        let below = self.saved.pop()?;
        log::trace!("pop scope, depth {}", self.depth());
        Some(std::mem::replace(&mut self.current, below))
    }

    /// Number of local scopes, at least one.
    pub fn depth(&self) -> usize {
        self.saved.len() + 1
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new(Scope::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locals_shadow_globals() {
        let mut env = Environment::new(Scope::from([("x".to_string(), RuntimeValue::Integer(1))]));
        assert_eq!(env.get_variable("x"), Some(&RuntimeValue::Integer(1)));
        env.set_variable("x", RuntimeValue::Integer(2));
        assert_eq!(env.get_variable("x"), Some(&RuntimeValue::Integer(2)));
        assert!(env.get_variable("len").is_some());
        assert!(env.get_variable("missing").is_none());
    }

    #[test]
    fn pushed_scope_copies_and_pop_discards() {
        let mut env = Environment::default();
        env.set_variable("a", RuntimeValue::Integer(1));
        env.push_scope();
        assert_eq!(env.depth(), 2);
        assert_eq!(env.get_variable("a"), Some(&RuntimeValue::Integer(1)));

        env.set_variable("a", RuntimeValue::Integer(5));
        env.set_variable("b", RuntimeValue::Integer(6));
        let popped = env.pop_scope().unwrap();
        assert_eq!(popped.len(), 2);
        assert_eq!(env.get_variable("a"), Some(&RuntimeValue::Integer(1)));
        assert!(env.get_variable("b").is_none());
    }

    #[test]
    fn bottom_scope_is_never_popped() {
        let mut env = Environment::default();
        env.set_variable("a", RuntimeValue::Integer(1));
        assert!(env.pop_scope().is_none());
        assert_eq!(env.depth(), 1);
        assert_eq!(env.get_variable("a"), Some(&RuntimeValue::Integer(1)));
    }

    #[test]
    fn scopes_share_one_counter_registry() {
        let shared = Counters::new();
        shared.advance("n", false);
        let mut env = Environment::default().with_counters(shared.clone());
        env.push_scope();
        assert_eq!(env.counters().advance("n", false), 2);
        env.pop_scope();
        assert_eq!(shared.advance("n", false), 3);
        assert_eq!(Environment::default().counters().advance("n", false), 1);
    }
}
