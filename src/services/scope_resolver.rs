//! Variable scope resolution.
//!
//! A [`ScopeChain`] holds the variables of a task scope and of the execution
//! chain above it, innermost first. Writes are applied to the in-memory levels
//! immediately and collected, so a transition reads its own writes before
//! they are committed.

use crate::domain::errors::DomainResult;
use crate::domain::models::{ScopeRef, VariableMap, VariableValue, VariableWrite};
use crate::domain::ports::VariableRepository;

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeLevel {
    pub scope: ScopeRef,
    pub variables: VariableMap,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeChain {
    /// Innermost first; the last level is the process instance (or a standalone task)
    levels: Vec<ScopeLevel>,
    pending: Vec<VariableWrite>,
}

impl ScopeChain {
    pub fn from_levels(levels: Vec<ScopeLevel>) -> Self {
        Self {
            levels,
            pending: Vec::new(),
        }
    }

    /// Load the variables of every scope, innermost first.
    pub async fn load(repo: &dyn VariableRepository, scopes: Vec<ScopeRef>) -> DomainResult<Self> {
        let mut levels = Vec::with_capacity(scopes.len());
        for scope in scopes {
            let variables = repo.load(&scope).await?;
            levels.push(ScopeLevel { scope, variables });
        }
        Ok(Self::from_levels(levels))
    }

    pub fn levels(&self) -> &[ScopeLevel] {
        &self.levels
    }

    fn innermost(&self) -> Option<&ScopeLevel> {
        self.levels.first()
    }

    /// Innermost value of `name`.
    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.levels.iter().find_map(|level| level.variables.get(name))
    }

    /// Value of `name` on the innermost scope only.
    pub fn get_local(&self, name: &str) -> Option<&VariableValue> {
        self.innermost().and_then(|level| level.variables.get(name))
    }

    /// Every visible variable; inner scopes shadow outer ones.
    pub fn all(&self) -> VariableMap {
        let mut merged = VariableMap::new();
        for level in self.levels.iter().rev() {
            merged.extend(level.variables.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }

    pub fn local(&self) -> VariableMap {
        self.innermost().map(|level| level.variables.clone()).unwrap_or_default()
    }

    /// Variables of one scope of the chain, as currently visible.
    pub fn at(&self, scope: &ScopeRef) -> Option<&VariableMap> {
        self.levels.iter().find(|level| &level.scope == scope).map(|level| &level.variables)
    }

    /// Scope a default write of `name` lands on: the innermost scope that
    /// already holds it, else the outermost scope.
    pub fn default_scope(&self, name: &str) -> Option<&ScopeRef> {
        self.levels
            .iter()
            .find(|level| level.variables.contains_key(name))
            .or_else(|| self.levels.last())
            .map(|level| &level.scope)
    }

    fn apply(&mut self, write: VariableWrite) {
        if let Some(level) = self.levels.iter_mut().find(|level| level.scope == write.scope) {
            match &write.value {
                Some(value) => {
                    level.variables.insert(write.name.clone(), value.clone());
                }
                None => {
                    level.variables.remove(&write.name);
                }
            }
        }
        self.pending.push(write);
    }

    pub fn write_default(&mut self, name: &str, value: VariableValue) {
        if let Some(scope) = self.default_scope(name).cloned() {
            self.apply(VariableWrite::set(scope, name, value));
        }
    }

    pub fn write_local(&mut self, name: &str, value: VariableValue) {
        if let Some(scope) = self.innermost().map(|level| level.scope.clone()) {
            self.apply(VariableWrite::set(scope, name, value));
        }
    }

    /// Write to a scope that need not be part of the chain.
    pub fn write_to(&mut self, scope: ScopeRef, name: &str, value: VariableValue) {
        self.apply(VariableWrite::set(scope, name, value));
    }

    pub fn write_all_default(&mut self, variables: &VariableMap) {
        for (name, value) in variables {
            self.write_default(name, value.clone());
        }
    }

    /// Remove the innermost occurrence of `name`. Missing names are a no-op.
    pub fn remove(&mut self, name: &str) {
        let scope = self
            .levels
            .iter()
            .find(|level| level.variables.contains_key(name))
            .map(|level| level.scope.clone());
        if let Some(scope) = scope {
            self.apply(VariableWrite::remove(scope, name));
        }
    }

    pub fn remove_local(&mut self, name: &str) {
        let scope = self
            .innermost()
            .filter(|level| level.variables.contains_key(name))
            .map(|level| level.scope.clone());
        if let Some(scope) = scope {
            self.apply(VariableWrite::remove(scope, name));
        }
    }

    pub fn pending(&self) -> &[VariableWrite] {
        &self.pending
    }

    pub fn take_writes(&mut self) -> Vec<VariableWrite> {
        std::mem::take(&mut self.pending)
    }
}

/// Pick the requested names out of a map; `None` keeps everything.
pub fn select(variables: VariableMap, names: Option<&[String]>) -> VariableMap {
    match names {
        None => variables,
        Some(names) => variables
            .into_iter()
            .filter(|(name, _)| names.iter().any(|n| n == name))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn level(scope: ScopeRef, vars: &[(&str, i64)]) -> ScopeLevel {
        ScopeLevel {
            scope,
            variables: vars.iter().map(|(k, v)| ((*k).to_string(), VariableValue::Integer(*v))).collect(),
        }
    }

    fn chain() -> ScopeChain {
        ScopeChain::from_levels(vec![
            level(ScopeRef::Task("t1".into()), &[("local", 1)]),
            level(ScopeRef::Execution("child".into()), &[("shadowed", 2)]),
            level(ScopeRef::Execution("pi".into()), &[("shadowed", 3), ("global", 4)]),
        ])
    }

    #[test]
    fn test_inner_scope_shadows_outer() {
        let chain = chain();
        assert_eq!(chain.get("shadowed"), Some(&VariableValue::Integer(2)));
        assert_eq!(chain.all().get("shadowed"), Some(&VariableValue::Integer(2)));
        assert_eq!(chain.all().len(), 3);
        assert_eq!(chain.get_local("global"), None);
    }

    #[test]
    fn test_default_write_of_new_name_lands_on_instance() {
        let mut chain = chain();
        chain.write_default("fresh", true.into());
        assert_eq!(chain.pending()[0].scope, ScopeRef::Execution("pi".into()));
        assert_eq!(chain.get("fresh"), Some(&VariableValue::Boolean(true)));
        assert_eq!(chain.get_local("fresh"), None);
    }

    #[test]
    fn test_default_write_updates_existing_scope() {
        let mut chain = chain();
        chain.write_default("shadowed", 9.into());
        assert_eq!(chain.pending()[0].scope, ScopeRef::Execution("child".into()));
        assert_eq!(chain.at(&ScopeRef::Execution("pi".into())).unwrap().get("shadowed"), Some(&3.into()));
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut chain = chain();
        chain.remove("nothing");
        chain.remove_local("global");
        assert!(chain.take_writes().is_empty());

        chain.remove("shadowed");
        assert_eq!(chain.get("shadowed"), Some(&VariableValue::Integer(3)));
        assert_eq!(chain.take_writes().len(), 1);
    }

    #[test]
    fn test_select_names() {
        let vars = chain().all();
        let picked = select(vars, Some(&["global".to_string(), "absent".to_string()]));
        assert_eq!(picked.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_default_write_is_visible_but_not_local(
            depth in 2usize..5,
            name in "[a-z]{1,8}",
            value in any::<i64>(),
        ) {
            let levels = (0..depth)
                .map(|i| level(ScopeRef::Execution(format!("e{i}")), &[]))
                .collect();
            let mut chain = ScopeChain::from_levels(levels);
            chain.write_default(&name, value.into());

            prop_assert_eq!(chain.get(&name), Some(&VariableValue::Integer(value)));
            prop_assert_eq!(chain.get_local(&name), None);
            let outermost = ScopeRef::Execution(format!("e{}", depth - 1));
            prop_assert_eq!(&chain.pending()[0].scope, &outermost);
        }

        #[test]
        fn prop_get_returns_innermost_definition(
            present in proptest::collection::vec(any::<bool>(), 1..6),
        ) {
            let levels: Vec<ScopeLevel> = present
                .iter()
                .enumerate()
                .map(|(i, has)| {
                    let vars: &[(&str, i64)] = if *has { &[("x", 0)] } else { &[] };
                    let mut l = level(ScopeRef::Execution(format!("e{i}")), vars);
                    if *has {
                        l.variables.insert("x".into(), VariableValue::Integer(i as i64));
                    }
                    l
                })
                .collect();
            let chain = ScopeChain::from_levels(levels);
            let expected = present.iter().position(|has| *has).map(|i| VariableValue::Integer(i as i64));
            prop_assert_eq!(chain.get("x").cloned(), expected);
        }
    }
}
