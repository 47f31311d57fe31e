//! Stage registry: named stages, their dependencies and the validated
//! linear execution order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bankforge_types::state::StageName;

use crate::error::RegistryError;
use crate::generator::{EntityGenerator, ReferenceNeed};

/// A registered stage.
#[derive(Clone)]
pub struct StageDef {
    pub name: StageName,
    pub deps: Vec<StageName>,
    pub generator: Arc<dyn EntityGenerator>,
}

impl std::fmt::Debug for StageDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDef")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// Collects stage registrations and validates them into a [`StageRegistry`].
#[derive(Default)]
pub struct StageRegistryBuilder {
    stages: Vec<StageDef>,
}

impl StageRegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` depending on `deps`.
    #[must_use]
    pub fn register(
        mut self,
        name: &str,
        deps: &[&str],
        generator: impl EntityGenerator + 'static,
    ) -> Self {
        self.stages.push(StageDef {
            name: StageName::new(name),
            deps: deps.iter().map(|d| StageName::new(*d)).collect(),
            generator: Arc::new(generator),
        });
        self
    }

    /// Validate registrations and fix the execution order.
    ///
    /// Among stages whose dependencies are satisfied, the one registered
    /// first runs first, so registering in a valid order keeps that order.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistryError`] found: bad or duplicate names,
    /// unknown dependencies, references to undeclared stages, more than one
    /// driving window, a scoped reference without a window, or a dependency
    /// cycle.
    pub fn build(self) -> Result<StageRegistry, RegistryError> {
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !stage.name.is_identifier() {
                return Err(RegistryError::InvalidStageName(stage.name.clone()));
            }
            if !seen.insert(stage.name.clone()) {
                return Err(RegistryError::DuplicateStage(stage.name.clone()));
            }
        }

        for stage in &self.stages {
            for dep in &stage.deps {
                if !seen.contains(dep) {
                    return Err(RegistryError::UnknownDependency {
                        stage: stage.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            let needs = stage.generator.references();
            for need in &needs {
                if !stage.deps.contains(need.stage()) {
                    return Err(RegistryError::UndeclaredReference {
                        stage: stage.name.clone(),
                        reference: need.stage().clone(),
                    });
                }
            }
            let windows = needs
                .iter()
                .filter(|n| matches!(n, ReferenceNeed::Window(_)))
                .count();
            if windows > 1 {
                return Err(RegistryError::MultipleWindows(stage.name.clone()));
            }
            if windows == 0 {
                if let Some(scoped) = needs
                    .iter()
                    .find(|n| matches!(n, ReferenceNeed::Scoped { .. }))
                {
                    return Err(RegistryError::ScopedWithoutWindow {
                        stage: stage.name.clone(),
                        reference: scoped.stage().clone(),
                    });
                }
            }
        }

        let order = topological_order(&self.stages)?;
        let mut slots: Vec<Option<StageDef>> = self.stages.into_iter().map(Some).collect();
        let stages: Vec<StageDef> = order.iter().filter_map(|&i| slots[i].take()).collect();
        let positions = stages
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
        Ok(StageRegistry { stages, positions })
    }
}

/// Kahn's algorithm, always releasing the earliest-registered ready stage.
fn topological_order(stages: &[StageDef]) -> Result<Vec<usize>, RegistryError> {
    let index: HashMap<&StageName, usize> =
        stages.iter().enumerate().map(|(i, s)| (&s.name, i)).collect();
    let mut pending: Vec<usize> = stages.iter().map(|s| s.deps.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); stages.len()];
    for (i, stage) in stages.iter().enumerate() {
        for dep in &stage.deps {
            if let Some(&d) = index.get(dep) {
                dependents[d].push(i);
            }
        }
    }

    let mut done = vec![false; stages.len()];
    let mut order = Vec::with_capacity(stages.len());
    while order.len() < stages.len() {
        let Some(next) = (0..stages.len()).find(|&i| !done[i] && pending[i] == 0) else {
            let stuck = (0..stages.len())
                .filter(|&i| !done[i])
                .map(|i| stages[i].name.clone())
                .collect();
            return Err(RegistryError::CyclicDependency(stuck));
        };
        done[next] = true;
        order.push(next);
        for &d in &dependents[next] {
            pending[d] -= 1;
        }
    }
    Ok(order)
}

/// Validated stages in execution order. Every stage's dependencies appear
/// strictly before it.
#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: Vec<StageDef>,
    positions: HashMap<StageName, usize>,
}

impl StageRegistry {
    #[must_use]
    pub fn stages(&self) -> &[StageDef] {
        &self.stages
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn order(&self) -> Vec<StageName> {
        self.stages.iter().map(|s| s.name.clone()).collect()
    }

    #[must_use]
    pub fn get(&self, name: &StageName) -> Option<&StageDef> {
        self.position(name).map(|i| &self.stages[i])
    }

    #[must_use]
    pub fn position(&self, name: &StageName) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Look up a stage, failing with [`RegistryError::UnknownStage`].
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not registered.
    pub fn require(&self, name: &StageName) -> Result<&StageDef, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::UnknownStage(name.clone()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
