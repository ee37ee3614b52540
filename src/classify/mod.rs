//! Reactivity classifier - deciding which bindings become signals.
//!
//! A compiler front end summarizes each component function as its
//! bindings, the names its template reads, and the writes it performs.
//! Classification decides, per binding, what the generated code lowers
//! it to:
//!
//! - `Reactive`: a mutable binding observed by the template (directly or
//!   through a derived chain) becomes a signal.
//! - `Derived`: an immutable binding whose initializer reads at least one
//!   reactive or derived binding becomes a derived computation.
//! - `Inert`: everything else stays a plain value.
//!
//! Destructured bindings never become reactive: reactivity does not
//! propagate through destructuring, so they classify `Inert` and act as
//! a wall in dependency chains.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

// =============================================================================
// Input Summary
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Mutable declaration; may be reassigned.
    Let,
    /// Immutable declaration with an initializer expression.
    Const,
}

/// One top-level binding of a component function.
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub kind: BindingKind,
    /// Introduced by a destructuring pattern.
    pub destructured: bool,
    /// Binding names the initializer expression reads.
    pub init_reads: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteKind {
    /// `name = value`
    Reassign,
    /// `name.method(..)` where the method mutates in place.
    MutatingCall { method: String },
}

/// One write the component performs on a binding.
#[derive(Debug, Clone)]
pub struct Write {
    pub target: String,
    pub kind: WriteKind,
}

/// Summary of a component function, as a front end reports it.
#[derive(Debug, Clone, Default)]
pub struct ComponentFn {
    pub bindings: Vec<Binding>,
    /// Binding names the template expression reads.
    pub template_reads: Vec<String>,
    pub writes: Vec<Write>,
}

impl ComponentFn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn let_binding(mut self, name: &str, init_reads: &[&str]) -> Self {
        self.bindings.push(Binding {
            name: name.into(),
            kind: BindingKind::Let,
            destructured: false,
            init_reads: init_reads.iter().map(|&read| read.into()).collect(),
        });
        self
    }

    pub fn const_binding(mut self, name: &str, init_reads: &[&str]) -> Self {
        self.bindings.push(Binding {
            name: name.into(),
            kind: BindingKind::Const,
            destructured: false,
            init_reads: init_reads.iter().map(|&read| read.into()).collect(),
        });
        self
    }

    pub fn destructured_let(mut self, name: &str, init_reads: &[&str]) -> Self {
        self.bindings.push(Binding {
            name: name.into(),
            kind: BindingKind::Let,
            destructured: true,
            init_reads: init_reads.iter().map(|&read| read.into()).collect(),
        });
        self
    }

    pub fn template_read(mut self, name: &str) -> Self {
        self.template_reads.push(name.into());
        self
    }

    pub fn reassign(mut self, target: &str) -> Self {
        self.writes.push(Write {
            target: target.into(),
            kind: WriteKind::Reassign,
        });
        self
    }

    pub fn mutating_call(mut self, target: &str, method: &str) -> Self {
        self.writes.push(Write {
            target: target.into(),
            kind: WriteKind::MutatingCall {
                method: method.into(),
            },
        });
        self
    }
}

// =============================================================================
// Output
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Reactive,
    Derived,
    Inert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedBinding {
    pub name: String,
    pub classification: Classification,
    /// For `Derived`: the reactive or derived bindings it reads.
    pub deps: Vec<String>,
}

/// A reactive binding was mutated in place. In-place mutation bypasses
/// the signal write path, so the template would never re-render.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("binding `{binding}` is reactive but mutated in place via `.{method}(..)`; reassign it instead")]
pub struct ClassificationDiagnostic {
    pub binding: String,
    pub method: String,
}

#[derive(Debug, Clone)]
pub struct ClassifierOutput {
    /// One entry per input binding, in declaration order.
    pub bindings: Vec<ClassifiedBinding>,
    pub diagnostics: Vec<ClassificationDiagnostic>,
}

impl ClassifierOutput {
    pub fn classification_of(&self, name: &str) -> Option<Classification> {
        self.bindings
            .iter()
            .find(|binding| binding.name == name)
            .map(|binding| binding.classification)
    }
}

// =============================================================================
// Classifier
// =============================================================================

/// Names observed by the template, directly or through initializer
/// chains: a fixed point over "the template reads X" and "an observed
/// binding's initializer reads X".
fn observed_set(component: &ComponentFn, by_name: &HashMap<&str, &Binding>) -> HashSet<String> {
    let mut observed: HashSet<String> = component
        .template_reads
        .iter()
        .filter(|name| by_name.contains_key(name.as_str()))
        .cloned()
        .collect();

    let mut worklist: Vec<String> = observed.iter().cloned().collect();
    while let Some(name) = worklist.pop() {
        let Some(binding) = by_name.get(name.as_str()) else {
            continue;
        };
        // Destructuring is a wall: what its initializer reads is not
        // observed through it.
        if binding.destructured {
            continue;
        }
        for read in &binding.init_reads {
            if by_name.contains_key(read.as_str()) && observed.insert(read.clone()) {
                worklist.push(read.clone());
            }
        }
    }
    observed
}

/// Does `name`'s initializer chain reach a reactive source? Memoized
/// depth-first search; cycles resolve to false.
fn reaches_reactive(
    name: &str,
    by_name: &HashMap<&str, &Binding>,
    reactive: &HashSet<String>,
    memo: &mut HashMap<String, bool>,
    visiting: &mut HashSet<String>,
) -> bool {
    if let Some(&known) = memo.get(name) {
        return known;
    }
    if !visiting.insert(name.to_string()) {
        return false;
    }
    let result = by_name.get(name).is_some_and(|binding| {
        !binding.destructured
            && binding.init_reads.iter().any(|read| {
                reactive.contains(read)
                    || reaches_reactive(read, by_name, reactive, memo, visiting)
            })
    });
    visiting.remove(name);
    memo.insert(name.to_string(), result);
    result
}

/// Classify every binding of `component`.
pub fn classify(component: &ComponentFn) -> ClassifierOutput {
    let by_name: HashMap<&str, &Binding> = component
        .bindings
        .iter()
        .map(|binding| (binding.name.as_str(), binding))
        .collect();

    let observed = observed_set(component, &by_name);

    // Reactive sources: observed, mutable, not destructured.
    let reactive: HashSet<String> = component
        .bindings
        .iter()
        .filter(|binding| {
            binding.kind == BindingKind::Let
                && !binding.destructured
                && observed.contains(&binding.name)
        })
        .map(|binding| binding.name.clone())
        .collect();

    let mut memo: HashMap<String, bool> = HashMap::new();
    let mut bindings = Vec::with_capacity(component.bindings.len());
    for binding in &component.bindings {
        let classification = if binding.destructured {
            Classification::Inert
        } else {
            match binding.kind {
                BindingKind::Let if reactive.contains(&binding.name) => Classification::Reactive,
                BindingKind::Let => Classification::Inert,
                BindingKind::Const => {
                    let mut visiting = HashSet::new();
                    let sourced = observed.contains(&binding.name)
                        && reaches_reactive(
                            &binding.name,
                            &by_name,
                            &reactive,
                            &mut memo,
                            &mut visiting,
                        );
                    if sourced {
                        Classification::Derived
                    } else {
                        Classification::Inert
                    }
                }
            }
        };
        bindings.push(ClassifiedBinding {
            name: binding.name.clone(),
            classification,
            deps: Vec::new(),
        });
    }

    // Derived deps: the reactive or derived bindings the initializer
    // reads directly.
    let classified: HashMap<String, Classification> = bindings
        .iter()
        .map(|binding| (binding.name.clone(), binding.classification))
        .collect();
    for (entry, binding) in bindings.iter_mut().zip(&component.bindings) {
        if entry.classification == Classification::Derived {
            entry.deps = binding
                .init_reads
                .iter()
                .filter(|read| {
                    matches!(
                        classified.get(read.as_str()),
                        Some(Classification::Reactive | Classification::Derived)
                    )
                })
                .cloned()
                .collect();
        }
    }

    let diagnostics = component
        .writes
        .iter()
        .filter_map(|write| match &write.kind {
            WriteKind::MutatingCall { method }
                if classified.get(write.target.as_str()) == Some(&Classification::Reactive) =>
            {
                Some(ClassificationDiagnostic {
                    binding: write.target.clone(),
                    method: method.clone(),
                })
            }
            _ => None,
        })
        .collect();

    ClassifierOutput {
        bindings,
        diagnostics,
    }
}

// =============================================================================
// Tests
// =============================================================================
