//! Block compilation.
//!
//! A closed block is routed by its kind to a definition (offset table, sine,
//! curve, trial) or a directive. The [`Profile`] collects definitions across
//! every scanned file.

use std::collections::HashMap;

use serde::Serialize;

use ctp_ir::defs::{Definition, DefinitionKind};
use ctp_ir::diag::{Exception, ExceptionList, ResultCode, SourceLocation};

use crate::block::Block;
use crate::field::Payload;
use crate::statement::BlockKinds;

/// A directive found in a profile file.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Include {
        group: String,
        optional: bool,
        location: SourceLocation,
    },
    DryRun(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Compiled {
    Directives(Vec<Directive>),
    Definition(Definition),
}

/// Compile one block. Non-fatal problems are pushed to `diags`; a block
/// that cannot be classified yields `None`.
pub fn compile_block(block: &Block, diags: &mut ExceptionList) -> Option<Compiled> {
    let location = block.location().cloned();
    let at = |e: Exception| match &location {
        Some(loc) => e.or_at(loc),
        None => e,
    };

    if block.kinds.count() != 1 {
        let message = if block.kinds.is_empty() {
            "could not classify block: no field determines its kind".to_string()
        } else {
            format!("ambiguous block: fields of kinds {}", block.kinds)
        };
        push(diags, at(Exception::syntax(message).with_code(ResultCode::AmbiguousBlock)));
        return None;
    }

    if block.kinds == BlockKinds::DIRECTIVE {
        let directives = block
            .fields
            .iter()
            .filter_map(|field| match &field.payload {
                Payload::Include { group, optional } => Some(Directive::Include {
                    group: group.clone(),
                    optional: *optional,
                    location: field.statement.location.clone(),
                }),
                Payload::DryRun(on) => Some(Directive::DryRun(*on)),
                _ => None,
            })
            .collect();
        return Some(Compiled::Directives(directives));
    }

    let kind = definition_kind(block.kinds)?;
    let mut def = Definition::empty(kind);
    if let Some(location) = &location {
        def.set_location(location.clone());
    }

    for field in &block.fields {
        if !field.info().valid_in.contains(block.kinds) {
            push(
                diags,
                Exception::syntax(format!(
                    "'{}' is not valid in a {kind} block",
                    field.info().name
                ))
                .at(field.statement.location.clone()),
            );
            continue;
        }
        if let Err(e) = field.apply(&mut def) {
            push(diags, e);
        }
    }

    if def.name().is_empty() {
        match &mut def {
            Definition::Trial(trial) => {
                trial.name = location
                    .as_ref()
                    .map(|loc| format!("trial@{loc}"))
                    .unwrap_or_else(|| "trial".to_string());
            }
            _ => {
                push(
                    diags,
                    at(Exception::syntax(format!("{kind} definition without a name"))),
                );
                return None;
            }
        }
    }

    tracing::debug!(kind = %kind, name = def.name(), "compiled definition");
    Some(Compiled::Definition(def))
}

fn definition_kind(kinds: BlockKinds) -> Option<DefinitionKind> {
    [
        (BlockKinds::OFFSET, DefinitionKind::Offset),
        (BlockKinds::SINE, DefinitionKind::Sine),
        (BlockKinds::CURVE, DefinitionKind::Curve),
        (BlockKinds::TRIAL, DefinitionKind::Trial),
    ]
    .iter()
    .find(|(bit, _)| kinds == *bit)
    .map(|&(_, kind)| kind)
}

fn push(diags: &mut ExceptionList, e: Exception) {
    e.emit();
    diags.push(e);
}

/// Every definition collected across the scanned files, in scan order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Profile {
    definitions: Vec<Definition>,
    #[serde(skip)]
    by_name: HashMap<(DefinitionKindKey, String), usize>,
    pub dry_run: bool,
}

/// Trials and variation sources live in separate namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DefinitionKindKey {
    Source,
    Trial,
}

impl From<DefinitionKind> for DefinitionKindKey {
    fn from(kind: DefinitionKind) -> Self {
        match kind {
            DefinitionKind::Trial => DefinitionKindKey::Trial,
            _ => DefinitionKindKey::Source,
        }
    }
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition. A second definition with the same name in the
    /// same namespace is rejected.
    pub fn insert(&mut self, def: Definition) -> Result<(), Exception> {
        let key = (DefinitionKindKey::from(def.kind()), def.name().to_string());
        if let Some(&existing) = self.by_name.get(&key) {
            let previous = self.definitions[existing]
                .location()
                .map(|l| format!(" (first defined at {l})"))
                .unwrap_or_default();
            let mut e = Exception::error(format!(
                "duplicate {} '{}'{previous}",
                def.kind(),
                def.name()
            ))
            .with_code(ResultCode::InvalidArgument);
            if let Some(location) = def.location() {
                e = e.at(location.clone());
            }
            return Err(e);
        }
        self.by_name.insert(key, self.definitions.len());
        self.definitions.push(def);
        Ok(())
    }

    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    /// Variation source definitions (offset, sine, curve) in scan order.
    pub fn sources(&self) -> impl Iterator<Item = &Definition> {
        self.definitions
            .iter()
            .filter(|d| d.kind() != DefinitionKind::Trial)
    }

    pub fn trials(&self) -> impl Iterator<Item = &ctp_ir::defs::TrialDef> {
        self.definitions.iter().filter_map(|d| match d {
            Definition::Trial(trial) => Some(trial),
            _ => None,
        })
    }

    pub fn get(&self, kind: DefinitionKind, name: &str) -> Option<&Definition> {
        self.by_name
            .get(&(DefinitionKindKey::from(kind), name.to_string()))
            .map(|&i| &self.definitions[i])
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
