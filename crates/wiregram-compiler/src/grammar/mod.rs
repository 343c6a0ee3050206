//! The grammar: an arena of productions rooted at a start production.

pub mod production;


use std::collections::HashMap;

use indexmap::IndexMap;

use wiregram_core::{AttrKind, ProductionId, TokenId};

use crate::analyze::{self, Analysis};
use crate::diagnostics::{DiagnosticMessage, Diagnostics};

pub use production::{
    Ctor, CtorIntType, Production, ProductionKind, UnitDef, UnitField, WhileMode,
};

/// Traversal depth cap guarding pathological reference chains.
pub(crate) const DEREF_CAP: usize = 1000;

/// A collection of productions with one start production.
///
/// The grammar owns every production; `Reference` and `Deferred` point
/// back into the same arena. After [`Grammar::finalize`] the analysis
/// tables are frozen and the grammar is read-only and shareable.
#[derive(Clone, Debug, Default)]
pub struct Grammar {
    name: String,
    productions: Vec<Production>,
    symbols: IndexMap<String, ProductionId>,
    start: Option<ProductionId>,
    literals: Vec<Ctor>,
    literal_index: HashMap<Ctor, TokenId>,
    analysis: Option<Analysis>,
}

impl Grammar {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take ownership of a production. The first production added
    /// becomes the start production.
    pub fn add_production(&mut self, production: Production) -> ProductionId {
        let id = ProductionId(self.productions.len() as u32);
        self.symbols
            .entry(production.symbol.clone())
            .or_insert(id);
        self.productions.push(production);
        if self.start.is_none() {
            self.start = Some(id);
        }
        id
    }

    /// Intern a literal, assigning its look-ahead token. Equal literals
    /// share a token.
    pub fn intern_ctor(&mut self, ctor: &Ctor) -> TokenId {
        if let Some(token) = self.literal_index.get(ctor) {
            return *token;
        }
        let token = TokenId(self.literals.len() as u32);
        self.literals.push(ctor.clone());
        self.literal_index.insert(ctor.clone(), token);
        token
    }

    /// Convenience: intern a ctor and add its literal production.
    pub fn add_ctor(&mut self, symbol: impl Into<String>, ctor: Ctor) -> ProductionId {
        let token = self.intern_ctor(&ctor);
        self.add_production(Production::new(symbol, ProductionKind::Ctor { ctor, token }))
    }

    pub fn start(&self) -> Option<ProductionId> {
        self.start
    }

    pub fn lookup(&self, symbol: &str) -> Option<ProductionId> {
        self.symbols.get(symbol).copied()
    }

    pub fn get(&self, id: ProductionId) -> &Production {
        &self.productions[id.index()]
    }

    pub fn get_mut(&mut self, id: ProductionId) -> &mut Production {
        &mut self.productions[id.index()]
    }

    pub fn len(&self) -> usize {
        self.productions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.productions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProductionId, &Production)> {
        self.productions
            .iter()
            .enumerate()
            .map(|(i, p)| (ProductionId(i as u32), p))
    }

    pub fn literals(&self) -> &[Ctor] {
        &self.literals
    }

    /// Replace a placeholder in place. References to the deferred slot
    /// remain valid and now lead to `target`.
    pub fn resolve(
        &mut self,
        deferred: ProductionId,
        target: ProductionId,
    ) -> Result<(), DiagnosticMessage> {
        if target.index() >= self.productions.len() {
            return Err(DiagnosticMessage::error(format!(
                "cannot resolve {deferred}: target {target} is not owned by this grammar"
            )));
        }
        let symbol = self.get(deferred).symbol.clone();
        match &mut self.get_mut(deferred).kind {
            ProductionKind::Deferred { target: slot } => {
                if slot.is_some() {
                    return Err(
                        DiagnosticMessage::error("deferred production already resolved")
                            .with_symbol(symbol),
                    );
                }
                *slot = Some(target);
                Ok(())
            }
            _ => Err(
                DiagnosticMessage::error("resolve target is not a deferred production")
                    .with_symbol(symbol),
            ),
        }
    }

    /// Follow `Reference` and resolved `Deferred` chains to the
    /// production that actually defines structure.
    pub fn deref(&self, id: ProductionId) -> ProductionId {
        let mut current = id;
        for _ in 0..DEREF_CAP {
            match &self.get(current).kind {
                ProductionKind::Reference { target } => current = *target,
                ProductionKind::Deferred {
                    target: Some(target),
                } => current = *target,
                _ => return current,
            }
        }
        current
    }

    /// Productions reachable from the start, as an arena-indexed mask.
    pub fn reachable(&self) -> Vec<bool> {
        let mut seen = vec![false; self.productions.len()];
        let Some(start) = self.start else {
            return seen;
        };
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut seen[id.index()], true) {
                continue;
            }
            stack.extend(self.get(id).child_ids());
        }
        seen
    }

    /// Run the analyzer and freeze its tables. Idempotent: a finalized
    /// grammar returns immediately with no diagnostics.
    ///
    /// On success the returned diagnostics hold only warnings; on
    /// failure the error list includes every conflict found.
    pub fn finalize(&mut self) -> Result<Diagnostics, Diagnostics> {
        if self.analysis.is_some() {
            return Ok(Diagnostics::new());
        }

        let mut errors = Diagnostics::new();
        if self.productions.is_empty() {
            errors.push(DiagnosticMessage::error("grammar has no productions"));
            return Err(errors);
        }

        for (_, production) in self.iter() {
            if let ProductionKind::Deferred { target: None } = production.kind {
                errors.push(
                    DiagnosticMessage::error("unresolved deferred production")
                        .with_symbol(production.symbol.clone())
                        .with_location(production.location.clone()),
                );
            }
        }
        if errors.has_errors() {
            return Err(errors);
        }

        let outcome = analyze::analyze(self)?;
        for (id, lahs) in outcome.lahs {
            if let ProductionKind::LookAhead { lahs: slot, .. } = &mut self.get_mut(id).kind {
                *slot = Some(lahs);
            }
        }
        self.analysis = Some(outcome.analysis);
        Ok(outcome.warnings)
    }

    pub fn is_finalized(&self) -> bool {
        self.analysis.is_some()
    }

    /// Analysis tables; available after `finalize`.
    pub fn analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }

    /// True iff the production may match empty input. Available after
    /// `finalize`.
    pub fn is_nullable(&self, id: ProductionId) -> bool {
        self.analysis
            .as_ref()
            .is_some_and(|a| a.nullable[id.index()])
    }

    /// True iff matching against a frozen, empty view is acceptable.
    pub fn is_eod_ok(&self, id: ProductionId) -> bool {
        if self.is_nullable(id) {
            return true;
        }
        match &self.get(self.deref(id)).kind {
            ProductionKind::Variable { attrs, .. } => attrs.has(AttrKind::Eod),
            _ => false,
        }
    }
}
