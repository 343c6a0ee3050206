//! Parser synthesis: lowering an analyzed grammar into parsing plans.
//!
//! One plan per reachable unit type, the start unit first. Literal
//! tokens keep the grammar's numbering; terminator literals discovered
//! during synthesis (`&until` arguments) extend the table.

use std::collections::HashMap;

use wiregram_core::{
    AttrKind, AttributeSet, BlockId, Expr, ParseType, PlanId, ProductionId, TokenId, Value,
};
use wiregram_plan::{
    BoundaryKind, BytesAttrs, HookKind, Literal, LiteralValue, LookAheadDefault, LoopKind,
    Module, Plan, RegexDef, RegexId, RegexMode, Step,
};

use crate::analyze;
use crate::diagnostics::{DiagnosticMessage, Diagnostics};
use crate::grammar::{Ctor, Grammar, Production, ProductionKind, UnitDef, WhileMode};

/// Synthesis knobs supplied by the embedding host.
#[derive(Clone, Copy, Debug, Default)]
pub struct SynthOptions {
    /// Emit a `Suspend` step after each top-level field, giving the
    /// driver a chance to trim consumed input between fields.
    pub auto_suspend: bool,
}

pub fn synthesize(grammar: &Grammar) -> Result<Module, Diagnostics> {
    synthesize_with(grammar, SynthOptions::default())
}

pub fn synthesize_with(
    grammar: &Grammar,
    options: SynthOptions,
) -> Result<Module, Diagnostics> {
    let mut diagnostics = Diagnostics::new();
    if !grammar.is_finalized() {
        diagnostics.push(DiagnosticMessage::error(
            "grammar must be finalized before synthesis",
        ));
        return Err(diagnostics);
    }

    let mut synth = Synth {
        grammar,
        options,
        module: Module::default(),
        plan_ids: HashMap::new(),
        regex_ids: HashMap::new(),
        diagnostics,
    };

    synth.build_literal_table();
    let units = synth.collect_units()?;
    for (plan_id, unit_id) in units.iter().enumerate() {
        synth.plan_ids.insert(*unit_id, PlanId(plan_id as u32));
    }
    for unit_id in units {
        let plan = synth.synth_unit(unit_id);
        let id = synth.plan_ids[&unit_id];
        synth.module.entries.insert(plan.name.clone(), id);
        synth.module.plans.push(plan);
    }

    if synth.diagnostics.has_errors() {
        Err(synth.diagnostics)
    } else {
        Ok(synth.module)
    }
}

struct Synth<'g> {
    grammar: &'g Grammar,
    options: SynthOptions,
    module: Module,
    plan_ids: HashMap<ProductionId, PlanId>,
    regex_ids: HashMap<String, RegexId>,
    diagnostics: Diagnostics,
}

/// Blocks of the plan under construction.
struct PlanBuilder {
    blocks: Vec<Vec<Step>>,
    sync_token: Option<TokenId>,
}

impl PlanBuilder {
    fn new() -> Self {
        Self {
            blocks: vec![Vec::new()],
            sync_token: None,
        }
    }

    fn alloc(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Vec::new());
        id
    }

    fn push(&mut self, block: BlockId, step: Step) {
        self.blocks[block.index()].push(step);
    }

    /// A fresh block holding exactly one step.
    fn single(&mut self, step: Step) -> BlockId {
        let block = self.alloc();
        self.push(block, step);
        block
    }
}

impl<'g> Synth<'g> {
    fn build_literal_table(&mut self) {
        let grammar = self.grammar;
        for ctor in grammar.literals() {
            let value = match ctor {
                Ctor::Bytes(b) => LiteralValue::Bytes(b.clone()),
                Ctor::UInt { value, ty } => LiteralValue::UInt {
                    value: *value,
                    ty: ParseType::UInt {
                        bits: ty.bits,
                        order: if ty.big_endian {
                            wiregram_core::ByteOrder::Big
                        } else {
                            wiregram_core::ByteOrder::Little
                        },
                    },
                },
                Ctor::Regex(pattern) => match self.intern_regex(pattern) {
                    Some(id) => LiteralValue::Regex(id),
                    // Diagnostic already recorded; keep the table dense.
                    None => LiteralValue::Bytes(wiregram_core::Bytes::default()),
                },
            };
            self.module.literals.push(Literal {
                value,
                origin: None,
            });
        }
    }

    fn intern_regex(&mut self, pattern: &str) -> Option<RegexId> {
        if let Some(&id) = self.regex_ids.get(pattern) {
            return Some(id);
        }
        if let Err(err) = regex_syntax::Parser::new().parse(pattern) {
            self.diagnostics.push(DiagnosticMessage::error(format!(
                "invalid regular expression /{pattern}/: {err}"
            )));
            return None;
        }
        let id = RegexId(self.module.regexes.len() as u32);
        self.module.regexes.push(RegexDef {
            pattern: pattern.to_string(),
        });
        self.regex_ids.insert(pattern.to_string(), id);
        Some(id)
    }

    /// A literal discovered during synthesis (e.g. an `&until`
    /// terminator) extends the token table past the grammar's literals.
    fn add_literal(&mut self, value: LiteralValue) -> TokenId {
        let token = TokenId(self.module.literals.len() as u32);
        self.module.literals.push(Literal {
            value,
            origin: None,
        });
        token
    }

    /// Reachable canonical unit productions, start unit first.
    fn collect_units(&mut self) -> Result<Vec<ProductionId>, Diagnostics> {
        let start = self
            .grammar
            .start()
            .expect("finalized grammar has a start production");
        let start_unit = self.grammar.deref(start);
        if !matches!(
            self.grammar.get(start_unit).kind,
            ProductionKind::Unit { def: Some(_), .. }
        ) {
            let mut errors = Diagnostics::new();
            errors.push(DiagnosticMessage::error(
                "the start production must be a unit",
            ));
            return Err(errors);
        }

        let reachable = self.grammar.reachable();
        let mut units = vec![start_unit];
        for (id, production) in self.grammar.iter() {
            if id != start_unit
                && reachable[id.index()]
                && matches!(production.kind, ProductionKind::Unit { def: Some(_), .. })
            {
                units.push(id);
            }
        }
        Ok(units)
    }

    fn synth_unit(&mut self, unit_id: ProductionId) -> Plan {
        let grammar = self.grammar;
        let production = grammar.get(unit_id);
        let ProductionKind::Unit {
            name,
            def: Some(def),
            ..
        } = &production.kind
        else {
            unreachable!("collect_units only yields canonical unit productions");
        };

        let mut pb = PlanBuilder::new();
        let root = BlockId(0);

        for (i, hook) in def.hooks.iter().enumerate() {
            if hook.kind == HookKind::UnitBegin {
                pb.push(root, Step::RunHook {
                    hook: wiregram_core::HookId(i as u32),
                });
            }
        }

        for element in &def.body {
            self.emit(&mut pb, def, root, *element);
            if self.options.auto_suspend {
                pb.push(root, Step::Suspend);
            }
        }

        for (i, hook) in def.hooks.iter().enumerate() {
            if hook.kind == HookKind::UnitEnd {
                pb.push(root, Step::RunHook {
                    hook: wiregram_core::HookId(i as u32),
                });
            }
        }

        Plan {
            name: name.clone(),
            params: def.params.clone(),
            root,
            blocks: pb.blocks,
            fields: def.fields.iter().map(|f| f.info.clone()).collect(),
            hooks: def.hooks.clone(),
            sync_token: pb.sync_token,
        }
    }

    /// A fresh block containing the given productions in order.
    fn block_of(
        &mut self,
        pb: &mut PlanBuilder,
        def: &UnitDef,
        elements: &[ProductionId],
    ) -> BlockId {
        let block = pb.alloc();
        for element in elements {
            self.emit(pb, def, block, *element);
        }
        block
    }

    fn emit(&mut self, pb: &mut PlanBuilder, def: &UnitDef, block: BlockId, id: ProductionId) {
        let grammar = self.grammar;
        let id = grammar.deref(id);
        let production = grammar.get(id);

        match &production.kind {
            ProductionKind::Epsilon => {}

            ProductionKind::Ctor { ctor, token } => {
                // A regex ctor whose pattern failed to compile already
                // produced a diagnostic; fall back to the literal so
                // synthesis can keep collecting errors.
                let step = match ctor {
                    Ctor::Regex(pattern) => match self.regex_ids.get(pattern.as_str()) {
                        Some(&regex) => Step::MatchRegex {
                            regex,
                            mode: RegexMode::Exact,
                        },
                        None => Step::MatchLiteral { token: *token },
                    },
                    _ => Step::MatchLiteral { token: *token },
                };
                pb.push(block, step);
                self.emit_assign(pb, def, block, production);
            }

            ProductionKind::TypeLiteral { ty } => {
                pb.push(block, Step::MatchType {
                    ty: ty.clone(),
                    bytes: BytesAttrs::default(),
                });
                self.emit_assign(pb, def, block, production);
            }

            ProductionKind::Variable { ty, attrs } => {
                let bytes = self.bytes_attrs(def, production, attrs);
                pb.push(block, Step::MatchType {
                    ty: ty.clone(),
                    bytes,
                });
                self.emit_assign(pb, def, block, production);
            }

            ProductionKind::Sequence { elements } => {
                for element in elements.clone() {
                    self.emit(pb, def, block, element);
                }
            }

            ProductionKind::Block {
                body,
                condition,
                else_body,
                attrs,
            } => {
                self.emit_block(pb, def, block, id, body, condition, else_body, attrs);
            }

            ProductionKind::LookAhead {
                alt1,
                alt2,
                default,
                condition,
                lahs,
            } => {
                let (set_a, set_b) = lahs
                    .as_ref()
                    .map(|(a, b)| {
                        (a.iter().copied().collect(), b.iter().copied().collect())
                    })
                    .unwrap_or_default();
                // A nullable alternative needs no literal, so it is the
                // fallback when neither look-ahead set matches. The
                // analyzer rejects grammars where both are nullable.
                let mut default = *default;
                if default == LookAheadDefault::None {
                    if grammar.is_nullable(*alt1) {
                        default = LookAheadDefault::First;
                    } else if grammar.is_nullable(*alt2) {
                        default = LookAheadDefault::Second;
                    }
                }
                let block_a = self.block_of(pb, def, &[*alt1]);
                let block_b = self.block_of(pb, def, &[*alt2]);
                let step = Step::TryLookAhead {
                    set_a,
                    set_b,
                    default,
                    block_a,
                    block_b,
                };
                match condition {
                    Some(cond) => {
                        let then_block = pb.single(step);
                        pb.push(block, Step::IfCond {
                            cond: cond.clone(),
                            then_block,
                            else_block: None,
                        });
                    }
                    None => pb.push(block, step),
                }
            }

            ProductionKind::Switch {
                scrutinee,
                cases,
                default,
                ..
            } => {
                let cases: Vec<(Expr, BlockId)> = cases
                    .clone()
                    .into_iter()
                    .map(|(value, target)| (value, self.block_of(pb, def, &[target])))
                    .collect();
                let default = default.map(|target| self.block_of(pb, def, &[target]));
                pb.push(block, Step::Switch {
                    scrutinee: scrutinee.clone(),
                    cases,
                    default,
                });
                self.emit_assign(pb, def, block, production);
            }

            ProductionKind::Counter { count, body } => {
                self.emit_loop(pb, def, block, production, LoopKind::Counter(count.clone()), *body);
            }

            ProductionKind::While { mode, body } => {
                let kind = match mode {
                    WhileMode::Cond(e) => LoopKind::WhileExpr(e.clone()),
                    WhileMode::Until(e) => LoopKind::Until(e.clone()),
                    WhileMode::Eod => LoopKind::Eod,
                    WhileMode::LookAhead => {
                        let first = analyze::body_first(self.grammar, *body);
                        if first.is_empty() {
                            self.diagnostics.push(
                                DiagnosticMessage::error(
                                    "look-ahead loop body has no look-ahead tokens",
                                )
                                .with_symbol(production.symbol.clone())
                                .with_location(production.location.clone()),
                            );
                        }
                        LoopKind::WhileLookAhead(first)
                    }
                };
                self.emit_loop(pb, def, block, production, kind, *body);
            }

            ProductionKind::ForEach { container, body } => {
                self.emit_loop(pb, def, block, production, LoopKind::ForEach(container.clone()), *body);
            }

            ProductionKind::Skip { inner } => {
                let body = self.block_of(pb, def, &[*inner]);
                pb.push(block, Step::Skip { body });
            }

            ProductionKind::Enclosure { inner, begin, end } => {
                if let Some(hook) = begin {
                    pb.push(block, Step::RunHook { hook: *hook });
                }
                self.emit(pb, def, block, *inner);
                if let Some(hook) = end {
                    pb.push(block, Step::RunHook { hook: *hook });
                }
            }

            ProductionKind::Unit {
                name,
                args,
                target,
                def: unit_def,
            } => {
                let canonical = match unit_def {
                    Some(_) => id,
                    None => self.grammar.deref(target.expect("embed has a target")),
                };
                match self.plan_ids.get(&canonical) {
                    Some(&plan) => {
                        pb.push(block, Step::Call {
                            plan,
                            args: args.clone(),
                        });
                        self.emit_assign(pb, def, block, production);
                    }
                    None => self.diagnostics.push(
                        DiagnosticMessage::error(format!(
                            "embedded unit `{name}` has no synthesized plan"
                        ))
                        .with_symbol(production.symbol.clone()),
                    ),
                }
            }

            ProductionKind::Reference { .. } | ProductionKind::Deferred { .. } => {
                unreachable!("deref resolves forwarding productions");
            }
        }
    }

    /// Store the current value when the production carries a field
    /// marker and the field is not transient.
    fn emit_assign(
        &mut self,
        pb: &mut PlanBuilder,
        def: &UnitDef,
        block: BlockId,
        production: &Production,
    ) {
        let Some(field) = production.field else {
            return;
        };
        let meta = &def.fields[field.index()];
        if meta.info.transient {
            return;
        }
        pb.push(block, Step::AssignField {
            field,
            source: None,
            convert: meta.convert.clone(),
            requires: meta.requires.clone(),
        });
    }

    fn emit_loop(
        &mut self,
        pb: &mut PlanBuilder,
        def: &UnitDef,
        block: BlockId,
        production: &Production,
        kind: LoopKind,
        body: ProductionId,
    ) {
        let collect = production
            .field
            .is_some_and(|f| !def.fields[f.index()].info.transient);
        let body = self.block_of(pb, def, &[body]);
        pb.push(block, Step::Loop {
            kind,
            body,
            collect,
        });
        self.emit_assign(pb, def, block, production);
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_block(
        &mut self,
        pb: &mut PlanBuilder,
        def: &UnitDef,
        block: BlockId,
        id: ProductionId,
        body: &[ProductionId],
        condition: &Option<Expr>,
        else_body: &[ProductionId],
        attrs: &AttributeSet,
    ) {
        let has_boundary = [
            AttrKind::Size,
            AttrKind::MaxSize,
            AttrKind::ParseAt,
            AttrKind::ParseFrom,
        ]
        .iter()
        .any(|k| attrs.expr(*k).is_some());
        let has_sync = attrs.has(AttrKind::Synchronize);

        if condition.is_none() && !has_boundary && !has_sync {
            for element in body.to_vec() {
                self.emit(pb, def, block, element);
            }
            return;
        }

        let body = body.to_vec();
        let else_body = else_body.to_vec();

        let mut step = match condition {
            Some(cond) => {
                let then_block = self.block_of(pb, def, &body);
                let else_block = if else_body.is_empty() {
                    None
                } else {
                    Some(self.block_of(pb, def, &else_body))
                };
                Step::IfCond {
                    cond: cond.clone(),
                    then_block,
                    else_block,
                }
            }
            None => {
                let inner = self.block_of(pb, def, &body);
                // Placeholder so the wrapping loop below has one step
                // to wrap; replaced immediately by the first boundary.
                Step::Skip { body: inner }
            }
        };
        let mut wrapped = condition.is_some();

        for (attr, kind) in [
            (AttrKind::Size, BoundaryKind::Size),
            (AttrKind::MaxSize, BoundaryKind::MaxSize),
            (AttrKind::ParseAt, BoundaryKind::ParseAt),
            (AttrKind::ParseFrom, BoundaryKind::ParseFrom),
        ] {
            let Some(arg) = attrs.expr(attr) else {
                continue;
            };
            let inner = if wrapped {
                pb.single(step)
            } else {
                // Reuse the bare body block of the placeholder.
                match step {
                    Step::Skip { body } => body,
                    _ => unreachable!(),
                }
            };
            step = Step::SetBoundary {
                kind,
                arg: arg.clone(),
                body: inner,
            };
            wrapped = true;
        }

        if has_sync {
            let token = self.sync_token_for(id);
            let inner = if wrapped {
                pb.single(step)
            } else {
                match step {
                    Step::Skip { body } => body,
                    _ => unreachable!(),
                }
            };
            if let Some(token) = token {
                pb.sync_token.get_or_insert(token);
            }
            step = Step::Synchronize { body: inner, token };
            wrapped = true;
        }

        debug_assert!(wrapped);
        pb.push(block, step);
    }

    /// The literal that re-anchors a `&synchronize` region: the
    /// smallest token in the region's FIRST set. Regions that do not
    /// start with a literal resynchronize byte by byte instead.
    fn sync_token_for(&self, id: ProductionId) -> Option<TokenId> {
        let analysis = self.grammar.analysis().expect("grammar is finalized");
        analysis.first[id.index()].iter().next().copied()
    }

    fn bytes_attrs(
        &mut self,
        def: &UnitDef,
        production: &Production,
        attrs: &AttributeSet,
    ) -> BytesAttrs {
        let mut bytes = BytesAttrs {
            size: attrs.expr(AttrKind::Size).cloned(),
            until: None,
            until_including: attrs.has(AttrKind::UntilIncluding),
            eod: attrs.has(AttrKind::Eod),
            chunked: None,
        };

        let until = attrs
            .expr(AttrKind::Until)
            .or_else(|| attrs.expr(AttrKind::UntilIncluding));
        if let Some(expr) = until {
            match expr.as_const() {
                Some(Value::Bytes(b)) => {
                    bytes.until = Some(self.add_literal(LiteralValue::Bytes(b.clone())));
                }
                _ => self.diagnostics.push(
                    DiagnosticMessage::error(
                        "`&until` on a bytes field requires a constant byte literal",
                    )
                    .with_symbol(production.symbol.clone())
                    .with_location(production.location.clone()),
                ),
            }
        }

        if attrs.has(AttrKind::Chunked) {
            bytes.chunked = production.field.and_then(|fid| {
                def.hooks.iter().enumerate().find_map(|(i, hook)| {
                    (hook.kind == HookKind::Chunked && hook.field == Some(fid))
                        .then_some(wiregram_core::HookId(i as u32))
                })
            });
        }

        bytes
    }
}
