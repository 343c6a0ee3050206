//! Lowers resolved unit descriptions into a grammar.
//!
//! Wrapping order for a field, outside in: guard block, `Skip` for
//! `&transient`, `Enclosure` for hooks, boundary block for
//! `&size`/`&max-size`/`&parse-at`/`&parse-from`/`&synchronize`, then
//! the repeat wrapper around the core item. The value-producing
//! production (core item, or the repeat wrapper for containers)
//! carries the field marker.

use std::collections::HashMap;

use wiregram_core::{
    Attribute, AttrKind, AttributeSet, FieldId, HookId, Location, ParseType, ProductionId,
};
use wiregram_plan::{FieldInfo, HookInfo, HookKind};

use crate::diagnostics::{DiagnosticMessage, Diagnostics};
use crate::grammar::{
    Grammar, Production, ProductionKind, UnitDef, UnitField, WhileMode,
};
use crate::unit::{FieldDescription, FieldItem, RepeatSpec, UnitDescription};

/// Attributes that force a boundary block around the field.
const BOUNDARY_ATTRS: [AttrKind; 5] = [
    AttrKind::Size,
    AttrKind::MaxSize,
    AttrKind::ParseAt,
    AttrKind::ParseFrom,
    AttrKind::Synchronize,
];

/// Build a grammar from unit descriptions. The first description is the
/// start unit.
pub fn build_grammar(units: &[UnitDescription]) -> Result<Grammar, Diagnostics> {
    let mut diagnostics = Diagnostics::new();
    if units.is_empty() {
        diagnostics.push(DiagnosticMessage::error(
            "cannot build a grammar from an empty set of units",
        ));
        return Err(diagnostics);
    }

    let mut builder = Builder {
        grammar: Grammar::new(units[0].name.clone()),
        diagnostics,
        unit_ids: HashMap::new(),
        pending: Vec::new(),
    };

    // The start slot is added first and resolved once the start unit
    // exists, so recursive grammars can reference it from anywhere.
    let root = builder.grammar.add_production(Production::new(
        format!("%start:{}", units[0].name),
        ProductionKind::Deferred { target: None },
    ));

    for unit in units {
        let id = builder.build_unit(unit);
        if builder.unit_ids.insert(unit.name.clone(), id).is_some() {
            builder.diagnostics.push(
                DiagnosticMessage::error(format!("duplicate unit type `{}`", unit.name))
                    .with_location(unit.location.clone()),
            );
        }
    }

    builder.link_pending();
    let start_unit = builder.unit_ids[&units[0].name];
    if let Err(msg) = builder.grammar.resolve(root, start_unit) {
        builder.diagnostics.push(msg);
    }

    if builder.diagnostics.has_errors() {
        Err(builder.diagnostics)
    } else {
        Ok(builder.grammar)
    }
}

struct Builder {
    grammar: Grammar,
    diagnostics: Diagnostics,
    unit_ids: HashMap<String, ProductionId>,
    /// Deferred slots waiting for a unit type to be built.
    pending: Vec<(ProductionId, String, Option<Location>)>,
}

/// Per-unit state while lowering its fields.
struct UnitCtx {
    unit_name: String,
    fields: Vec<UnitField>,
    hooks: Vec<HookInfo>,
    anon_count: usize,
}

impl Builder {
    fn build_unit(&mut self, unit: &UnitDescription) -> ProductionId {
        let mut ctx = UnitCtx {
            unit_name: unit.name.clone(),
            fields: Vec::new(),
            hooks: Vec::new(),
            anon_count: 0,
        };

        for hook in &unit.hooks {
            ctx.hooks.push(HookInfo {
                name: hook.name.clone(),
                kind: hook.kind,
                field: None,
            });
        }

        let body: Vec<ProductionId> = unit
            .fields
            .iter()
            .map(|field| self.build_field(field, &mut ctx))
            .collect();

        self.grammar.add_production(
            Production::new(
                unit.name.clone(),
                ProductionKind::Unit {
                    name: unit.name.clone(),
                    args: Vec::new(),
                    target: None,
                    def: Some(UnitDef {
                        params: unit.params.clone(),
                        body,
                        fields: ctx.fields,
                        hooks: ctx.hooks,
                        attrs: unit.attributes.clone(),
                    }),
                },
            )
            .with_location(unit.location.clone()),
        )
    }

    fn link_pending(&mut self) {
        for (deferred, name, location) in std::mem::take(&mut self.pending) {
            match self.unit_ids.get(&name) {
                Some(&target) => {
                    if let Err(msg) = self.grammar.resolve(deferred, target) {
                        self.diagnostics.push(msg);
                    }
                }
                None => self.diagnostics.push(
                    DiagnosticMessage::error(format!("unknown unit type `{name}`"))
                        .with_location(location),
                ),
            }
        }
    }

    fn build_field(&mut self, field: &FieldDescription, ctx: &mut UnitCtx) -> ProductionId {
        let attrs = &field.attributes;

        // Field slot allocation: named fields and `&anonymous` ones get
        // storage metadata; bare separators do not.
        let field_id = if field.name.is_some() || attrs.has(AttrKind::Anonymous) {
            let name = match &field.name {
                Some(name) => name.clone(),
                None => {
                    ctx.anon_count += 1;
                    format!("_anon{}", ctx.anon_count)
                }
            };
            let id = FieldId(ctx.fields.len() as u16);
            ctx.fields.push(UnitField {
                info: FieldInfo {
                    name,
                    transient: attrs.has(AttrKind::Transient),
                    anonymous: attrs.has(AttrKind::Anonymous),
                    default: attrs.expr(AttrKind::Default).cloned(),
                    location: field.location.clone(),
                },
                convert: attrs.expr(AttrKind::Convert).cloned(),
                requires: attrs.expr(AttrKind::Requires).cloned(),
            });
            Some(id)
        } else {
            None
        };

        let mut hook_begin: Option<HookId> = None;
        let mut hook_end: Option<HookId> = None;
        for hook in &field.hooks {
            let id = HookId(ctx.hooks.len() as u32);
            ctx.hooks.push(HookInfo {
                name: hook.name.clone(),
                kind: hook.kind,
                field: field_id,
            });
            match hook.kind {
                HookKind::FieldBegin => hook_begin = Some(id),
                HookKind::FieldEnd => hook_end = Some(id),
                _ => {}
            }
        }

        let symbol = self.field_symbol(field, ctx);
        let mut core = self.build_item(field, &symbol, ctx);

        // `&synchronize` on a repeated field re-anchors at element
        // granularity, so the sync region sits inside the loop.
        if field.repeat.is_some() && attrs.has(AttrKind::Synchronize) {
            core = self.grammar.add_production(
                Production::new(
                    format!("{symbol}~"),
                    ProductionKind::Block {
                        body: vec![core],
                        condition: None,
                        else_body: Vec::new(),
                        attrs: [Attribute::new(AttrKind::Synchronize)]
                            .into_iter()
                            .collect(),
                    },
                )
                .with_location(field.location.clone()),
            );
        }

        // Repeat wrapper for container fields.
        let mut current = match &field.repeat {
            None => core,
            Some(repeat) => {
                let kind = match repeat {
                    RepeatSpec::Count(e) => ProductionKind::Counter {
                        count: e.clone(),
                        body: core,
                    },
                    RepeatSpec::While(e) => ProductionKind::While {
                        mode: WhileMode::Cond(e.clone()),
                        body: core,
                    },
                    RepeatSpec::Until(e) | RepeatSpec::UntilIncluding(e) => {
                        ProductionKind::While {
                            mode: WhileMode::Until(e.clone()),
                            body: core,
                        }
                    }
                    RepeatSpec::Eod => ProductionKind::While {
                        mode: WhileMode::Eod,
                        body: core,
                    },
                    RepeatSpec::LookAhead => ProductionKind::While {
                        mode: WhileMode::LookAhead,
                        body: core,
                    },
                };
                self.grammar.add_production(
                    Production::new(format!("{symbol}[]"), kind)
                        .with_location(field.location.clone()),
                )
            }
        };

        // Mark the value producer.
        if let Some(id) = field_id {
            self.grammar.get_mut(current).field = Some(id);
        }

        // Boundary attributes wrap outside the repeat so `&size` bounds
        // the whole container. Plain bytes fields keep size/until/eod
        // inside their own attributes instead.
        let boundary: AttributeSet = attrs
            .iter()
            .filter(|a| BOUNDARY_ATTRS.contains(&a.kind) && !attr_stays_inline(field, a))
            .filter(|a| !(a.kind == AttrKind::Synchronize && field.repeat.is_some()))
            .cloned()
            .collect();
        if !boundary.is_empty() {
            current = self.grammar.add_production(
                Production::new(
                    format!("{symbol}&"),
                    ProductionKind::Block {
                        body: vec![current],
                        condition: None,
                        else_body: Vec::new(),
                        attrs: boundary,
                    },
                )
                .with_location(field.location.clone()),
            );
        }

        if hook_begin.is_some() || hook_end.is_some() {
            current = self.grammar.add_production(Production::new(
                format!("{symbol}%"),
                ProductionKind::Enclosure {
                    inner: current,
                    begin: hook_begin,
                    end: hook_end,
                },
            ));
        }

        if attrs.has(AttrKind::Transient) {
            current = self.grammar.add_production(Production::new(
                format!("{symbol}!"),
                ProductionKind::Skip { inner: current },
            ));
        }

        if let Some(guard) = &field.guard {
            current = self.grammar.add_production(
                Production::new(
                    format!("{symbol}?"),
                    ProductionKind::Block {
                        body: vec![current],
                        condition: Some(guard.clone()),
                        else_body: Vec::new(),
                        attrs: AttributeSet::new(),
                    },
                )
                .with_location(field.location.clone()),
            );
        }

        current
    }

    fn field_symbol(&self, field: &FieldDescription, ctx: &UnitCtx) -> String {
        match &field.name {
            Some(name) => format!("{}::{name}", ctx.unit_name),
            None => format!("{}::<anon>", ctx.unit_name),
        }
    }

    fn build_item(
        &mut self,
        field: &FieldDescription,
        symbol: &str,
        ctx: &mut UnitCtx,
    ) -> ProductionId {
        match &field.item {
            FieldItem::Ctor(ctor) => self.grammar.add_ctor(symbol.to_string(), ctor.clone()),
            FieldItem::Type(ty) => {
                // Boundary attributes that get a wrapping block are not
                // repeated on the variable itself.
                let attrs: AttributeSet = field
                    .attributes
                    .iter()
                    .filter(|a| {
                        !BOUNDARY_ATTRS.contains(&a.kind) || attr_stays_inline(field, a)
                    })
                    .cloned()
                    .collect();
                self.grammar.add_production(
                    Production::new(
                        symbol.to_string(),
                        ProductionKind::Variable {
                            ty: ty.clone(),
                            attrs,
                        },
                    )
                    .with_location(field.location.clone()),
                )
            }
            FieldItem::Unit { name, args } => {
                let target = self.unit_target(name, field.location.clone());
                self.grammar.add_production(
                    Production::new(
                        symbol.to_string(),
                        ProductionKind::Unit {
                            name: name.clone(),
                            args: args.clone(),
                            target: Some(target),
                            def: None,
                        },
                    )
                    .with_location(field.location.clone()),
                )
            }
            FieldItem::Switch {
                scrutinee,
                cases,
                default,
            } => {
                let cases: Vec<_> = cases
                    .iter()
                    .map(|(value, fields)| {
                        (value.clone(), self.sequence_of(fields, symbol, ctx))
                    })
                    .collect();
                let default = default
                    .as_ref()
                    .map(|fields| self.sequence_of(fields, symbol, ctx));
                self.grammar.add_production(
                    Production::new(
                        symbol.to_string(),
                        ProductionKind::Switch {
                            scrutinee: scrutinee.clone(),
                            cases,
                            default,
                            attrs: AttributeSet::new(),
                        },
                    )
                    .with_location(field.location.clone()),
                )
            }
            FieldItem::Block {
                fields,
                else_fields,
            } => {
                let body: Vec<_> = fields.iter().map(|f| self.build_field(f, ctx)).collect();
                let else_body: Vec<_> = else_fields
                    .iter()
                    .map(|f| self.build_field(f, ctx))
                    .collect();
                self.grammar.add_production(
                    Production::new(
                        symbol.to_string(),
                        ProductionKind::Block {
                            body,
                            condition: None,
                            else_body,
                            attrs: AttributeSet::new(),
                        },
                    )
                    .with_location(field.location.clone()),
                )
            }
            FieldItem::Alternative {
                first,
                second,
                default,
            } => {
                let alt1 = self.sequence_of(first, symbol, ctx);
                let alt2 = self.sequence_of(second, symbol, ctx);
                self.grammar.add_production(
                    Production::new(
                        symbol.to_string(),
                        ProductionKind::LookAhead {
                            alt1,
                            alt2,
                            default: *default,
                            condition: None,
                            lahs: None,
                        },
                    )
                    .with_location(field.location.clone()),
                )
            }
        }
    }

    /// Canonical production for a unit type, or a deferred slot when
    /// the type has not been built yet.
    fn unit_target(&mut self, name: &str, location: Option<Location>) -> ProductionId {
        if let Some(&id) = self.unit_ids.get(name) {
            return id;
        }
        let deferred = self.grammar.add_production(Production::new(
            format!("%deferred:{name}"),
            ProductionKind::Deferred { target: None },
        ));
        self.pending.push((deferred, name.to_string(), location));
        deferred
    }

    fn sequence_of(
        &mut self,
        fields: &[FieldDescription],
        symbol: &str,
        ctx: &mut UnitCtx,
    ) -> ProductionId {
        match fields.len() {
            0 => self.grammar.add_production(Production::new(
                format!("{symbol}:empty"),
                ProductionKind::Epsilon,
            )),
            1 => self.build_field(&fields[0], ctx),
            _ => {
                let elements: Vec<_> =
                    fields.iter().map(|f| self.build_field(f, ctx)).collect();
                self.grammar.add_production(Production::new(
                    format!("{symbol}..."),
                    ProductionKind::Sequence { elements },
                ))
            }
        }
    }
}

/// `&size` on a plain bytes field is decoded by the type matcher
/// itself; everything else boundary-like needs a wrapping block.
fn attr_stays_inline(field: &FieldDescription, attr: &Attribute) -> bool {
    attr.kind == AttrKind::Size
        && field.repeat.is_none()
        && matches!(field.item, FieldItem::Type(ParseType::Bytes))
}
