//! Newtype ids used across the compiler and runtime.
//!
//! All ids are plain indices into their owning arena (grammar, plan,
//! module). They are only meaningful together with that owner.

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident($repr:ty), $prefix:literal) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub $repr);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_type! {
    /// A production owned by a grammar arena.
    ProductionId(u32), "p"
}

id_type! {
    /// A literal usable as a look-ahead token. Assigned by the grammar
    /// when a literal production is registered; equal literals share an id.
    TokenId(u32), "t"
}

id_type! {
    /// A named field slot within a unit plan.
    FieldId(u16), "f"
}

id_type! {
    /// A user hook referenced by the plan and resolved by the host.
    HookId(u32), "h"
}

id_type! {
    /// An opaque host expression.
    ExprId(u32), "e"
}

id_type! {
    /// A step block within a plan.
    BlockId(u32), "b"
}

id_type! {
    /// A unit plan within a compiled module.
    PlanId(u32), "u"
}
