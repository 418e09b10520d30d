//! The fixed-point engine and the analyses built on it.

mod call_kill;
pub mod fixed_point;
mod may_alias;
mod must_alias;
mod side_effects;

pub use self::may_alias::{may_alias, Aliases, MayAlias};
pub use self::must_alias::{must_alias, MustAlias};
pub use self::side_effects::{side_effects, SideEffects};
