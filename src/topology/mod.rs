//! Topology declaration and pairwise link computation.
//!
//! ## Contents
//! - [`Addressee`] identity of one unit instance (`name#number`)
//! - [`GroupSpec`] user declaration of one logical group
//! - [`Topology`]  validated, symmetrized set of groups with link computation

mod addressee;
mod group;
mod plan;

pub use addressee::{Addressee, MAIN_POOL};
pub use group::GroupSpec;
pub use plan::{Group, Topology};
