//! Control-flow reconstruction for raw PowerPC code.
//!
//! Two analyses live here: function-extent recovery (basic blocks from a
//! forward symbolic walk over instruction words) and jump-table recognition
//! (matching the four dispatch sequences the Wii U compilers emit).

mod function;
mod switch;

pub use function::*;
pub use switch::*;
