//! Native function libraries a host can bind into a machine's table.
//!
//! Each library keeps its state behind an `Rc<RefCell<_>>` shared between the
//! host and the installed closures, so the host can inspect it between
//! evaluations.

pub mod canvas;
pub mod window;

use crate::cell::Cell;

/// Combine two argument cells into a big-endian 16-bit word.
pub fn word<C: Cell>(hi: C, lo: C) -> u16 {
    u16::from(hi.to_byte()) << 8 | u16::from(lo.to_byte())
}
