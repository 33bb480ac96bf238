//! Syntax tree for the Dunlin language.
//!
//! Nodes carry byte-offset [`TextRange`]s into the source they were parsed
//! from and own their identifiers as [`Name`]s. The tree is produced by the
//! `dunlin_parser` crate and consumed by `dunlin_semantic`.

use text_size::{TextRange, TextSize};

pub use crate::name::Name;
pub use crate::nodes::*;

mod name;
mod nodes;

pub trait Ranged {
    fn range(&self) -> TextRange;

    fn start(&self) -> TextSize {
        self.range().start()
    }

    fn end(&self) -> TextSize {
        self.range().end()
    }
}

impl Ranged for TextRange {
    fn range(&self) -> TextRange {
        *self
    }
}

impl<T> Ranged for &T
where
    T: Ranged,
{
    fn range(&self) -> TextRange {
        T::range(self)
    }
}
