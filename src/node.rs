use crate::utils::bitset::BitSet;

/// A Node stands for one program value that needs a register. Like many
/// allocator classes we use deliberately terse naming since the name shows
/// up everywhere; a node is nothing more than a dense index into the
/// per-routine side tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    index: u32,
}

impl Node {
    pub const fn from_index(index: usize) -> Self {
        Self {
            index: index as u32,
        }
    }

    pub const fn index(self) -> usize {
        self.index as usize
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "n{}", self.index)
    }
}

/// What a node demands of its register: how many adjacent slots it covers,
/// whether it must sit on a slot boundary, and an optional pre-restricted
/// color set (calling-convention-fixed registers and the like).
///
/// Wide nodes are only representable in aligned form; `width > 1` without
/// `aligned` is rejected when the model is built.
#[derive(Debug, Clone)]
pub struct RegisterReq {
    pub width: u32,
    pub aligned: bool,
    pub limited: Option<BitSet>,
}

impl RegisterReq {
    /// An ordinary single-register node.
    pub fn scalar() -> Self {
        Self {
            width: 1,
            aligned: false,
            limited: None,
        }
    }

    /// A node covering `width` adjacent registers, starting on an aligned slot.
    pub fn wide(width: u32) -> Self {
        Self {
            width,
            aligned: true,
            limited: None,
        }
    }

    pub fn with_limited(mut self, colors: BitSet) -> Self {
        self.limited = Some(colors);
        self
    }
}
