use crate::utils::bitset::BitSet;

/// A register class: a palette of `n_colors` registers, of which a subset is
/// allocatable by the coalescer. Non-allocatable colors (stack pointer,
/// frame pointer, ...) never receive variables in interference constraints.
#[derive(Debug, Clone)]
pub struct RegClass {
    n_colors: u32,
    allocatable: BitSet,
}

impl RegClass {
    /// A class where every color is allocatable.
    pub fn new(n_colors: u32) -> Self {
        Self {
            n_colors,
            allocatable: (0..n_colors as usize).collect(),
        }
    }

    pub fn mark_non_allocatable(&mut self, color: u32) {
        debug_assert!(color < self.n_colors);
        self.allocatable.clear(color as usize);
    }

    pub fn n_colors(&self) -> u32 {
        self.n_colors
    }

    pub fn allocatable_colors(&self) -> &BitSet {
        &self.allocatable
    }

    pub fn is_allocatable(&self, color: u32) -> bool {
        self.allocatable.get(color as usize)
    }
}
