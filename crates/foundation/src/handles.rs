/// Generational handle: a slot index plus the generation the slot had when
/// the handle was issued.
///
/// A handle whose generation no longer matches its slot is stale and must be
/// rejected by the owning container.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::Handle;

    #[test]
    fn handles_compare_by_index_then_generation() {
        let a = Handle::new(1, 0);
        let b = Handle::new(1, 1);
        let c = Handle::new(2, 0);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.index(), 1);
        assert_eq!(b.generation(), 1);
    }
}
