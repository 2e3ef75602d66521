//! Slab index types for type-safe indexing.

/// A compact 32-bit index into a slab.
///
/// `u32::MAX` is reserved as the `OptionSlabIndex` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SlabIndex(u32);

impl SlabIndex {
    /// # Panics
    /// Panics if `index >= u32::MAX`.
    #[inline]
    pub fn new(index: usize) -> Self {
        assert!(
            index < u32::MAX as usize,
            "slab index must be less than u32::MAX"
        );
        Self(index as u32)
    }

    #[inline]
    pub fn get(&self) -> usize {
        self.0 as usize
    }
}

/// An optional slab index using u32::MAX as the None sentinel.
///
/// Fits in 4 bytes, which matters for the two recency links carried by every
/// file record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct OptionSlabIndex(u32);

impl OptionSlabIndex {
    #[inline]
    pub const fn none() -> Self {
        Self(u32::MAX)
    }

    #[inline]
    pub fn some(index: SlabIndex) -> Self {
        Self(index.0)
    }

    #[inline]
    pub fn from_option(index: Option<SlabIndex>) -> Self {
        index.map_or(Self::none(), Self::some)
    }

    #[inline]
    pub fn to_option(self) -> Option<SlabIndex> {
        if self.0 == u32::MAX {
            None
        } else {
            Some(SlabIndex(self.0))
        }
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == u32::MAX
    }
}

impl Default for OptionSlabIndex {
    fn default() -> Self {
        Self::none()
    }
}

impl From<Option<SlabIndex>> for OptionSlabIndex {
    fn from(index: Option<SlabIndex>) -> Self {
        Self::from_option(index)
    }
}
