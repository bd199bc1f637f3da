//! Cache coherency capability the components call into.
//!
//! The core never touches cache hardware; the platform supplies a
//! [`CacheOps`] implementation.

/// Cache maintenance requested by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCmd {
    WritebackInvalidate,
    Invalidate,
}

/// A memory range subject to cache maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheRegion {
    pub addr: usize,
    pub len: usize,
}

impl CacheRegion {
    /// Region covering one value.
    pub fn of<T>(val: &T) -> Self {
        CacheRegion {
            addr: val as *const T as usize,
            len: core::mem::size_of::<T>(),
        }
    }

    /// Region covering a slice.
    pub fn of_slice<T>(slice: &[T]) -> Self {
        CacheRegion {
            addr: slice.as_ptr() as usize,
            len: core::mem::size_of_val(slice),
        }
    }
}

/// Platform cache primitives.
pub trait CacheOps {
    fn writeback_invalidate(&mut self, region: CacheRegion);
    fn invalidate(&mut self, region: CacheRegion);
}

/// Apply `cmd` to `regions`, which are listed in write-back order
/// (config, delay arena, private data, header).
///
/// Invalidation walks the list backwards so the header is refreshed before
/// anything it points to. Empty regions are skipped.
pub fn sync_regions(cmd: CacheCmd, regions: &[CacheRegion], ops: &mut dyn CacheOps) {
    match cmd {
        CacheCmd::WritebackInvalidate => {
            for r in regions.iter().filter(|r| r.len > 0) {
                ops.writeback_invalidate(*r);
            }
        }
        CacheCmd::Invalidate => {
            for r in regions.iter().rev().filter(|r| r.len > 0) {
                ops.invalidate(*r);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use alloc::vec::Vec;

    /// Records every maintenance call in order.
    #[derive(Default)]
    pub struct RecordingCache {
        pub log: Vec<(CacheCmd, CacheRegion)>,
    }

    impl CacheOps for RecordingCache {
        fn writeback_invalidate(&mut self, region: CacheRegion) {
            self.log.push((CacheCmd::WritebackInvalidate, region));
        }

        fn invalidate(&mut self, region: CacheRegion) {
            self.log.push((CacheCmd::Invalidate, region));
        }
    }

    impl RecordingCache {
        pub fn addrs(&self) -> Vec<usize> {
            self.log.iter().map(|(_, r)| r.addr).collect()
        }
    }
}
