//! Runtime configuration.

/// Tunables for a [`Runtime`](super::Runtime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// External memory (bytes) above which [`Runtime::should_collect`](super::Runtime::should_collect)
    /// reports true.
    pub external_memory_limit: i64,
    /// Initial object heap capacity.
    pub heap_capacity: usize,
}

impl RuntimeOptions {
    pub const DEFAULT_EXTERNAL_MEMORY_LIMIT: i64 = 8 * 1024 * 1024;
    pub const DEFAULT_HEAP_CAPACITY: usize = 256;

    pub fn with_external_memory_limit(mut self, bytes: i64) -> Self {
        self.external_memory_limit = bytes;
        self
    }

    pub fn with_heap_capacity(mut self, capacity: usize) -> Self {
        self.heap_capacity = capacity;
        self
    }
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            external_memory_limit: Self::DEFAULT_EXTERNAL_MEMORY_LIMIT,
            heap_capacity: Self::DEFAULT_HEAP_CAPACITY,
        }
    }
}
