use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// A contiguous block handed out by a [`MemoryAllocator`]
#[derive(Debug, Clone)]
pub struct MemoryBlock {
    /// Pointer to the memory block
    ptr: NonNull<u8>,
    /// Size of the memory block in bytes
    size: usize,
    /// Alignment of the memory block
    alignment: usize,
}

// SAFETY: the block is a plain address range. Ownership of the memory stays
// with the allocator that produced it, which is itself Send + Sync.
unsafe impl Send for MemoryBlock {}
unsafe impl Sync for MemoryBlock {}

impl MemoryBlock {
    pub fn new(ptr: NonNull<u8>, size: usize, alignment: usize) -> Self {
        Self { ptr, size, alignment }
    }

    pub fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Address `offset` bytes into the block. `offset` must not exceed the size.
    pub fn ptr_at(&self, offset: usize) -> Option<NonNull<u8>> {
        if offset > self.size {
            return None;
        }
        // SAFETY: offset is within (or one past the end of) the allocation.
        let ptr = unsafe { self.ptr.as_ptr().add(offset) };
        NonNull::new(ptr)
    }
}

/// Source of the backing allocation of a memory pool
pub trait MemoryAllocator: Send + Sync {
    /// Allocate a block of memory with the specified size and alignment
    fn allocate(&mut self, size: usize, alignment: usize) -> Result<MemoryBlock>;

    /// Deallocate a memory block
    fn deallocate(&mut self, block: MemoryBlock);

    /// Get the amount of allocated memory
    fn allocated_memory(&self) -> usize;

    /// Get the amount of memory that can still be allocated
    fn available_memory(&self) -> usize;

    /// Number of successful allocations over the allocator's lifetime
    fn allocation_count(&self) -> usize;
}

/// System allocator with an optional memory cap
pub struct SystemAllocator {
    allocated: AtomicUsize,
    acquisitions: AtomicUsize,
    memory_limit: Option<usize>,
    allocations: Mutex<HashMap<usize, Layout>>,
}

impl SystemAllocator {
    /// Create a new system allocator
    pub fn new(memory_limit: Option<usize>) -> Self {
        Self {
            allocated: AtomicUsize::new(0),
            acquisitions: AtomicUsize::new(0),
            memory_limit,
            allocations: Mutex::new(HashMap::new()),
        }
    }

    pub fn memory_limit(&self) -> Option<usize> {
        self.memory_limit
    }
}

impl MemoryAllocator for SystemAllocator {
    fn allocate(&mut self, size: usize, alignment: usize) -> Result<MemoryBlock> {
        // Zero-sized layouts cannot be passed to the global allocator
        let size = std::cmp::max(1, size);

        if let Some(limit) = self.memory_limit {
            let current = self.allocated.load(Ordering::Relaxed);
            if current.checked_add(size).map_or(true, |total| total > limit) {
                return Err(Error::OutOfMemory { requested: size, limit });
            }
        }

        let layout = Layout::from_size_align(size, alignment).map_err(|e| {
            Error::InvalidLayout(format!("size={}, alignment={}, error={}", size, alignment, e))
        })?;

        let mut allocations = self
            .allocations
            .lock()
            .map_err(|_| Error::LockPoisoned("allocations mutex".to_string()))?;

        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        let ptr = NonNull::new(ptr).ok_or(Error::AllocationFailed { size, alignment })?;

        allocations.insert(ptr.as_ptr() as usize, layout);
        self.allocated.fetch_add(size, Ordering::Relaxed);
        self.acquisitions.fetch_add(1, Ordering::Relaxed);

        Ok(MemoryBlock::new(ptr, size, alignment))
    }

    fn deallocate(&mut self, block: MemoryBlock) {
        let mut allocations = match self.allocations.lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::error!("allocations mutex poisoned; leaking {} bytes", block.size());
                return;
            }
        };

        let key = block.ptr().as_ptr() as usize;
        if let Some(layout) = allocations.remove(&key) {
            // SAFETY: the pointer was produced by `alloc` with this layout and
            // has just been removed from the live set.
            unsafe {
                alloc::dealloc(block.ptr().as_ptr(), layout);
            }
            self.allocated.fetch_sub(layout.size(), Ordering::Relaxed);
        }
    }

    fn allocated_memory(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    fn available_memory(&self) -> usize {
        let allocated = self.allocated.load(Ordering::Relaxed);
        match self.memory_limit {
            Some(limit) => limit.saturating_sub(allocated),
            None => usize::MAX - allocated,
        }
    }

    fn allocation_count(&self) -> usize {
        self.acquisitions.load(Ordering::Relaxed)
    }
}

impl Drop for SystemAllocator {
    fn drop(&mut self) {
        let allocations = match self.allocations.get_mut() {
            Ok(map) => std::mem::take(map),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        for (ptr, layout) in allocations {
            // SAFETY: every entry is a live allocation made with its layout.
            unsafe {
                alloc::dealloc(ptr as *mut u8, layout);
            }
        }
        self.allocated.store(0, Ordering::Relaxed);
    }
}

/// Create a default memory allocator
pub fn create_default_allocator(memory_limit: Option<usize>) -> Box<dyn MemoryAllocator> {
    Box::new(SystemAllocator::new(memory_limit))
}
