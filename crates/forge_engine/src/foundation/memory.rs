//! Page-based memory pool and bump arenas
//!
//! All long-lived engine allocations flow through a [`MemoryPool`]: a fixed
//! number of page slots whose backing buffers are allocated lazily and never
//! returned to the OS, only to the pool's free set. [`Arena`]s borrow pages
//! from a pool and hand out [`ArenaSlot`] handles instead of pointers, so a
//! slot that outlives its scope fails loudly instead of reading reclaimed
//! memory.
//!
//! Pages are loaned by move: `get_page` transfers ownership of the backing
//! buffer to the caller and `free_page` takes it back, which makes the
//! "every page is either owned by one arena or free" invariant structural
//! rather than bookkeeping.

use bytemuck::Pod;
use thiserror::Error;

/// Default capacity of a freshly backed page, in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 2_000_000;

/// Default number of page slots in a pool.
pub const DEFAULT_PAGE_COUNT: usize = 64;

/// Memory pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    /// No free page slot can satisfy the request. The pool never reclaims
    /// in-use pages, so this is a hard capacity limit.
    #[error("memory pool exhausted: no free page can hold {requested} bytes ({free} free slots)")]
    Exhausted {
        /// Size of the allocation that could not be satisfied
        requested: usize,
        /// Free slots remaining at the time of failure
        free: usize,
    },
}

/// Identifier of a page slot within its owning pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageId(u32);

/// A page on loan from a [`MemoryPool`]. Holds the backing buffer until it
/// is returned via [`MemoryPool::free_page`].
#[derive(Debug)]
pub struct Page {
    id: PageId,
    buf: Vec<u8>,
}

impl Page {
    /// Slot id of this page in its pool.
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Usable capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

/// Pool-side record of a page slot. `buf` is `Some` while the page sits in
/// the free set and `None` while it is loaned out; `capacity` survives the
/// loan so reuse can prefer already-backed pages.
#[derive(Debug, Default)]
struct PageSlot {
    buf: Option<Vec<u8>>,
    capacity: usize,
}

/// Fixed-slot pool of lazily backed memory pages.
#[derive(Debug)]
pub struct MemoryPool {
    slots: Vec<PageSlot>,
    free: Vec<u32>,
    page_size: usize,
}

impl MemoryPool {
    /// Create a pool with `page_count` slots and `page_size` default page
    /// capacity. No memory is allocated until the first `get_page`.
    pub fn new(page_count: usize, page_size: usize) -> Self {
        let mut slots = Vec::with_capacity(page_count);
        let mut free = Vec::with_capacity(page_count);
        for i in 0..page_count {
            slots.push(PageSlot {
                buf: Some(Vec::new()),
                capacity: 0,
            });
            free.push(i as u32);
        }
        Self {
            slots,
            free,
            page_size,
        }
    }

    /// Pool with the engine's default slot count and page size.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_PAGE_COUNT, DEFAULT_PAGE_SIZE)
    }

    /// Take a free page with capacity of at least `min_size` bytes.
    ///
    /// Prefers a page that is already backed; otherwise backs a fresh slot
    /// with `max(min_size, page_size)` bytes. A backed free page that is too
    /// small is skipped, never grown.
    pub fn get_page(&mut self, min_size: usize) -> Result<Page, PoolError> {
        // First pass: an already-backed page that fits.
        if let Some(pos) = self.free.iter().position(|&id| {
            let slot = &self.slots[id as usize];
            slot.capacity >= min_size && slot.capacity > 0
        }) {
            return Ok(self.take_free(pos, None));
        }

        // Second pass: back a fresh slot.
        if let Some(pos) = self
            .free
            .iter()
            .position(|&id| self.slots[id as usize].capacity == 0)
        {
            let size = min_size.max(self.page_size);
            log::debug!("backing new memory page of {size} bytes");
            return Ok(self.take_free(pos, Some(size)));
        }

        Err(PoolError::Exhausted {
            requested: min_size,
            free: self.free.len(),
        })
    }

    /// Return a page to the free set. The backing memory is kept as-is for
    /// reuse by later `get_page` calls.
    pub fn free_page(&mut self, page: Page) {
        let Page { id, buf } = page;
        let slot = &mut self.slots[id.0 as usize];
        debug_assert!(slot.buf.is_none(), "page {id:?} freed twice");
        debug_assert_eq!(slot.capacity, buf.len());
        slot.buf = Some(buf);
        self.free.push(id.0);
    }

    /// Number of slots currently in the free set.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Number of slots whose backing buffer has been allocated at least once.
    pub fn backed_count(&self) -> usize {
        self.slots.iter().filter(|s| s.capacity > 0).count()
    }

    /// Default page capacity in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn take_free(&mut self, pos: usize, back_with: Option<usize>) -> Page {
        let id = self.free.swap_remove(pos);
        let slot = &mut self.slots[id as usize];
        let mut buf = slot.buf.take().unwrap_or_default();
        if let Some(size) = back_with {
            buf.resize(size, 0);
            slot.capacity = size;
        }
        Page { id: PageId(id), buf }
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Handle to a byte range inside an [`Arena`].
///
/// A slot stays valid until the arena ends a scope, is reset, or is
/// disposed; after that, dereferencing it panics instead of reading
/// reclaimed memory. Arenas that never open scopes (the persistent
/// vertex/index arenas) hand out slots that live as long as the arena.
#[derive(Debug, Clone, Copy)]
pub struct ArenaSlot {
    page: u32,
    offset: u32,
    len: u32,
    generation: u32,
}

impl ArenaSlot {
    /// Length of the allocation in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the allocation is zero-sized.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug)]
struct OwnedPage {
    page: Page,
    used: usize,
}

/// Checkpoint of (page count, cursor in the last page) taken at
/// `start_scope`.
#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    page_count: usize,
    used: usize,
}

/// Bump allocator over pool pages with LIFO scope checkpoints.
///
/// The arena never stores a pool reference; callers pass the pool into every
/// operation that can acquire or release pages, keeping data flow explicit.
/// An allocation never straddles a page boundary: when the current page's
/// tail is too small, a new page sized to at least the request is acquired
/// and the allocation starts at its beginning. Dead tail bytes are skipped
/// by [`Arena::chunks`].
#[derive(Debug, Default)]
pub struct Arena {
    pages: Vec<OwnedPage>,
    scopes: Vec<Checkpoint>,
    generation: u32,
}

impl Arena {
    /// Create an empty arena. Pages are acquired on first allocation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump-allocate `size` bytes, zero-initialized.
    pub fn alloc(&mut self, pool: &mut MemoryPool, size: usize) -> Result<ArenaSlot, PoolError> {
        if size == 0 {
            return Ok(ArenaSlot {
                page: 0,
                offset: 0,
                len: 0,
                generation: self.generation,
            });
        }
        let fits = self
            .pages
            .last()
            .is_some_and(|p| p.page.capacity() - p.used >= size);
        if !fits {
            let page = pool.get_page(size)?;
            self.pages.push(OwnedPage { page, used: 0 });
        }
        let index = self.pages.len() - 1;
        let current = &mut self.pages[index];
        let offset = current.used;
        current.used += size;
        Ok(ArenaSlot {
            page: index as u32,
            offset: offset as u32,
            len: size as u32,
            generation: self.generation,
        })
    }

    /// Allocate and fill with a copy of `bytes`.
    pub fn push_bytes(
        &mut self,
        pool: &mut MemoryPool,
        bytes: &[u8],
    ) -> Result<ArenaSlot, PoolError> {
        let slot = self.alloc(pool, bytes.len())?;
        self.bytes_mut(slot).copy_from_slice(bytes);
        Ok(slot)
    }

    /// Allocate and fill with the byte representation of a `Pod` slice.
    pub fn push_slice<T: Pod>(
        &mut self,
        pool: &mut MemoryPool,
        data: &[T],
    ) -> Result<ArenaSlot, PoolError> {
        self.push_bytes(pool, bytemuck::cast_slice(data))
    }

    /// Read access to a slot's bytes.
    ///
    /// # Panics
    /// Panics if the slot was allocated before the most recent `end_scope`,
    /// `reset`, or `dispose` of this arena.
    pub fn bytes(&self, slot: ArenaSlot) -> &[u8] {
        self.check(slot);
        if slot.len == 0 {
            return &[];
        }
        let page = &self.pages[slot.page as usize];
        &page.page.buf[slot.offset as usize..(slot.offset + slot.len) as usize]
    }

    /// Mutable access to a slot's bytes.
    ///
    /// # Panics
    /// Same staleness rule as [`Arena::bytes`].
    pub fn bytes_mut(&mut self, slot: ArenaSlot) -> &mut [u8] {
        self.check(slot);
        if slot.len == 0 {
            return &mut [];
        }
        let page = &mut self.pages[slot.page as usize];
        &mut page.page.buf[slot.offset as usize..(slot.offset + slot.len) as usize]
    }

    /// Open a scope. All allocations made until the matching `end_scope` are
    /// reclaimed in bulk when it closes.
    pub fn start_scope(&mut self) {
        self.scopes.push(Checkpoint {
            page_count: self.pages.len(),
            used: self.pages.last().map_or(0, |p| p.used),
        });
    }

    /// Close the innermost scope, returning pages acquired inside it to the
    /// pool and restoring the cursor to the matching `start_scope`. Every
    /// outstanding slot of this arena is retired.
    ///
    /// # Panics
    /// Panics if no scope is open.
    pub fn end_scope(&mut self, pool: &mut MemoryPool) {
        let checkpoint = self
            .scopes
            .pop()
            .expect("end_scope without matching start_scope");
        while self.pages.len() > checkpoint.page_count {
            if let Some(owned) = self.pages.pop() {
                pool.free_page(owned.page);
            }
        }
        if let Some(last) = self.pages.last_mut() {
            last.used = checkpoint.used;
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Number of currently open scopes.
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Return every owned page to the pool. The arena is empty and reusable
    /// afterwards; all outstanding slots are retired.
    pub fn dispose(&mut self, pool: &mut MemoryPool) {
        for owned in self.pages.drain(..) {
            pool.free_page(owned.page);
        }
        self.scopes.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    /// Total bytes allocated, excluding dead page tails.
    pub fn used_bytes(&self) -> usize {
        self.pages.iter().map(|p| p.used).sum()
    }

    /// Used byte ranges of each owned page, in allocation order. Suitable
    /// for wholesale upload into a contiguous GPU buffer.
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> {
        self.pages.iter().map(|p| &p.page.buf[..p.used])
    }

    fn check(&self, slot: ArenaSlot) {
        assert_eq!(
            slot.generation, self.generation,
            "arena slot used after its scope ended"
        );
    }

    #[cfg(test)]
    fn cursor(&self) -> (usize, usize) {
        (self.pages.len(), self.pages.last().map_or(0, |p| p.used))
    }
}
