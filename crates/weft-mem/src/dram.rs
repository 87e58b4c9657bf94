//! Simulated paged DRAM.
//!
//! The device sees a flat 32-bit physical address space; hosts see opaque
//! pointers. Allocations reserve whole pages, physical pages are assigned
//! monotonically and never reused or moved, and both lookup directions
//! (host pointer → physical, physical → host bytes) stay consistent for the
//! lifetime of an allocation. A single process-global instance backs every
//! device, guarded by one internal mutex.

use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock};

pub const LOG2_PAGE_BYTES: u32 = 12;
pub const PAGE_BYTES: usize = 1 << LOG2_PAGE_BYTES;

/// Opaque host-side handle to DRAM-backed memory.
///
/// Carries the address of the backing host buffer; host code may form
/// interior pointers with [`HostPtr::offset`] and hand them back to the
/// copy/lookup entry points, which resolve the containing allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostPtr(u64);

impl HostPtr {
    /// Interior pointer `bytes` past this one.
    pub fn offset(self, bytes: u64) -> HostPtr {
        HostPtr(self.0 + bytes)
    }
}

struct Allocation {
    buf: Box<[u8]>,
    phy_base: u32,
}

struct DramState {
    /// Next physical page number to hand out. Page 0 is never allocated so
    /// that physical address 0 stays invalid.
    next_page: u32,
    /// Host base address → allocation (owns the bytes).
    allocs: BTreeMap<u64, Allocation>,
    /// Page table: physical page number → host base address.
    pages: BTreeMap<u32, u64>,
}

/// The simulated DRAM. See the module docs; obtain the process-wide
/// instance with [`PagedDram::global`].
pub struct PagedDram {
    state: Mutex<DramState>,
}

impl Default for PagedDram {
    fn default() -> Self {
        Self::new()
    }
}

impl PagedDram {
    pub fn new() -> Self {
        PagedDram {
            state: Mutex::new(DramState {
                next_page: 1,
                allocs: BTreeMap::new(),
                pages: BTreeMap::new(),
            }),
        }
    }

    /// The process-global DRAM shared by all devices.
    pub fn global() -> &'static PagedDram {
        static GLOBAL: OnceLock<PagedDram> = OnceLock::new();
        GLOBAL.get_or_init(PagedDram::new)
    }

    /// Allocate at least `size` bytes, rounded up to whole pages. The
    /// returned handle is stable until [`PagedDram::free`].
    pub fn alloc(&self, size: usize) -> HostPtr {
        assert!(size > 0, "zero-sized DRAM allocation");
        let npages = size.div_ceil(PAGE_BYTES);
        let buf = vec![0u8; npages * PAGE_BYTES].into_boxed_slice();
        let host = buf.as_ptr() as u64;

        let mut state = self.state.lock().unwrap();
        let first_page = state.next_page;
        let next = state
            .next_page
            .checked_add(npages as u32)
            .filter(|next| (*next as u64) << LOG2_PAGE_BYTES <= u32::MAX as u64 + 1)
            .unwrap_or_else(|| panic!("physical address space exhausted"));
        state.next_page = next;
        for i in 0..npages as u32 {
            state.pages.insert(first_page + i, host);
        }
        let phy_base = first_page << LOG2_PAGE_BYTES;
        state.allocs.insert(host, Allocation { buf, phy_base });
        HostPtr(host)
    }

    /// Release an allocation. `ptr` must be the handle returned by
    /// [`PagedDram::alloc`]; physical addresses of the freed pages become
    /// invalid and are never handed out again.
    pub fn free(&self, ptr: HostPtr) {
        let mut state = self.state.lock().unwrap();
        let alloc = state
            .allocs
            .remove(&ptr.0)
            .unwrap_or_else(|| panic!("free of unknown host pointer {:#x}", ptr.0));
        let first_page = alloc.phy_base >> LOG2_PAGE_BYTES;
        let npages = (alloc.buf.len() / PAGE_BYTES) as u32;
        for i in 0..npages {
            state.pages.remove(&(first_page + i));
        }
    }

    /// Base physical address of the allocation containing `ptr`, or `None`
    /// if no live allocation contains it.
    pub fn try_phy_addr(&self, ptr: HostPtr) -> Option<u32> {
        let state = self.state.lock().unwrap();
        let (base, alloc) = state.allocs.range(..=ptr.0).next_back()?;
        (ptr.0 < base + alloc.buf.len() as u64).then_some(alloc.phy_base)
    }

    /// Base physical address of the allocation containing `ptr`. Lookup
    /// misses are fatal.
    pub fn phy_addr(&self, ptr: HostPtr) -> u32 {
        self.try_phy_addr(ptr)
            .unwrap_or_else(|| panic!("host pointer {:#x} is not DRAM-backed", ptr.0))
    }

    /// Host handle for a physical byte address inside a live allocation.
    pub fn try_addr(&self, phy: u64) -> Option<HostPtr> {
        let state = self.state.lock().unwrap();
        let page = u32::try_from(phy >> LOG2_PAGE_BYTES).ok()?;
        let host = *state.pages.get(&page)?;
        let alloc = &state.allocs[&host];
        Some(HostPtr(host + (phy - alloc.phy_base as u64)))
    }

    /// Copy host bytes into DRAM at `dst` (which may be interior).
    pub fn copy_from_host(&self, dst: HostPtr, src: &[u8]) {
        self.with_alloc_mut(dst, src.len(), "copy_from_host", |bytes| {
            bytes.copy_from_slice(src)
        });
    }

    /// Copy DRAM bytes at `src` (which may be interior) out to the host.
    pub fn copy_to_host(&self, dst: &mut [u8], src: HostPtr) {
        self.with_alloc_mut(src, dst.len(), "copy_to_host", |bytes| {
            dst.copy_from_slice(bytes)
        });
    }

    /// Read `dst.len()` bytes starting at physical address `phy`. The whole
    /// range must lie in one live allocation; a miss is fatal.
    pub fn read(&self, phy: u64, dst: &mut [u8]) {
        self.with_region(phy, dst.len(), |bytes| dst.copy_from_slice(bytes));
    }

    /// Write `src` starting at physical address `phy`.
    pub fn write(&self, phy: u64, src: &[u8]) {
        self.with_region(phy, src.len(), |bytes| bytes.copy_from_slice(src));
    }

    /// Run `f` over the `len` bytes at physical address `phy`, under the
    /// DRAM lock. The range must lie in one live allocation; a miss is
    /// fatal, mirroring the device's view that an unmapped access is a
    /// caller bug.
    pub fn with_region<R>(&self, phy: u64, len: usize, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        let page = u32::try_from(phy >> LOG2_PAGE_BYTES)
            .unwrap_or_else(|_| panic!("physical address {phy:#x} out of range"));
        let host = *state
            .pages
            .get(&page)
            .unwrap_or_else(|| panic!("physical address {phy:#x} is not mapped"));
        let alloc = state.allocs.get_mut(&host).expect("page table out of sync");
        let offset = (phy - alloc.phy_base as u64) as usize;
        assert!(
            offset + len <= alloc.buf.len(),
            "physical range {phy:#x}+{len:#x} crosses its allocation"
        );
        f(&mut alloc.buf[offset..offset + len])
    }

    fn with_alloc_mut<R>(
        &self,
        ptr: HostPtr,
        len: usize,
        what: &str,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> R {
        let mut state = self.state.lock().unwrap();
        let (base, alloc) = state
            .allocs
            .range_mut(..=ptr.0)
            .next_back()
            .filter(|(base, alloc)| ptr.0 < **base + alloc.buf.len() as u64)
            .unwrap_or_else(|| panic!("{what}: host pointer {:#x} is not DRAM-backed", ptr.0));
        let offset = (ptr.0 - base) as usize;
        assert!(
            offset + len <= alloc.buf.len(),
            "{what}: range {:#x}+{len:#x} crosses its allocation",
            ptr.0
        );
        f(&mut alloc.buf[offset..offset + len])
    }
}
