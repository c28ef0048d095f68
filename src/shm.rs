//! Shared memory (C9): kernel-heap-backed regions addressable by id.
//! `SHM_MAP` returns the region's kernel virtual address directly rather
//! than inserting a mapping into the caller's private page-directory half
//! — section 4.8's documented simplification, preserved rather than
//! "fixed" because the kernel half is identity-shared across every
//! process directory (P5) and so the address is valid from any caller.
//! Grounded on `kernel/core/memory.c`'s shared-region table.

use crate::lib::error::KernelError;
use crate::mm::frame::PAGE_SIZE;
use alloc::boxed::Box;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::Mutex;

pub const MAX_REGIONS: usize = 32;
pub const MAX_TOTAL_BYTES: usize = 4 * 1024 * 1024;

pub struct Region {
    pub id: u32,
    pub size: usize,
    pub owner_pid: u32,
    storage: Box<[u8]>,
    refcount: AtomicU32,
}

impl Region {
    /// Kernel virtual address of the backing storage. Since this kernel
    /// never relocates the heap, this address is stable for the region's
    /// lifetime (regions are never freed, section 4.8).
    pub fn address(&self) -> u32 {
        self.storage.as_ptr() as u32
    }

    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::SeqCst)
    }
}

struct Table {
    regions: [Option<Region>; MAX_REGIONS],
    next_id: u32,
    total_bytes: usize,
}

impl Table {
    const fn new() -> Self {
        const NONE_REGION: Option<Region> = None;
        Table { regions: [NONE_REGION; MAX_REGIONS], next_id: 1, total_bytes: 0 }
    }
}

static TABLE: Mutex<Table> = Mutex::new(Table::new());

fn round_up_page(size: usize) -> usize {
    (size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// SHM_CREATE: allocates a zeroed, page-rounded region. Per section 4.6,
/// size ≤ 0 or above the implementation cap is a 0-id failure rather than
/// a `KernelError`, since the syscall table documents 0 as this call's own
/// distinguished failure code (not the generic -1).
pub fn create(owner_pid: u32, requested_size: usize) -> u32 {
    if requested_size == 0 {
        return 0;
    }
    let size = round_up_page(requested_size);

    let mut table = TABLE.lock();
    if size > MAX_TOTAL_BYTES || table.total_bytes + size > MAX_TOTAL_BYTES {
        return 0;
    }
    let Some(slot) = table.regions.iter().position(Option::is_none) else {
        return 0;
    };

    let id = table.next_id;
    table.next_id += 1;
    table.total_bytes += size;

    let storage = alloc::vec![0u8; size].into_boxed_slice();
    table.regions[slot] =
        Some(Region { id, size, owner_pid, storage, refcount: AtomicU32::new(0) });
    id
}

/// SHM_MAP: increments the refcount and returns the region's kernel
/// virtual address.
pub fn map(id: u32) -> Result<u32, KernelError> {
    let table = TABLE.lock();
    let region = table
        .regions
        .iter()
        .flatten()
        .find(|r| r.id == id)
        .ok_or(KernelError::NoSuchRegion)?;
    region.refcount.fetch_add(1, Ordering::SeqCst);
    Ok(region.address())
}

/// SHM_UNMAP: decrements the refcount, clamped at zero (P3). Regions are
/// never reclaimed even once the count returns to zero.
pub fn unmap(id: u32) -> Result<(), KernelError> {
    let table = TABLE.lock();
    let region =
        table.regions.iter().flatten().find(|r| r.id == id).ok_or(KernelError::NoSuchRegion)?;
    let _ = region
        .refcount
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some(c.saturating_sub(1)));
    Ok(())
}

pub fn region_count() -> usize {
    TABLE.lock().regions.iter().flatten().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_rounds_up_to_page_size() {
        let id = create(1, 10);
        assert_ne!(id, 0);
        let addr = map(id).unwrap();
        assert_ne!(addr, 0);
    }

    #[test]
    fn zero_size_fails_with_distinguished_zero_id() {
        assert_eq!(create(1, 0), 0);
    }

    #[test]
    fn refcount_tracks_map_and_unmap_and_never_goes_negative() {
        let id = create(1, 4096);
        map(id).unwrap();
        map(id).unwrap();
        unmap(id).unwrap();
        unmap(id).unwrap();
        unmap(id).unwrap();
        let table = TABLE.lock();
        let region = table.regions.iter().flatten().find(|r| r.id == id).unwrap();
        assert_eq!(region.refcount(), 0, "P3: refcount must clamp at zero, never go negative");
    }

    #[test]
    fn unknown_id_fails() {
        assert_eq!(map(999_999), Err(KernelError::NoSuchRegion));
        assert_eq!(unmap(999_999), Err(KernelError::NoSuchRegion));
    }
}
