// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! A host-backed guest address space.
//!
//! [`GuestMemory`] stores the target address space sparsely, one host buffer per mapped target
//! page. Windows handed out by [`TargetAccessProvider::lock_user`] are staged copies: the range is
//! gathered from its pages, handed to the caller, and (for writes) scattered back on release. This
//! is what lets targets with a different page size, word width or byte order from the host be
//! laid out safely.

use core::ops::Range;
use std::collections::BTreeMap;

use super::page_mgmt::{
    AllocationError, DeallocationError, FixedAddressBehavior, MemoryRegionPermissions,
    PageMappingProvider, PermissionUpdateError,
};
use super::{Provider, TargetAccessProvider, VerifyAccess};
use crate::target::{TargetAddr, WordLayout, WordSize};

/// Default lowest address handed out for non-fixed mappings.
pub const DEFAULT_MMAP_BASE: TargetAddr = 0x4000_0000;

struct GuestPage {
    permissions: MemoryRegionPermissions,
    data: Box<[u8]>,
}

/// A sparse, page-granular target address space living in host memory.
pub struct GuestMemory {
    layout: WordLayout,
    page_size: usize,
    /// Exclusive upper bound of usable target addresses.
    addr_limit: TargetAddr,
    mmap_base: TargetAddr,
    /// Keyed by page number (address divided by the page size).
    pages: BTreeMap<u64, GuestPage>,
}

impl GuestMemory {
    /// Create an empty address space for a target with the given word layout and page size.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is not a power of two.
    pub fn new(layout: WordLayout, page_size: usize) -> Self {
        assert!(page_size.is_power_of_two(), "page size must be a power of two");
        let addr_limit = match layout.size {
            WordSize::Bits32 => 1 << 32,
            // 47-bit user space, as on common 64-bit hosts.
            WordSize::Bits64 => 1 << 47,
        };
        Self {
            layout,
            page_size,
            addr_limit,
            mmap_base: DEFAULT_MMAP_BASE,
            pages: BTreeMap::new(),
        }
    }

    /// Override the lowest address used for non-fixed mappings.
    #[must_use]
    pub fn with_mmap_base(mut self, mmap_base: TargetAddr) -> Self {
        self.mmap_base = mmap_base;
        self
    }

    fn page_size_u64(&self) -> u64 {
        self.page_size as u64
    }

    fn page_number(&self, addr: TargetAddr) -> u64 {
        addr / self.page_size_u64()
    }

    /// Permissions of the page containing `addr`, if it is mapped.
    pub fn permissions_at(&self, addr: TargetAddr) -> Option<MemoryRegionPermissions> {
        self.pages
            .get(&self.page_number(addr))
            .map(|page| page.permissions)
    }

    /// Whether the page containing `addr` is mapped.
    pub fn is_mapped(&self, addr: TargetAddr) -> bool {
        self.permissions_at(addr).is_some()
    }

    /// Number of mapped target pages.
    pub fn mapped_pages(&self) -> usize {
        self.pages.len()
    }

    /// Contiguous mapped ranges, in ascending order, each with uniform permissions.
    pub fn mappings(&self) -> Vec<(Range<TargetAddr>, MemoryRegionPermissions)> {
        let psz = self.page_size_u64();
        let mut out: Vec<(Range<TargetAddr>, MemoryRegionPermissions)> = Vec::new();
        for (&number, page) in &self.pages {
            let start = number * psz;
            match out.last_mut() {
                Some((range, perms)) if range.end == start && *perms == page.permissions => {
                    range.end = start + psz;
                }
                _ => out.push((start..start + psz, page.permissions)),
            }
        }
        out
    }

    fn check_range(&self, range: &Range<TargetAddr>) -> Result<(), AllocationError> {
        let psz = self.page_size_u64();
        if range.start % psz != 0 || range.end % psz != 0 {
            return Err(AllocationError::Unaligned);
        }
        if range.start >= range.end || range.end > self.addr_limit {
            return Err(AllocationError::InvalidRange);
        }
        Ok(())
    }

    fn range_is_free(&self, range: &Range<TargetAddr>) -> bool {
        self.pages
            .range(self.page_number(range.start)..self.page_number(range.end))
            .next()
            .is_none()
    }

    fn find_free(&self, len: u64) -> Option<TargetAddr> {
        let psz = self.page_size_u64();
        let mut candidate = self.mmap_base;
        while candidate.checked_add(len)? <= self.addr_limit {
            let range = candidate..candidate + len;
            match self
                .pages
                .range(self.page_number(range.start)..self.page_number(range.end))
                .next_back()
            {
                None => return Some(candidate),
                // Skip past the highest page that is in the way.
                Some((&number, _)) => candidate = (number + 1) * psz,
            }
        }
        None
    }

    fn install(&mut self, range: Range<TargetAddr>, permissions: MemoryRegionPermissions) {
        let first = self.page_number(range.start);
        let last = self.page_number(range.end);
        for number in first..last {
            self.pages.insert(
                number,
                GuestPage {
                    permissions,
                    data: vec![0u8; self.page_size].into_boxed_slice(),
                },
            );
        }
    }

    /// Walk `[addr, addr + len)` page by page, checking that every page is mapped with the
    /// permission `access` requires.
    fn accessible(&self, access: VerifyAccess, addr: TargetAddr, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        let Some(end) = addr.checked_add(len as u64) else {
            return false;
        };
        if end > self.addr_limit {
            return false;
        }
        let required = match access {
            VerifyAccess::Read => MemoryRegionPermissions::READ,
            VerifyAccess::Write => MemoryRegionPermissions::WRITE,
        };
        (self.page_number(addr)..=self.page_number(end - 1)).all(|number| {
            self.pages
                .get(&number)
                .is_some_and(|page| page.permissions.contains(required))
        })
    }

    /// Visit every page-local piece of `[addr, addr + len)` in order.
    fn for_each_piece(
        &mut self,
        addr: TargetAddr,
        len: usize,
        mut f: impl FnMut(&mut [u8], usize),
    ) {
        let psz = self.page_size_u64();
        let mut done = 0usize;
        while done < len {
            let cur = addr + done as u64;
            let offset = usize::try_from(cur % psz).expect("page offset fits in usize");
            let piece = (self.page_size - offset).min(len - done);
            let page = self
                .pages
                .get_mut(&(cur / psz))
                .expect("range was checked to be mapped");
            f(&mut page.data[offset..offset + piece], done);
            done += piece;
        }
    }
}

impl Provider for GuestMemory {}

impl TargetAccessProvider for GuestMemory {
    fn word_layout(&self) -> WordLayout {
        self.layout
    }

    fn lock_user<R>(
        &mut self,
        access: VerifyAccess,
        addr: TargetAddr,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Option<R> {
        if !self.accessible(access, addr, len) {
            tracing::trace!(?access, addr = format_args!("{addr:#x}"), len, "lock_user fault");
            return None;
        }
        let mut window = vec![0u8; len];
        self.for_each_piece(addr, len, |piece, at| {
            window[at..at + piece.len()].copy_from_slice(piece);
        });
        let ret = f(&mut window);
        if access == VerifyAccess::Write {
            self.for_each_piece(addr, len, |piece, at| {
                let n = piece.len();
                piece.copy_from_slice(&window[at..at + n]);
            });
        }
        Some(ret)
    }
}

impl PageMappingProvider for GuestMemory {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn allocate_pages(
        &mut self,
        suggested_range: Range<TargetAddr>,
        initial_permissions: MemoryRegionPermissions,
        fixed_address_behavior: FixedAddressBehavior,
    ) -> Result<TargetAddr, AllocationError> {
        let len = suggested_range
            .end
            .checked_sub(suggested_range.start)
            .ok_or(AllocationError::InvalidRange)?;
        let range = match fixed_address_behavior {
            FixedAddressBehavior::Replace => {
                self.check_range(&suggested_range)?;
                suggested_range
            }
            FixedAddressBehavior::NoReplace => {
                self.check_range(&suggested_range)?;
                if !self.range_is_free(&suggested_range) {
                    return Err(AllocationError::AddressInUse);
                }
                suggested_range
            }
            FixedAddressBehavior::Hint => {
                if self.check_range(&suggested_range).is_ok()
                    && suggested_range.start != 0
                    && self.range_is_free(&suggested_range)
                {
                    suggested_range
                } else {
                    let start = self.find_free(len).ok_or(AllocationError::OutOfMemory)?;
                    start..start + len
                }
            }
        };
        self.check_range(&range)?;
        tracing::trace!(
            start = format_args!("{:#x}", range.start),
            end = format_args!("{:#x}", range.end),
            ?initial_permissions,
            "allocate guest pages"
        );
        let start = range.start;
        self.install(range, initial_permissions);
        Ok(start)
    }

    fn deallocate_pages(&mut self, range: Range<TargetAddr>) -> Result<(), DeallocationError> {
        let psz = self.page_size_u64();
        if range.start % psz != 0 || range.end % psz != 0 {
            return Err(DeallocationError::Unaligned);
        }
        let numbers = self.page_number(range.start)..self.page_number(range.end);
        if numbers.clone().any(|n| !self.pages.contains_key(&n)) {
            return Err(DeallocationError::AlreadyUnallocated);
        }
        for n in numbers {
            self.pages.remove(&n);
        }
        Ok(())
    }

    fn update_permissions(
        &mut self,
        range: Range<TargetAddr>,
        new_permissions: MemoryRegionPermissions,
    ) -> Result<(), PermissionUpdateError> {
        let psz = self.page_size_u64();
        if range.start % psz != 0 || range.end % psz != 0 {
            return Err(PermissionUpdateError::Unaligned);
        }
        let numbers = self.page_number(range.start)..self.page_number(range.end);
        if numbers.clone().any(|n| !self.pages.contains_key(&n)) {
            return Err(PermissionUpdateError::Unallocated);
        }
        for n in numbers {
            if let Some(page) = self.pages.get_mut(&n) {
                page.permissions = new_permissions;
            }
        }
        Ok(())
    }
}
