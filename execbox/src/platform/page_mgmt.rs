// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Page-management related types and traits

use core::ops::Range;
use thiserror::Error;

use crate::target::TargetAddr;

bitflags::bitflags! {
    /// Permissions for a memory region
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MemoryRegionPermissions: u8 {
        /// Readable
        const READ = 1 << 0;
        /// Writable
        const WRITE = 1 << 1;
        /// Executable
        const EXEC = 1 << 2;
    }
}

/// A provider for reserving pages in the target address space.
pub trait PageMappingProvider {
    /// The target page size; a power of two.
    fn page_size(&self) -> usize;

    /// Allocates zero-filled target pages at `suggested_range` with the given
    /// `initial_permissions`.
    ///
    /// # Parameters
    ///
    /// - `suggested_range`: A suggested address range for the allocation. Both ends must be
    ///   aligned to [`page_size`](Self::page_size).
    /// - `initial_permissions`: The permissions to apply to the allocated memory region.
    /// - `fixed_address_behavior`: Specifies the required semantics of `suggested_range`.
    ///
    /// # Returns
    ///
    /// On success, returns the target address of the start of the allocated region.
    ///
    /// # Errors
    ///
    /// Returns an [`AllocationError`] if the allocation fails.
    fn allocate_pages(
        &mut self,
        suggested_range: Range<TargetAddr>,
        initial_permissions: MemoryRegionPermissions,
        fixed_address_behavior: FixedAddressBehavior,
    ) -> Result<TargetAddr, AllocationError>;

    /// De-allocate all pages in the given `range`.
    fn deallocate_pages(&mut self, range: Range<TargetAddr>) -> Result<(), DeallocationError>;

    /// Update the permissions on pages in `range` to `new_permissions`.
    fn update_permissions(
        &mut self,
        range: Range<TargetAddr>,
        new_permissions: MemoryRegionPermissions,
    ) -> Result<(), PermissionUpdateError>;
}

/// Behavior when allocating pages at a fixed address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FixedAddressBehavior {
    /// The address is just a hint, and the platform may choose a different
    /// address if the hint is not available.
    Hint,
    /// Allocate the pages at the specified address, replacing any existing
    /// mappings.
    Replace,
    /// Allocate the pages at the specified address, failing if any part of the
    /// range is already in use.
    NoReplace,
}

/// Possible errors for [`PageMappingProvider::allocate_pages`]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AllocationError {
    #[error("provided range is not page-aligned")]
    Unaligned,
    #[error("provided range is invalid")]
    InvalidRange,
    #[error("out of memory")]
    OutOfMemory,
    #[error("provided fixed address range is in use")]
    AddressInUse,
}

/// Possible errors for [`PageMappingProvider::deallocate_pages`]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeallocationError {
    #[error("provided range is not page-aligned")]
    Unaligned,
    #[error("provided range contains unallocated pages")]
    AlreadyUnallocated,
}

/// Possible errors for [`PageMappingProvider::update_permissions`]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PermissionUpdateError {
    #[error("provided range is not page-aligned")]
    Unaligned,
    #[error("provided range contains unallocated pages")]
    Unallocated,
}
