// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! `mmap` against the target address space.

use std::io;

use execbox::platform::page_mgmt::{FixedAddressBehavior, MemoryRegionPermissions};
use execbox::platform::Provider;
use execbox::target::TargetAddr;
use execbox::utils::align_up;
use execbox_common_linux::errno::Errno;
use execbox_common_linux::{MapFlags, ProtFlags};

use crate::loader::BinaryFile;

/// What a new mapping is initialised from.
#[derive(Clone, Copy)]
pub enum MapBacking<'a> {
    /// Zero-filled memory.
    Anonymous,
    /// File content starting at `offset`; whatever lies past the end of the file reads as zero.
    File {
        file: &'a dyn BinaryFile,
        offset: u64,
    },
}

/// Map `len` bytes of target memory, returning the target address of the mapping.
///
/// `MAP_FIXED` maps exactly at `addr`, replacing what is there; `MAP_FIXED_NOREPLACE` maps exactly
/// at `addr` but fails with `EEXIST` if anything is there; otherwise `addr` is only a hint.
pub fn target_mmap<P: Provider>(
    platform: &mut P,
    addr: TargetAddr,
    len: usize,
    prot: ProtFlags,
    flags: MapFlags,
    backing: MapBacking<'_>,
) -> Result<TargetAddr, Errno> {
    let page_size = platform.page_size() as u64;
    if addr % page_size != 0 {
        return Err(Errno::EINVAL);
    }
    if len == 0 {
        return Err(Errno::EINVAL);
    }
    if let MapBacking::File { offset, .. } = backing
        && offset % page_size != 0
    {
        return Err(Errno::EINVAL);
    }
    let aligned_len = align_up(len as u64, page_size).ok_or(Errno::ENOMEM)?;
    let end = addr.checked_add(aligned_len).ok_or(Errno::ENOMEM)?;

    let behavior = if flags.contains(MapFlags::MAP_FIXED_NOREPLACE) {
        FixedAddressBehavior::NoReplace
    } else if flags.contains(MapFlags::MAP_FIXED) {
        FixedAddressBehavior::Replace
    } else {
        FixedAddressBehavior::Hint
    };
    let permissions = MemoryRegionPermissions::from(prot);
    let initial = match backing {
        MapBacking::Anonymous => permissions,
        // Populate through a writable mapping, then drop to the requested protection.
        MapBacking::File { .. } => permissions | MemoryRegionPermissions::WRITE,
    };
    let start = platform.allocate_pages(addr..end, initial, behavior)?;

    if let MapBacking::File { file, offset } = backing {
        if let Err(e) = copy_file_into(platform, start, aligned_len, file, offset) {
            platform.deallocate_pages(start..start + aligned_len)?;
            return Err(e);
        }
        if initial != permissions {
            platform.update_permissions(start..start + aligned_len, permissions)?;
        }
    }
    tracing::trace!(
        addr = format_args!("{start:#x}"),
        len = aligned_len,
        ?prot,
        ?flags,
        "target_mmap"
    );
    Ok(start)
}

fn copy_file_into<P: Provider>(
    platform: &mut P,
    start: TargetAddr,
    len: u64,
    file: &dyn BinaryFile,
    offset: u64,
) -> Result<(), Errno> {
    let mut buffer = vec![0u8; platform.page_size()];
    let mut copied = 0u64;
    while copied < len {
        let want = usize::try_from(len - copied)
            .unwrap_or(usize::MAX)
            .min(buffer.len());
        let size = match file.read_at(offset + copied, &mut buffer[..want]) {
            Ok(0) => break,
            Ok(size) => size,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        platform.memcpy_to_target(start + copied, &buffer[..size])?;
        copied += size as u64;
    }
    Ok(())
}
