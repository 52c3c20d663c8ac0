// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The interface to the target address space.
//!
//! The top-level trait that denotes something is a usable execbox platform is [`Provider`]. This
//! trait is merely a collection of subtraits that could be composed independently from various
//! other crates that implement them upon various types.
//!
//! Nothing in the exec pipeline touches target memory except through [`TargetAccessProvider`]:
//! each access acquires a host-visible window over a target range, performs the access and
//! releases the window, on every exit path.

use thiserror::Error;

use crate::target::{TargetAddr, WordLayout};

pub mod guest;
pub mod page_mgmt;


pub use page_mgmt::PageMappingProvider;

/// A provider of a target address space.
///
/// Ideally, a [`Provider`] is zero-sized, and only exists to provide access to functionality
/// provided by it. _However_, most of the provided APIs within the provider act upon `&mut self`
/// since a single exec attempt owns its target address space for its whole duration.
pub trait Provider: PageMappingProvider + TargetAccessProvider {}

/// The kind of access a window over target memory is acquired for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyAccess {
    /// The window is only read from.
    Read,
    /// The window may be written to; changes are flushed back on release.
    Write,
}

/// An error indicating a target-memory access fault.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("target memory access fault")]
pub struct Fault;

/// Scoped access to target memory.
///
/// The single required primitive is [`lock_user`](Self::lock_user); every other method is a
/// convenience built on top of it, and thus gets bounds-checking and guaranteed release for free.
pub trait TargetAccessProvider {
    /// The width and byte order of a target word.
    fn word_layout(&self) -> WordLayout;

    /// Acquire a host-visible window over `[addr, addr + len)`, run `f` upon it, and release it.
    ///
    /// Returns `None` (and does not invoke `f`) if any part of the range is unmapped, lacks the
    /// permission required by `access`, or the range wraps around.
    ///
    /// For [`VerifyAccess::Write`], the window initially holds the current contents of the range,
    /// and whatever `f` leaves in it is written back on release.
    fn lock_user<R>(
        &mut self,
        access: VerifyAccess,
        addr: TargetAddr,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Option<R>;

    /// Copy `buf.len()` bytes out of target memory at `addr`.
    fn read_bytes(&mut self, addr: TargetAddr, buf: &mut [u8]) -> Result<(), Fault> {
        self.lock_user(VerifyAccess::Read, addr, buf.len(), |window| {
            buf.copy_from_slice(window);
        })
        .ok_or(Fault)
    }

    /// Copy `data` into target memory at `addr`.
    fn write_bytes(&mut self, addr: TargetAddr, data: &[u8]) -> Result<(), Fault> {
        self.lock_user(VerifyAccess::Write, addr, data.len(), |window| {
            window.copy_from_slice(data);
        })
        .ok_or(Fault)
    }

    /// Fill `[addr, addr + len)` by repeating `pattern`.
    ///
    /// A trailing partial copy of `pattern` is written if `len` is not a multiple of its length.
    fn fill_pattern(&mut self, addr: TargetAddr, len: usize, pattern: &[u8]) -> Result<(), Fault> {
        if pattern.is_empty() {
            return Ok(());
        }
        self.lock_user(VerifyAccess::Write, addr, len, |window| {
            for chunk in window.chunks_mut(pattern.len()) {
                chunk.copy_from_slice(&pattern[..chunk.len()]);
            }
        })
        .ok_or(Fault)
    }

    /// Store one target word (`abi_ulong`) at `addr`.
    fn put_user_ual(&mut self, addr: TargetAddr, value: u64) -> Result<(), Fault> {
        let layout = self.word_layout();
        self.lock_user(VerifyAccess::Write, addr, layout.bytes(), |window| {
            layout.encode_into(value, window);
        })
        .ok_or(Fault)
    }

    /// Load one target word (`abi_ulong`) from `addr`.
    fn get_user_ual(&mut self, addr: TargetAddr) -> Result<u64, Fault> {
        let layout = self.word_layout();
        self.lock_user(VerifyAccess::Read, addr, layout.bytes(), |window| {
            layout.decode(window)
        })
        .ok_or(Fault)
    }

    /// Length of the NUL-terminated string resident in target memory at `addr`, excluding the
    /// terminator.
    fn target_strlen(&mut self, addr: TargetAddr) -> Result<usize, Fault> {
        const CHUNK: u64 = 256;
        let mut len = 0usize;
        let mut cursor = addr;
        loop {
            // Never let a chunk straddle a chunk-aligned boundary, so that a string ending just
            // before an unmapped page is still measurable.
            let chunk_end = (cursor | (CHUNK - 1)).checked_add(1).ok_or(Fault)?;
            let chunk_len = usize::try_from(chunk_end - cursor).map_err(|_| Fault)?;
            let found = self
                .lock_user(VerifyAccess::Read, cursor, chunk_len, |window| {
                    window.iter().position(|&b| b == 0)
                })
                .ok_or(Fault)?;
            if let Some(pos) = found {
                return Ok(len + pos);
            }
            len += chunk_len;
            cursor = chunk_end;
        }
    }

    /// Read the NUL-terminated string at `addr`, without its terminator.
    fn read_cstring(&mut self, addr: TargetAddr) -> Result<Vec<u8>, Fault> {
        let len = self.target_strlen(addr)?;
        let mut buf = vec![0u8; len];
        self.read_bytes(addr, &mut buf)?;
        Ok(buf)
    }

    /// Copy a host buffer into target memory; the named form of [`write_bytes`](Self::write_bytes)
    /// used when mirroring host-side staging pages.
    fn memcpy_to_target(&mut self, dest: TargetAddr, src: &[u8]) -> Result<(), Fault> {
        self.write_bytes(dest, src)
    }
}
