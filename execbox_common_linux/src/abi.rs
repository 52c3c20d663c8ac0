// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Runtime descriptions of the emulated target.
//!
//! The exec path never assumes the host's word width, byte order or page size; everything it needs
//! to know about the target is carried by a [`TargetAbi`].

use execbox::target::{TargetAddr, WordLayout};

/// A target architecture as seen by the exec path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetAbi {
    /// Short human-readable name.
    pub name: &'static str,
    /// Width and byte order of `abi_ulong`.
    pub word: WordLayout,
    /// Target page size in bytes; a power of two.
    pub page_size: usize,
    /// Whether flat (`bFLT`) executables may be dispatched on this target.
    pub supports_flat: bool,
    /// Fixed stack and flag-page placement, for targets whose ABI mandates one.
    pub fixed_layout: Option<FixedStackLayout>,
}

impl TargetAbi {
    /// 32-bit little-endian x86.
    pub const I386: Self = Self {
        name: "i386",
        word: WordLayout::LE32,
        page_size: 4096,
        supports_flat: false,
        fixed_layout: None,
    };

    /// 32-bit x86 under the CGC (DECREE) ABI, with its fixed stack and flag page.
    pub const CGC_I386: Self = Self {
        name: "cgc",
        fixed_layout: Some(FixedStackLayout::CGC),
        ..Self::I386
    };

    /// 32-bit big-endian m68k; the classic flat-binary target.
    pub const M68K: Self = Self {
        name: "m68k",
        word: WordLayout::BE32,
        page_size: 4096,
        supports_flat: true,
        fixed_layout: None,
    };

    /// 64-bit little-endian x86.
    pub const X86_64: Self = Self {
        name: "x86-64",
        word: WordLayout::LE64,
        page_size: 4096,
        supports_flat: false,
        fixed_layout: None,
    };

    /// Size of a target word, in bytes.
    pub const fn word_bytes(&self) -> usize {
        self.word.bytes()
    }
}

/// A fixed placement of the initial stack and a pre-filled read/write "flag page".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedStackLayout {
    /// Base address of the flag page.
    pub flag_page: TargetAddr,
    /// Length of the flag page in bytes.
    pub flag_page_len: usize,
    /// 32-bit value the flag page is filled with, in target byte order.
    pub flag_fill: u32,
    /// Initial stack pointer.
    pub stack_init: TargetAddr,
    /// Granularity of the stack mapping.
    pub stack_page_size: u64,
}

impl FixedStackLayout {
    pub const CGC: Self = Self {
        flag_page: 0x4347_C000,
        flag_page_len: 4096,
        flag_fill: 0x4342_434C,
        stack_init: 0xBAAA_AFFC,
        stack_page_size: 4096,
    };

    /// Exclusive upper bound of the stack mapping: the page above the one holding
    /// [`stack_init`](Self::stack_init).
    pub const fn stack_page_limit(&self) -> TargetAddr {
        (self.stack_init & !(self.stack_page_size - 1)) + self.stack_page_size
    }

    /// Number of stack pages needed to cover `[stack_limit, start_stack]`, as reported by the
    /// format loader.
    ///
    /// A `start_stack` below `stack_limit` wraps around and yields a count no mapping can satisfy.
    pub const fn stack_pages(&self, start_stack: TargetAddr, stack_limit: TargetAddr) -> u64 {
        start_stack.wrapping_sub(stack_limit) / self.stack_page_size + 1
    }
}
