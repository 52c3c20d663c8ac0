// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Target word layout.
//!
//! Quantities written into the target address space (argc, pointers, flag words) must use the
//! target's natural word width and byte order, never the host's. [`WordLayout`] is the single
//! place where that conversion happens.

use crate::utils::TruncateExt as _;

/// An address in the target (emulated) address space.
///
/// Always carried as a `u64` on the host, regardless of the target word width; narrower targets
/// simply never produce values above their [`WordLayout::mask`].
pub type TargetAddr = u64;

/// Byte order of the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endianness {
    Little,
    Big,
}

/// Width of a target machine word (`abi_ulong`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WordSize {
    Bits32,
    Bits64,
}

impl WordSize {
    /// Number of bytes in a word of this size.
    pub const fn bytes(self) -> usize {
        match self {
            WordSize::Bits32 => 4,
            WordSize::Bits64 => 8,
        }
    }
}

/// Width and byte order of a target machine word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WordLayout {
    pub size: WordSize,
    pub endian: Endianness,
}

impl WordLayout {
    pub const LE32: Self = Self::new(WordSize::Bits32, Endianness::Little);
    pub const BE32: Self = Self::new(WordSize::Bits32, Endianness::Big);
    pub const LE64: Self = Self::new(WordSize::Bits64, Endianness::Little);
    pub const BE64: Self = Self::new(WordSize::Bits64, Endianness::Big);

    pub const fn new(size: WordSize, endian: Endianness) -> Self {
        Self { size, endian }
    }

    /// Number of bytes in one target word.
    pub const fn bytes(&self) -> usize {
        self.size.bytes()
    }

    /// All-ones value of a target word.
    pub const fn mask(&self) -> u64 {
        match self.size {
            WordSize::Bits32 => u32::MAX as u64,
            WordSize::Bits64 => u64::MAX,
        }
    }

    /// Encode `value` into `dst` using the target width and byte order.
    ///
    /// Bits above the target width are dropped, as a store of an `abi_ulong` would.
    ///
    /// # Panics
    ///
    /// Panics if `dst.len()` differs from [`Self::bytes`].
    pub fn encode_into(&self, value: u64, dst: &mut [u8]) {
        assert_eq!(dst.len(), self.bytes(), "destination is not one target word");
        match (self.size, self.endian) {
            (WordSize::Bits32, Endianness::Little) => {
                let value: u32 = value.truncate();
                dst.copy_from_slice(&value.to_le_bytes());
            }
            (WordSize::Bits32, Endianness::Big) => {
                let value: u32 = value.truncate();
                dst.copy_from_slice(&value.to_be_bytes());
            }
            (WordSize::Bits64, Endianness::Little) => dst.copy_from_slice(&value.to_le_bytes()),
            (WordSize::Bits64, Endianness::Big) => dst.copy_from_slice(&value.to_be_bytes()),
        }
    }

    /// Decode one target word from `src`.
    ///
    /// # Panics
    ///
    /// Panics if `src.len()` differs from [`Self::bytes`].
    pub fn decode(&self, src: &[u8]) -> u64 {
        assert_eq!(src.len(), self.bytes(), "source is not one target word");
        match (self.size, self.endian) {
            (WordSize::Bits32, Endianness::Little) => {
                u32::from_le_bytes(src.try_into().expect("length checked above")).into()
            }
            (WordSize::Bits32, Endianness::Big) => {
                u32::from_be_bytes(src.try_into().expect("length checked above")).into()
            }
            (WordSize::Bits64, Endianness::Little) => {
                u64::from_le_bytes(src.try_into().expect("length checked above"))
            }
            (WordSize::Bits64, Endianness::Big) => {
                u64::from_be_bytes(src.try_into().expect("length checked above"))
            }
        }
    }

    /// Encode a 32-bit quantity (e.g., a fill pattern) in target byte order.
    pub fn encode_u32(&self, value: u32) -> [u8; 4] {
        match self.endian {
            Endianness::Little => value.to_le_bytes(),
            Endianness::Big => value.to_be_bytes(),
        }
    }
}
