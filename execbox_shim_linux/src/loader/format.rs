// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Executable format detection and the interface to format-specific loaders.

use execbox::platform::Provider;
use execbox_common_linux::abi::TargetAbi;
use execbox_common_linux::errno::Errno;
use execbox_common_linux::loader::ImageInfo;

use super::binprm::BinaryParameters;

/// The executable formats the exec path can dispatch to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryFormat {
    /// ELF-style container, recognized by its `\x7fCGC` magic.
    Elf,
    /// uClinux flat binary (`bFLT`).
    Flat,
}

impl BinaryFormat {
    pub const ELF_MAGIC: [u8; 4] = [0x7f, b'C', b'G', b'C'];
    pub const FLAT_MAGIC: [u8; 4] = *b"bFLT";

    /// Pick the format from the first four header bytes.
    ///
    /// Flat binaries are only recognized on targets that support them.
    pub fn sniff(buf: &[u8], abi: &TargetAbi) -> Option<Self> {
        let magic: [u8; 4] = buf.get(..4)?.try_into().ok()?;
        match magic {
            Self::ELF_MAGIC => Some(Self::Elf),
            Self::FLAT_MAGIC if abi.supports_flat => Some(Self::Flat),
            _ => None,
        }
    }
}

impl core::fmt::Display for BinaryFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            BinaryFormat::Elf => "ELF",
            BinaryFormat::Flat => "flat",
        })
    }
}

/// A format-specific loader.
///
/// On success the loader has mapped the image, laid out the initial stack (normally through
/// [`create_stack`](super::stack::create_stack)) and filled in `info`. On failure `info` is
/// unspecified.
pub trait FormatLoader<P: Provider> {
    fn load(
        &self,
        bprm: &mut BinaryParameters,
        info: &mut ImageInfo,
        platform: &mut P,
        abi: &TargetAbi,
    ) -> Result<usize, Errno>;
}

/// The loaders available to an exec attempt.
pub struct FormatLoaders<'a, P: Provider> {
    pub primary: &'a dyn FormatLoader<P>,
    pub flat: Option<&'a dyn FormatLoader<P>>,
}

impl<'a, P: Provider> FormatLoaders<'a, P> {
    pub fn new(primary: &'a dyn FormatLoader<P>) -> Self {
        Self {
            primary,
            flat: None,
        }
    }

    #[must_use]
    pub fn with_flat(mut self, flat: &'a dyn FormatLoader<P>) -> Self {
        self.flat = Some(flat);
        self
    }

    /// The loader registered for `format`, if any.
    pub fn get(&self, format: BinaryFormat) -> Option<&'a dyn FormatLoader<P>> {
        match format {
            BinaryFormat::Elf => Some(self.primary),
            BinaryFormat::Flat => self.flat,
        }
    }
}
