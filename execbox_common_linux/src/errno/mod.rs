// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Error handling. See [`Errno`].

#![allow(
    clippy::match_same_arms,
    reason = "in this one module, we want to spell out every mapping, just to keep consistency"
)]

use execbox::platform::Fault;
use execbox::platform::page_mgmt::{AllocationError, DeallocationError, PermissionUpdateError};
use thiserror::Error;

mod generated;


/// Linux error numbers
///
/// This is a transparent wrapper around Linux error numbers (i.e., `i32`s) intended
/// to provide some type safety by expecting explicit conversions to/from `i32`s.
#[derive(PartialEq, Eq, Clone, Copy, Error)]
pub struct Errno {
    value: core::num::NonZeroU8,
}

impl From<Errno> for i32 {
    fn from(e: Errno) -> Self {
        e.value.get().into()
    }
}

impl core::fmt::Display for Errno {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl core::fmt::Debug for Errno {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Errno({} = {})", self.value.get(), self.as_str())
    }
}

impl Errno {
    /// Provide the negative integer representation of the error
    ///
    /// ```
    /// # use execbox_common_linux::errno::Errno;
    /// assert_eq!(-8, Errno::ENOEXEC.as_neg());
    /// // Direct conversion to i32 will give the positive variant
    /// assert_eq!(8, i32::from(Errno::ENOEXEC));
    /// ```
    pub fn as_neg(self) -> i32 {
        -i32::from(self)
    }

    /// Helper that keeps the associated constants on [`Errno`] readable.
    const fn from_const(v: u8) -> Self {
        match core::num::NonZeroU8::new(v) {
            Some(value) => Self { value },
            None => panic!("errno constants are non-zero"),
        }
    }
}

/// Errors when converting to an [`Errno`]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ErrnoConversionError {
    #[error("Expected positive error number")]
    ExpectedPositive,
    #[error("Error number cannot be zero")]
    ExpectedNonZero,
    #[error("Error number is unexpectedly large")]
    ExpectedSmallEnough,
}

impl TryFrom<i32> for Errno {
    type Error = ErrnoConversionError;
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        let value: u32 = value
            .try_into()
            .or(Err(ErrnoConversionError::ExpectedPositive))?;
        Self::try_from(value)
    }
}
impl TryFrom<u32> for Errno {
    type Error = ErrnoConversionError;
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        let value: u8 = value
            .try_into()
            .or(Err(ErrnoConversionError::ExpectedSmallEnough))?;
        Self::try_from(value)
    }
}
impl TryFrom<u8> for Errno {
    type Error = ErrnoConversionError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let value =
            core::num::NonZeroU8::new(value).ok_or(ErrnoConversionError::ExpectedNonZero)?;
        if value.get() <= Self::MAX.value.get() {
            Ok(Self { value })
        } else {
            Err(ErrnoConversionError::ExpectedSmallEnough)
        }
    }
}

/// Host I/O errors carry their OS error number through unchanged; anything without one (or with
/// one out of range) becomes `EIO`.
impl From<std::io::Error> for Errno {
    fn from(value: std::io::Error) -> Self {
        value
            .raw_os_error()
            .and_then(|raw| Errno::try_from(raw).ok())
            .unwrap_or(Errno::EIO)
    }
}

impl From<Fault> for Errno {
    fn from(Fault: Fault) -> Self {
        Errno::EFAULT
    }
}

impl From<AllocationError> for Errno {
    fn from(value: AllocationError) -> Self {
        match value {
            AllocationError::Unaligned => Errno::EINVAL,
            AllocationError::InvalidRange => Errno::EINVAL,
            AllocationError::OutOfMemory => Errno::ENOMEM,
            AllocationError::AddressInUse => Errno::EEXIST,
            _ => unimplemented!(),
        }
    }
}

impl From<DeallocationError> for Errno {
    fn from(value: DeallocationError) -> Self {
        match value {
            DeallocationError::Unaligned => Errno::EINVAL,
            DeallocationError::AlreadyUnallocated => Errno::EINVAL,
            _ => unimplemented!(),
        }
    }
}

impl From<PermissionUpdateError> for Errno {
    fn from(value: PermissionUpdateError) -> Self {
        match value {
            PermissionUpdateError::Unaligned => Errno::EINVAL,
            PermissionUpdateError::Unallocated => Errno::ENOMEM,
            _ => unimplemented!(),
        }
    }
}
