// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Miscellaneous integer helpers shared by the execbox crates.

/// An extension trait that adds `truncate` to truncate integers to a specific size of the same
/// signedness.
pub trait TruncateExt<To> {
    /// Truncate `self` to `To`, taking only lower-order bits.
    fn truncate(self) -> To;
}

macro_rules! impl_truncate {
    ($from:ty, $to:ty) => {
        impl TruncateExt<$to> for $from {
            #[inline(always)]
            fn truncate(self) -> $to {
                <$to>::from_le_bytes(
                    self.to_le_bytes()[..const { core::mem::size_of::<$to>() }]
                        .try_into()
                        .expect("guaranteed to be optimized out"),
                )
            }
        }
    };
}

impl_truncate! { u64, u32 }
impl_truncate! { u64, u16 }
impl_truncate! { u64, u8 }
impl_truncate! { u32, u16 }
impl_truncate! { u32, u8 }

/// Round `value` down to a multiple of `align`.
///
/// `align` must be a power of two.
#[inline]
pub const fn align_down(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

/// Round `value` up to a multiple of `align`, or `None` on overflow.
///
/// `align` must be a power of two.
#[inline]
pub const fn align_up(value: u64, align: u64) -> Option<u64> {
    debug_assert!(align.is_power_of_two());
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}
