// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Error number constants for [`super::Errno`].
//!
//! This particular module itself is private, but defines all of the below within the public
//! [`super::Errno`] type, so as to have them all be exposed, but still keep the table restricted to
//! this single file. Only the numbers the exec path can produce are named; every other valid
//! number is still representable and prints with a generic description.

impl super::Errno {
    /// Human-friendly readable version of `self`.
    pub const fn as_str(self) -> &'static str {
        match self.value.get() {
            1 => "EPERM: Operation not permitted",
            2 => "ENOENT: No such file or directory",
            4 => "EINTR: Interrupted system call",
            5 => "EIO: Input/output error",
            7 => "E2BIG: Argument list too long",
            8 => "ENOEXEC: Exec format error",
            9 => "EBADF: Bad file descriptor",
            11 => "EAGAIN/EWOULDBLOCK: Resource temporarily unavailable",
            12 => "ENOMEM: Cannot allocate memory",
            13 => "EACCES: Permission denied",
            14 => "EFAULT: Bad address",
            17 => "EEXIST: File exists",
            20 => "ENOTDIR: Not a directory",
            21 => "EISDIR: Is a directory",
            22 => "EINVAL: Invalid argument",
            26 => "ETXTBSY: Text file busy",
            27 => "EFBIG: File too large",
            36 => "ENAMETOOLONG: File name too long",
            38 => "ENOSYS: Function not implemented",
            40 => "ELOOP: Too many levels of symbolic links",
            75 => "EOVERFLOW: Value too large for defined data type",
            95 => "ENOTSUP/EOPNOTSUPP: Operation not supported",
            _ => "Unknown error",
        }
    }

    /// Operation not permitted
    pub const EPERM: Self = Self::from_const(1);
    /// No such file or directory
    pub const ENOENT: Self = Self::from_const(2);
    /// Interrupted system call
    pub const EINTR: Self = Self::from_const(4);
    /// Input/output error
    pub const EIO: Self = Self::from_const(5);
    /// Argument list too long
    pub const E2BIG: Self = Self::from_const(7);
    /// Exec format error
    pub const ENOEXEC: Self = Self::from_const(8);
    /// Bad file descriptor
    pub const EBADF: Self = Self::from_const(9);
    /// Resource temporarily unavailable
    pub const EAGAIN: Self = Self::from_const(11);
    /// Cannot allocate memory
    pub const ENOMEM: Self = Self::from_const(12);
    /// Permission denied
    pub const EACCES: Self = Self::from_const(13);
    /// Bad address
    pub const EFAULT: Self = Self::from_const(14);
    /// File exists
    pub const EEXIST: Self = Self::from_const(17);
    /// Not a directory
    pub const ENOTDIR: Self = Self::from_const(20);
    /// Is a directory
    pub const EISDIR: Self = Self::from_const(21);
    /// Invalid argument
    pub const EINVAL: Self = Self::from_const(22);
    /// Text file busy
    pub const ETXTBSY: Self = Self::from_const(26);
    /// File too large
    pub const EFBIG: Self = Self::from_const(27);
    /// File name too long
    pub const ENAMETOOLONG: Self = Self::from_const(36);
    /// Function not implemented
    pub const ENOSYS: Self = Self::from_const(38);
    /// Too many levels of symbolic links
    pub const ELOOP: Self = Self::from_const(40);
    /// Value too large for defined data type
    pub const EOVERFLOW: Self = Self::from_const(75);
    /// Operation not supported
    pub const EOPNOTSUPP: Self = Self::from_const(95);

    /// The largest error number Linux defines.
    pub const MAX: Self = Self::from_const(133);
}
