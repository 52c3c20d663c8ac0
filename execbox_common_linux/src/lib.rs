// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Common Linux-y items suitable for execbox

#![allow(non_camel_case_types)]

use execbox::platform::page_mgmt::MemoryRegionPermissions;

pub mod abi;
pub mod errno;
pub mod loader;
pub mod regs;

bitflags::bitflags! {
    /// Desired memory protection of a memory mapping.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct ProtFlags: core::ffi::c_int {
        /// Pages cannot be accessed.
        const PROT_NONE = 0;
        /// Pages can be read.
        const PROT_READ = 1 << 0;
        /// Pages can be written.
        const PROT_WRITE = 1 << 1;
        /// Pages can be executed
        const PROT_EXEC = 1 << 2;
        /// <https://docs.rs/bitflags/*/bitflags/#externally-defined-flags>
        const _ = !0;

        const PROT_READ_EXEC = Self::PROT_READ.bits() | Self::PROT_EXEC.bits();
        const PROT_READ_WRITE = Self::PROT_READ.bits() | Self::PROT_WRITE.bits();
        const PROT_READ_WRITE_EXEC = Self::PROT_READ_WRITE.bits() | Self::PROT_EXEC.bits();
    }
}

impl From<ProtFlags> for MemoryRegionPermissions {
    fn from(prot: ProtFlags) -> Self {
        let mut perms = MemoryRegionPermissions::empty();
        perms.set(
            MemoryRegionPermissions::READ,
            prot.contains(ProtFlags::PROT_READ),
        );
        perms.set(
            MemoryRegionPermissions::WRITE,
            prot.contains(ProtFlags::PROT_WRITE),
        );
        perms.set(
            MemoryRegionPermissions::EXEC,
            prot.contains(ProtFlags::PROT_EXEC),
        );
        perms
    }
}

bitflags::bitflags! {
    /// Additional parameters for [`mmap`](https://man7.org/linux/man-pages/man2/mmap.2.html).
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct MapFlags: core::ffi::c_int {
        /// Share this mapping. Mutually exclusive with `MAP_PRIVATE`.
        const MAP_SHARED = 0x1;
        /// Changes are private
        const MAP_PRIVATE = 0x2;
        /// Interpret addr exactly
        const MAP_FIXED = 0x10;
        /// don't use a file
        const MAP_ANONYMOUS = 0x20;
        /// Synonym for [`MAP_ANONYMOUS`](Self::MAP_ANONYMOUS)
        const MAP_ANON = 0x20;
        /// Used for stacks; indicates to the kernel that the mapping should extend downward in memory.
        const MAP_GROWSDOWN = 0x100;
        /// Do not reserve swap space for this mapping.
        const MAP_NORESERVE = 0x4000;
        /// Allocate the mapping at an address suitable for a process or thread stack.
        const MAP_STACK = 0x20000;
        /// Place the mapping at exactly the address specified in `addr`, but never clobber an existing range.
        const MAP_FIXED_NOREPLACE = 0x100000;
        /// <https://docs.rs/bitflags/*/bitflags/#externally-defined-flags>
        const _ = !0;
    }
}

bitflags::bitflags! {
    /// `st_mode` bits: file type and `S_I*` permission constants.
    #[repr(transparent)]
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct Mode: u32 {
        /// `S_IFMT`: mask of the file type bits
        const IFMT = 0o170000;
        /// `S_IFREG`: regular file
        const IFREG = 0o100000;
        /// `S_IFDIR`: directory
        const IFDIR = 0o040000;
        /// `S_ISUID`: set-user-ID bit
        const SUID = 0o0004000;
        /// `S_ISGID`: set-group-ID bit (see inode(7)).
        const SGID = 0o0002000;
        /// `S_ISVTX`: sticky bit (see inode(7)).
        const SVTX = 0o0001000;
        /// `S_IRUSR`: user has read permission
        const RUSR = 0o00400;
        /// `S_IWUSR`: user has write permission
        const WUSR = 0o00200;
        /// `S_IXUSR`: user has execute permission
        const XUSR = 0o00100;
        /// `S_IRGRP`: group has read permission
        const RGRP = 0o00040;
        /// `S_IWGRP`: group has write permission
        const WGRP = 0o00020;
        /// `S_IXGRP`: group has execute permission
        const XGRP = 0o00010;
        /// `S_IROTH`: others have read permission
        const ROTH = 0o00004;
        /// `S_IWOTH`: others have write permission
        const WOTH = 0o00002;
        /// `S_IXOTH`: others have execute permission
        const XOTH = 0o00001;
        /// <https://docs.rs/bitflags/*/bitflags/#externally-defined-flags>
        const _ = !0;

        /// Any of the three execute bits
        const XANY = Self::XUSR.bits() | Self::XGRP.bits() | Self::XOTH.bits();
    }
}

impl Mode {
    /// Whether the file type bits denote a regular file.
    pub fn is_regular_file(self) -> bool {
        self.bits() & Self::IFMT.bits() == Self::IFREG.bits()
    }

    /// Whether at least one of user, group or other may execute.
    pub fn any_executable(self) -> bool {
        self.intersects(Self::XANY)
    }

    /// Set-group-ID only takes effect together with group-execute; without it the bit denotes
    /// mandatory locking.
    pub fn sgid_effective(self) -> bool {
        self.contains(Self::SGID | Self::XGRP)
    }
}
