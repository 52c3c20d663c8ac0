// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Initial register state of the emulated CPU.

use execbox::target::TargetAddr;
use execbox::utils::TruncateExt as _;

use crate::loader::ImageInfo;

/// The register-state record that the exec path seeds before the emulated CPU starts.
pub trait TargetRegisters {
    /// Set the registers a new thread starts with, from the final image description.
    fn init_thread(&mut self, info: &ImageInfo);

    /// Expose the address of the ABI flag page to the program, in the register the ABI
    /// designates for it.
    fn set_flag_page(&mut self, addr: TargetAddr);
}

/// General-purpose registers of a 32-bit x86 target.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct I386Regs {
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub eax: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u32,
}

impl TargetRegisters for I386Regs {
    fn init_thread(&mut self, info: &ImageInfo) {
        self.esp = info.start_stack.truncate();
        self.eip = info.entry.truncate();
        // A non-zero edx would be taken as an atexit handler by the libc startup code.
        self.edx = 0;
        self.cs = 0x23; // __USER_CS
        self.ss = 0x2b; // __USER_DS
    }

    fn set_flag_page(&mut self, addr: TargetAddr) {
        self.ecx = addr.truncate();
    }
}
