// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::cell::Cell;
use std::ffi::CString;
use std::io::Write as _;
use std::os::unix::fs::PermissionsExt as _;

use execbox::platform::guest::GuestMemory;
use execbox::target::TargetAddr;
use execbox_common_linux::abi::TargetAbi;
use execbox_common_linux::errno::Errno;
use execbox_common_linux::loader::ImageInfo;
use execbox_shim_linux::loader::{
    BinaryParameters, FormatLoader, copy_strings, create_stack,
};
use tempfile::NamedTempFile;

/// An on-disk executable with the given contents and mode.
pub fn executable(contents: &[u8], mode: u32) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents).unwrap();
    file.flush().unwrap();
    std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(mode)).unwrap();
    file
}

pub fn cstrings(strs: &[&str]) -> Vec<CString> {
    strs.iter().map(|s| CString::new(*s).unwrap()).collect()
}

pub fn bprm_for(
    exe: &NamedTempFile,
    argv: &[&str],
    envp: &[&str],
    abi: &TargetAbi,
) -> BinaryParameters {
    let file = std::fs::File::open(exe.path()).unwrap();
    BinaryParameters::new(
        file,
        exe.path().display().to_string(),
        cstrings(argv),
        cstrings(envp),
        abi,
    )
}

/// What a [`RecordingLoader`] does once invoked.
pub enum Behavior {
    /// Lay out a stack and succeed.
    Succeed,
    /// Stage the strings, then fail with the given error.
    FailAfterStaging(Errno),
    /// Succeed, reporting the given `(start_stack, stack_limit)` without mapping anything.
    Report(TargetAddr, TargetAddr),
}

/// A format loader that lays out a stack (no segments) and counts its invocations.
pub struct RecordingLoader {
    pub calls: Cell<usize>,
    pub push_ptr: bool,
    pub behavior: Behavior,
}

pub const ENTRY: TargetAddr = 0x0804_8000;

impl RecordingLoader {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            calls: Cell::new(0),
            push_ptr: false,
            behavior,
        }
    }
}

impl FormatLoader<GuestMemory> for RecordingLoader {
    fn load(
        &self,
        bprm: &mut BinaryParameters,
        info: &mut ImageInfo,
        platform: &mut GuestMemory,
        abi: &TargetAbi,
    ) -> Result<usize, Errno> {
        self.calls.set(self.calls.get() + 1);
        match self.behavior {
            Behavior::Succeed => {
                create_stack(bprm, info, platform, abi, 0, self.push_ptr)?;
            }
            Behavior::FailAfterStaging(e) => {
                copy_strings(bprm)?;
                return Err(e);
            }
            Behavior::Report(start_stack, stack_limit) => {
                info.start_stack = start_stack;
                info.stack_limit = stack_limit;
            }
        }
        info.entry = ENTRY;
        Ok(0)
    }
}
