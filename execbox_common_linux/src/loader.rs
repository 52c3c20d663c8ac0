// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Description of a freshly loaded process image.

use execbox::target::TargetAddr;

/// Information about the loaded image, used to set up the process after loading the executable.
///
/// Zeroed before a format loader runs; written by the loader (and the argument layout routine it
/// calls); read-only once handed to register initialization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageInfo {
    /// The entry point, where execution begins.
    pub entry: TargetAddr,
    pub start_code: TargetAddr,
    pub end_code: TargetAddr,
    pub start_data: TargetAddr,
    pub end_data: TargetAddr,
    pub start_brk: TargetAddr,
    /// The program break (end of all mapped segments).
    pub brk: TargetAddr,
    /// Initial target stack pointer.
    pub start_stack: TargetAddr,
    /// Lowest valid stack address.
    pub stack_limit: TargetAddr,
    /// First byte of the argument strings.
    pub arg_start: TargetAddr,
    /// One past the last byte (terminator included) of the argument strings.
    pub arg_end: TargetAddr,
    pub env_start: TargetAddr,
    pub env_end: TargetAddr,
    /// Address of the argv table.
    pub arg_strings: TargetAddr,
    /// Address of the envp table.
    pub env_strings: TargetAddr,
}

impl ImageInfo {
    /// Byte length of the argument string span.
    pub fn arg_span_len(&self) -> u64 {
        self.arg_end - self.arg_start
    }
}
