// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The exec path of an emulated Linux process.
//!
//! Given an open executable and its argument and environment vectors, [`loader::loader_exec`]
//! validates the file, dispatches it to a format loader by its magic bytes, lets that loader lay
//! out the initial stack in the target address space, applies any ABI-mandated fixed layout and
//! finally seeds the initial registers. All target memory is reached through the
//! [`execbox::platform::Provider`] the caller supplies.

pub mod loader;
pub mod syscalls;
