// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Syscall-shaped entry points used while building a process image.

pub mod mm;
