// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! This module contains the loader for the execbox shim.

pub mod binprm;
pub mod exec;
pub mod format;
pub mod stack;


pub use binprm::{ArgPages, BinaryFile, BinaryParameters, Credentials, FileStat, prepare_binprm};
pub use exec::{ExecContext, ExecError, FixedLayoutError, loader_exec};
pub use format::{BinaryFormat, FormatLoader, FormatLoaders};
pub use stack::{copy_strings, create_stack, loader_build_argptr, setup_arg_pages};

/// Size of the header buffer handed to format sniffing and format loaders.
pub const BPRM_BUF_SIZE: usize = 128;

/// Maximum number of pages the argument and environment strings may occupy.
pub const MAX_ARG_PAGES: usize = 33;

/// Default size of the initial stack.
pub const DEFAULT_STACK_SIZE: usize = 8 * 1024 * 1024; // 8 MB
