// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! # execbox
//!
//! > Building the initial process image of an emulated program.
//!
//! The host computes with native arithmetic while everything it lays out lives in a *target*
//! address space whose word width and byte order may differ from its own. This crate provides the
//! pieces that keep those two worlds apart: a description of the target word
//! ([`target::WordLayout`]), the provider traits through which every target-memory access and
//! mapping must go ([`platform`]), and a host-backed guest address space implementing them
//! ([`platform::guest::GuestMemory`]).
//!
//! The exec pipeline itself lives in `execbox_shim_linux`.

pub mod platform;
pub mod target;
pub mod utils;
