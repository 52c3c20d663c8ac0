// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! This module lays out the initial stack of the new process.
//!
//! The layout produced by [`create_stack`] is as follows, with `n` the target word size:
//! ```text
//!                           STACK LAYOUT
//! position            content                     size (bytes) + comment
//! ------------------------------------------------------------------------
//! stack pointer ->  [ argc = number of args ]     n
//!                   [ argv (pointer) ]            n   (only if pushed)
//!                   [ envp (pointer) ]            n   (only if pushed)
//!                   [ argv[0] (pointer) ]         n   (program name)
//!                   [ argv[..] (pointer) ]        n * x
//!                   [ argv[argc] (pointer) ]      n   (= NULL)
//!
//!                   [ envp[0] (pointer) ]         n
//!                   [ envp[..] (pointer) ]        n * y
//!                   [ envp[envc] (pointer) ]      n   (= NULL)
//!
//!                   [ padding ]                   0 - 15
//!
//!                   [ argument ASCIIZ strings ]   >= 0
//!                   [ environment ASCIIZ str. ]   >= 0
//!                   [ filename ASCIIZ ]           >= 1
//!                   [ end marker ]                n
//!
//!                   < top of stack >              0   (virtual)
//! ------------------------------------------------------------------------
//! ```
//!
//! The strings are first staged in host memory ([`copy_strings`]), then mirrored to the top of a
//! freshly mapped stack ([`setup_arg_pages`]), and only then are the pointer tables built
//! ([`loader_build_argptr`]), since that step measures every string in target memory.

use execbox::platform::page_mgmt::MemoryRegionPermissions;
use execbox::platform::{Fault, Provider, TargetAccessProvider, VerifyAccess};
use execbox::target::TargetAddr;
use execbox::utils::{align_down, align_up};
use execbox_common_linux::abi::TargetAbi;
use execbox_common_linux::errno::Errno;
use execbox_common_linux::loader::ImageInfo;
use execbox_common_linux::{MapFlags, ProtFlags};

use super::binprm::{ArgPages, BinaryParameters};
use super::MAX_ARG_PAGES;
use crate::syscalls::mm::{MapBacking, target_mmap};

/// Stack alignment required by libc ABI
const STACK_ALIGNMENT: u64 = 16;

/// Construct the envp and argv tables on the target stack.
///
/// `argc` argument strings followed by `envc` environment strings must already be resident,
/// back to back, at `stringp` in target memory. Starting at `sp`, reserves the envp table (at the
/// higher address), then the argv table, then, if `push_ptr`, the addresses of the envp and argv
/// tables (argv's lowest), and finally `argc`. Records the argument (and environment) string
/// spans and the table addresses in `info`, and returns the new stack pointer.
///
/// The whole table span is checked to be writable before anything is written; a [`Fault`] after
/// that point can only come from measuring a string that runs off the end of mapped memory.
pub fn loader_build_argptr<M: TargetAccessProvider>(
    mem: &mut M,
    info: &mut ImageInfo,
    envc: usize,
    argc: usize,
    sp: TargetAddr,
    stringp: TargetAddr,
    push_ptr: bool,
) -> Result<TargetAddr, Fault> {
    let n = mem.word_layout().bytes() as u64;
    let slots = (envc as u64 + 1) + (argc as u64 + 1) + if push_ptr { 2 } else { 0 } + 1;
    let table_len = slots.checked_mul(n).ok_or(Fault)?;
    let lowest = sp.checked_sub(table_len).ok_or(Fault)?;
    mem.lock_user(
        VerifyAccess::Write,
        lowest,
        usize::try_from(table_len).map_err(|_| Fault)?,
        |_| (),
    )
    .ok_or(Fault)?;

    let mut sp = sp;
    sp -= (envc as u64 + 1) * n;
    let mut envp = sp;
    sp -= (argc as u64 + 1) * n;
    let mut argv = sp;
    if push_ptr {
        sp -= n;
        mem.put_user_ual(sp, envp)?;
        sp -= n;
        mem.put_user_ual(sp, argv)?;
    }
    sp -= n;
    mem.put_user_ual(sp, argc as u64)?;
    info.arg_strings = argv;
    info.env_strings = envp;

    let mut stringp = stringp;
    info.arg_start = stringp;
    for _ in 0..argc {
        mem.put_user_ual(argv, stringp)?;
        argv += n;
        stringp = next_string(mem, stringp)?;
    }
    info.arg_end = stringp;
    mem.put_user_ual(argv, 0)?;

    info.env_start = stringp;
    for _ in 0..envc {
        mem.put_user_ual(envp, stringp)?;
        envp += n;
        stringp = next_string(mem, stringp)?;
    }
    info.env_end = stringp;
    mem.put_user_ual(envp, 0)?;

    tracing::trace!(
        argc,
        envc,
        push_ptr,
        sp = format_args!("{sp:#x}"),
        arg_start = format_args!("{:#x}", info.arg_start),
        "built argv/envp tables"
    );
    Ok(sp)
}

/// Address just past the terminator of the string at `stringp`.
fn next_string<M: TargetAccessProvider>(
    mem: &mut M,
    stringp: TargetAddr,
) -> Result<TargetAddr, Fault> {
    let len = mem.target_strlen(stringp)? as u64;
    stringp.checked_add(len + 1).ok_or(Fault)
}

/// Stage the filename, the environment and the arguments in `bprm.pages`, growing down from
/// `bprm.p`.
///
/// Each vector is copied last string first, so that in ascending address order the area reads:
/// argument strings, environment strings, filename. Fails with `E2BIG` once the staging area is
/// exhausted.
pub fn copy_strings(bprm: &mut BinaryParameters) -> Result<(), Errno> {
    let BinaryParameters {
        filename,
        argv,
        envp,
        pages,
        p,
        ..
    } = bprm;
    push_string(pages, p, filename.as_bytes())?;
    for s in envp.iter().rev() {
        push_string(pages, p, s.as_bytes())?;
    }
    for s in argv.iter().rev() {
        push_string(pages, p, s.as_bytes())?;
    }
    Ok(())
}

fn push_string(pages: &mut ArgPages, p: &mut TargetAddr, s: &[u8]) -> Result<(), Errno> {
    let len = s.len() as u64 + 1;
    if *p < len {
        return Err(Errno::E2BIG);
    }
    *p -= len;
    let offset = usize::try_from(*p).map_err(|_| Errno::E2BIG)?;
    write_staged(pages, offset, s);
    write_staged(pages, offset + s.len(), &[0]);
    Ok(())
}

fn write_staged(pages: &mut ArgPages, mut offset: usize, mut data: &[u8]) {
    let page_size = pages.page_size();
    while !data.is_empty() {
        let within = offset % page_size;
        let n = (page_size - within).min(data.len());
        pages.get_or_alloc(offset / page_size)[within..within + n].copy_from_slice(&data[..n]);
        offset += n;
        data = &data[n..];
    }
}

/// Map the initial stack and move the staged strings to its top.
///
/// The stack is `max(stack_size, MAX_ARG_PAGES pages)` long, with one inaccessible guard page
/// below it. Every populated staging page is copied to the matching page at the top of the stack
/// and freed. Sets `info.stack_limit` to the lowest usable stack address and returns the target
/// address of the first staged string.
pub fn setup_arg_pages<P: Provider>(
    bprm: &mut BinaryParameters,
    info: &mut ImageInfo,
    platform: &mut P,
    abi: &TargetAbi,
    stack_size: usize,
) -> Result<TargetAddr, Errno> {
    let page_size = bprm.pages.page_size() as u64;
    let arg_area = bprm.pages.capacity() as u64;
    let size = align_up((stack_size as u64).max(arg_area), page_size).ok_or(Errno::ENOMEM)?;
    let guard = page_size;
    let len = usize::try_from(size + guard).map_err(|_| Errno::ENOMEM)?;

    let base = target_mmap(
        platform,
        0,
        len,
        ProtFlags::PROT_READ_WRITE,
        MapFlags::MAP_PRIVATE | MapFlags::MAP_ANONYMOUS,
        MapBacking::Anonymous,
    )?;
    platform.update_permissions(base..base + guard, MemoryRegionPermissions::empty())?;
    info.stack_limit = base + guard;

    let mut stack_base = info.stack_limit + size - arg_area;
    let p = bprm.p + stack_base;
    for index in 0..MAX_ARG_PAGES {
        if let Some(page) = bprm.pages.take(index) {
            platform.memcpy_to_target(stack_base, &page)?;
        }
        stack_base += page_size;
    }
    tracing::debug!(
        abi = abi.name,
        stack_limit = format_args!("{:#x}", info.stack_limit),
        strings = format_args!("{p:#x}"),
        "mapped initial stack"
    );
    Ok(p)
}

/// Build the complete initial stack: stage the strings, map the stack, and lay out the pointer
/// tables below the strings.
///
/// On success `info.start_stack` holds the returned stack pointer and `bprm.p` the target address
/// of the strings.
pub fn create_stack<P: Provider>(
    bprm: &mut BinaryParameters,
    info: &mut ImageInfo,
    platform: &mut P,
    abi: &TargetAbi,
    stack_size: usize,
    push_ptr: bool,
) -> Result<TargetAddr, Errno> {
    copy_strings(bprm)?;
    let stringp = setup_arg_pages(bprm, info, platform, abi, stack_size)?;
    bprm.p = stringp;
    let sp = align_down(stringp, STACK_ALIGNMENT);
    let sp = loader_build_argptr(platform, info, bprm.envc, bprm.argc, sp, stringp, push_ptr)?;
    info.start_stack = sp;
    Ok(sp)
}
