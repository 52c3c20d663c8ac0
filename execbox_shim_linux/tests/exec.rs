// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod common;

use common::{Behavior, ENTRY, RecordingLoader, bprm_for, executable};
use execbox::platform::TargetAccessProvider as _;
use execbox::platform::guest::GuestMemory;
use execbox::platform::page_mgmt::MemoryRegionPermissions;
use execbox_common_linux::abi::TargetAbi;
use execbox_common_linux::errno::Errno;
use execbox_common_linux::loader::ImageInfo;
use execbox_common_linux::regs::I386Regs;
use execbox_shim_linux::loader::{
    BinaryFormat, Credentials, ExecContext, ExecError, FixedLayoutError, FormatLoaders,
    loader_exec,
};

const CGC_HEADER: &[u8] = b"\x7fCGC\x01\x01\x01\x43\x01\x4d\x65\x72\x69\x6e\x6f\x00";

fn caller() -> Credentials {
    Credentials::current()
}

#[test]
fn end_to_end_stack_layout() {
    let exe = executable(CGC_HEADER, 0o755);
    let abi = TargetAbi::I386;
    let mut mem = GuestMemory::new(abi.word, abi.page_size);
    let loader = RecordingLoader::new(Behavior::Succeed);
    let mut bprm = bprm_for(&exe, &["prog", "-x"], &["A=1"], &abi);
    let mut regs = I386Regs::default();
    let mut info = ImageInfo::default();

    let mut ctx = ExecContext {
        platform: &mut mem,
        abi,
        loaders: FormatLoaders::new(&loader),
        credentials: caller(),
    };
    let retval = loader_exec(&mut bprm, &mut ctx, &mut regs, &mut info).unwrap();
    assert_eq!(retval, 0);
    assert_eq!(loader.calls.get(), 1);
    assert!(bprm.pages.is_empty());
    assert_eq!(bprm.buf[..CGC_HEADER.len()], *CGC_HEADER);
    assert!(bprm.buf[CGC_HEADER.len()..].iter().all(|&b| b == 0));

    let sp = info.start_stack;
    assert_eq!(mem.get_user_ual(sp).unwrap(), 2);
    // argc, then argv (3 slots), then envp (2 slots), ascending.
    assert_eq!(info.arg_strings, sp + 4);
    assert_eq!(info.env_strings, sp + 4 + 3 * 4);
    assert_eq!(mem.get_user_ual(info.arg_strings + 2 * 4).unwrap(), 0);
    assert_eq!(mem.get_user_ual(info.env_strings + 4).unwrap(), 0);
    let argv0 = mem.get_user_ual(info.arg_strings).unwrap();
    let argv1 = mem.get_user_ual(info.arg_strings + 4).unwrap();
    let envp0 = mem.get_user_ual(info.env_strings).unwrap();
    assert_eq!(mem.read_cstring(argv0).unwrap(), b"prog");
    assert_eq!(mem.read_cstring(argv1).unwrap(), b"-x");
    assert_eq!(mem.read_cstring(envp0).unwrap(), b"A=1");
    assert_eq!(info.arg_end - info.arg_start, 5 + 3);

    assert_eq!(u64::from(regs.esp), sp);
    assert_eq!(u64::from(regs.eip), ENTRY);
    assert_eq!(regs.edx, 0);
    assert_eq!(regs.ecx, 0);
}

#[test]
fn unrecognized_format_leaks_nothing() {
    let exe = executable(b"#!/bin/sh\necho hi\n", 0o755);
    let abi = TargetAbi::I386;
    let mut mem = GuestMemory::new(abi.word, abi.page_size);
    let loader = RecordingLoader::new(Behavior::Succeed);
    let mut bprm = bprm_for(&exe, &["prog"], &[], &abi);
    let mut ctx = ExecContext {
        platform: &mut mem,
        abi,
        loaders: FormatLoaders::new(&loader).with_flat(&loader),
        credentials: caller(),
    };
    let err = loader_exec(
        &mut bprm,
        &mut ctx,
        &mut I386Regs::default(),
        &mut ImageInfo::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ExecError::UnrecognizedFormat));
    assert_eq!(err.as_neg(), Errno::ENOEXEC.as_neg());
    assert_eq!(loader.calls.get(), 0);
    assert!(bprm.pages.is_empty());
    assert_eq!(mem.mapped_pages(), 0);
}

#[test]
fn non_executable_files_are_rejected_before_dispatch() {
    let abi = TargetAbi::I386;
    let loader = RecordingLoader::new(Behavior::Succeed);
    let exe = executable(CGC_HEADER, 0o644);
    let dir = tempfile::tempdir().unwrap();

    let mut bprms = vec![bprm_for(&exe, &["prog"], &[], &abi)];
    bprms.push(execbox_shim_linux::loader::BinaryParameters::new(
        std::fs::File::open(dir.path()).unwrap(),
        dir.path().display().to_string(),
        Vec::new(),
        Vec::new(),
        &abi,
    ));
    for mut bprm in bprms {
        let mut mem = GuestMemory::new(abi.word, abi.page_size);
        let mut ctx = ExecContext {
            platform: &mut mem,
            abi,
            loaders: FormatLoaders::new(&loader),
            credentials: caller(),
        };
        let err = loader_exec(
            &mut bprm,
            &mut ctx,
            &mut I386Regs::default(),
            &mut ImageInfo::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ExecError::Prepare(e) if e == Errno::EACCES));
        assert_eq!(err.as_neg(), -13);
    }
    assert_eq!(loader.calls.get(), 0);
}

#[test]
fn loader_failure_releases_staged_pages() {
    let exe = executable(CGC_HEADER, 0o755);
    let abi = TargetAbi::I386;
    let mut mem = GuestMemory::new(abi.word, abi.page_size);
    let loader = RecordingLoader::new(Behavior::FailAfterStaging(Errno::ENOMEM));
    let mut bprm = bprm_for(&exe, &["prog", "-x"], &["A=1"], &abi);
    let mut regs = I386Regs::default();
    let mut ctx = ExecContext {
        platform: &mut mem,
        abi,
        loaders: FormatLoaders::new(&loader),
        credentials: caller(),
    };
    let err = loader_exec(&mut bprm, &mut ctx, &mut regs, &mut ImageInfo::default()).unwrap_err();
    assert!(matches!(err, ExecError::Load(BinaryFormat::Elf, e) if e == Errno::ENOMEM));
    assert_eq!(loader.calls.get(), 1);
    assert!(bprm.pages.is_empty());
    // Registers are left alone on failure.
    assert_eq!(regs, I386Regs::default());
}

#[test]
fn flat_binaries_need_target_support_and_a_loader() {
    let exe = executable(b"bFLT\x00\x00\x00\x04", 0o755);
    let primary = RecordingLoader::new(Behavior::Succeed);
    let mut flat = RecordingLoader::new(Behavior::Succeed);
    flat.push_ptr = true;

    // m68k with a flat loader: dispatched to it.
    let abi = TargetAbi::M68K;
    let mut mem = GuestMemory::new(abi.word, abi.page_size);
    let mut bprm = bprm_for(&exe, &["prog"], &[], &abi);
    let mut info = ImageInfo::default();
    let mut ctx = ExecContext {
        platform: &mut mem,
        abi,
        loaders: FormatLoaders::new(&primary).with_flat(&flat),
        credentials: caller(),
    };
    loader_exec(&mut bprm, &mut ctx, &mut I386Regs::default(), &mut info).unwrap();
    assert_eq!((primary.calls.get(), flat.calls.get()), (0, 1));
    // Big-endian argc, followed by the pushed argv and envp table addresses.
    let mut raw = [0u8; 4];
    mem.read_bytes(info.start_stack, &mut raw).unwrap();
    assert_eq!(raw, [0, 0, 0, 1]);
    assert_eq!(
        mem.get_user_ual(info.start_stack + 4).unwrap(),
        info.arg_strings
    );
    assert_eq!(
        mem.get_user_ual(info.start_stack + 8).unwrap(),
        info.env_strings
    );

    // m68k without a flat loader, and i386 even with one: unrecognized.
    for (abi, loaders) in [
        (TargetAbi::M68K, FormatLoaders::<GuestMemory>::new(&primary)),
        (
            TargetAbi::I386,
            FormatLoaders::<GuestMemory>::new(&primary).with_flat(&flat),
        ),
    ] {
        let mut mem = GuestMemory::new(abi.word, abi.page_size);
        let mut bprm = bprm_for(&exe, &["prog"], &[], &abi);
        let mut ctx = ExecContext {
            platform: &mut mem,
            abi,
            loaders,
            credentials: caller(),
        };
        let err = loader_exec(
            &mut bprm,
            &mut ctx,
            &mut I386Regs::default(),
            &mut ImageInfo::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ExecError::UnrecognizedFormat));
    }
    assert_eq!((primary.calls.get(), flat.calls.get()), (0, 1));
}

#[test]
fn cgc_fixed_layout() {
    let exe = executable(CGC_HEADER, 0o755);
    let abi = TargetAbi::CGC_I386;
    let mut mem = GuestMemory::new(abi.word, abi.page_size);
    let loader = RecordingLoader::new(Behavior::Succeed);
    let mut bprm = bprm_for(&exe, &["prog"], &["A=1"], &abi);
    let mut regs = I386Regs::default();
    let mut info = ImageInfo::default();
    let mut ctx = ExecContext {
        platform: &mut mem,
        abi,
        loaders: FormatLoaders::new(&loader),
        credentials: caller(),
    };
    loader_exec(&mut bprm, &mut ctx, &mut regs, &mut info).unwrap();

    assert_eq!(info.start_stack, 0xBAAA_AFFC);
    assert_eq!(info.stack_limit, 0xBAAA_B000);
    assert_eq!(regs.esp, 0xBAAA_AFFC);
    assert_eq!(regs.ecx, 0x4347_C000);
    assert_eq!(u64::from(regs.eip), ENTRY);

    // The flag page is filled with 0x4342434C in target (little-endian) order.
    let mut page = vec![0u8; 4096];
    mem.read_bytes(0x4347_C000, &mut page).unwrap();
    assert!(page.chunks(4).all(|word| word == b"LCBC"));
    assert_eq!(mem.get_user_ual(0x4347_CFFC).unwrap(), 0x4342_434C);
    assert_eq!(
        mem.permissions_at(0x4347_C000),
        Some(MemoryRegionPermissions::READ | MemoryRegionPermissions::WRITE)
    );

    // The loader's stack spans 33 pages, so 33 pages are mapped below 0xBAAAB000.
    let rwx = MemoryRegionPermissions::READ
        | MemoryRegionPermissions::WRITE
        | MemoryRegionPermissions::EXEC;
    assert_eq!(mem.permissions_at(0xBAAA_AFFC), Some(rwx));
    assert_eq!(mem.permissions_at(0xBAAA_B000 - 33 * 4096), Some(rwx));
    assert!(!mem.is_mapped(0xBAAA_B000 - 34 * 4096));
    assert!(!mem.is_mapped(0xBAAA_B000));
}

#[test]
fn cgc_layout_is_skipped_when_loading_fails() {
    let exe = executable(CGC_HEADER, 0o755);
    let abi = TargetAbi::CGC_I386;
    let mut mem = GuestMemory::new(abi.word, abi.page_size);
    let loader = RecordingLoader::new(Behavior::FailAfterStaging(Errno::EINVAL));
    let mut bprm = bprm_for(&exe, &["prog"], &[], &abi);
    let mut regs = I386Regs::default();
    let mut ctx = ExecContext {
        platform: &mut mem,
        abi,
        loaders: FormatLoaders::new(&loader),
        credentials: caller(),
    };
    let err = loader_exec(&mut bprm, &mut ctx, &mut regs, &mut ImageInfo::default()).unwrap_err();
    assert_eq!(Errno::from(err), Errno::EINVAL);
    assert_eq!(mem.mapped_pages(), 0);
    assert_eq!(regs.ecx, 0);
}

#[test]
fn cgc_layout_rejects_inverted_stack_bounds() {
    let exe = executable(CGC_HEADER, 0o755);
    let abi = TargetAbi::CGC_I386;
    let mut mem = GuestMemory::new(abi.word, abi.page_size);
    let loader = RecordingLoader::new(Behavior::Report(0x1000, 0x2000));
    let mut bprm = bprm_for(&exe, &["prog"], &[], &abi);
    let mut regs = I386Regs::default();
    let mut ctx = ExecContext {
        platform: &mut mem,
        abi,
        loaders: FormatLoaders::new(&loader),
        credentials: caller(),
    };
    let err = loader_exec(&mut bprm, &mut ctx, &mut regs, &mut ImageInfo::default()).unwrap_err();
    assert!(matches!(
        err,
        ExecError::FixedLayout(FixedLayoutError::Stack(e)) if e == Errno::ENOMEM
    ));
    assert_eq!(regs.esp, 0);
}
