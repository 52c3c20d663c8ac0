// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::io::Write as _;
use std::os::unix::fs::PermissionsExt as _;

use clap::{CommandFactory as _, Parser as _};
use execbox_runner_linux_userland::{AbiChoice, CliArgs, InitialRegisters, build_image};
use execbox_shim_linux::loader::{BinaryFormat, DEFAULT_STACK_SIZE};
use tempfile::NamedTempFile;

fn executable(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents).unwrap();
    file.flush().unwrap();
    std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o755)).unwrap();
    file
}

fn cgc_binary() -> NamedTempFile {
    let mut contents = vec![0x7f, b'C', b'G', b'C'];
    contents.resize(256, 0);
    executable(&contents)
}

fn args(exe: &NamedTempFile, rest: &[&str]) -> Vec<String> {
    let path = exe.path().to_str().unwrap().to_owned();
    let mut out = vec!["execbox".to_owned()];
    out.extend(rest.iter().map(|s| (*s).to_owned()));
    out.push(path);
    out
}

#[test]
fn cli_definition_is_consistent() {
    CliArgs::command().debug_assert();
}

#[test]
fn cli_defaults_and_trailing_arguments() {
    let cli = CliArgs::parse_from(["execbox", "--env", "A=1", "./prog", "--version", "-v"]);
    assert_eq!(cli.program_and_arguments, ["./prog", "--version", "-v"]);
    assert_eq!(cli.environment_variables, ["A=1"]);
    assert_eq!(cli.abi, AbiChoice::I386);
    assert_eq!(cli.stack_size, DEFAULT_STACK_SIZE);
    assert_eq!(cli.verbose, 0);
    assert!(!cli.forward_environment_variables);

    let cli = CliArgs::parse_from(["execbox", "-vv", "--abi", "x86-64", "./prog"]);
    assert_eq!(cli.abi, AbiChoice::X86_64);
    assert_eq!(cli.verbose, 2);

    assert!(CliArgs::try_parse_from(["execbox"]).is_err());
}

#[test]
fn i386_image_reads_back_arguments_and_environment() {
    let exe = cgc_binary();
    let mut argv = args(&exe, &["--env", "HOME=/home/user", "--env", "TERM=dumb"]);
    argv.extend(["one".to_owned(), "two".to_owned()]);
    let report = build_image(&CliArgs::parse_from(argv)).unwrap();

    assert_eq!(report.format, Some(BinaryFormat::Elf));
    assert_eq!(report.argc, 3);
    assert_eq!(report.argv.len(), 3);
    assert_eq!(report.argv[0], exe.path().to_str().unwrap().as_bytes());
    assert_eq!(report.argv[1], b"one");
    assert_eq!(report.argv[2], b"two");
    assert_eq!(report.envp, [b"HOME=/home/user".to_vec(), b"TERM=dumb".to_vec()]);
    assert!(report.flag_word.is_none());
    match &report.regs {
        InitialRegisters::I386(regs) => {
            assert_eq!(u64::from(regs.esp), report.info.start_stack);
            assert_eq!(regs.eip, 0);
            assert_eq!(regs.edx, 0);
        }
        InitialRegisters::Generic { .. } => panic!("i386 should use the i386 register file"),
    }

    let printed = report.to_string();
    assert!(printed.contains("format:      ELF"));
    assert!(printed.contains("argc:        3"));
    assert!(printed.contains("envp[1]:     \"TERM=dumb\""));
}

#[test]
fn cgc_image_has_flag_page_and_fixed_stack() {
    let exe = cgc_binary();
    let mut argv = args(&exe, &["--abi", "cgc", "--env", "A=1"]);
    argv.push("one".to_owned());
    let report = build_image(&CliArgs::parse_from(argv)).unwrap();

    assert_eq!(report.info.start_stack, 0xBAAA_AFFC);
    assert_eq!(report.argc, 2);
    assert_eq!(report.argv.len(), 2);
    assert_eq!(report.argv[1], b"one");
    assert_eq!(report.envp, [b"A=1".to_vec()]);
    assert_eq!(report.info.stack_limit, 0xBAAA_B000);
    assert_eq!(report.flag_word, Some(0x4342_434C));
    match &report.regs {
        InitialRegisters::I386(regs) => {
            assert_eq!(regs.esp, 0xBAAA_AFFC);
            assert_eq!(regs.ecx, 0x4347_C000);
        }
        InitialRegisters::Generic { .. } => panic!("cgc should use the i386 register file"),
    }
    let printed = report.to_string();
    assert!(printed.contains("flag word:   0x4342434c"));
    assert!(printed.contains("argc:        2"));
}

#[test]
fn x86_64_uses_generic_registers() {
    let exe = cgc_binary();
    let report = build_image(&CliArgs::parse_from(args(&exe, &["--abi", "x86-64"]))).unwrap();

    assert_eq!(report.argc, 1);
    assert_eq!(
        report.regs,
        InitialRegisters::Generic {
            sp: report.info.start_stack,
            pc: 0,
            flag_page: None,
        }
    );
}

#[test]
fn scripts_are_not_executable_formats() {
    let exe = executable(b"#!/bin/sh\necho hi\n");
    let err = build_image(&CliArgs::parse_from(args(&exe, &[]))).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("ENOEXEC"), "{msg}");
    assert!(msg.contains("(-8)"), "{msg}");
}

#[test]
fn missing_program_is_reported() {
    let err = build_image(&CliArgs::parse_from([
        "execbox",
        "/nonexistent/execbox/program",
    ]))
    .unwrap_err();
    assert!(err.to_string().contains("could not open"));
}
