// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Build the initial process image of a target program inside a host-backed guest address space
//! and report what the program would start with.

use std::ffi::CString;
use std::fmt;
use std::path::Path;

use anyhow::{Context as _, Result, anyhow};
use clap::Parser;
use execbox::platform::TargetAccessProvider as _;
use execbox::platform::guest::GuestMemory;
use execbox::target::{TargetAddr, WordLayout};
use execbox_common_linux::abi::TargetAbi;
use execbox_common_linux::errno::Errno;
use execbox_common_linux::loader::ImageInfo;
use execbox_common_linux::regs::{I386Regs, TargetRegisters};
use execbox_shim_linux::loader::{
    BinaryFormat, BinaryParameters, Credentials, DEFAULT_STACK_SIZE, ExecContext, FormatLoader,
    FormatLoaders, create_stack, loader_exec,
};

/// Build the initial process image of a program for an emulated target
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// The program and arguments passed to it (e.g., `./prog --version`)
    #[arg(
        required = true,
        trailing_var_arg = true,
        value_hint = clap::ValueHint::CommandWithArguments
    )]
    pub program_and_arguments: Vec<String>,
    /// Environment variables passed to the program (`K=V` pairs; can be invoked multiple times)
    #[arg(long = "env")]
    pub environment_variables: Vec<String>,
    /// Forward the existing environment variables
    #[arg(long = "forward-env")]
    pub forward_environment_variables: bool,
    /// Target ABI to build the image for
    #[arg(value_enum, long, default_value = "i386")]
    pub abi: AbiChoice,
    /// Size of the initial stack, in bytes
    #[arg(long = "stack-size", default_value_t = DEFAULT_STACK_SIZE)]
    pub stack_size: usize,
    /// Increase verbosity (pass multiple times to increase)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Targets selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AbiChoice {
    /// 32-bit little-endian x86
    I386,
    /// 32-bit x86 with the CGC fixed stack and flag page
    Cgc,
    /// 32-bit big-endian m68k, with flat binary support
    M68k,
    /// 64-bit little-endian x86
    #[value(name = "x86-64")]
    X86_64,
}

impl AbiChoice {
    pub fn abi(self) -> TargetAbi {
        match self {
            AbiChoice::I386 => TargetAbi::I386,
            AbiChoice::Cgc => TargetAbi::CGC_I386,
            AbiChoice::M68k => TargetAbi::M68K,
            AbiChoice::X86_64 => TargetAbi::X86_64,
        }
    }
}

/// A format loader that maps no segments: it only lays out the initial stack and leaves the entry
/// point at zero.
pub struct StackOnlyLoader {
    pub stack_size: usize,
    /// Push the argv and envp table addresses below `argc`, as flat binaries expect.
    pub push_ptr: bool,
}

impl FormatLoader<GuestMemory> for StackOnlyLoader {
    fn load(
        &self,
        bprm: &mut BinaryParameters,
        info: &mut ImageInfo,
        platform: &mut GuestMemory,
        abi: &TargetAbi,
    ) -> Result<usize, Errno> {
        create_stack(bprm, info, platform, abi, self.stack_size, self.push_ptr)?;
        Ok(0)
    }
}

/// Initial registers of whichever target was selected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InitialRegisters {
    I386(I386Regs),
    /// Targets without a dedicated register record: just the stack pointer, program counter and
    /// flag page.
    Generic {
        sp: TargetAddr,
        pc: TargetAddr,
        flag_page: Option<TargetAddr>,
    },
}

impl InitialRegisters {
    fn for_abi(abi: &TargetAbi) -> Self {
        if abi.word == WordLayout::LE32 {
            Self::I386(I386Regs::default())
        } else {
            Self::Generic {
                sp: 0,
                pc: 0,
                flag_page: None,
            }
        }
    }
}

impl TargetRegisters for InitialRegisters {
    fn init_thread(&mut self, info: &ImageInfo) {
        match self {
            Self::I386(regs) => regs.init_thread(info),
            Self::Generic { sp, pc, .. } => {
                *sp = info.start_stack;
                *pc = info.entry;
            }
        }
    }

    fn set_flag_page(&mut self, addr: TargetAddr) {
        match self {
            Self::I386(regs) => regs.set_flag_page(addr),
            Self::Generic { flag_page, .. } => *flag_page = Some(addr),
        }
    }
}

/// The image as the program would find it.
#[derive(Debug)]
pub struct Report {
    pub abi: TargetAbi,
    pub format: Option<BinaryFormat>,
    pub e_uid: u32,
    pub e_gid: u32,
    pub info: ImageInfo,
    pub regs: InitialRegisters,
    /// The argument count the format loader laid out.
    pub argc: u64,
    pub argv: Vec<Vec<u8>>,
    pub envp: Vec<Vec<u8>>,
    /// First word of the flag page, when the ABI maps one.
    pub flag_word: Option<u64>,
}

fn cstring(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| anyhow!("{s:?} contains a NUL byte"))
}

/// Read a NULL-terminated table of string pointers.
fn read_string_table(mem: &mut GuestMemory, mut at: TargetAddr) -> Result<Vec<Vec<u8>>> {
    let n = mem.word_layout().bytes() as u64;
    let mut out = Vec::new();
    loop {
        let ptr = mem
            .get_user_ual(at)
            .with_context(|| format!("reading string table at {at:#x}"))?;
        if ptr == 0 {
            return Ok(out);
        }
        out.push(
            mem.read_cstring(ptr)
                .with_context(|| format!("reading string at {ptr:#x}"))?,
        );
        at += n;
    }
}

/// Run the exec path for the program named on the command line and read the result back out of
/// guest memory.
pub fn build_image(cli_args: &CliArgs) -> Result<Report> {
    let abi = cli_args.abi.abi();
    let program = &cli_args.program_and_arguments[0];
    let file = std::fs::File::open(Path::new(program))
        .with_context(|| format!("could not open {program}"))?;

    let argv = cli_args
        .program_and_arguments
        .iter()
        .map(|x| cstring(x))
        .collect::<Result<Vec<_>>>()?;
    let envp = cli_args
        .environment_variables
        .iter()
        .map(|x| cstring(x))
        .collect::<Result<Vec<_>>>()?;
    let envp = if cli_args.forward_environment_variables {
        envp.into_iter()
            .chain(
                std::env::vars()
                    .map(|(k, v)| cstring(&format!("{k}={v}")))
                    .collect::<Result<Vec<_>>>()?,
            )
            .collect()
    } else {
        envp
    };

    let mut mem = GuestMemory::new(abi.word, abi.page_size);
    let primary = StackOnlyLoader {
        stack_size: cli_args.stack_size,
        push_ptr: false,
    };
    let flat = StackOnlyLoader {
        stack_size: cli_args.stack_size,
        push_ptr: true,
    };
    let mut bprm = BinaryParameters::new(file, program.clone(), argv, envp, &abi);
    let mut regs = InitialRegisters::for_abi(&abi);
    let mut info = ImageInfo::default();
    let mut ctx = ExecContext {
        platform: &mut mem,
        abi,
        loaders: FormatLoaders::new(&primary).with_flat(&flat),
        credentials: Credentials::current(),
    };
    loader_exec(&mut bprm, &mut ctx, &mut regs, &mut info).map_err(|e| {
        let errno = Errno::from(e);
        anyhow!("exec of {program} failed: {errno} ({})", errno.as_neg())
    })?;
    tracing::info!(program = %program, abi = abi.name, "built initial image");

    // `argc` sits right below the argv table, or below the pushed table addresses for flat
    // binaries. A fixed stack layout moves `start_stack` away from it.
    let format = BinaryFormat::sniff(&bprm.buf, &abi);
    let below = if format == Some(BinaryFormat::Flat) { 3 } else { 1 };
    let argc_at = info
        .arg_strings
        .checked_sub(below * abi.word_bytes() as u64)
        .context("argv table has no room for argc")?;
    let argc = mem.get_user_ual(argc_at).context("reading argc")?;
    let argv = read_string_table(&mut mem, info.arg_strings)?;
    let envp = read_string_table(&mut mem, info.env_strings)?;
    let flag_word = match abi.fixed_layout {
        Some(layout) => Some(
            mem.get_user_ual(layout.flag_page)
                .context("reading the flag page")?,
        ),
        None => None,
    };

    Ok(Report {
        abi,
        format,
        e_uid: bprm.e_uid,
        e_gid: bprm.e_gid,
        info,
        regs,
        argc,
        argv,
        envp,
        flag_word,
    })
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = &self.info;
        writeln!(f, "abi:         {}", self.abi.name)?;
        match self.format {
            Some(format) => writeln!(f, "format:      {format}")?,
            None => writeln!(f, "format:      unknown")?,
        }
        writeln!(f, "credentials: euid={} egid={}", self.e_uid, self.e_gid)?;
        writeln!(f, "entry:       {:#x}", info.entry)?;
        writeln!(f, "start_stack: {:#x}", info.start_stack)?;
        writeln!(f, "stack_limit: {:#x}", info.stack_limit)?;
        writeln!(f, "args:        {:#x}..{:#x}", info.arg_start, info.arg_end)?;
        writeln!(f, "env:         {:#x}..{:#x}", info.env_start, info.env_end)?;
        match &self.regs {
            InitialRegisters::I386(regs) => writeln!(
                f,
                "registers:   esp={:#x} eip={:#x} ecx={:#x} edx={:#x}",
                regs.esp, regs.eip, regs.ecx, regs.edx
            )?,
            InitialRegisters::Generic { sp, pc, flag_page } => {
                write!(f, "registers:   sp={sp:#x} pc={pc:#x}")?;
                if let Some(flag_page) = flag_page {
                    write!(f, " flag_page={flag_page:#x}")?;
                }
                writeln!(f)?;
            }
        }
        if let Some(word) = self.flag_word {
            writeln!(f, "flag word:   {word:#010x}")?;
        }
        writeln!(f, "argc:        {}", self.argc)?;
        for (i, arg) in self.argv.iter().enumerate() {
            writeln!(f, "argv[{i}]:     {:?}", String::from_utf8_lossy(arg))?;
        }
        for (i, var) in self.envp.iter().enumerate() {
            writeln!(f, "envp[{i}]:     {:?}", String::from_utf8_lossy(var))?;
        }
        Ok(())
    }
}

/// Build the image for the program named by `cli_args` and print it to stdout.
pub fn run(cli_args: CliArgs) -> Result<()> {
    let report = build_image(&cli_args)?;
    print!("{report}");
    Ok(())
}
