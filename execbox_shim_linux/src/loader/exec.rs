// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The exec entry point.

use execbox::platform::{Fault, Provider};
use execbox::target::TargetAddr;
use execbox_common_linux::abi::{FixedStackLayout, TargetAbi};
use execbox_common_linux::errno::Errno;
use execbox_common_linux::loader::ImageInfo;
use execbox_common_linux::regs::TargetRegisters;
use execbox_common_linux::{MapFlags, ProtFlags};
use thiserror::Error;

use super::binprm::{BinaryParameters, Credentials, prepare_binprm};
use super::format::{BinaryFormat, FormatLoaders};
use crate::syscalls::mm::{MapBacking, target_mmap};

/// Everything an exec attempt needs besides the binary itself.
pub struct ExecContext<'a, P: Provider> {
    /// The target address space the image is built in.
    pub platform: &'a mut P,
    pub abi: TargetAbi,
    pub loaders: FormatLoaders<'a, P>,
    /// Credentials of the process performing the exec.
    pub credentials: Credentials,
}

/// Failure of an exec attempt.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to prepare the binary")]
    Prepare(#[source] Errno),
    #[error("unrecognized executable format")]
    UnrecognizedFormat,
    #[error("failed to load the {0} binary")]
    Load(BinaryFormat, #[source] Errno),
    #[error("failed to install the fixed stack layout")]
    FixedLayout(#[from] FixedLayoutError),
}

/// Failure while installing a [`FixedStackLayout`].
#[derive(Error, Debug)]
pub enum FixedLayoutError {
    #[error("failed to map the flag page")]
    FlagPage(#[source] Errno),
    #[error("failed to fill the flag page")]
    FlagFill(#[from] Fault),
    #[error("failed to map the stack")]
    Stack(#[source] Errno),
}

impl From<FixedLayoutError> for Errno {
    fn from(value: FixedLayoutError) -> Self {
        match value {
            FixedLayoutError::FlagPage(e) | FixedLayoutError::Stack(e) => e,
            FixedLayoutError::FlagFill(fault) => fault.into(),
        }
    }
}

impl From<ExecError> for Errno {
    fn from(value: ExecError) -> Self {
        match value {
            ExecError::Prepare(e) | ExecError::Load(_, e) => e,
            ExecError::UnrecognizedFormat => Errno::ENOEXEC,
            ExecError::FixedLayout(e) => e.into(),
        }
    }
}

impl ExecError {
    /// The negative error code reported to the caller of exec.
    pub fn as_neg(self) -> i32 {
        Errno::from(self).as_neg()
    }
}

/// Run one exec attempt.
///
/// Prepares `bprm`, hands it to the loader its magic bytes select, applies the ABI's fixed stack
/// layout (if it has one) and initialises `regs` from the final `info`. Returns the loader's
/// result. Whatever the outcome, `bprm.pages` is empty on return.
pub fn loader_exec<P: Provider>(
    bprm: &mut BinaryParameters,
    ctx: &mut ExecContext<'_, P>,
    regs: &mut impl TargetRegisters,
    info: &mut ImageInfo,
) -> Result<usize, ExecError> {
    let span = tracing::debug_span!("loader_exec", filename = %bprm.filename, abi = ctx.abi.name);
    let _guard = span.enter();

    let result = exec_binprm(bprm, ctx, regs, info);
    let released = bprm.pages.release();
    match &result {
        Ok(retval) => tracing::debug!(retval, released, "exec succeeded"),
        Err(e) => tracing::debug!(error = %e, released, "exec failed"),
    }
    result
}

fn exec_binprm<P: Provider>(
    bprm: &mut BinaryParameters,
    ctx: &mut ExecContext<'_, P>,
    regs: &mut impl TargetRegisters,
    info: &mut ImageInfo,
) -> Result<usize, ExecError> {
    prepare_binprm(bprm, ctx.credentials).map_err(ExecError::Prepare)?;

    let format = BinaryFormat::sniff(&bprm.buf, &ctx.abi).ok_or(ExecError::UnrecognizedFormat)?;
    let loader = ctx
        .loaders
        .get(format)
        .ok_or(ExecError::UnrecognizedFormat)?;
    tracing::debug!(%format, "dispatching");

    *info = ImageInfo::default();
    let retval = loader
        .load(bprm, info, ctx.platform, &ctx.abi)
        .map_err(|e| ExecError::Load(format, e))?;

    if let Some(layout) = ctx.abi.fixed_layout {
        install_fixed_layout(ctx.platform, &layout, info, regs)?;
    }

    regs.init_thread(info);
    Ok(retval)
}

/// Map and fill the flag page, map the fixed stack, and point `info` and `regs` at them.
///
/// The stack is sized from the span the format loader reported, then the loader's own stack
/// bounds are replaced by the layout's constants.
fn install_fixed_layout<P: Provider>(
    platform: &mut P,
    layout: &FixedStackLayout,
    info: &mut ImageInfo,
    regs: &mut impl TargetRegisters,
) -> Result<(), FixedLayoutError> {
    let flag_page = target_mmap(
        platform,
        layout.flag_page,
        layout.flag_page_len,
        ProtFlags::PROT_READ_WRITE,
        MapFlags::MAP_ANONYMOUS | MapFlags::MAP_PRIVATE,
        MapBacking::Anonymous,
    )
    .map_err(FixedLayoutError::FlagPage)?;
    let fill = platform.word_layout().encode_u32(layout.flag_fill);
    platform.fill_pattern(flag_page, layout.flag_page_len, &fill)?;

    let stack_page_limit = layout.stack_page_limit();
    let pages = layout.stack_pages(info.start_stack, info.stack_limit);
    let stack_start = pages
        .checked_mul(layout.stack_page_size)
        .and_then(|len| stack_page_limit.checked_sub(len))
        .ok_or(FixedLayoutError::Stack(Errno::ENOMEM))?;
    let stack_len = usize::try_from(stack_page_limit - stack_start)
        .map_err(|_| FixedLayoutError::Stack(Errno::ENOMEM))?;
    let stack: TargetAddr = target_mmap(
        platform,
        stack_start,
        stack_len,
        ProtFlags::PROT_READ_WRITE_EXEC,
        MapFlags::MAP_ANONYMOUS | MapFlags::MAP_PRIVATE | MapFlags::MAP_STACK,
        MapBacking::Anonymous,
    )
    .map_err(FixedLayoutError::Stack)?;

    tracing::debug!(
        flag_page = format_args!("{flag_page:#x}"),
        stack = format_args!("{stack:#x}"),
        pages,
        "installed fixed stack layout"
    );
    regs.set_flag_page(flag_page);
    info.start_stack = layout.stack_init;
    info.stack_limit = stack_page_limit;
    Ok(())
}
