// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The per-exec binary parameters record and binary preparation.

use std::ffi::CString;
use std::io;

use execbox::target::TargetAddr;
use execbox_common_linux::Mode;
use execbox_common_linux::abi::TargetAbi;
use execbox_common_linux::errno::Errno;

use super::{BPRM_BUF_SIZE, MAX_ARG_PAGES};

/// The subset of `stat(2)` that binary preparation looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub mode: Mode,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
}

/// An open executable.
pub trait BinaryFile {
    /// Status of the open file.
    fn stat(&self) -> io::Result<FileStat>;

    /// Read into `buf` from `offset`, returning the number of bytes read; `0` at end of file.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}

impl BinaryFile for std::fs::File {
    fn stat(&self) -> io::Result<FileStat> {
        use std::os::unix::fs::MetadataExt as _;
        let metadata = self.metadata()?;
        Ok(FileStat {
            mode: Mode::from_bits_retain(metadata.mode()),
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.size(),
        })
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }
}

/// Effective user and group of the process performing the exec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub euid: u32,
    pub egid: u32,
}

impl Credentials {
    /// The effective credentials of the current host process.
    pub fn current() -> Self {
        // SAFETY: `geteuid` and `getegid` cannot fail and have no preconditions.
        let (euid, egid) = unsafe { (libc::geteuid(), libc::getegid()) };
        Self { euid, egid }
    }
}

/// Host-side staging pages for the argument and environment strings.
///
/// Holds at most [`MAX_ARG_PAGES`] zero-initialised buffers of the target page size, allocated on
/// first use. Each populated buffer is freed exactly once: either taken out by whoever mirrors it
/// into target memory, or by [`release`](Self::release) (which also runs on drop).
pub struct ArgPages {
    page_size: usize,
    pages: [Option<Box<[u8]>>; MAX_ARG_PAGES],
}

impl ArgPages {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            pages: core::array::from_fn(|_| None),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Total bytes the staging area can hold.
    pub fn capacity(&self) -> usize {
        self.page_size * MAX_ARG_PAGES
    }

    /// The page at `index`, if it has been populated.
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.pages.get(index)?.as_deref()
    }

    /// The page at `index`, allocating a zeroed one if it is still empty.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`MAX_ARG_PAGES`].
    pub fn get_or_alloc(&mut self, index: usize) -> &mut [u8] {
        let page_size = self.page_size;
        self.pages[index].get_or_insert_with(|| vec![0u8; page_size].into_boxed_slice())
    }

    /// Take ownership of the page at `index`, leaving the slot empty.
    pub fn take(&mut self, index: usize) -> Option<Box<[u8]>> {
        self.pages.get_mut(index)?.take()
    }

    /// Number of populated pages.
    pub fn populated(&self) -> usize {
        self.pages.iter().filter(|page| page.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.populated() == 0
    }

    /// Free every populated page, returning how many there were.
    pub fn release(&mut self) -> usize {
        let mut freed = 0;
        for slot in &mut self.pages {
            if slot.take().is_some() {
                freed += 1;
            }
        }
        freed
    }
}

impl Drop for ArgPages {
    fn drop(&mut self) {
        self.release();
    }
}

impl core::fmt::Debug for ArgPages {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArgPages")
            .field("page_size", &self.page_size)
            .field("populated", &self.populated())
            .finish()
    }
}

/// Everything one exec attempt knows about the binary it is loading.
pub struct BinaryParameters {
    pub file: Box<dyn BinaryFile>,
    pub filename: String,
    pub argc: usize,
    pub envc: usize,
    pub argv: Vec<CString>,
    pub envp: Vec<CString>,
    /// The first [`BPRM_BUF_SIZE`] bytes of the file, zero padded.
    pub buf: [u8; BPRM_BUF_SIZE],
    pub e_uid: u32,
    pub e_gid: u32,
    pub pages: ArgPages,
    /// Offset into the staging area below which the strings are copied; starts one target word
    /// below its top.
    pub p: TargetAddr,
}

impl BinaryParameters {
    /// Populate the record for a fresh exec attempt on `abi`.
    pub fn new(
        file: impl BinaryFile + 'static,
        filename: impl Into<String>,
        argv: Vec<CString>,
        envp: Vec<CString>,
        abi: &TargetAbi,
    ) -> Self {
        let pages = ArgPages::new(abi.page_size);
        let p = (pages.capacity() - abi.word_bytes()) as TargetAddr;
        Self {
            file: Box::new(file),
            filename: filename.into(),
            argc: argv.len(),
            envc: envp.len(),
            argv,
            envp,
            buf: [0; BPRM_BUF_SIZE],
            e_uid: 0,
            e_gid: 0,
            pages,
            p,
        }
    }
}

/// Validate the executable, compute the effective credentials and read its header into
/// `bprm.buf`.
///
/// Returns the number of header bytes that came from the file. A failure to read the header after
/// the file was successfully checked terminates the process.
pub fn prepare_binprm(bprm: &mut BinaryParameters, caller: Credentials) -> Result<usize, Errno> {
    let stat = bprm.file.stat().map_err(Errno::from)?;
    let mode = stat.mode;
    if !mode.is_regular_file() {
        return Err(Errno::EACCES);
    }
    if !mode.any_executable() {
        return Err(Errno::EACCES);
    }

    bprm.e_uid = caller.euid;
    bprm.e_gid = caller.egid;

    if mode.contains(Mode::SUID) {
        bprm.e_uid = stat.uid;
    }
    // Set-gid without group-execute marks a mandatory-locking candidate, not a set-gid binary.
    if mode.sgid_effective() {
        bprm.e_gid = stat.gid;
    }

    let len = match read_header(bprm.file.as_ref(), &mut bprm.buf) {
        Ok(len) => len,
        Err(e) => {
            tracing::error!(filename = %bprm.filename, error = %e, "prepare_binprm");
            eprintln!("prepare_binprm: {e}");
            std::process::exit(-1);
        }
    };
    bprm.buf[len..].fill(0);
    tracing::debug!(
        filename = %bprm.filename,
        mode = format_args!("{:o}", mode.bits()),
        e_uid = bprm.e_uid,
        e_gid = bprm.e_gid,
        len,
        "prepared binary"
    );
    Ok(len)
}

fn read_header(file: &dyn BinaryFile, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(filled as u64, &mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
