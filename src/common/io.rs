use std::fs::File;
use std::io;
use std::path::Path;

/// Flush buffer for the table and profile writers — amortizes write
/// syscalls without holding more than one panel's working set.
pub const WRITE_BUF_SIZE: usize = 64 * 1024;

/// Open a file for sequential streaming, hinting the kernel so readahead
/// kicks in aggressively. The super-mer inputs are consumed exactly once,
/// front to back.
pub fn open_sequential(path: &Path) -> io::Result<File> {
    let file = File::open(path)?;

    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        if let Ok(meta) = file.metadata() {
            let len = meta.len();
            if len > 0 {
                unsafe {
                    libc::posix_fadvise(
                        file.as_raw_fd(),
                        0,
                        len as i64,
                        libc::POSIX_FADV_SEQUENTIAL,
                    );
                }
            }
        }
    }

    Ok(file)
}

/// Remove a file, treating "not found" as success. Used to clear stale
/// results before a run and to unlink consumed inputs.
pub fn remove_if_present(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
