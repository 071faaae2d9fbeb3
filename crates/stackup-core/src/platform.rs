use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use crate::error::{Result, StackupError};

/// Return the system hostname, or `"unknown"` if it cannot be determined.
pub fn hostname() -> String {
    #[cfg(unix)]
    {
        nix::unistd::gethostname()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".into())
    }

    #[cfg(not(unix))]
    {
        std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown".into())
    }
}

/// Human-readable OS description from `/etc/os-release`, falling back to the
/// compile-time OS name.
pub fn os_description() -> String {
    if let Ok(contents) = std::fs::read_to_string("/etc/os-release") {
        for line in contents.lines() {
            if let Some(value) = line.strip_prefix("PRETTY_NAME=") {
                return value.trim_matches('"').to_string();
            }
        }
    }
    std::env::consts::OS.to_string()
}

/// Kernel release string, or `"unknown"`.
pub fn kernel_version() -> String {
    std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "unknown".into())
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run a command with piped stdout/stderr and a deadline. Output is drained
/// on reader threads so large dumps cannot fill the pipe and wedge the child.
pub fn run_command(cmd: &mut Command, timeout: Duration) -> std::io::Result<Output> {
    cmd.stdin(Stdio::null());
    run_spawned(cmd, None, timeout)
}

/// Like [`run_command`], but feeds `input` to the child's stdin.
pub fn run_command_with_stdin(
    cmd: &mut Command,
    input: &[u8],
    timeout: Duration,
) -> std::io::Result<Output> {
    run_spawned(cmd, Some(input.to_vec()), timeout)
}

fn run_spawned(
    cmd: &mut Command,
    input: Option<Vec<u8>>,
    timeout: Duration,
) -> std::io::Result<Output> {
    if input.is_some() {
        cmd.stdin(Stdio::piped());
    }
    let mut child = cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).spawn()?;

    let writer = input.and_then(|data| {
        child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || {
                let _ = stdin.write_all(&data);
            })
        })
    });
    let stdout_reader = child.stdout.take().map(spawn_drain);
    let stderr_reader = child.stderr.take().map(spawn_drain);

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait()? {
            Some(status) => {
                if let Some(handle) = writer {
                    let _ = handle.join();
                }
                let stdout = stdout_reader
                    .map(|h| h.join().unwrap_or_default())
                    .unwrap_or_default();
                let stderr = stderr_reader
                    .map(|h| h.join().unwrap_or_default())
                    .unwrap_or_default();
                return Ok(Output {
                    status,
                    stdout,
                    stderr,
                });
            }
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("command timed out after {} seconds", timeout.as_secs()),
                    ));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

fn spawn_drain<R: Read + Send + 'static>(mut reader: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

/// Strip root/prefix components so an absolute source path can be re-rooted
/// under a staging or restore directory.
pub fn rootless(path: &Path) -> PathBuf {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

/// Copy a file or directory tree from `src` into `dest` (the copy of `src`'s
/// root). Symlinks are recreated, not followed. Returns bytes copied.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<u64> {
    let meta = std::fs::symlink_metadata(src)?;
    if meta.is_file() {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        return Ok(std::fs::copy(src, dest)?);
    }
    if !meta.is_dir() {
        return Err(StackupError::Other(format!(
            "unsupported source type: {}",
            src.display()
        )));
    }

    std::fs::create_dir_all(dest)?;
    let mut total = 0u64;
    for entry in walkdir::WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry =
            entry.map_err(|e| StackupError::Other(format!("walk {}: {e}", src.display())))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| StackupError::Other(format!("walk {}: {e}", src.display())))?;
        let target = dest.join(rel);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link_target = std::fs::read_link(entry.path())?;
            let _ = std::fs::remove_file(&target);
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link_target, &target)?;
            #[cfg(not(unix))]
            {
                let _ = link_target;
            }
        } else if file_type.is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            total += std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(total)
}
