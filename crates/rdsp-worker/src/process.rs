//! Spawns and owns a codec/audio worker subprocess: the control pipe
//! (stdin/stdout, framed per [`crate::codec`]) plus, on Unix, a bulk channel
//! used to hand the worker a frame's bytes via `SCM_RIGHTS` fd passing
//! instead of copying them across the control pipe.
//!
//! The worker owns its own memory; this handle holds only the pipes and
//! (on Unix) the bulk socket. There is no `ur-taking-me-with-you` crate in
//! this workspace — it ships as an empty stub upstream — so the death-pact
//! (kill the worker if this process dies without a clean shutdown) is
//! implemented directly against `libc::prctl(PR_SET_PDEATHSIG, ...)`.

use std::ffi::OsStr;
use std::process::Stdio;

use tokio::io::{BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::codec::{read_message, write_message};
use crate::control::WorkerControl;
use crate::error::WorkerError;

#[cfg(unix)]
use std::os::fd::{AsRawFd, RawFd};

pub struct WorkerHandle {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    #[cfg(unix)]
    bulk: Option<tokio::net::UnixStream>,
}

impl WorkerHandle {
    /// Spawns `program` with `args`, wiring a framed control pipe over
    /// stdin/stdout and, on Unix, a bulk fd-passing channel reachable by the
    /// child through the `RDSP_WORKER_BULK_FD` environment variable.
    pub async fn spawn(program: impl AsRef<OsStr>, args: &[&str]) -> Result<Self, WorkerError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        #[cfg(unix)]
        let bulk_child_half = {
            let (parent_half, child_half) = std::os::unix::net::UnixStream::pair().map_err(WorkerError::Spawn)?;
            parent_half.set_nonblocking(true).map_err(WorkerError::Spawn)?;
            clear_close_on_exec(child_half.as_raw_fd())?;
            command.env("RDSP_WORKER_BULK_FD", child_half.as_raw_fd().to_string());
            enable_death_pact(&mut command);
            (parent_half, child_half)
        };

        let mut child = command.spawn().map_err(WorkerError::Spawn)?;
        let stdin = BufWriter::new(child.stdin.take().expect("stdin was piped"));
        let stdout = BufReader::new(child.stdout.take().expect("stdout was piped"));

        #[cfg(unix)]
        let bulk = {
            let (parent_half, child_half) = bulk_child_half;
            // The child's copy of this fd survived the fork+exec above (we
            // cleared FD_CLOEXEC on it); our own copy is no longer needed.
            drop(child_half);
            Some(tokio::net::UnixStream::from_std(parent_half).map_err(WorkerError::Spawn)?)
        };

        Ok(Self {
            child,
            stdin,
            stdout,
            #[cfg(unix)]
            bulk,
        })
    }

    pub async fn send(&mut self, message: &WorkerControl) -> Result<(), WorkerError> {
        write_message(&mut self.stdin, message).await
    }

    pub async fn recv(&mut self) -> Result<WorkerControl, WorkerError> {
        read_message(&mut self.stdout).await
    }

    /// Hands the worker a bulk payload by passing its file descriptor
    /// across the Unix bulk channel, rather than copying the bytes.
    #[cfg(unix)]
    pub async fn send_bulk_fd(&self, fd: RawFd) -> Result<(), WorkerError> {
        use async_send_fd::AsyncSendFd;
        let bulk = self.bulk.as_ref().ok_or(WorkerError::NoFdChannel)?;
        bulk.send_fd(fd).await.map_err(WorkerError::Io)
    }

    /// Receives a bulk payload's file descriptor from the worker.
    #[cfg(unix)]
    pub async fn recv_bulk_fd(&self) -> Result<RawFd, WorkerError> {
        use async_send_fd::AsyncRecvFd;
        let bulk = self.bulk.as_ref().ok_or(WorkerError::NoFdChannel)?;
        bulk.recv_fd().await.map_err(WorkerError::Io)
    }

    /// Receives a bulk payload's fd and maps it directly into this
    /// process's address space, avoiding a copy through a scratch buffer.
    /// The returned buffer owns the mapping: it is `munmap`'d when dropped.
    #[cfg(unix)]
    pub async fn recv_bulk_mapped(&self, len: usize) -> Result<rdsp_buffer::AlignedBuffer, WorkerError> {
        let fd = self.recv_bulk_fd().await?;
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        // The fd is only needed to establish the mapping; once mapped, the
        // underlying shared memory object stays alive via the mapping itself.
        unsafe { libc::close(fd) };
        if ptr == libc::MAP_FAILED {
            return Err(WorkerError::Io(std::io::Error::last_os_error()));
        }
        let ptr = ptr as *mut u8;
        Ok(unsafe {
            rdsp_buffer::AlignedBuffer::foreign(
                ptr,
                len,
                Box::new(move |ptr, len| {
                    unsafe { libc::munmap(ptr as *mut libc::c_void, len) };
                }),
            )
        })
    }

    /// Copies a bulk payload inline over the control pipe, for platforms
    /// (or configurations) without fd-passing support. Callers choose this
    /// path explicitly; it is never a silent fallback from the fd path.
    pub async fn send_bulk_inline(&mut self, bytes: &[u8]) -> Result<(), WorkerError> {
        use tokio::io::AsyncWriteExt;
        let len = u32::try_from(bytes.len()).map_err(|_| WorkerError::MessageTooLarge(u32::MAX, u32::MAX))?;
        self.stdin.write_all(&len.to_le_bytes()).await.map_err(WorkerError::Io)?;
        self.stdin.write_all(bytes).await.map_err(WorkerError::Io)?;
        self.stdin.flush().await.map_err(WorkerError::Io)
    }

    pub async fn recv_bulk_inline(&mut self) -> Result<Vec<u8>, WorkerError> {
        use tokio::io::AsyncReadExt;
        let mut len_bytes = [0u8; 4];
        self.stdout.read_exact(&mut len_bytes).await.map_err(WorkerError::Io)?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        let mut buf = vec![0u8; len];
        self.stdout.read_exact(&mut buf).await.map_err(WorkerError::Io)?;
        Ok(buf)
    }

    /// Requests a clean shutdown, then waits for the process to exit. The
    /// death-pact signal remains armed as a backstop if the worker ignores
    /// `Shutdown` or hangs.
    pub async fn shutdown(mut self) -> Result<(), WorkerError> {
        let _ = self.send(&WorkerControl::Shutdown).await;
        let status = self.child.wait().await.map_err(WorkerError::Io)?;
        if !status.success() {
            return Err(WorkerError::Exited(status.code()));
        }
        Ok(())
    }
}

#[cfg(unix)]
fn enable_death_pact(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    unsafe {
        command.pre_exec(|| {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            // The parent may have exited between fork and this prctl call;
            // re-check and self-kill rather than running on as an orphan.
            if libc::getppid() == 1 {
                libc::raise(libc::SIGKILL);
            }
            Ok(())
        });
    }
}

#[cfg(unix)]
fn clear_close_on_exec(fd: RawFd) -> Result<(), WorkerError> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(WorkerError::Spawn(std::io::Error::last_os_error()));
    }
    let cleared = unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) };
    if cleared < 0 {
        return Err(WorkerError::Spawn(std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawns_a_trivial_echo_process_and_talks_over_its_pipes() {
        // `cat` isn't a real worker, but it round-trips raw bytes, which is
        // enough to exercise the spawn/stdin/stdout wiring without a fixture
        // binary that speaks the control protocol.
        let mut handle = WorkerHandle::spawn("cat", &[]).await.expect("spawn cat");
        handle.send_bulk_inline(b"hello").await.unwrap();
        let echoed = handle.recv_bulk_inline().await.unwrap();
        assert_eq!(echoed, b"hello");
        let _ = handle.child.start_kill();
    }
}
