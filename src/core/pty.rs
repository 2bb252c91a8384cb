//! Pseudo-terminal process spawning
//!
//! [`Spawner`] turns a [`SpawnRequest`] into a running child whose stdin,
//! stdout and stderr are merged through a pty. [`PtySpawner`] is the real
//! implementation on top of `portable-pty`; tests substitute an in-memory
//! spawner.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("No command given")]
    EmptyCommand,

    #[error("Failed to open pty: {0}")]
    Open(String),

    #[error("Failed to spawn {command}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("Failed to resize pty: {0}")]
    Resize(String),

    #[error("Failed to write to pty: {0}")]
    Write(#[source] io::Error),

    #[error("Failed to signal process group: {0}")]
    Signal(String),

    #[error("Failed to wait for process: {0}")]
    Wait(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, PtyError>;

/// What to run and how big its terminal is
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpawnRequest {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub cols: u16,
    pub rows: u16,
}

/// Control side of a spawned child
pub trait ProcessControl: Send {
    fn pid(&self) -> Option<u32>;

    fn resize(&self, cols: u16, rows: u16) -> Result<()>;

    /// Kill the child's whole process group and wait for the child to exit.
    /// Calling it again after the child is reaped is a no-op.
    fn terminate(&mut self) -> Result<()>;
}

/// A running child: output stream, input stream, control handle
pub struct SpawnedProcess {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
    pub control: Box<dyn ProcessControl>,
}

pub trait Spawner: Send {
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedProcess>;
}

/// Spawns children under the host's native pty system
pub struct PtySpawner {
    term: String,
}

impl PtySpawner {
    /// `term` is exported to every child as `TERM`.
    pub fn new(term: impl Into<String>) -> Self {
        Self { term: term.into() }
    }
}

impl Default for PtySpawner {
    fn default() -> Self {
        Self::new("xterm-256color")
    }
}

fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows: rows.max(1),
        cols: cols.max(1),
        pixel_width: 0,
        pixel_height: 0,
    }
}

impl Spawner for PtySpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedProcess> {
        let (program, args) = request.argv.split_first().ok_or(PtyError::EmptyCommand)?;

        let pair = native_pty_system()
            .openpty(pty_size(request.cols, request.rows))
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        if let Some(cwd) = &request.cwd {
            cmd.cwd(cwd);
        }
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        cmd.env("TERM", &self.term);

        let spawn_err = |e: anyhow::Error| PtyError::Spawn {
            command: program.clone(),
            reason: e.to_string(),
        };
        let child = pair.slave.spawn_command(cmd).map_err(spawn_err)?;
        // Only the child may hold the slave, or the reader never sees EOF.
        drop(pair.slave);

        let reader = pair.master.try_clone_reader().map_err(spawn_err)?;
        let writer = pair.master.take_writer().map_err(spawn_err)?;

        tracing::info!(
            "spawned {:?} (pid {:?}) at {}x{}",
            request.argv,
            child.process_id(),
            request.cols,
            request.rows
        );

        Ok(SpawnedProcess {
            reader,
            writer,
            control: Box::new(PtyProcess {
                master: pair.master,
                child,
                reaped: false,
            }),
        })
    }
}

struct PtyProcess {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    reaped: bool,
}

impl ProcessControl for PtyProcess {
    fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }

    fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.master
            .resize(pty_size(cols, rows))
            .map_err(|e| PtyError::Resize(e.to_string()))
    }

    fn terminate(&mut self) -> Result<()> {
        if self.reaped {
            return Ok(());
        }
        self.signal_group()?;
        let status = self.child.wait().map_err(PtyError::Wait)?;
        self.reaped = true;
        tracing::info!("process {:?} exited with {}", self.pid(), status.exit_code());
        Ok(())
    }
}

impl PtyProcess {
    /// The child is a session leader, so its pid names its process group.
    #[cfg(unix)]
    fn signal_group(&mut self) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.process_id() else {
            return Ok(());
        };
        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(PtyError::Signal(e.to_string())),
        }
    }

    #[cfg(not(unix))]
    fn signal_group(&mut self) -> Result<()> {
        use portable_pty::ChildKiller;

        if let Ok(Some(_)) = self.child.try_wait() {
            return Ok(());
        }
        match self.child.kill() {
            Ok(()) => Ok(()),
            Err(e) => Err(PtyError::Signal(e.to_string())),
        }
    }
}
