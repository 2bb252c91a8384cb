//! Session management
//!
//! A [`Session`] is one running child process. It owns two threads:
//!
//! ```text
//! pty ──read──▶ reader thread ──Event::Output──▶ multiplexer queue
//!                    └─ EOF ──▶ Event::PaneClosed
//! multiplexer ──write()──▶ channel ──▶ writer thread ──▶ pty
//! ```
//!
//! The reader never touches pane state; it only posts events. Writes are
//! queued, so a child that does not read its input cannot block the caller.

use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use super::pty::{ProcessControl, PtyError, Result, SpawnRequest, SpawnedProcess, Spawner};
use crate::event::Event;
use crate::wm::PaneId;

const READ_BUFFER: usize = 4096;

pub struct Session {
    control: Box<dyn ProcessControl>,
    input_tx: Option<Sender<Vec<u8>>>,
    writer_thread: Option<JoinHandle<()>>,
    killed: bool,
}

impl Session {
    /// Spawn the child and start its reader and writer threads.
    pub fn spawn(
        spawner: &dyn Spawner,
        request: &SpawnRequest,
        pane: PaneId,
        generation: u64,
        events: Sender<Event>,
    ) -> Result<Self> {
        let SpawnedProcess {
            reader,
            mut writer,
            mut control,
        } = spawner.spawn(request)?;

        thread::Builder::new()
            .name(format!("pane-{}-reader", pane))
            .spawn(move || read_loop(reader, pane, generation, events))
            .map_err(|e| abandon(control.as_mut(), request, "reader", e))?;

        let (input_tx, input_rx) = mpsc::channel::<Vec<u8>>();
        let writer_thread = thread::Builder::new()
            .name(format!("pane-{}-writer", pane))
            .spawn(move || {
                for data in input_rx {
                    if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
                        tracing::debug!("pane {} input closed: {}", pane, e);
                        break;
                    }
                }
            })
            .map_err(|e| abandon(control.as_mut(), request, "writer", e))?;

        Ok(Self {
            control,
            input_tx: Some(input_tx),
            writer_thread: Some(writer_thread),
            killed: false,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.control.pid()
    }

    /// Queue bytes for the child's input. Never blocks.
    pub fn write(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if let Some(tx) = &self.input_tx {
            // A closed channel means the child is gone; its close event follows.
            let _ = tx.send(data.to_vec());
        }
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.control.resize(cols, rows)
    }

    /// Kill the process group and wait for the child.
    pub fn kill(&mut self) -> Result<()> {
        if self.killed {
            return Ok(());
        }
        self.killed = true;
        self.input_tx.take();
        self.control.terminate()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.kill() {
            tracing::warn!("failed to stop process: {}", e);
        }
        if let Some(handle) = self.writer_thread.take() {
            let _ = handle.join();
        }
    }
}

fn read_loop(mut reader: Box<dyn Read + Send>, pane: PaneId, generation: u64, events: Sender<Event>) {
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                let event = Event::Output {
                    pane,
                    generation,
                    bytes: buffer[..n].to_vec(),
                };
                if events.send(event).is_err() {
                    // Multiplexer is gone
                    return;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // EIO once the child side of the pty closes
            Err(e) => {
                tracing::debug!("pane {} read ended: {}", pane, e);
                break;
            }
        }
    }
    let _ = events.send(Event::PaneClosed { pane, generation });
}

/// A worker thread could not start. The child is killed before the error
/// is returned so it is not left running unreaped.
fn abandon(
    control: &mut dyn ProcessControl,
    request: &SpawnRequest,
    worker: &str,
    err: io::Error,
) -> PtyError {
    if let Err(e) = control.terminate() {
        tracing::warn!("could not kill {} after failed start: {}", request.argv.join(" "), e);
    }
    PtyError::Spawn {
        command: request.argv.join(" "),
        reason: format!("{} thread: {}", worker, err),
    }
}
