//! mosaic - a sidebar terminal multiplexer for supervising processes
//!
//! Several child processes run under pseudo-terminals. Each is rendered by
//! its own VT emulator into a pane; a sidebar lists the panes and one pane
//! at a time fills the main viewport.
//!
//! ```no_run
//! use mosaic::{CrosstermSurface, LayoutConfig, Multiplexer, ProcessSpec, PtySpawner};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let surface = CrosstermSurface::new()?;
//! let mut mux = Multiplexer::new(surface, Box::new(PtySpawner::default()), LayoutConfig::default());
//! mux.add_process(ProcessSpec::new("shell", vec!["/bin/sh".into()]).killable(false))?;
//! mux.run()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod event;
pub mod ui;
pub mod wm;

pub use crate::config::Config;
pub use crate::core::pty::{PtyError, PtySpawner, SpawnRequest, Spawner};
pub use crate::core::term::Emulator;
pub use crate::event::{Event, MuxHandle};
pub use crate::ui::{CrosstermSurface, MemorySurface, Surface};
pub use crate::wm::{Focus, LayoutConfig, Multiplexer, MuxError, Pane, PaneStatus, ProcessSpec};
