//! Pane supervision and the multiplexer event loop.
//!
//! - **pane**: one supervised process, its emulator and lifecycle
//! - **manager**: `Multiplexer`, owning every pane, focus, selection and
//!   the composition of sidebar and main viewport
//!
//! ```text
//! wm/
//! ├── mod.rs      - Module exports
//! ├── manager.rs  - Multiplexer (event loop, layout, input routing)
//! └── pane.rs     - Pane (emulator + session, Running/Stopped/Clearing)
//! ```

pub mod manager;
pub mod pane;

pub use manager::{Flow, Focus, LayoutConfig, Multiplexer, MuxError};
pub use pane::{ExitCallback, Pane, PaneId, PaneStatus, ProcessSpec};
