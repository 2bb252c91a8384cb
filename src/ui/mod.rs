//! User interface rendering and input handling.
//!
//! This module provides all UI-related functionality:
//!
//! - **surface**: the `Surface` trait the multiplexer draws into, plus an
//!   in-memory implementation
//! - **renderer**: crossterm-backed surface with diff rendering and input
//! - **sidebar**: pane list, separator and hint footer
//! - **keymapper**: key, mouse and paste input to pty byte sequences

pub mod keymapper;
pub mod renderer;
pub mod sidebar;
pub mod surface;

pub use keymapper::KeyMapper;
pub use renderer::CrosstermSurface;
pub use surface::{CellBuffer, MemorySurface, Style, StyledCell, Surface, Viewport};
