//! Core terminal emulation components.
//!
//! This module contains the low-level terminal emulation logic:
//!
//! - **pty**: process spawning under a pseudo-terminal, group kill
//! - **term**: VT500 parser and VT100/xterm screen state
//! - **session**: one running child with its reader and writer threads
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── ProcessControl (resize, kill process group + wait)
//! ├── reader thread ──▶ Event queue
//! └── writer thread ◀── input channel
//!
//! Emulator
//! ├── Parser (bytes -> Sequence)
//! └── TerminalState
//!     ├── Grid (primary / alternate)
//!     ├── Cursor, margins, tab stops, modes, charsets
//!     └── scrollback
//! ```

pub mod pty;
pub mod session;
pub mod term;
