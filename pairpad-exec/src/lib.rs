//! # pairpad-exec — shared code execution per room
//!
//! Every room gets at most one execution session. Anyone in the room can
//! start a run; everyone watching sees the same terminal.
//!
//! ## Architecture
//!
//! ```text
//! run(code) ──► Toolchain::prepare ──► spawn ──► RunSupervisor
//!                (work dir, main.*)               │ stdout + stderr
//!                                                 ▼
//!                               OutputBuffer ◄── publish ──► Viewers
//! ```
//!
//! ## Modules
//!
//! - [`event`] — JSON requests and events of the execution channel
//! - [`language`] — supported languages
//! - [`buffer`] — bounded scrollback and incremental UTF-8 decoding
//! - [`toolchain`] — runtimes, source materialization, TypeScript emit
//! - [`manager`] — session lifecycle, supersession, limits and disposal

pub mod event;
pub mod language;
pub mod buffer;
pub mod toolchain;
pub mod manager;

pub use event::{ExecEvent, ExecRequest, TerminalSize, Viewer};
pub use language::Language;
pub use buffer::{OutputBuffer, Utf8Decoder};
pub use toolchain::{Interpreter, Launch, Toolchain};
pub use manager::{
    ExecConfig, ExecError, ExecutionManager, PendingRun, SessionPhase, OUTPUT_LIMIT_NOTICE,
    TERMINAL_RESET,
};
