//! Pipeline orchestration
//!
//! Wires the external stages into one continuous stream:
//!
//! ```text
//!  silence ─┐                 ┌── track file
//!           ├─► passthrough ─►│ filter ─► output channel ─► throttle ─► hub
//!  voice  ──┘                 └── (ducks track under voice)
//! ```
//!
//! The filter stage is replaced whenever its track ends or it crashes; the
//! hub and its listeners are never touched by a restart.

pub mod orchestrator;
pub mod passthrough;
pub mod radio;
pub mod stage;
pub mod state;

pub use radio::Radio;
pub use state::{Phase, RadioStatus};
