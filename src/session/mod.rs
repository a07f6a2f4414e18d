//! Session lifecycle, demux, and host-facing notices.

pub mod controller;
pub mod events;
pub mod state;

pub use controller::VoiceSession;
pub use events::SessionNotice;
pub use state::SessionState;
