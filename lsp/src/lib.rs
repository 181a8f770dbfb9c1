//! Language server that finds story entities in manuscripts.
//!
//! Mentions of registered characters, settings, items, events and
//! foreshadowings are detected in open documents. Low-confidence mentions
//! become diagnostics; the rest feed navigation, hover, quick fixes,
//! semantic highlighting and the outline.

pub mod capabilities;
pub mod codec;
pub mod detection;
pub mod diagnostics;
pub mod documents;
pub mod features;
pub mod outbound;
pub mod project;
pub mod types;

pub(crate) mod protocol;
pub(crate) mod server;

pub use codec::{FrameReader, FrameWriter, TransportError};
pub use protocol::{ErrorCode, RequestError};
pub use server::{ServerOptions, SessionEnd, serve};
