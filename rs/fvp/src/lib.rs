//! # fvp: video textures and player callbacks for UI runtimes
//!
//! `fvp` sits between a native media engine and a UI framework that composites GPU textures and
//! runs a managed scripting runtime. It solves two problems:
//!
//! - Rendering decoded frames into a texture the compositor can display, without copies.
//!   A [TexturePlayer] registers a texture with the [Compositor] and renders into a lazily created
//!   [SurfaceBinding] whenever the compositor asks for a frame. GPU objects are released on the
//!   rendering thread through a [CleanupQueue], never from whichever thread dropped the player.
//! - Forwarding engine notifications to the runtime as [Message]s over a [Port].
//!   The [Bridge] can block the engine's thread until the runtime replies, for callbacks whose
//!   return value matters (accepting a media status, deciding on a boosted start).
//!
//! The engine itself is abstracted by the [Engine] and [Decoder] traits, the platform GPU by
//! [Gpu]. The `gl` and `d3d11` features provide real backends; the `testing` feature provides
//! in-process doubles for all of them.
//!
//! The UI layer talks to the [Plugin] with [MethodCall]s; the runtime's foreign-call layer talks
//! to the [Bridge], usually through the C ABI in `libfvp`.

mod bridge;
mod cleanup;
mod config;
mod decoder;
mod error;
mod log;
mod message;
mod port;
mod registry;
mod rpc;

pub mod gpu;
pub mod texture;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bridge::*;
pub use cleanup::*;
pub use config::*;
pub use decoder::*;
pub use error::*;
pub use gpu::{ExternalHandle, Gpu, SurfaceBinding};
pub use log::*;
pub use message::*;
pub use port::*;
pub use registry::*;
pub use rpc::*;
pub use texture::{Compositor, TexturePlayer, TextureSource};

// Re-export the crates that appear in our API.
pub use bytes;
