//! C bindings for `fvp`, used by the scripting runtime's foreign-call layer.
//!
//! The host hands over its engine as a table of function pointers with [fvp_init], then registers
//! a native port per player. Engine threads report back through the `fvp_engine_*` functions;
//! those may block until the runtime calls [fvp_reply_type].

mod api;
mod engine;
mod error;
mod ffi;
mod port;
mod state;

pub use api::*;
pub use engine::*;
pub use error::*;
pub use port::*;
