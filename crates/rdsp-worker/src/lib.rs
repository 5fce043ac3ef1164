//! Subprocess isolation for codecs and audio backends: a small framed
//! control protocol over stdin/stdout, plus a bulk data channel that avoids
//! copying frame bytes when the platform supports fd passing.
//!
//! A crash or memory-safety bug in a third-party codec library brings down
//! only the worker process, never the session core: [`WorkerHandle`] is the
//! only thing the core holds, and the worker owns all of its own memory.

mod codec;
mod control;
mod error;
mod process;

pub use control::WorkerControl;
pub use error::WorkerError;
pub use process::WorkerHandle;
