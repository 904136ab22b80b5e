//! Filter context coordinator
//!
//! The context mediates between filter values and the controllers acting on
//! them:
//! - **Attachment:** values and controllers register by key and get handles
//! - **Initialisation:** every value initialises concurrently behind one signal
//! - **Notification:** value updates fan out to the key's controllers in order
//! - **Batching:** writes and reloads inside a batch collapse into one commit

mod config;
mod core;
mod handle;
mod metrics;
mod signal;

pub use self::config::FilterContextConfig;
pub use self::core::FilterContext;
pub use self::handle::{ControllerHandle, ValueHandle};
pub use self::metrics::FilterContextMetrics;
pub use self::signal::{InitPhase, InitSignal};
