//! callbridge: device-capability bridge for cross-platform app shells.
//!
//! The shell talks to this crate over a versioned JSON command channel
//! ([`host`]) to list and launch apps, toggle radios, place calls, and
//! report capability grants. The core is the call-state monitor
//! ([`telephony`]), which turns the platform's noisy telephony broadcasts
//! into one `call.incoming` and at most one `call.ended` per call.
//!
//! # Architecture
//!
//! - **Platform**: [`platform::PlatformHandler`] is implemented by the shell
//!   on top of the native APIs
//! - **Call monitor**: a single task owning a pure state machine, a debounce
//!   gate with a withheld-number fallback, and an identity resolver
//! - **Registration**: capability-gated attachment to the event source with
//!   a one-shot retry on grant
//! - **Host channel**: mpsc request router plus broadcast event bus, exposed
//!   over stdin/stdout by the `callbridge-host` binary

pub mod apps;
pub mod bridge_dirs;
pub mod config;
pub mod dialer;
pub mod error;
pub mod host;
pub mod permissions;
pub mod platform;
pub mod telephony;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use telephony::{CallLifecycleEvent, CallService};
