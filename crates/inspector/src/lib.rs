//! Remote DOM mirror synchronization
//!
//! Protocol-facing layer over the `mirror` tree crate: keeps a client-side
//! replica of an inspected page's DOM consistent with the push events of a
//! remote debugging connection.
//!
//! # Architecture
//!
//! 1. **One agent per connection**: `DomMirror` owns the registry and the
//!    current document generation; everything resets together on navigation.
//! 2. **Seams, not transports**: outbound requests go through the
//!    `DomBackend` trait, inbound events arrive as decoded envelopes through
//!    `DomDispatcher`. The wire itself lives elsewhere.
//! 3. **Typed notifications**: one `MirrorEvent` enum over a broadcast
//!    channel; no stringly-typed listener registration.

pub mod agent;
pub mod backend;
pub mod dispatcher;
pub mod events;
pub mod highlight;
pub mod protocol;

pub use agent::{DomMirror, InspectorError, MirrorConfig};
pub use backend::{BackendError, BackendResult, DomBackend};
pub use dispatcher::DomDispatcher;
pub use events::{EventBus, MirrorEvent};
pub use highlight::{BackendHighlighter, HighlightConfig, HighlightMode, NodeHighlighter};
pub use protocol::{ProtocolEvent, RemoteError, SearchId};
