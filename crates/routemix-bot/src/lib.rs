//! RouteMix Bot - the interaction engine.
//!
//! The engine consumes free-text messages and button-press events scoped to
//! one identity and answers with [`Reply`] effects; it is otherwise
//! transport-agnostic. A messaging transport (or the bundled console
//! driver) delivers the events and renders the replies.
//!
//! A user drives a per-identity selection session — send a subscription
//! link, pick rule sets (paging, letter shortcuts, free-text search, stored
//! groups), then generate — and receives the synthesized configuration as a
//! document attachment. Stored groups are edited through a separate,
//! short-lived edit session.

pub mod engine;
pub mod event;
pub mod fetch;
pub mod session;
pub mod view;

pub use engine::{Engine, EngineConfig, GenerateError, Reply};
pub use event::Action;
pub use fetch::{Fetch, FetchError, HttpFetch};
pub use session::{ChatId, EditSession, SelectionSession, SessionStore};
pub use view::{Button, Keyboard};
