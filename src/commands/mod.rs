//! Command Layer
//!
//! The in-process, command-shaped entry point to the keyspace. A transport
//! adapter would decode a request into `[name, arg, ...]`, hand it to
//! [`CommandHandler::execute`] and encode the returned [`Reply`].
//!
//! ```text
//!   [name, args...]
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  validate, parse arguments, dispatch
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Keyspace     │  type engines
//! └────────┬────────┘
//!          │
//!          ▼
//!        Reply
//! ```

pub mod handler;
pub mod reply;

pub use handler::CommandHandler;
pub use reply::Reply;
