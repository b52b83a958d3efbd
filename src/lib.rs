//! Client core for FriendlyChat: a shared, realtime message feed backed by a
//! managed backend. The GTK front end lives in the `friendlychat-gtk` binary.

pub mod adapter;
pub mod api;
pub mod app;
pub mod compose;
pub mod config_gate;
pub mod error;
pub mod feed;
pub mod notifications;
pub mod session;
pub mod sync;
pub mod utils;

pub use error::{Error, Result};
