//! Change notification primitives used by `Database`.
//!
//! - [`event`]: [`ChangeKind`] and the [`ChangeEvent`] enum.
//! - [`listeners`]: [`ListenerRegistry<E>`] and [`ListenerId`].

pub mod event;
pub mod listeners;

pub use event::{ChangeEvent, ChangeKind};
pub use listeners::{ListenerFn, ListenerId, ListenerRegistry};
