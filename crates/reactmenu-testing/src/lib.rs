//! Testing utilities for reactmenu.
//!
//! - [`MemoryTransport`]: surfaces in a map, recorded edits, pushable reaction stream
//! - [`StaticDelegates`]: a trusted-delegate directory tests can mutate
//! - [`PagedOwner`]: a page-flipping menu owner with child cascades
//! - [`Harness`]: all of the above wired into a [`reactmenu::Dispatcher`]

mod delegates;
mod harness;
mod paged;
mod transport;

pub use delegates::StaticDelegates;
pub use harness::{Harness, AUTHOR, BOT, CHANNEL, FRIEND, STRANGER};
pub use paged::{
    render_page, PagedOwner, CHILD_NEXT, CHILD_PREV, CLOSE, NEXT, PREV, QUIZ_DETAIL, QUIZ_MENU,
    QUIZ_OWNER,
};
pub use transport::{Edit, MemoryTransport};
