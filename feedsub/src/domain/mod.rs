//! Domain types for feedsub
//!
//! Only an item's identifier carries meaning to the subscription loop; the
//! rest of the record is passed through to the consumer untouched.

mod item;

pub use item::{Item, ItemId};
