//! On-board parameter store and the synchronous publish/subscribe bus.
//!
//! Parameters are double-buffered seqlock cells identified by a 16-bit
//! ID: readers never block and never observe a torn value, writers never
//! wait for readers. The [`ParameterStore`] keeps a sorted index for
//! binary-search lookup. [`Topic`] delivers typed messages synchronously
//! to subscribers registered at startup.

pub mod parameter;
pub mod topic;

pub use parameter::{
    AnyParameter, INVALID_ID, MAX_READ_TRIES, Parameter, ParameterError, ParameterStore,
};
pub use topic::Topic;
