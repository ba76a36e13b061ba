//! # Runtime
//!
//! The two long-running loops behind `Operator::run` and the retry bookkeeping
//! they share.
//!
//! - `watch_loop`: store maintenance and reconnects
//! - `dispatcher`: serialized reconciler invocations
//! - `retry`: failure counts and backoff timers

pub(crate) mod dispatcher;
pub(crate) mod retry;
pub(crate) mod watch_loop;
