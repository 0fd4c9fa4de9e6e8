//! Relay boundary: the single HTTP entry point to the language-model and
//! speech provider.
//!
//! * [`Relay`] — async trait every provider call goes through.
//! * [`HttpRelay`] — `reqwest` implementation posting `{endpoint, method, body}`.
//! * [`RelayRequest`] / [`RelayResponse`] / [`Endpoint`] — wire types.
//! * [`RelayError`] — transport, timeout, status and decode failures.

pub mod client;

pub use client::{Endpoint, HttpRelay, Relay, RelayError, RelayRequest, RelayResponse};
