//! A small MQTT 3.1 client protocol engine. It speaks the full v3.1 control
//! packet set and drives the connection on the application's behalf: the
//! CONNECT handshake, the QoS 1 and 2 acknowledgement exchanges, keep alive
//! pings and reconnection with a growing backoff.
//!
//! It is backed by tokio; the engine suspends only on socket readiness and
//! timers, and application handlers run inline on the task driving it.
//!
//! ## Examples
//!
//! See [`client`] for a walkthrough of the engine API, and [`packet`] for the
//! wire format types.
pub mod client;
pub mod packet;
pub mod transport;

mod codec;
