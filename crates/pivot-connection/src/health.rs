//! Liveness checks for freshly opened connections
//!
//! A socket that accepts a handshake is not proof that the server can serve
//! queries. Failover only hands out connections that completed a round trip.

mod ping;
mod validate;

#[cfg(test)]
mod tests;

pub use ping::{PingError, PingResult, ping_connection};
pub use validate::validate_connection;
