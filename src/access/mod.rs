//! Cross-cutting request gates: the service-enabled toggle and the
//! account-list credential check.

pub mod credentials;
pub mod gate;
