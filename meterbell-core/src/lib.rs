#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod dedupe;
pub mod entities;
pub mod events;
pub mod framework;
pub mod processors;
pub mod threshold;

#[cfg(test)]
pub(crate) mod testing;
