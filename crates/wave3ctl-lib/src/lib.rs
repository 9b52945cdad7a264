//! wave3ctl — USB control-transfer proxy and controller for the Elgato Wave:3.

pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod hooks;
pub mod locator;
pub mod monitor;
pub mod protocol;
pub mod proxy;
pub mod reconnect;
pub mod transport;
pub mod wave3;
pub mod xfer;

#[cfg(unix)]
pub mod client;
#[cfg(unix)]
pub mod server;

pub use error::Wave3Error;
