//! The UAPI control protocol: wire codec, state types, and the engine-side
//! request handler and listener.

pub mod codec;
pub mod device;
#[cfg(unix)]
pub mod server;
pub mod types;

pub use codec::{ConfigurationError, ProtocolError};
pub use device::{DeviceUapi, IpcError};
#[cfg(unix)]
pub use server::{ShutdownSignal, serve};
pub use types::{Configuration, Handshake, InterfaceState, PeerConfig, PeerState};
