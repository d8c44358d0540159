//! Everything that talks to the remote host: the byte-level transport, the
//! session built on top of it and the platform tool discovery.

pub mod platform;
pub mod session;
pub mod ssh;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use platform::PlatformLocation;
pub use session::RemoteSession;
pub use ssh::SshTransport;
pub use transport::{CommandOutput, CommandRunner, Transport, quote_arg, quote_path};
