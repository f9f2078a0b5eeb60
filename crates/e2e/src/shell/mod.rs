//! Remote shells into tool session containers

pub mod container;
pub mod session;
pub mod transport;
pub mod workspace;

pub use container::{ContainerManager, SessionBook, SessionLease};
pub use session::{SessionSnapshot, ToolSession};
pub use transport::{CommandOutput, LocalTransport, ShellChannel, SshTransport, Target, Transport};
pub use workspace::{ImportSource, Workspace};
