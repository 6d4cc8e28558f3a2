//! In-process mock IPC server (component C6): the local RPC endpoint the
//! instrumented SUT connects to during replay, serving recorded spans back
//! as mocks via the span-matching engine.

pub mod hashes;
pub mod protocol;
pub mod server;
pub mod state;
pub mod transport;
pub mod version;

pub use protocol::{MockInteraction, MockInteractionSide, Request, Response};
pub use server::IpcServer;
pub use state::{SdkConnectWaitError, ServerState};
pub use transport::IpcTransport;
