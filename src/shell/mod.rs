// Browser-to-SSH shell bridge

pub mod relay;
pub mod remote;

pub use relay::{relay, RelayEnd, Utf8Carry};
pub use remote::{RemoteShell, RemoteTarget, ShellError, ShellOptions, ShellStreams};

/// Read size for every stream the bridge pumps.
pub const CHUNK_SIZE: usize = 4096;
