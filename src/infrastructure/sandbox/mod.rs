pub mod process;
pub mod workspace;

pub use process::{ProcessSandbox, SandboxConfig};
