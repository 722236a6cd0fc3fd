pub mod bearer;
pub mod grant;
pub mod init;
pub mod keys;
pub mod monitor;
pub mod probe;
pub mod recover;
pub mod serve;
pub mod share;
pub mod verify_token;
pub mod version;

pub use bearer::Bearer;
pub use grant::Grant;
pub use init::Init;
pub use keys::Keys;
pub use monitor::Monitor;
pub use probe::Probe;
pub use recover::Recover;
pub use serve::Serve;
pub use share::Share;
pub use verify_token::VerifyToken;
pub use version::Version;
