pub mod args;
pub mod files;
pub mod op;
pub mod ops;

pub use ops::{
    Bearer, Grant, Init, Keys, Monitor, Probe, Recover, Serve, Share, Version, VerifyToken,
};
