pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Connect, Daemon, Domain, Init, Session, User, Version};
