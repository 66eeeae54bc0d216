pub mod connect;
pub mod daemon;
pub mod domain;
pub mod init;
pub mod session;
pub mod user;
pub mod version;

pub use connect::Connect;
pub use daemon::Daemon;
pub use domain::Domain;
pub use init::Init;
pub use session::Session;
pub use user::User;
pub use version::Version;
