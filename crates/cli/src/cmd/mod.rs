mod deploy;
mod purge;
mod status;
mod validate;

pub use deploy::cmd_deploy;
pub use purge::cmd_purge;
pub use status::cmd_status;
pub use validate::cmd_validate;
