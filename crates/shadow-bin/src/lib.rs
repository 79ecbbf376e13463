pub mod aliases;
pub mod command;
pub mod env;
pub mod links;
pub mod npm_root;
pub mod shims;

pub use command::RealCommand;
pub use env::prepare_environment;
pub use links::{find_real_binary, install_links};
pub use npm_root::{npm_install_root, NpmRoot};
