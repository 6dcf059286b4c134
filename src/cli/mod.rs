mod args;
mod paths;

pub use args::{Cli, Commands, PackArgs};
pub use paths::resolve_project_dir;
