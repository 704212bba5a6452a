pub mod config;
pub mod module;

pub use config::handle_config_command;
pub use module::handle_module_command;
