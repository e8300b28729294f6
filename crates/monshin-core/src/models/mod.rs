pub mod audit;
pub mod prompt;
pub mod session;
pub mod settings;
pub mod snapshot;
pub mod template;
pub mod user;
