pub mod auth_session;
pub mod instance;
pub mod terminal;
