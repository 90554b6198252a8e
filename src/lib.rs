pub mod config;
pub mod dispatcher;
pub mod telegram;
pub mod tracker;
