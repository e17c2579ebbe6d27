pub mod migration;
pub mod scan;
pub mod settings;
pub mod stats;
pub mod ticket;
pub mod user;
pub mod webhook;
