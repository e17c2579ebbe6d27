pub mod auth;
pub mod lockdown;
