pub mod email;
pub mod qr;
pub mod sessions;
pub mod throttle;
