//! Request and response shapes exposed to the surrounding web layer.

pub mod auth;
