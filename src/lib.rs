/// Gatehouse - credential and session-token lifecycle service
///
/// Password authentication with an optional TOTP second factor, signed
/// and encrypted bearer tokens with refresh rotation, and time-boxed
/// single-use links for password reset and email verification.

pub mod account;
pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod crypto;
pub mod db;
pub mod error;
pub mod jobs;
pub mod link;
pub mod mailer;
pub mod otp;
pub mod rate_limit;
pub mod server;
pub mod token;
