//! Router Module Index
//!
//! Splits the API into an anonymous-capable group and a group that sits behind the
//! authentication layer, so a protected endpoint cannot be exposed by accident.

/// Routes open to every caller. Content access is still decided per snippet.
pub mod public;

/// Routes wrapped by the `AuthUser` middleware; every handler gets a verified caller.
pub mod authenticated;
