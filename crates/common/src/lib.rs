//! Common utilities and types shared across Gatekeeper components.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (size limits, unverified header extraction)
pub mod jwt;
