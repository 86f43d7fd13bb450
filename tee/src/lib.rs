// Copyright (c) 2024-2025 The Keywarden Project

//! TrustZone secure-world services.
//!
//! The Non-Secure world never touches key material: cryptographic
//! requests cross the monitor boundary as [mailbox] deposits, a trusted
//! [applet][crate::applet] services each request to completion, and the
//! reply travels back through the symmetric result slot. The
//! [`TeeToken`][token::TeeToken] wraps this exchange behind the ordinary
//! [`Token`][keywarden_core::crypto::Token] interface.
//!
//! Hardware concerns (TrustZone region programming, world switching,
//! ELF loading) live outside this crate; [`TrustedOs`][rpc::TrustedOs]
//! models the monitor's dispatch contract only.

pub mod applet;

pub mod mailbox;

pub mod request;

pub mod rpc;

pub mod token;

pub use mailbox::{Mail, Mailbox, MailboxError};

/// Applet id of the cryptography applet
pub const CRYPTO_APPLET_ID: u32 = 1;
