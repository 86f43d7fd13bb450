// Copyright (c) 2024-2025 The Keywarden Project

//! Keywarden hardware wallet core.
//!
//! This crate ties the firmware together: the [crypto] module provides
//! key derivation and the [`Token`][crypto::Token] capability, [apps]
//! routes command APDUs to per-application handlers (currently the
//! Cosmos SDK signer), and [hid] pumps HID reports between the USB
//! transport and the dispatcher.
//!
//! Platform integration (USB device registration, TrustZone monitor
//! bootstrap) lives outside this crate; the core only assumes it is
//! handed 64-byte reports.

pub use keywarden_apdu as apdu;
pub use keywarden_transport as transport;

pub mod apps;

pub mod crypto;

pub mod hid;
