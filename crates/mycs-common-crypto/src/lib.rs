// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cryptographic primitives for the node authentication handshake.
//!
//! Three pieces, matching the three legs of the handshake: RSA-OAEP key
//! wrapping for the request/response key blobs, X25519 agreement for the
//! per-session shared secret, and an AES-256-GCM transport cipher keyed by
//! that secret. Nothing here is novel; it is standard primitives wired
//! together with base64 framing on every wire-facing surface.

pub mod crypt;
pub mod ecdh;
pub mod error;
pub mod rsa_keys;

pub use crypt::Crypt;
pub use ecdh::EcdhKey;
pub use error::{CryptoError, Result};
pub use rsa_keys::{RsaKey, RsaPublicKey};
