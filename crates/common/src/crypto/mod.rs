//! Cryptographic primitives for Q2Q
//!
//! - **Identity & Authentication**: Ed25519 keypairs back every certificate,
//!   domain authorities sign with them and peers prove possession with them
//!   during the handshake
//! - **Password derivation**: Argon2id turns a user's password into the
//!   derived key kept by the user store
//!
//! Ed25519 signatures are deterministic, so signing the same certificate body
//! with the same key always produces the same certificate.

mod kdf;
mod keys;

pub use ed25519_dalek::Signature;
pub use kdf::{DerivedKey, KdfError, KdfParams, DERIVED_KEY_SIZE, KDF_VERSION};
pub use keys::{KeyError, PublicKey, SecretKey, PRIVATE_KEY_PEM_TAG};
