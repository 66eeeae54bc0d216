/**
 * Signing certificate requests on behalf
 *  of a domain, with monotonic serials.
 */
pub mod authority;
/**
 * Domain and user certificates, private
 *  certificates and certificate requests.
 */
pub mod certificate;
/**
 * Cryptographic types and operations.
 *  - Ed25519 public and secret keys
 *  - Password key derivation
 */
pub mod crypto;
/**
 * File transfer boundary, served only
 *  over authenticated streams.
 */
pub mod filexfer;
/**
 * The `user@domain` identity type.
 */
pub mod identity;
/**
 * Store traits for derived keys, certificates,
 *  sessions and serials, plus an in-memory
 *  implementation of each.
 */
pub mod store;
/**
 * The authenticated transport and its
 *  handshake.
 */
pub mod transport;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::authority::{AuthorityError, CertificateAuthority, DomainAuthority};
    pub use crate::certificate::{
        Certificate, CertificateError, CertificateRequest, Fingerprint, PrivateCertificate,
        Subject,
    };
    pub use crate::crypto::{DerivedKey, KdfParams, PublicKey, SecretKey};
    pub use crate::identity::{IdentityAddress, IdentityError};
    pub use crate::store::{
        CertificateStorage, MemoryStore, ReplacementPolicy, SerialLedger, SessionTokenStorage,
        StoreConfig, StoreError, UserStore,
    };
    pub use crate::transport::{
        AuthenticatedStream, HandshakeState, LocalCredentials, Q2QTransport, TransportError,
    };
    pub use crate::version::build_info;
}
