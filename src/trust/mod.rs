//! Certificate store and signer roles.
//!
//! # Modules
//!
//! - [`certificate`] - Ed25519 certificates and key encoding.
//! - [`known_hosts`] - Remote peer key record.
//! - [`role`] - The closed set of signer roles.
//! - [`store`] - On-disk root and role certificate issuance.

pub mod certificate;
pub mod known_hosts;
pub mod role;
pub mod store;

pub use certificate::{Certificate, SubjectFields};
pub use role::{CertificateRole, Role};
pub use store::{Identity, Overwrite, StoreState, TrustStore};
