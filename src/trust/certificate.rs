//! Ed25519 certificates for the package trust hierarchy.
//!
//! A certificate binds a subject and a role to an Ed25519 public key. The
//! issuer signs the JSON encoding of the [`CertificateBody`]; the root
//! certificate is self-signed. Issuers are referenced by the fingerprint of
//! their public key, so a regenerated root never validates certificates
//! issued under its predecessor.

use super::role::{CertificateRole, Role};
use crate::error::{PackageError, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Distinguished-name fields describing a certificate subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectFields {
    /// Country (`C`).
    pub country: String,
    /// State or province (`ST`).
    pub state: String,
    /// Locality (`L`).
    pub locality: String,
    /// Organization (`O`).
    pub organization: String,
    /// Organizational unit (`OU`).
    pub organizational_unit: String,
    /// Common name (`CN`).
    pub common_name: String,
}

impl SubjectFields {
    /// Return the default subject with the given common name.
    #[must_use]
    pub fn with_common_name(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            ..Self::default()
        }
    }
}

impl Default for SubjectFields {
    fn default() -> Self {
        Self {
            country: "US".to_owned(),
            state: "Washington".to_owned(),
            locality: "Richland".to_owned(),
            organization: "Agent Platform".to_owned(),
            organizational_unit: "Packaging".to_owned(),
            common_name: String::new(),
        }
    }
}

/// Reference from a certificate to the certificate that signed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerRef {
    /// Common name of the issuer.
    pub common_name: String,
    /// Hex SHA-256 fingerprint of the issuer's public key.
    pub fingerprint: String,
}

/// The signed portion of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateBody {
    /// Unique serial number.
    pub serial: String,
    /// Role the certificate grants.
    pub role: CertificateRole,
    /// Subject the key belongs to.
    pub subject: SubjectFields,
    /// Hex-encoded Ed25519 public key.
    pub public_key: String,
    /// The issuing certificate.
    pub issuer: IssuerRef,
}

/// A certificate: body plus the issuer's signature over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// The signed fields.
    pub body: CertificateBody,
    /// Hex-encoded Ed25519 signature over the JSON-encoded body.
    pub signature: String,
}

impl Certificate {
    /// Create a self-signed root certificate for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::Serialization`] if the body cannot be encoded.
    pub fn self_signed(subject: SubjectFields, key: &SigningKey) -> Result<Self> {
        let verifying_key = key.verifying_key();
        let body = CertificateBody {
            serial: uuid::Uuid::new_v4().to_string(),
            role: CertificateRole::Root,
            issuer: IssuerRef {
                common_name: subject.common_name.clone(),
                fingerprint: fingerprint(&verifying_key),
            },
            subject,
            public_key: hex::encode(verifying_key.to_bytes()),
        };
        Self::sign_body(body, key)
    }

    /// Issue a role certificate for `subject_key`, signed by `issuer`.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::TrustChainBroken`] if `issuer` is not a root
    /// certificate, or a decoding error if its stored key is malformed.
    pub fn issue(
        role: Role,
        subject: SubjectFields,
        subject_key: &VerifyingKey,
        issuer: &Self,
        issuer_key: &SigningKey,
    ) -> Result<Self> {
        if issuer.body.role != CertificateRole::Root {
            return Err(PackageError::TrustChainBroken {
                reason: format!("issuer {} is not a root certificate", issuer.common_name()),
            });
        }
        let body = CertificateBody {
            serial: uuid::Uuid::new_v4().to_string(),
            role: role.into(),
            subject,
            public_key: hex::encode(subject_key.to_bytes()),
            issuer: IssuerRef {
                common_name: issuer.common_name().to_owned(),
                fingerprint: issuer.fingerprint()?,
            },
        };
        Self::sign_body(body, issuer_key)
    }

    fn sign_body(body: CertificateBody, key: &SigningKey) -> Result<Self> {
        let signature = key.sign(&serde_json::to_vec(&body)?);
        Ok(Self {
            body,
            signature: hex::encode(signature.to_bytes()),
        })
    }

    /// Return the subject common name.
    #[must_use]
    pub fn common_name(&self) -> &str {
        &self.body.subject.common_name
    }

    /// Return the role granted by this certificate.
    #[must_use]
    pub const fn role(&self) -> CertificateRole {
        self.body.role
    }

    /// Decode the certificate's public key.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::InvalidKey`] if the key is not valid hex or
    /// not a valid Ed25519 point.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        decode_verifying_key(&self.body.public_key, self.common_name())
    }

    /// Return the hex SHA-256 fingerprint of the certificate's public key.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::InvalidKey`] if the public key is malformed.
    pub fn fingerprint(&self) -> Result<String> {
        Ok(fingerprint(&self.verifying_key()?))
    }

    /// Check that this certificate was issued by `issuer`.
    ///
    /// Verifies the issuer reference against the issuer's key fingerprint
    /// and the issuer signature over the body.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::TrustChainBroken`] describing the first link
    /// that does not hold.
    pub fn verify_issued_by(&self, issuer: &Self) -> Result<()> {
        let issuer_fingerprint = issuer.fingerprint()?;
        if self.body.issuer.fingerprint != issuer_fingerprint {
            return Err(PackageError::TrustChainBroken {
                reason: format!(
                    "certificate {} was issued by key {}, trusted root is {}",
                    self.common_name(),
                    self.body.issuer.fingerprint,
                    issuer_fingerprint
                ),
            });
        }
        let signature = decode_signature(&self.signature, self.common_name())?;
        issuer
            .verifying_key()?
            .verify(&serde_json::to_vec(&self.body)?, &signature)
            .map_err(|e| PackageError::TrustChainBroken {
                reason: format!(
                    "issuer signature on certificate {} is invalid: {e}",
                    self.common_name()
                ),
            })
    }
}

/// Return the hex SHA-256 fingerprint of an Ed25519 public key.
#[must_use]
pub fn fingerprint(key: &VerifyingKey) -> String {
    hex::encode(Sha256::digest(key.to_bytes()))
}

/// Decode a hex-encoded Ed25519 public key.
///
/// # Errors
///
/// Returns [`PackageError::InvalidKey`] if the value is not 32 bytes of hex
/// or does not encode a valid curve point.
pub fn decode_verifying_key(value: &str, context: &str) -> Result<VerifyingKey> {
    let bytes: [u8; 32] = decode_fixed(value, context)?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| PackageError::InvalidKey {
        context: context.to_owned(),
        reason: e.to_string(),
    })
}

/// Decode a hex-encoded Ed25519 secret key.
///
/// # Errors
///
/// Returns [`PackageError::InvalidKey`] if the value is not 32 bytes of hex.
pub fn decode_signing_key(value: &str, context: &str) -> Result<SigningKey> {
    let bytes: [u8; 32] = decode_fixed(value, context)?;
    Ok(SigningKey::from_bytes(&bytes))
}

pub(crate) fn decode_signature(value: &str, context: &str) -> Result<Signature> {
    let bytes: [u8; 64] = decode_fixed(value, context)?;
    Ok(Signature::from_bytes(&bytes))
}

fn decode_fixed<const N: usize>(value: &str, context: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(value.trim()).map_err(|e| PackageError::InvalidKey {
        context: context.to_owned(),
        reason: e.to_string(),
    })?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| PackageError::InvalidKey {
        context: context.to_owned(),
        reason: format!("expected {N} bytes, got {len}"),
    })
}
