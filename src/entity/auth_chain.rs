//! Deployment auth chains
//!
//! An auth chain proves a chain of custody from a signer address down to one
//! deployed entity id. The first link carries the claimed signer address;
//! every later link is an Ed25519 signature over its own payload, made by the
//! key named in the previous link; the final link's payload is the entity id
//! itself. Delegation links let an owner key authorize a short-lived
//! deployment key without exposing the owner key to the deploy tool.
//!
//! Addresses are `0x` + lowercase hex of a 32-byte Ed25519 verifying key.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::types::{FirmamentError, Result};

/// Address length: "0x" prefix + 64 hex chars
const ADDRESS_LEN: usize = 66;

/// Tolerance for delegation timestamps from the future (clock skew)
const FUTURE_TOLERANCE_SECS: u64 = 5 * 60;

/// Kind of a single auth-chain link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthLinkKind {
    /// First link: claims the signer address, carries no signature
    Signer,
    /// Owner key authorizes a delegate key; payload embeds the issue time
    Delegation,
    /// Final link: payload is the entity id being deployed
    SignedEntity,
}

/// One link of an auth chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthLink {
    #[serde(rename = "type")]
    pub kind: AuthLinkKind,
    pub payload: String,
    /// Hex-encoded Ed25519 signature; empty for the Signer link
    #[serde(default)]
    pub signature: String,
}

/// Ordered list of signed links proving custody from a wallet to an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthChain(pub Vec<AuthLink>);

/// Check that a string is a well-formed address (`0x` + 64 hex chars).
pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_LEN
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Render a verifying key as an address string.
pub fn address_of(key: &VerifyingKey) -> String {
    format!("0x{}", hex::encode(key.as_bytes()))
}

/// Decode an address back into its verifying key.
fn verifying_key_of(address: &str) -> Result<VerifyingKey> {
    if !is_valid_address(address) {
        return Err(FirmamentError::AuthChain(format!(
            "Malformed signer address: {}",
            address
        )));
    }

    let bytes = hex::decode(&address[2..])
        .map_err(|e| FirmamentError::AuthChain(format!("Invalid address hex: {}", e)))?;

    let key_bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| FirmamentError::AuthChain("Address is not 32 bytes".to_string()))?;

    VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| FirmamentError::AuthChain(format!("Invalid public key: {}", e)))
}

/// Verify one signature over a payload against the given address.
fn verify_link_signature(address: &str, payload: &str, signature_hex: &str) -> Result<()> {
    let key = verifying_key_of(address)?;

    let sig_bytes = hex::decode(signature_hex)
        .map_err(|e| FirmamentError::AuthChain(format!("Invalid signature hex: {}", e)))?;

    let sig_arr: [u8; 64] = sig_bytes
        .as_slice()
        .try_into()
        .map_err(|_| FirmamentError::AuthChain("Signature is not 64 bytes".to_string()))?;

    let signature = Signature::from_bytes(&sig_arr);

    key.verify(payload.as_bytes(), &signature)
        .map_err(|_| FirmamentError::AuthChain("Signature verification failed".to_string()))
}

/// Parsed delegation payload: "delegate <address> issued <unix-seconds>"
struct DelegationPayload {
    delegate: String,
    issued_at: u64,
}

fn parse_delegation_payload(payload: &str) -> Result<DelegationPayload> {
    let parts: Vec<&str> = payload.split_whitespace().collect();
    match parts.as_slice() {
        ["delegate", delegate, "issued", issued] => {
            let issued_at: u64 = issued.parse().map_err(|_| {
                FirmamentError::AuthChain(format!("Invalid delegation timestamp: {}", issued))
            })?;
            Ok(DelegationPayload {
                delegate: delegate.to_string(),
                issued_at,
            })
        }
        _ => Err(FirmamentError::AuthChain(format!(
            "Malformed delegation payload: {}",
            payload
        ))),
    }
}

impl AuthChain {
    /// Parse an auth chain from its canonical JSON bytes.
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| FirmamentError::AuthChain(format!("Invalid auth chain JSON: {}", e)))
    }

    /// Canonical JSON bytes, as persisted under `<entity_id>.auth`.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| FirmamentError::Internal(format!("Auth chain serialization: {}", e)))
    }

    /// The claimed signer address (payload of the first link), if present.
    pub fn signer_address(&self) -> Option<&str> {
        self.0.first().map(|link| link.payload.as_str())
    }

    /// Structural validation: non-empty, Signer first, SignedEntity last,
    /// only Delegation links in between, signatures present where required.
    pub fn validate_structure(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(FirmamentError::AuthChain("Auth chain is empty".to_string()));
        }

        let first = &self.0[0];
        if first.kind != AuthLinkKind::Signer {
            return Err(FirmamentError::AuthChain(
                "First link must be a SIGNER link".to_string(),
            ));
        }
        if !first.signature.is_empty() {
            return Err(FirmamentError::AuthChain(
                "SIGNER link must not carry a signature".to_string(),
            ));
        }

        if self.0.len() < 2 {
            return Err(FirmamentError::AuthChain(
                "Auth chain has no SIGNED_ENTITY link".to_string(),
            ));
        }

        for (i, link) in self.0.iter().enumerate().skip(1) {
            let is_last = i == self.0.len() - 1;
            match (link.kind, is_last) {
                (AuthLinkKind::SignedEntity, true) => {}
                (AuthLinkKind::Delegation, false) => {}
                (AuthLinkKind::Signer, _) => {
                    return Err(FirmamentError::AuthChain(
                        "SIGNER link is only valid in first position".to_string(),
                    ));
                }
                (AuthLinkKind::SignedEntity, false) => {
                    return Err(FirmamentError::AuthChain(
                        "SIGNED_ENTITY link must be the final link".to_string(),
                    ));
                }
                (AuthLinkKind::Delegation, true) => {
                    return Err(FirmamentError::AuthChain(
                        "Auth chain must end with a SIGNED_ENTITY link".to_string(),
                    ));
                }
            }
            if link.signature.is_empty() {
                return Err(FirmamentError::AuthChain(format!(
                    "Link {} is missing its signature",
                    i
                )));
            }
        }

        Ok(())
    }

    /// Full verification: structure, every signature against the previous
    /// link's key, delegation freshness, and the final payload matching
    /// `entity_id`.
    ///
    /// `max_signature_age_secs = 0` disables the delegation-age check.
    pub fn verify(&self, entity_id: &str, now_secs: u64, max_signature_age_secs: u64) -> Result<()> {
        self.validate_structure()?;

        let mut current_address = self.0[0].payload.clone();
        if !is_valid_address(&current_address) {
            return Err(FirmamentError::AuthChain(format!(
                "Malformed signer address: {}",
                current_address
            )));
        }

        for link in self.0.iter().skip(1) {
            verify_link_signature(&current_address, &link.payload, &link.signature)?;

            match link.kind {
                AuthLinkKind::Delegation => {
                    let delegation = parse_delegation_payload(&link.payload)?;

                    if delegation.issued_at > now_secs + FUTURE_TOLERANCE_SECS {
                        return Err(FirmamentError::AuthChain(
                            "Delegation timestamp is in the future".to_string(),
                        ));
                    }
                    if max_signature_age_secs > 0
                        && now_secs.saturating_sub(delegation.issued_at) > max_signature_age_secs
                    {
                        return Err(FirmamentError::AuthChain(
                            "Delegation signature has expired".to_string(),
                        ));
                    }

                    current_address = delegation.delegate;
                }
                AuthLinkKind::SignedEntity => {
                    if link.payload != entity_id {
                        return Err(FirmamentError::AuthChain(format!(
                            "Final link signs '{}' but the deployed entity is '{}'",
                            link.payload, entity_id
                        )));
                    }
                }
                AuthLinkKind::Signer => unreachable!("rejected by validate_structure"),
            }
        }

        Ok(())
    }

    /// Build a two-link chain where the signer key signs the entity id
    /// directly. Used by deploy tooling and tests.
    pub fn single_signer(key: &SigningKey, entity_id: &str) -> Self {
        let address = address_of(&key.verifying_key());
        let signature = key.sign(entity_id.as_bytes());

        AuthChain(vec![
            AuthLink {
                kind: AuthLinkKind::Signer,
                payload: address,
                signature: String::new(),
            },
            AuthLink {
                kind: AuthLinkKind::SignedEntity,
                payload: entity_id.to_string(),
                signature: hex::encode(signature.to_bytes()),
            },
        ])
    }

    /// Build a three-link chain: owner delegates to an ephemeral key which
    /// then signs the entity id. Used by deploy tooling and tests.
    pub fn with_delegation(
        owner: &SigningKey,
        delegate: &SigningKey,
        issued_at_secs: u64,
        entity_id: &str,
    ) -> Self {
        let owner_address = address_of(&owner.verifying_key());
        let delegate_address = address_of(&delegate.verifying_key());

        let delegation_payload =
            format!("delegate {} issued {}", delegate_address, issued_at_secs);
        let delegation_sig = owner.sign(delegation_payload.as_bytes());
        let entity_sig = delegate.sign(entity_id.as_bytes());

        AuthChain(vec![
            AuthLink {
                kind: AuthLinkKind::Signer,
                payload: owner_address,
                signature: String::new(),
            },
            AuthLink {
                kind: AuthLinkKind::Delegation,
                payload: delegation_payload,
                signature: hex::encode(delegation_sig.to_bytes()),
            },
            AuthLink {
                kind: AuthLinkKind::SignedEntity,
                payload: entity_id.to_string(),
                signature: hex::encode(entity_sig.to_bytes()),
            },
        ])
    }
}
