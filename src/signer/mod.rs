//! Digital Signature Module
//!
//! Applies an XML-DSig signature to the batch document, binding an RSA-SHA1
//! signature to the `LoteRps` element as the ABRASF standard expects.
//!
//! # Modes
//! - **Credentialed**: loads the provider's PKCS#12 bundle, digests the
//!   `LoteRps` element and appends a `Signature` block referencing it.
//! - **Pass-through**: no credential supplied; the document is wrapped as
//!   "signed" without modification. Development only; the mode used is
//!   always surfaced in the outcome report for auditability.
//!
//! Signing never alters existing content; it only appends the signature
//! block. Canonicalization is the builder's deterministic serialization,
//! so re-signing identical input yields a byte-identical digest.

mod xmldsig;

use crate::error::SigningError;
use crate::types::{BatchDocument, SignatureMode, SignedDocument};
use std::path::PathBuf;
use tracing::{info, warn};

/// Location of the provider's PKCS#12 certificate bundle
#[derive(Debug, Clone)]
pub struct SigningCredential {
    pub pfx_path: PathBuf,
    /// Empty string for unprotected bundles
    pub passphrase: String,
}

/// Sign a batch document, or pass it through when no credential is supplied
///
/// Credentials are loaded inside the call and dropped before it returns;
/// key material is never retained between sign operations.
pub fn sign(
    doc: BatchDocument,
    credential: Option<&SigningCredential>,
) -> Result<SignedDocument, SigningError> {
    match credential {
        Some(credential) => {
            info!(batch_number = doc.batch_number, "signing batch document");
            xmldsig::sign_batch(doc, credential)
        }
        None => {
            warn!(
                batch_number = doc.batch_number,
                "signature disabled, forwarding batch document unsigned"
            );
            Ok(SignedDocument {
                xml: doc.xml,
                mode: SignatureMode::Passthrough,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> BatchDocument {
        BatchDocument {
            batch_number: 7,
            record_count: 1,
            lote_id: "lote_7".to_string(),
            xml: "<EnviarLoteRpsEnvio xmlns='http://www.abrasf.org.br/nfse.xsd'>\
                  <LoteRps Id='lote_7'><NumeroLote>7</NumeroLote></LoteRps>\
                  </EnviarLoteRpsEnvio>"
                .to_string(),
        }
    }

    #[test]
    fn pass_through_leaves_document_untouched() {
        let doc = document();
        let signed = sign(doc.clone(), None).unwrap();
        assert_eq!(signed.xml, doc.xml);
        assert_eq!(signed.mode, SignatureMode::Passthrough);
    }

    #[test]
    fn pass_through_twice_is_a_no_op() {
        let doc = document();
        let once = sign(doc.clone(), None).unwrap();
        let again = sign(doc, None).unwrap();
        assert_eq!(once, again);
    }

    #[test]
    fn missing_certificate_is_reported_as_such() {
        let credential = SigningCredential {
            pfx_path: PathBuf::from("certs/does-not-exist.pfx"),
            passphrase: String::new(),
        };
        let err = sign(document(), Some(&credential)).unwrap_err();
        assert!(matches!(err, SigningError::CertificateNotFound(_)));
    }
}
