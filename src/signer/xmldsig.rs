//! XML-DSig signature construction
//!
//! Produces an enveloped signature over the `LoteRps` element using the
//! algorithm suite the ABRASF standard mandates: Canonical XML 1.0,
//! RSA-SHA1 signatures and SHA-1 digests. The canonical bytes of the
//! element are taken from the builder's deterministic serialization, so
//! the digest is stable for identical input.

use crate::error::SigningError;
use crate::signer::SigningCredential;
use crate::types::{BatchDocument, SignatureMode, SignedDocument};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use openssl::x509::X509;
use std::fs;

const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
const C14N_ALGORITHM: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
const RSA_SHA1_ALGORITHM: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
const SHA1_ALGORITHM: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
const ENVELOPED_TRANSFORM: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

/// Sign the `LoteRps` element and append the signature block to the envelope
pub(super) fn sign_batch(
    doc: BatchDocument,
    credential: &SigningCredential,
) -> Result<SignedDocument, SigningError> {
    let (key, certificate) = load_credential(credential)?;

    let fragment = element_fragment(&doc.xml, "LoteRps").ok_or_else(|| {
        SigningError::Signature("LoteRps element not found in batch document".to_string())
    })?;

    let digest = sha1_digest(fragment.as_bytes())?;
    let signed_info = signed_info_xml(&doc.lote_id, &BASE64.encode(digest));
    let signature_value = rsa_sha1_sign(&key, signed_info.as_bytes())?;

    let certificate_der = certificate
        .to_der()
        .map_err(|e| SigningError::Signature(e.to_string()))?;

    let block = signature_block(
        &signed_info,
        &BASE64.encode(signature_value),
        &BASE64.encode(certificate_der),
    );

    let xml = append_before_close(&doc.xml, "EnviarLoteRpsEnvio", &block).ok_or_else(|| {
        SigningError::Signature("batch document has no closing envelope tag".to_string())
    })?;

    Ok(SignedDocument {
        xml,
        mode: SignatureMode::Signed,
    })
}

/// Load the private key and certificate from the PKCS#12 bundle
///
/// Key material lives only for the duration of the sign operation.
fn load_credential(
    credential: &SigningCredential,
) -> Result<(PKey<Private>, X509), SigningError> {
    if !credential.pfx_path.exists() {
        return Err(SigningError::CertificateNotFound(
            credential.pfx_path.clone(),
        ));
    }

    let bytes = fs::read(&credential.pfx_path).map_err(|source| {
        SigningError::CertificateUnreadable {
            path: credential.pfx_path.clone(),
            source,
        }
    })?;

    let bundle =
        Pkcs12::from_der(&bytes).map_err(|e| SigningError::InvalidBundle(e.to_string()))?;
    let parsed = bundle
        .parse2(&credential.passphrase)
        .map_err(|e| SigningError::BadPassphrase(e.to_string()))?;

    let key = parsed.pkey.ok_or(SigningError::NoSigningKey)?;
    let certificate = parsed.cert.ok_or(SigningError::NoCertificate)?;
    Ok((key, certificate))
}

fn sha1_digest(data: &[u8]) -> Result<Vec<u8>, SigningError> {
    openssl::hash::hash(MessageDigest::sha1(), data)
        .map(|digest| digest.to_vec())
        .map_err(|e| SigningError::Signature(e.to_string()))
}

fn rsa_sha1_sign(key: &PKey<Private>, data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut signer = Signer::new(MessageDigest::sha1(), key)
        .map_err(|e| SigningError::Signature(e.to_string()))?;
    signer
        .update(data)
        .map_err(|e| SigningError::Signature(e.to_string()))?;
    signer
        .sign_to_vec()
        .map_err(|e| SigningError::Signature(e.to_string()))
}

/// Extract the serialized bytes of the named element, opening tag through
/// closing tag inclusive
fn element_fragment<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{}", name);
    let close = format!("</{}>", name);
    let start = xml.find(&open)?;
    let end = xml.find(&close)? + close.len();
    if end <= start {
        return None;
    }
    Some(&xml[start..end])
}

/// The `SignedInfo` element in its canonical single-line form
fn signed_info_xml(lote_id: &str, digest_b64: &str) -> String {
    format!(
        "<SignedInfo xmlns=\"{DSIG_NS}\">\
         <CanonicalizationMethod Algorithm=\"{C14N_ALGORITHM}\"/>\
         <SignatureMethod Algorithm=\"{RSA_SHA1_ALGORITHM}\"/>\
         <Reference URI=\"#{lote_id}\">\
         <Transforms>\
         <Transform Algorithm=\"{ENVELOPED_TRANSFORM}\"/>\
         <Transform Algorithm=\"{C14N_ALGORITHM}\"/>\
         </Transforms>\
         <DigestMethod Algorithm=\"{SHA1_ALGORITHM}\"/>\
         <DigestValue>{digest_b64}</DigestValue>\
         </Reference>\
         </SignedInfo>"
    )
}

fn signature_block(signed_info: &str, signature_b64: &str, certificate_b64: &str) -> String {
    format!(
        "<Signature xmlns=\"{DSIG_NS}\">\
         {signed_info}\
         <SignatureValue>{signature_b64}</SignatureValue>\
         <KeyInfo><X509Data><X509Certificate>{certificate_b64}</X509Certificate></X509Data></KeyInfo>\
         </Signature>"
    )
}

/// Splice `block` immediately before the closing tag of `root`
fn append_before_close(xml: &str, root: &str, block: &str) -> Option<String> {
    let close = format!("</{}>", root);
    let position = xml.rfind(&close)?;
    let mut out = String::with_capacity(xml.len() + block.len());
    out.push_str(&xml[..position]);
    out.push_str(block);
    out.push_str(&xml[position..]);
    Some(out)
}
