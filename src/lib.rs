// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! GM/T 0010 Cryptographic Message Syntax in Pure Rust

This crate implements the message syntax defined by GM/T 0010: the
PKCS #7 derived containers profiled for the Chinese SM cipher suite
(SM2 public-key cryptography, the SM3 digest and SM4-CBC content
encryption). Messages live under the OID arc `1.2.156.10197.6.1.4.2`
and come in six content types:

* `data`: raw octets;
* `signedData`: content plus one signature per signer;
* `envelopedData`: content encrypted under a fresh key, the key wrapped
  to each recipient;
* `signedAndEnvelopedData`: both of the above in one container;
* `encryptedData`: content encrypted under a pre-shared key;
* `keyAgreementInfo`: the structural companion of SM2 key agreement.

The low-level ASN.1 structures are defined in the [asn1] module tree and
(de)serialize through `bcder`, always in DER. On top of them sit builder
types ([SignedDataBuilder], [EnvelopedDataBuilder],
[SignedAndEnvelopedDataBuilder], [EncryptedDataBuilder]) and the compound
operations [encrypt]/[decrypt], [seal]/[open], [sign]/[verify] and
[sign_and_seal]/[open_and_verify].

# IMPORTANT SECURITY LIMITATIONS

**The verification functionality in this crate is purposefully limited
and isn't sufficient for trusting signed data.**

Signature verification answers the question *did the certificate
embedded in this message sign this content*. It does NOT validate the
certificates themselves: no chain building, no expiry or revocation
checking, no trust anchoring. If you use this crate to verify signed
data you need to answer *do I trust the signer* through other means.
*/

pub mod asn1;
mod algorithm;
mod certificate;
mod envelope;
mod signing;
#[cfg(test)]
mod testutil;

pub use {
    algorithm::{
        ContentEncryptionAlgorithm, DigestAlgorithm, KeyEncryptionAlgorithm, SignatureAlgorithm,
        SigningKey, CEK_LENGTH, IV_LENGTH, SM2_DEFAULT_ID,
    },
    asn1::gmt0010::ContentType,
    certificate::{certificate_matches, Certificate},
    envelope::{decrypt, encrypt, open, seal, EncryptedDataBuilder, EnvelopedDataBuilder},
    signing::{
        sign, sign_and_seal, SignedAndEnvelopedDataBuilder, SignedDataBuilder, SignerBuilder,
    },
};

use {
    crate::asn1::gmt0010::{
        ContentInfo, SignerInfos, OID_MESSAGE_DIGEST, OID_SIGNED_AND_ENVELOPED_DATA,
        OID_SIGNED_DATA,
    },
    bcder::{decode::DecodeError, OctetString, Oid},
    bytes::Bytes,
    std::{convert::Infallible, ops::Deref},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum CmsError {
    /// A DER parse error: unexpected tag, bad length, trailing bytes.
    #[error("malformed structure: {0}")]
    Decode(#[from] DecodeError<Infallible>),

    /// A structurally valid message missing a required piece.
    #[error("malformed structure: {0}")]
    MalformedStructure(&'static str),

    /// An algorithm identifier outside the fixed SM suite.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(Oid),

    /// A field value violating the GM/T 0010 profile.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// The outer content type does not match the operation invoked.
    #[error("unexpected content type: {0}")]
    UnexpectedContentType(Oid),

    /// SM4 padding or SM2 decryption failed.
    #[error("decryption failure")]
    DecryptionFailure,

    /// At least one signer info did not verify.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// A referenced issuer and serial number is absent from the message's
    /// certificates.
    #[error("certificate not found")]
    CertificateNotFound,

    /// An underlying cryptographic primitive signalled failure.
    #[error("cryptographic provider error: {0}")]
    CryptoProvider(&'static str),

    /// A general I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Represents a parsed `signedData` message.
///
/// This is a high-level interface over the ASN.1 structure. It exposes
/// the signed content, the embedded certificates and signature
/// verification; use [asn1::gmt0010::SignedData] directly for wire-level
/// access.
#[derive(Clone, Debug)]
pub struct SignedData {
    /// The type of the content that was signed.
    content_type: ContentType,

    /// Content that was signed.
    ///
    /// For `data` content this is the raw octets; for nested containers
    /// it is the DER body.
    content: Bytes,

    /// Certificates embedded within the message.
    certificates: Vec<Certificate>,

    /// The backing ASN.1 structure.
    raw: asn1::gmt0010::SignedData,
}

impl SignedData {
    /// Construct an instance by parsing DER data.
    ///
    /// The data must be a full `ContentInfo` message of type `signedData`;
    /// anything else fails with [CmsError::UnexpectedContentType].
    pub fn parse_der(data: &[u8]) -> Result<Self, CmsError> {
        let info = ContentInfo::decode_der(data)?;

        if info.content_type != OID_SIGNED_DATA {
            return Err(CmsError::UnexpectedContentType(info.content_type));
        }

        let raw = info
            .content
            .clone()
            .decode(|cons| asn1::gmt0010::SignedData::take_from(cons))?;

        let content_type = ContentType::from_oid(&raw.content_info.content_type)
            .ok_or(CmsError::InvalidParameter("unrecognized inner content type"))?;

        let content = match content_type {
            ContentType::Data => raw
                .content_info
                .content
                .clone()
                .decode(|cons| OctetString::take_from(cons))?
                .into_bytes(),
            _ => Bytes::copy_from_slice(raw.content_info.content.as_slice()),
        };

        let certificates = match raw.certificates.as_ref() {
            Some(certs) => certs
                .iter()
                .map(Certificate::try_from)
                .collect::<Result<Vec<_>, CmsError>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            content_type,
            content,
            certificates,
            raw,
        })
    }

    /// The type of the enclosed content.
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Obtain the content that was signed.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Obtain the certificates embedded within the message.
    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// Obtain the signer infos attached to this message.
    pub fn signers(&self) -> &SignerInfos {
        &self.raw.signer_infos
    }

    /// Verify every signature in the message.
    ///
    /// Each signer's certificate is looked up among the embedded
    /// certificates; a signer without a certificate fails with
    /// [CmsError::CertificateNotFound], a bad signature with
    /// [CmsError::SignatureInvalid].
    pub fn verify_signatures(&self) -> Result<(), CmsError> {
        signing::verify_signer_infos(&self.content, &self.certificates, &self.raw.signer_infos)
    }

    /// Verify the message-digest authenticated attribute of every signer
    /// that carries one.
    ///
    /// The attribute must contain the digest of the enclosed content.
    /// Signers without authenticated attributes are skipped; an attribute
    /// set missing the message digest fails with
    /// [CmsError::MalformedStructure].
    pub fn verify_message_digests(&self) -> Result<(), CmsError> {
        for info in self.raw.signer_infos.iter() {
            let attributes = match &info.authenticated_attributes {
                Some(attributes) => attributes,
                None => continue,
            };

            let attribute = attributes
                .iter()
                .find(|attribute| attribute.typ == OID_MESSAGE_DIGEST)
                .ok_or(CmsError::MalformedStructure(
                    "message-digest attribute is missing",
                ))?;

            let value = attribute.values.first().ok_or(CmsError::MalformedStructure(
                "message-digest attribute is empty",
            ))?;

            let wanted = value
                .deref()
                .clone()
                .decode(|cons| OctetString::take_from(cons))?
                .into_bytes();

            let algorithm = DigestAlgorithm::try_from(&info.digest_algorithm)?;

            if wanted.as_ref() != algorithm.digest(&self.content).as_slice() {
                return Err(CmsError::SignatureInvalid);
            }
        }

        Ok(())
    }
}

/// Verify a `ContentInfo(signedData)` message.
///
/// Succeeds only when every signer info verifies against a certificate
/// embedded in the message. Returns the inner content type and the signed
/// content.
pub fn verify(data: &[u8]) -> Result<(ContentType, Vec<u8>), CmsError> {
    let signed_data = SignedData::parse_der(data)?;

    signed_data.verify_signatures()?;

    Ok((signed_data.content_type(), signed_data.content().to_vec()))
}

/// Open and verify a `ContentInfo(signedAndEnvelopedData)` message.
///
/// The content-encryption key is unwrapped with the recipient's private
/// key, the payload decrypted, and every signature verified over the
/// recovered plaintext. Returns the inner content type and the plaintext.
pub fn open_and_verify(
    secret_key: &sm2::SecretKey,
    certificate: &Certificate,
    data: &[u8],
) -> Result<(ContentType, Vec<u8>), CmsError> {
    let info = ContentInfo::decode_der(data)?;

    if info.content_type != OID_SIGNED_AND_ENVELOPED_DATA {
        return Err(CmsError::UnexpectedContentType(info.content_type));
    }

    let raw = info
        .content
        .clone()
        .decode(|cons| asn1::gmt0010::SignedAndEnvelopedData::take_from(cons))?;

    let cek = envelope::unwrap_recipient_key(secret_key, certificate, &raw.recipient_infos)?;
    let (content_type, plaintext) =
        envelope::decrypt_content_info(&cek, &raw.encrypted_content_info)?;

    let certificates = match raw.certificates.as_ref() {
        Some(certs) => certs
            .iter()
            .map(Certificate::try_from)
            .collect::<Result<Vec<_>, CmsError>>()?,
        None => Vec::new(),
    };

    signing::verify_signer_infos(&plaintext, &certificates, &raw.signer_infos)?;

    Ok((content_type, plaintext))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            algorithm::{OID_EC_PUBLIC_KEY, OID_SM2_P256V1, OID_SM4_CBC},
            asn1::{
                gmt0010::{CmsVersion, KeyAgreementInfo},
                rfc5280::{AlgorithmIdentifier, AlgorithmParameter, SubjectPublicKeyInfo},
            },
            testutil::self_signed_sm2_certificate,
        },
        bcder::{encode::Values, BitString, Mode},
        rand_core::OsRng,
        sm2::elliptic_curve::sec1::ToEncodedPoint,
    };

    #[test]
    fn flipped_signature_bit_is_rejected() {
        let (cert, key, _) = self_signed_sm2_certificate("signer", 1);

        let message = sign(&[&key], &[cert], b"msg").unwrap();
        crate::verify(&message).unwrap();

        let mut raw = asn1::gmt0010::SignedData::decode_der(&message).unwrap();
        let mut digest = raw.signer_infos[0].encrypted_digest.clone().into_bytes().to_vec();
        let last = digest.len() - 1;
        digest[last] ^= 0x01;
        raw.signer_infos[0].encrypted_digest = OctetString::new(Bytes::from(digest));

        let mut tampered = Vec::new();
        raw.encode_ref().write_encoded(Mode::Der, &mut tampered).unwrap();

        assert!(matches!(
            crate::verify(&tampered),
            Err(CmsError::SignatureInvalid)
        ));
    }

    #[test]
    fn trailing_byte_is_rejected_by_every_facade() {
        let (cert, key, secret) = self_signed_sm2_certificate("party", 1);
        let symmetric_key = [0u8; CEK_LENGTH];

        let mut signed = sign(&[&key], &[cert.clone()], b"msg").unwrap();
        signed.push(0x00);
        assert!(matches!(crate::verify(&signed), Err(CmsError::Decode(_))));

        let mut sealed = seal(&[cert.clone()], b"msg").unwrap();
        sealed.push(0x00);
        assert!(matches!(
            open(&secret, &cert, &sealed),
            Err(CmsError::Decode(_))
        ));

        let mut sealed_and_signed =
            sign_and_seal(&[&key], &[cert.clone()], &[cert.clone()], b"msg").unwrap();
        sealed_and_signed.push(0x00);
        assert!(matches!(
            open_and_verify(&secret, &cert, &sealed_and_signed),
            Err(CmsError::Decode(_))
        ));

        let mut encrypted = encrypt(&symmetric_key, b"msg").unwrap();
        encrypted.push(0x00);
        assert!(matches!(
            decrypt(&symmetric_key, &encrypted),
            Err(CmsError::Decode(_))
        ));
    }

    #[test]
    fn facades_reject_mismatched_content_types() {
        let (cert, key, secret) = self_signed_sm2_certificate("party", 1);
        let symmetric_key = [0u8; CEK_LENGTH];

        let signed = sign(&[&key], &[cert.clone()], b"msg").unwrap();
        let encrypted = encrypt(&symmetric_key, b"msg").unwrap();

        assert!(matches!(
            decrypt(&symmetric_key, &signed),
            Err(CmsError::UnexpectedContentType(_))
        ));
        assert!(matches!(
            crate::verify(&encrypted),
            Err(CmsError::UnexpectedContentType(_))
        ));
        assert!(matches!(
            open(&secret, &cert, &signed),
            Err(CmsError::UnexpectedContentType(_))
        ));
        assert!(matches!(
            open_and_verify(&secret, &cert, &encrypted),
            Err(CmsError::UnexpectedContentType(_))
        ));
    }

    #[test]
    fn verify_without_embedded_certificate_fails() {
        let (cert, key, _) = self_signed_sm2_certificate("signer", 1);

        let message = sign(&[&key], &[cert], b"msg").unwrap();

        let mut raw = asn1::gmt0010::SignedData::decode_der(&message).unwrap();
        raw.certificates = None;

        let mut stripped = Vec::new();
        raw.encode_ref().write_encoded(Mode::Der, &mut stripped).unwrap();

        assert!(matches!(
            crate::verify(&stripped),
            Err(CmsError::CertificateNotFound)
        ));
    }

    #[test]
    fn signer_with_foreign_digest_algorithm_is_rejected() {
        let (cert, key, _) = self_signed_sm2_certificate("signer", 1);

        let message = sign(&[&key], &[cert], b"msg").unwrap();

        let mut raw = asn1::gmt0010::SignedData::decode_der(&message).unwrap();
        raw.signer_infos[0].digest_algorithm = AlgorithmIdentifier {
            algorithm: Oid(Bytes::copy_from_slice(OID_SM4_CBC.as_ref())),
            parameters: None,
        };

        let mut tampered = Vec::new();
        raw.encode_ref().write_encoded(Mode::Der, &mut tampered).unwrap();

        assert!(matches!(
            crate::verify(&tampered),
            Err(CmsError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn signer_with_foreign_signature_algorithm_is_rejected() {
        let (cert, key, _) = self_signed_sm2_certificate("signer", 1);

        let message = sign(&[&key], &[cert], b"msg").unwrap();

        let mut raw = asn1::gmt0010::SignedData::decode_der(&message).unwrap();
        raw.signer_infos[0].digest_encryption_algorithm = AlgorithmIdentifier {
            algorithm: Oid(Bytes::copy_from_slice(OID_SM4_CBC.as_ref())),
            parameters: None,
        };

        let mut tampered = Vec::new();
        raw.encode_ref().write_encoded(Mode::Der, &mut tampered).unwrap();

        assert!(matches!(
            crate::verify(&tampered),
            Err(CmsError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn parsed_message_exposes_content_and_certificates() {
        let (cert, key, _) = self_signed_sm2_certificate("signer", 4);

        let message = sign(&[&key], &[cert.clone()], b"inspect me").unwrap();

        let signed_data = SignedData::parse_der(&message).unwrap();
        assert_eq!(signed_data.content_type(), ContentType::Data);
        assert_eq!(signed_data.content(), b"inspect me");
        assert_eq!(signed_data.certificates().len(), 1);
        assert_eq!(
            signed_data.certificates()[0].serial_number(),
            cert.serial_number()
        );
        assert_eq!(signed_data.signers().len(), 1);

        signed_data.verify_signatures().unwrap();
    }

    #[test]
    fn message_digest_attribute_is_cross_checked() {
        let (cert, key, _) = self_signed_sm2_certificate("signer", 6);

        let message = SignedDataBuilder::default()
            .signed_content(b"digested content".to_vec())
            .signer(SignerBuilder::new(&key, cert).with_authenticated_attributes())
            .build_der()
            .unwrap();

        let signed_data = SignedData::parse_der(&message).unwrap();
        signed_data.verify_signatures().unwrap();
        signed_data.verify_message_digests().unwrap();
    }

    #[test]
    fn key_agreement_info_round_trip() {
        let (cert, _, _) = self_signed_sm2_certificate("agreement user", 9);

        let ephemeral = sm2::SecretKey::random(&mut OsRng);
        let point = ephemeral.public_key().to_encoded_point(false);

        let info = KeyAgreementInfo {
            version: CmsVersion::V1,
            temp_public_key_r: SubjectPublicKeyInfo {
                algorithm: AlgorithmIdentifier {
                    algorithm: Oid(Bytes::copy_from_slice(OID_EC_PUBLIC_KEY.as_ref())),
                    parameters: Some(AlgorithmParameter::from_oid(Oid(Bytes::copy_from_slice(
                        OID_SM2_P256V1.as_ref(),
                    )))),
                },
                subject_public_key: BitString::new(0, Bytes::copy_from_slice(point.as_bytes())),
            },
            user_certificate: cert.raw_certificate().clone(),
            user_id: OctetString::new(Bytes::copy_from_slice(SM2_DEFAULT_ID.as_bytes())),
        };

        let mut der = Vec::new();
        info.encode_ref().write_encoded(Mode::Der, &mut der).unwrap();

        let parsed = KeyAgreementInfo::decode_der(&der).unwrap();
        assert_eq!(parsed.version, CmsVersion::V1);
        assert_eq!(
            parsed.user_id.clone().into_bytes().as_ref(),
            SM2_DEFAULT_ID.as_bytes()
        );
        assert_eq!(parsed.temp_public_key_r, info.temp_public_key_r);

        // Re-emission is byte identical.
        let mut reemitted = Vec::new();
        parsed
            .encode_ref()
            .write_encoded(Mode::Der, &mut reemitted)
            .unwrap();
        assert_eq!(reemitted, der);

        der.push(0x00);
        assert!(KeyAgreementInfo::decode_der(&der).is_err());
    }
}
