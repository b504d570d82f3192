// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Functionality for signing data. */

use {
    crate::{
        algorithm::{
            verify_sm2_signature, DigestAlgorithm, SignatureAlgorithm, SigningKey, CEK_LENGTH,
            IV_LENGTH,
        },
        asn1::{
            asn1time::UtcTime,
            gmt0010::{
                Attribute, AttributeValue, AuthenticatedAttributes, CertificateSet, CmsVersion,
                ContentInfo, ContentType, DigestAlgorithmIdentifiers, RecipientInfos, SignedData,
                SignedAndEnvelopedData, SignerInfo, SignerInfos, OID_CONTENT_TYPE,
                OID_MESSAGE_DIGEST, OID_SIGNING_TIME,
            },
        },
        certificate::{certificate_matches, Certificate},
        envelope::{encrypt_content_info, wrap_recipient_key},
        CmsError,
    },
    bcder::{
        encode::{PrimitiveContent, Values},
        Captured, Mode, OctetString, Oid,
    },
    bytes::Bytes,
    rand_core::{OsRng, RngCore},
    std::collections::HashSet,
};

/// Builder type to construct an entity that will sign some data.
///
/// Instances are attached to [SignedDataBuilder] or
/// [SignedAndEnvelopedDataBuilder] instances where they sign data using
/// configured settings.
pub struct SignerBuilder<'a> {
    /// The cryptographic key pair used for signing content.
    signing_key: &'a SigningKey,

    /// X.509 certificate used for signing.
    signing_certificate: Certificate,

    /// Content digest algorithm to use.
    digest_algorithm: DigestAlgorithm,

    /// The content type of the value being signed.
    ///
    /// Recorded in the content-type authenticated attribute. The default
    /// value is `data`.
    content_type: ContentType,

    /// Whether to emit authenticated attributes at all.
    ///
    /// The default GM profile signs the bare content; attributes are
    /// opt-in and bring the mandatory content-type and message-digest
    /// attributes with them.
    use_authenticated_attributes: bool,

    /// Extra attributes to include in the authenticated set.
    extra_authenticated_attributes: Vec<Attribute>,
}

impl<'a> SignerBuilder<'a> {
    /// Construct a new entity that will sign content.
    ///
    /// An entity is constructed from a signing key and the certificate
    /// binding it to an identity. Both are mandatory.
    pub fn new(signing_key: &'a SigningKey, signing_certificate: Certificate) -> Self {
        Self {
            signing_key,
            signing_certificate,
            digest_algorithm: DigestAlgorithm::Sm3,
            content_type: ContentType::Data,
            use_authenticated_attributes: false,
            extra_authenticated_attributes: Vec::new(),
        }
    }

    /// Obtain the signature algorithm used by the signing key.
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::from(self.signing_key)
    }

    /// Define the content type of the signed content.
    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Emit authenticated attributes even when no extra attribute is added.
    ///
    /// The mandatory content-type and message-digest attributes and a
    /// signing-time attribute are generated at signing time.
    pub fn with_authenticated_attributes(mut self) -> Self {
        self.use_authenticated_attributes = true;
        self
    }

    /// Add an additional attribute to authenticate.
    pub fn authenticated_attribute(mut self, typ: Oid, values: Vec<AttributeValue>) -> Self {
        self.extra_authenticated_attributes
            .push(Attribute { typ, values });
        self.use_authenticated_attributes = true;
        self
    }

    /// Add an additional OctetString authenticated attribute.
    ///
    /// This is a helper for converting a byte slice to an OctetString and
    /// AttributeValue without having to go through low-level ASN.1 code.
    pub fn authenticated_attribute_octet_string(self, typ: Oid, data: &[u8]) -> Self {
        self.authenticated_attribute(
            typ,
            vec![AttributeValue::new(Captured::from_values(
                Mode::Der,
                data.encode(),
            ))],
        )
    }

    /// Assemble and sign the `SignerInfo` for the given content.
    ///
    /// The signature input is the content itself followed, when
    /// authenticated attributes are present, by their DER encoding under a
    /// universal SET header.
    fn build_signer_info(&self, content: &[u8]) -> Result<SignerInfo, CmsError> {
        let authenticated_attributes = if self.use_authenticated_attributes {
            let mut attributes = AuthenticatedAttributes::default();

            // The content-type attribute is mandatory whenever the set is
            // present.
            attributes.push(Attribute {
                typ: Oid(Bytes::copy_from_slice(OID_CONTENT_TYPE.as_ref())),
                values: vec![AttributeValue::new(Captured::from_values(
                    Mode::Der,
                    self.content_type.oid().encode(),
                ))],
            });

            // So is the message digest over the content being signed.
            let digest = self.digest_algorithm.digest(content);
            attributes.push(Attribute {
                typ: Oid(Bytes::copy_from_slice(OID_MESSAGE_DIGEST.as_ref())),
                values: vec![AttributeValue::new(Captured::from_values(
                    Mode::Der,
                    digest.as_slice().encode(),
                ))],
            });

            // Add signing time because it is common to include.
            attributes.push(Attribute {
                typ: Oid(Bytes::copy_from_slice(OID_SIGNING_TIME.as_ref())),
                values: vec![AttributeValue::new(Captured::from_values(
                    Mode::Der,
                    UtcTime::now().encode(),
                ))],
            });

            attributes.extend(self.extra_authenticated_attributes.iter().cloned());

            Some(attributes)
        } else {
            None
        };

        // The function computing the digested attributes content lives on
        // SignerInfo, so construct the instance first and sign afterwards.
        let mut signer_info = SignerInfo {
            version: CmsVersion::V1,
            issuer_and_serial_number: self.signing_certificate.issuer_and_serial_number(),
            digest_algorithm: self.digest_algorithm.into(),
            authenticated_attributes,
            digest_encryption_algorithm: self.signature_algorithm().into(),
            encrypted_digest: OctetString::new(Bytes::new()),
            unauthenticated_attributes: None,
            authenticated_attributes_data: None,
        };

        let mut message = Vec::with_capacity(content.len());
        message.extend_from_slice(content);
        if let Some(attributes_data) = signer_info.authenticated_attributes_digested_content()? {
            message.extend(attributes_data);
        }

        signer_info.encrypted_digest =
            OctetString::new(Bytes::from(self.signing_key.sign(&message)?));

        Ok(signer_info)
    }
}

/// Entity for incrementally deriving a `signedData` message.
#[derive(Default)]
pub struct SignedDataBuilder<'a> {
    /// Content to sign.
    signed_content: Vec<u8>,

    /// Entities who will generate signatures.
    signers: Vec<SignerBuilder<'a>>,

    /// Extra X.509 certificates to add to the payload.
    certificates: Vec<Certificate>,
}

impl<'a> SignedDataBuilder<'a> {
    /// Define the content to sign.
    ///
    /// This content is embedded in the generated message as a `data`
    /// content info.
    pub fn signed_content(mut self, data: Vec<u8>) -> Self {
        self.signed_content = data;
        self
    }

    /// Add a signer.
    ///
    /// The signer is the thing generating the cryptographic signature over
    /// the content. At least one is required.
    pub fn signer(mut self, signer: SignerBuilder<'a>) -> Self {
        self.signers.push(signer);
        self
    }

    /// Add a certificate beyond the signer certificates.
    pub fn certificate(mut self, certificate: Certificate) -> Self {
        if !self.certificates.iter().any(|x| x == &certificate) {
            self.certificates.push(certificate);
        }

        self
    }

    /// Construct a DER-encoded `ContentInfo` containing a `SignedData`.
    pub fn build_der(&self) -> Result<Vec<u8>, CmsError> {
        if self.signers.is_empty() {
            return Err(CmsError::InvalidParameter(
                "a signed message requires at least one signer",
            ));
        }

        let (digest_algorithms, certificates, signer_infos) =
            assemble_signatures(&self.signers, &self.certificates, &self.signed_content)?;

        let signed_data = SignedData {
            version: CmsVersion::V1,
            digest_algorithms,
            content_info: ContentInfo::new_data(&self.signed_content),
            certificates: Some(certificates),
            crls: None,
            signer_infos,
        };

        let mut der = Vec::new();
        signed_data.encode_ref().write_encoded(Mode::Der, &mut der)?;

        Ok(der)
    }
}

/// Entity for incrementally deriving a `signedAndEnvelopedData` message.
///
/// The plaintext is signed by every signer, encrypted under a fresh
/// content-encryption key, and the key wrapped to every recipient. The
/// signatures cover the plaintext, never the ciphertext.
#[derive(Default)]
pub struct SignedAndEnvelopedDataBuilder<'a> {
    /// Content to sign and encrypt.
    content: Vec<u8>,

    /// Entities who will generate signatures.
    signers: Vec<SignerBuilder<'a>>,

    /// Certificates of the parties able to open the message.
    recipients: Vec<Certificate>,

    /// Opaque agreement data carried next to the ciphertext.
    shared_info1: Option<Vec<u8>>,
    shared_info2: Option<Vec<u8>>,
}

impl<'a> SignedAndEnvelopedDataBuilder<'a> {
    /// Define the content to sign and encrypt.
    pub fn content(mut self, data: Vec<u8>) -> Self {
        self.content = data;
        self
    }

    /// Add a signer.
    pub fn signer(mut self, signer: SignerBuilder<'a>) -> Self {
        self.signers.push(signer);
        self
    }

    /// Add a recipient able to open the message.
    pub fn recipient(mut self, certificate: Certificate) -> Self {
        self.recipients.push(certificate);
        self
    }

    pub fn shared_info1(mut self, data: Vec<u8>) -> Self {
        self.shared_info1 = Some(data);
        self
    }

    pub fn shared_info2(mut self, data: Vec<u8>) -> Self {
        self.shared_info2 = Some(data);
        self
    }

    /// Construct a DER-encoded `ContentInfo` containing a
    /// `SignedAndEnvelopedData`.
    pub fn build_der(&self) -> Result<Vec<u8>, CmsError> {
        if self.signers.is_empty() {
            return Err(CmsError::InvalidParameter(
                "a signed message requires at least one signer",
            ));
        }
        if self.recipients.is_empty() {
            return Err(CmsError::InvalidParameter(
                "an enveloped message requires at least one recipient",
            ));
        }

        let mut cek = [0u8; CEK_LENGTH];
        let mut iv = [0u8; IV_LENGTH];
        OsRng.fill_bytes(&mut cek);
        OsRng.fill_bytes(&mut iv);

        let mut recipient_infos = RecipientInfos::default();
        for certificate in &self.recipients {
            recipient_infos.push(wrap_recipient_key(certificate, &cek)?);
        }

        // Signatures are computed over the plaintext before it is
        // encrypted away.
        let (digest_algorithms, certificates, signer_infos) =
            assemble_signatures(&self.signers, &[], &self.content)?;

        let signed_and_enveloped_data = SignedAndEnvelopedData {
            version: CmsVersion::V1,
            recipient_infos,
            digest_algorithms,
            encrypted_content_info: encrypt_content_info(
                ContentType::Data,
                &cek,
                &iv,
                &self.content,
                self.shared_info1.as_deref(),
                self.shared_info2.as_deref(),
            ),
            certificates: Some(certificates),
            crls: None,
            signer_infos,
        };

        let mut der = Vec::new();
        signed_and_enveloped_data
            .encode_ref()
            .write_encoded(Mode::Der, &mut der)?;

        Ok(der)
    }
}

/// Run every signer over the content and collect the resulting signer
/// infos together with the digest algorithm and certificate sets.
fn assemble_signatures(
    signers: &[SignerBuilder<'_>],
    extra_certificates: &[Certificate],
    content: &[u8],
) -> Result<(DigestAlgorithmIdentifiers, CertificateSet, SignerInfos), CmsError> {
    let mut signer_infos = SignerInfos::default();
    let mut seen_digest_algorithms = HashSet::new();
    let mut seen_certificates = extra_certificates.to_vec();

    for signer in signers {
        seen_digest_algorithms.insert(signer.digest_algorithm);

        if !seen_certificates
            .iter()
            .any(|x| x == &signer.signing_certificate)
        {
            seen_certificates.push(signer.signing_certificate.clone());
        }

        signer_infos.push(signer.build_signer_info(content)?);
    }

    let mut digest_algorithms = DigestAlgorithmIdentifiers::default();
    digest_algorithms.extend(seen_digest_algorithms.into_iter().map(Into::into));

    let mut certificates = CertificateSet::default();
    certificates.extend(
        seen_certificates
            .into_iter()
            .map(|certificate| certificate.raw_certificate().clone()),
    );

    Ok((digest_algorithms, certificates, signer_infos))
}

/// Verify every signer info against the given content.
///
/// Each signer's certificate is located among the supplied certificates by
/// its issuer and serial number; a missing certificate is an error. The
/// fixed digest and signature algorithms are enforced before any
/// cryptography runs.
pub(crate) fn verify_signer_infos(
    content: &[u8],
    certificates: &[Certificate],
    signer_infos: &SignerInfos,
) -> Result<(), CmsError> {
    for info in signer_infos.iter() {
        let certificate = certificates
            .iter()
            .find(|certificate| {
                certificate_matches(
                    &info.issuer_and_serial_number.serial_number,
                    &info.issuer_and_serial_number.issuer,
                    certificate,
                )
            })
            .ok_or(CmsError::CertificateNotFound)?;

        DigestAlgorithm::try_from(&info.digest_algorithm)?;
        SignatureAlgorithm::try_from(&info.digest_encryption_algorithm)?;

        let mut message = Vec::with_capacity(content.len());
        message.extend_from_slice(content);
        if let Some(attributes_data) = info.authenticated_attributes_digested_content()? {
            message.extend(attributes_data);
        }

        verify_sm2_signature(
            &certificate.public_key()?,
            &message,
            info.encrypted_digest.clone().into_bytes().as_ref(),
        )?;
    }

    Ok(())
}

/// Produce a `ContentInfo(signedData)` message over the plaintext.
///
/// Keys and certificates are paired up positionally; all signers share the
/// one enclosed plaintext.
pub fn sign(
    signing_keys: &[&SigningKey],
    signing_certificates: &[Certificate],
    plaintext: &[u8],
) -> Result<Vec<u8>, CmsError> {
    if signing_keys.len() != signing_certificates.len() {
        return Err(CmsError::InvalidParameter(
            "each signing key requires a matching certificate",
        ));
    }

    let mut builder = SignedDataBuilder::default().signed_content(plaintext.to_vec());

    for (key, certificate) in signing_keys.iter().zip(signing_certificates.iter()) {
        builder = builder.signer(SignerBuilder::new(key, certificate.clone()));
    }

    builder.build_der()
}

/// Produce a `ContentInfo(signedAndEnvelopedData)` message: signed by each
/// signer and readable by each recipient.
pub fn sign_and_seal(
    signing_keys: &[&SigningKey],
    signing_certificates: &[Certificate],
    recipient_certificates: &[Certificate],
    plaintext: &[u8],
) -> Result<Vec<u8>, CmsError> {
    if signing_keys.len() != signing_certificates.len() {
        return Err(CmsError::InvalidParameter(
            "each signing key requires a matching certificate",
        ));
    }

    let mut builder = SignedAndEnvelopedDataBuilder::default().content(plaintext.to_vec());

    for (key, certificate) in signing_keys.iter().zip(signing_certificates.iter()) {
        builder = builder.signer(SignerBuilder::new(key, certificate.clone()));
    }

    for certificate in recipient_certificates {
        builder = builder.recipient(certificate.clone());
    }

    builder.build_der()
}

#[cfg(test)]
mod tests {
    use {super::*, crate::testutil::self_signed_sm2_certificate};

    #[test]
    fn single_signer_round_trip() {
        let (cert, key, _) = self_signed_sm2_certificate("signer", 1);

        let message = sign(&[&key], &[cert], b"msg").unwrap();

        let (content_type, content) = crate::verify(&message).unwrap();
        assert_eq!(content_type, ContentType::Data);
        assert_eq!(content, b"msg");

        let signed_data = SignedData::decode_der(&message).unwrap();
        assert_eq!(signed_data.signer_infos.len(), 1);
        assert_eq!(signed_data.digest_algorithms.len(), 1);
    }

    #[test]
    fn two_signers_both_verify() {
        let (cert1, key1, _) = self_signed_sm2_certificate("first signer", 1);
        let (cert2, key2, _) = self_signed_sm2_certificate("second signer", 2);

        let message = sign(&[&key1, &key2], &[cert1, cert2], b"joint statement").unwrap();

        let signed_data = SignedData::decode_der(&message).unwrap();
        assert_eq!(signed_data.signer_infos.len(), 2);
        assert_eq!(signed_data.certificates.as_ref().unwrap().len(), 2);

        crate::verify(&message).unwrap();
    }

    #[test]
    fn mismatched_keys_and_certificates_are_rejected() {
        let (cert, key, _) = self_signed_sm2_certificate("signer", 1);

        assert!(matches!(
            sign(&[&key], &[cert.clone(), cert], b"msg"),
            Err(CmsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn authenticated_attributes_change_the_signature_input() {
        let (cert, key, _) = self_signed_sm2_certificate("signer", 1);

        let plain = SignedDataBuilder::default()
            .signed_content(b"same content".to_vec())
            .signer(SignerBuilder::new(&key, cert.clone()))
            .build_der()
            .unwrap();

        let attributed = SignedDataBuilder::default()
            .signed_content(b"same content".to_vec())
            .signer(
                SignerBuilder::new(&key, cert)
                    .authenticated_attribute_octet_string(
                        Oid(Bytes::copy_from_slice(&[85, 4, 3])),
                        b"extra",
                    ),
            )
            .build_der()
            .unwrap();

        // Both verify on their own.
        crate::verify(&plain).unwrap();
        crate::verify(&attributed).unwrap();

        let plain_data = SignedData::decode_der(&plain).unwrap();
        let attributed_data = SignedData::decode_der(&attributed).unwrap();

        assert!(plain_data.signer_infos[0].authenticated_attributes.is_none());
        assert!(attributed_data.signer_infos[0]
            .authenticated_attributes
            .is_some());

        // The signatures must differ because the attribute set feeds the
        // signature input.
        assert_ne!(
            plain_data.signer_infos[0].encrypted_digest,
            attributed_data.signer_infos[0].encrypted_digest
        );

        // Swapping the signatures between the two messages must break both.
        let mut crossed = attributed_data.clone();
        crossed.signer_infos[0].encrypted_digest =
            plain_data.signer_infos[0].encrypted_digest.clone();

        let mut der = Vec::new();
        crossed.encode_ref().write_encoded(Mode::Der, &mut der).unwrap();

        assert!(matches!(
            crate::verify(&der),
            Err(CmsError::SignatureInvalid)
        ));
    }

    #[test]
    fn mandatory_attributes_are_emitted() {
        let (cert, key, _) = self_signed_sm2_certificate("signer", 1);

        let message = SignedDataBuilder::default()
            .signed_content(b"content".to_vec())
            .signer(SignerBuilder::new(&key, cert).with_authenticated_attributes())
            .build_der()
            .unwrap();

        crate::verify(&message).unwrap();

        let signed_data = SignedData::decode_der(&message).unwrap();
        let attributes = signed_data.signer_infos[0]
            .authenticated_attributes
            .as_ref()
            .unwrap();

        assert!(attributes.iter().any(|a| a.typ == OID_CONTENT_TYPE));
        assert!(attributes.iter().any(|a| a.typ == OID_MESSAGE_DIGEST));
        assert!(attributes.iter().any(|a| a.typ == OID_SIGNING_TIME));
    }

    #[test]
    fn signed_message_reemits_byte_for_byte() {
        let (cert, key, _) = self_signed_sm2_certificate("signer", 21);

        let message = sign(&[&key], &[cert], b"round trip me").unwrap();

        let signed_data = SignedData::decode_der(&message).unwrap();
        let mut reemitted = Vec::new();
        signed_data
            .encode_ref()
            .write_encoded(Mode::Der, &mut reemitted)
            .unwrap();

        assert_eq!(reemitted, message);
    }

    #[test]
    fn sign_and_seal_round_trip() {
        let (signer_cert, signer_key, _) = self_signed_sm2_certificate("signer", 1);
        let (recipient_cert, _, recipient_key) = self_signed_sm2_certificate("recipient", 2);

        let message = sign_and_seal(
            &[&signer_key],
            &[signer_cert],
            &[recipient_cert.clone()],
            b"both signed and sealed",
        )
        .unwrap();

        let (content_type, plaintext) =
            crate::open_and_verify(&recipient_key, &recipient_cert, &message).unwrap();
        assert_eq!(content_type, ContentType::Data);
        assert_eq!(plaintext, b"both signed and sealed");
    }

    #[test]
    fn sign_and_seal_keeps_the_plaintext_out_of_the_clear() {
        let (signer_cert, signer_key, _) = self_signed_sm2_certificate("signer", 1);
        let (recipient_cert, _, _) = self_signed_sm2_certificate("recipient", 2);

        let plaintext = b"finding this would be bad";
        let message = sign_and_seal(
            &[&signer_key],
            &[signer_cert],
            &[recipient_cert],
            plaintext,
        )
        .unwrap();

        assert!(!message
            .windows(plaintext.len())
            .any(|window| window == plaintext));
    }

    #[test]
    fn open_and_verify_rejects_unrelated_recipient() {
        let (signer_cert, signer_key, _) = self_signed_sm2_certificate("signer", 1);
        let (recipient_cert, _, _) = self_signed_sm2_certificate("recipient", 2);
        let (other_cert, _, other_key) = self_signed_sm2_certificate("bystander", 3);

        let message = sign_and_seal(
            &[&signer_key],
            &[signer_cert],
            &[recipient_cert],
            b"not for bystanders",
        )
        .unwrap();

        assert!(matches!(
            crate::open_and_verify(&other_key, &other_cert, &message),
            Err(CmsError::CertificateNotFound)
        ));
    }
}
