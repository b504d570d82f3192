// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Functionality for encrypting and enveloping data.

`encryptedData` protects content under a key both sides already share;
`envelopedData` generates a fresh content-encryption key per message and
wraps it to each recipient's SM2 public key.
*/

use {
    crate::{
        algorithm::{
            ContentEncryptionAlgorithm, KeyEncryptionAlgorithm, CEK_LENGTH, IV_LENGTH,
        },
        asn1::gmt0010::{
            CmsVersion, ContentInfo, ContentType, EncryptedContentInfo, EncryptedData,
            EnvelopedData, RecipientInfo, RecipientInfos, OID_ENCRYPTED_DATA, OID_ENVELOPED_DATA,
        },
        certificate::{certificate_matches, Certificate},
        CmsError,
    },
    bcder::{encode::Values, Mode, OctetString},
    bytes::Bytes,
    rand_core::{OsRng, RngCore},
};

/// Entity for incrementally deriving an `encryptedData` message.
///
/// The symmetric key is supplied at build time; a fresh IV is drawn from
/// the OS for every message.
pub struct EncryptedDataBuilder {
    /// Content to encrypt.
    content: Vec<u8>,

    /// The content type conveyed inside the encrypted content info.
    content_type: ContentType,

    /// Opaque agreement data carried next to the ciphertext.
    shared_info1: Option<Vec<u8>>,
    shared_info2: Option<Vec<u8>>,
}

impl Default for EncryptedDataBuilder {
    fn default() -> Self {
        Self {
            content: Vec::new(),
            content_type: ContentType::Data,
            shared_info1: None,
            shared_info2: None,
        }
    }
}

impl EncryptedDataBuilder {
    /// Define the content to encrypt.
    pub fn content(mut self, data: Vec<u8>) -> Self {
        self.content = data;
        self
    }

    /// Define the content type of the plaintext.
    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
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

    /// Construct a DER-encoded `ContentInfo` containing an `EncryptedData`.
    pub fn build_der(&self, key: &[u8; CEK_LENGTH]) -> Result<Vec<u8>, CmsError> {
        let mut iv = [0u8; IV_LENGTH];
        OsRng.fill_bytes(&mut iv);

        let encrypted_data = EncryptedData {
            version: CmsVersion::V1,
            encrypted_content_info: encrypt_content_info(
                self.content_type,
                key,
                &iv,
                &self.content,
                self.shared_info1.as_deref(),
                self.shared_info2.as_deref(),
            ),
        };

        let mut der = Vec::new();
        encrypted_data
            .encode_ref()
            .write_encoded(Mode::Der, &mut der)?;

        Ok(der)
    }
}

/// Entity for incrementally deriving an `envelopedData` message.
///
/// A fresh content-encryption key and IV are generated per message; every
/// recipient receives the same key wrapped to its own certificate.
pub struct EnvelopedDataBuilder {
    /// Content to encrypt.
    content: Vec<u8>,

    /// The content type conveyed inside the encrypted content info.
    content_type: ContentType,

    /// Certificates of the parties able to open the message.
    recipients: Vec<Certificate>,

    /// Opaque agreement data carried next to the ciphertext.
    shared_info1: Option<Vec<u8>>,
    shared_info2: Option<Vec<u8>>,
}

impl Default for EnvelopedDataBuilder {
    fn default() -> Self {
        Self {
            content: Vec::new(),
            content_type: ContentType::Data,
            recipients: Vec::new(),
            shared_info1: None,
            shared_info2: None,
        }
    }
}

impl EnvelopedDataBuilder {
    /// Define the content to encrypt.
    pub fn content(mut self, data: Vec<u8>) -> Self {
        self.content = data;
        self
    }

    /// Define the content type of the plaintext.
    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
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

    /// Construct a DER-encoded `ContentInfo` containing an `EnvelopedData`.
    pub fn build_der(&self) -> Result<Vec<u8>, CmsError> {
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

        let enveloped_data = EnvelopedData {
            version: CmsVersion::V1,
            recipient_infos,
            encrypted_content_info: encrypt_content_info(
                self.content_type,
                &cek,
                &iv,
                &self.content,
                self.shared_info1.as_deref(),
                self.shared_info2.as_deref(),
            ),
        };

        let mut der = Vec::new();
        enveloped_data
            .encode_ref()
            .write_encoded(Mode::Der, &mut der)?;

        Ok(der)
    }
}

/// Produce a `ContentInfo(encryptedData)` message protecting the plaintext
/// under the given SM4 key with a fresh IV.
pub fn encrypt(key: &[u8; CEK_LENGTH], plaintext: &[u8]) -> Result<Vec<u8>, CmsError> {
    EncryptedDataBuilder::default()
        .content(plaintext.to_vec())
        .build_der(key)
}

/// Open a `ContentInfo(encryptedData)` message with the given SM4 key.
///
/// Returns the inner content type and the recovered plaintext.
pub fn decrypt(key: &[u8; CEK_LENGTH], data: &[u8]) -> Result<(ContentType, Vec<u8>), CmsError> {
    let info = ContentInfo::decode_der(data)?;

    if info.content_type != OID_ENCRYPTED_DATA {
        return Err(CmsError::UnexpectedContentType(info.content_type));
    }

    let encrypted_data = info
        .content
        .clone()
        .decode(|cons| EncryptedData::take_from(cons))?;

    decrypt_content_info(key, &encrypted_data.encrypted_content_info)
}

/// Produce a `ContentInfo(envelopedData)` message readable by each of the
/// given recipients.
pub fn seal(recipients: &[Certificate], plaintext: &[u8]) -> Result<Vec<u8>, CmsError> {
    let mut builder = EnvelopedDataBuilder::default().content(plaintext.to_vec());

    for certificate in recipients {
        builder = builder.recipient(certificate.clone());
    }

    builder.build_der()
}

/// Open a `ContentInfo(envelopedData)` message.
///
/// The recipient entry matching the given certificate is located, the
/// content-encryption key unwrapped with the private key, and the payload
/// decrypted. Returns the inner content type and the plaintext.
pub fn open(
    secret_key: &sm2::SecretKey,
    certificate: &Certificate,
    data: &[u8],
) -> Result<(ContentType, Vec<u8>), CmsError> {
    let info = ContentInfo::decode_der(data)?;

    if info.content_type != OID_ENVELOPED_DATA {
        return Err(CmsError::UnexpectedContentType(info.content_type));
    }

    let enveloped_data = info
        .content
        .clone()
        .decode(|cons| EnvelopedData::take_from(cons))?;

    let cek = unwrap_recipient_key(secret_key, certificate, &enveloped_data.recipient_infos)?;

    decrypt_content_info(&cek, &enveloped_data.encrypted_content_info)
}

/// Wrap a content-encryption key to one recipient.
pub(crate) fn wrap_recipient_key(
    certificate: &Certificate,
    cek: &[u8; CEK_LENGTH],
) -> Result<RecipientInfo, CmsError> {
    let public_key = certificate.public_key()?;
    let encrypted_key = KeyEncryptionAlgorithm::Sm2.wrap_key(&public_key, cek)?;

    Ok(RecipientInfo {
        version: CmsVersion::V1,
        issuer_and_serial_number: certificate.issuer_and_serial_number(),
        key_encryption_algorithm: KeyEncryptionAlgorithm::Sm2.into(),
        encrypted_key: OctetString::new(Bytes::from(encrypted_key)),
    })
}

/// Locate the recipient entry matching a certificate and unwrap the
/// content-encryption key with the corresponding private key.
pub(crate) fn unwrap_recipient_key(
    secret_key: &sm2::SecretKey,
    certificate: &Certificate,
    recipient_infos: &RecipientInfos,
) -> Result<[u8; CEK_LENGTH], CmsError> {
    let info = recipient_infos
        .iter()
        .find(|info| {
            certificate_matches(
                &info.issuer_and_serial_number.serial_number,
                &info.issuer_and_serial_number.issuer,
                certificate,
            )
        })
        .ok_or(CmsError::CertificateNotFound)?;

    let algorithm = KeyEncryptionAlgorithm::try_from(&info.key_encryption_algorithm)?;

    let key = algorithm.unwrap_key(
        secret_key,
        info.encrypted_key.clone().into_bytes().as_ref(),
    )?;

    if key.len() != CEK_LENGTH {
        return Err(CmsError::DecryptionFailure);
    }

    let mut cek = [0u8; CEK_LENGTH];
    cek.copy_from_slice(&key);

    Ok(cek)
}

/// Encrypt content and assemble the `EncryptedContentInfo` around it.
pub(crate) fn encrypt_content_info(
    content_type: ContentType,
    key: &[u8; CEK_LENGTH],
    iv: &[u8; IV_LENGTH],
    plaintext: &[u8],
    shared_info1: Option<&[u8]>,
    shared_info2: Option<&[u8]>,
) -> EncryptedContentInfo {
    let ciphertext = ContentEncryptionAlgorithm::Sm4Cbc.encrypt(key, iv, plaintext);

    EncryptedContentInfo {
        content_type: content_type.oid(),
        content_encryption_algorithm: ContentEncryptionAlgorithm::Sm4Cbc.identifier_with_iv(iv),
        encrypted_content: Some(OctetString::new(Bytes::from(ciphertext))),
        shared_info1: shared_info1.map(|v| OctetString::new(Bytes::copy_from_slice(v))),
        shared_info2: shared_info2.map(|v| OctetString::new(Bytes::copy_from_slice(v))),
    }
}

/// Validate an `EncryptedContentInfo` and decrypt its payload.
pub(crate) fn decrypt_content_info(
    key: &[u8; CEK_LENGTH],
    info: &EncryptedContentInfo,
) -> Result<(ContentType, Vec<u8>), CmsError> {
    let (algorithm, iv) =
        ContentEncryptionAlgorithm::from_identifier(&info.content_encryption_algorithm)?;

    let ciphertext = info
        .encrypted_content
        .as_ref()
        .ok_or(CmsError::MalformedStructure("encryptedContent is missing"))?
        .clone()
        .into_bytes();

    let plaintext = algorithm.decrypt(key, &iv, ciphertext.as_ref())?;

    let content_type = ContentType::from_oid(&info.content_type)
        .ok_or(CmsError::InvalidParameter("unrecognized inner content type"))?;

    Ok((content_type, plaintext))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testutil::self_signed_sm2_certificate,
        bcder::decode::{BytesSource, Constructed},
    };

    #[test]
    fn encrypt_decrypt_identity() {
        let key = [0u8; CEK_LENGTH];

        let message = encrypt(&key, b"hello").unwrap();
        let (content_type, plaintext) = decrypt(&key, &message).unwrap();

        assert_eq!(content_type, ContentType::Data);
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn decrypt_with_wrong_key_fails_or_garbles() {
        let key = [0u8; CEK_LENGTH];
        let wrong_key = [1u8; CEK_LENGTH];

        let message = encrypt(&key, b"hello").unwrap();

        // A wrong key almost always trips the padding check; the rare
        // accidental valid padding still cannot reproduce the plaintext.
        match decrypt(&wrong_key, &message) {
            Err(CmsError::DecryptionFailure) => (),
            Ok((_, plaintext)) => assert_ne!(plaintext, b"hello"),
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    #[test]
    fn decrypt_rejects_trailing_byte() {
        let key = [0u8; CEK_LENGTH];

        let mut message = encrypt(&key, b"hello").unwrap();
        message.push(0x00);

        assert!(matches!(
            decrypt(&key, &message),
            Err(CmsError::Decode(_))
        ));
    }

    #[test]
    fn decrypt_rejects_wrong_content_type() {
        let key = [0u8; CEK_LENGTH];
        let (cert, _, _) = self_signed_sm2_certificate("recipient", 1);

        let sealed = seal(&[cert], b"hello").unwrap();

        assert!(matches!(
            decrypt(&key, &sealed),
            Err(CmsError::UnexpectedContentType(_))
        ));
    }

    #[test]
    fn seal_open_with_two_recipients() {
        let (cert1, _, _key1) = self_signed_sm2_certificate("first recipient", 1);
        let (cert2, _, key2) = self_signed_sm2_certificate("second recipient", 2);
        let plaintext = vec![0xaau8; 100];

        let sealed = seal(&[cert1, cert2.clone()], &plaintext).unwrap();

        let enveloped = EnvelopedData::decode_der(&sealed).unwrap();
        assert_eq!(enveloped.recipient_infos.len(), 2);

        let (content_type, recovered) = open(&key2, &cert2, &sealed).unwrap();
        assert_eq!(content_type, ContentType::Data);
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn open_with_unrelated_certificate_fails() {
        let (cert, _, _) = self_signed_sm2_certificate("recipient", 1);
        let (other_cert, _, other_key) = self_signed_sm2_certificate("bystander", 99);

        let sealed = seal(&[cert], b"secret").unwrap();

        assert!(matches!(
            open(&other_key, &other_cert, &sealed),
            Err(CmsError::CertificateNotFound)
        ));
    }

    #[test]
    fn sealed_message_reemits_byte_for_byte() {
        let (cert, _, _) = self_signed_sm2_certificate("recipient", 5);

        let sealed = seal(&[cert], b"round trip me").unwrap();

        let enveloped = EnvelopedData::decode_der(&sealed).unwrap();
        let mut reemitted = Vec::new();
        enveloped
            .encode_ref()
            .write_encoded(Mode::Der, &mut reemitted)
            .unwrap();

        assert_eq!(reemitted, sealed);
    }

    #[test]
    fn shared_infos_survive_the_round_trip() {
        let key = [7u8; CEK_LENGTH];

        let message = EncryptedDataBuilder::default()
            .content(b"payload".to_vec())
            .shared_info1(b"agreed-1".to_vec())
            .shared_info2(b"agreed-2".to_vec())
            .build_der(&key)
            .unwrap();

        let encrypted = EncryptedData::decode_der(&message).unwrap();
        let info = &encrypted.encrypted_content_info;

        assert_eq!(
            info.shared_info1.as_ref().unwrap().clone().into_bytes().as_ref(),
            b"agreed-1"
        );
        assert_eq!(
            info.shared_info2.as_ref().unwrap().clone().into_bytes().as_ref(),
            b"agreed-2"
        );

        let (_, plaintext) = decrypt_content_info(&key, info).unwrap();
        assert_eq!(plaintext, b"payload");
    }

    #[test]
    fn recipient_info_with_foreign_key_algorithm_is_rejected() {
        let (cert, _, key) = self_signed_sm2_certificate("recipient", 3);

        let sealed = seal(&[cert.clone()], b"secret").unwrap();
        let mut enveloped = EnvelopedData::decode_der(&sealed).unwrap();

        // Swap the key-encryption algorithm for the digest OID.
        enveloped.recipient_infos[0].key_encryption_algorithm =
            crate::algorithm::DigestAlgorithm::Sm3.into();

        let mut tampered = Vec::new();
        enveloped
            .encode_ref()
            .write_encoded(Mode::Der, &mut tampered)
            .unwrap();

        assert!(matches!(
            open(&key, &cert, &tampered),
            Err(CmsError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn enveloped_data_encodes_from_prewrapped_parts() {
        // The structural encoder accepts pre-wrapped recipient infos and a
        // pre-encrypted payload without touching any key material.
        let (cert, _, key) = self_signed_sm2_certificate("recipient", 11);

        let cek = [0x31u8; CEK_LENGTH];
        let iv = [0x17u8; IV_LENGTH];

        let mut recipient_infos = RecipientInfos::default();
        recipient_infos.push(wrap_recipient_key(&cert, &cek).unwrap());

        let enveloped = EnvelopedData {
            version: CmsVersion::V1,
            recipient_infos,
            encrypted_content_info: encrypt_content_info(
                ContentType::Data,
                &cek,
                &iv,
                b"prebuilt",
                None,
                None,
            ),
        };

        let mut der = Vec::new();
        enveloped.encode_ref().write_encoded(Mode::Der, &mut der).unwrap();

        let (content_type, plaintext) = open(&key, &cert, &der).unwrap();
        assert_eq!(content_type, ContentType::Data);
        assert_eq!(plaintext, b"prebuilt");
    }

    #[test]
    fn enveloped_body_parses_to_declared_length_only() {
        let (cert, _, _) = self_signed_sm2_certificate("recipient", 8);
        let mut sealed = seal(&[cert], b"x").unwrap();
        sealed.push(0x00);

        let source = BytesSource::new(Bytes::copy_from_slice(&sealed));
        assert!(Constructed::decode(source, Mode::Der, |cons| {
            EnvelopedData::decode(cons)
        })
        .is_err());
    }
}
