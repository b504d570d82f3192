// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Cryptographic algorithms of the GM cipher suite.

GM/T 0010 fixes one algorithm per role: SM3 for digesting, SM2-with-SM3
for signing, SM2 for key encryption and SM4-CBC for content encryption.
The enums here exist so the fixed choices still travel through the same
OID/`AlgorithmIdentifier` conversions the wire format requires.
*/

use {
    crate::{
        asn1::rfc5280::{AlgorithmIdentifier, AlgorithmParameter},
        CmsError,
    },
    bcder::{
        decode::{BytesSource, Constructed},
        ConstOid, Mode, Oid, Tag,
    },
    bytes::Bytes,
    cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit},
    signature::{Signer, Verifier},
    std::fmt::{Debug, Display, Formatter},
};

/// SM3 digest algorithm.
///
/// 1.2.156.10197.1.401
pub const OID_SM3: ConstOid = Oid(&[42, 129, 28, 207, 85, 1, 131, 17]);

/// SM2 signing with SM3 digesting.
///
/// 1.2.156.10197.1.501
pub const OID_SM2_SIGN_WITH_SM3: ConstOid = Oid(&[42, 129, 28, 207, 85, 1, 131, 117]);

/// SM2 public key encryption.
///
/// 1.2.156.10197.1.301.3
pub const OID_SM2_ENCRYPT: ConstOid = Oid(&[42, 129, 28, 207, 85, 1, 130, 45, 3]);

/// SM4 in CBC mode.
///
/// 1.2.156.10197.1.104.2
pub const OID_SM4_CBC: ConstOid = Oid(&[42, 129, 28, 207, 85, 1, 104, 2]);

/// The sm2p256v1 curve.
///
/// 1.2.156.10197.1.301
pub const OID_SM2_P256V1: ConstOid = Oid(&[42, 129, 28, 207, 85, 1, 130, 45]);

/// Elliptic curve public key cryptography.
///
/// 1.2.840.10045.2.1
pub const OID_EC_PUBLIC_KEY: ConstOid = Oid(&[42, 134, 72, 206, 61, 2, 1]);

/// The distinguishing identifier fed into SM2 ZA preprocessing when no
/// identifier has been agreed out of band.
pub const SM2_DEFAULT_ID: &str = "1234567812345678";

/// SM4 and the content-encryption key are both 128 bits.
pub const CEK_LENGTH: usize = 16;

/// SM4-CBC initialization vectors are one block.
pub const IV_LENGTH: usize = 16;

type Sm4CbcEncryptor = cbc::Encryptor<sm4::Sm4>;
type Sm4CbcDecryptor = cbc::Decryptor<sm4::Sm4>;

/// A hashing algorithm used for digesting data.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DigestAlgorithm {
    /// SM3.
    ///
    /// Corresponds to OID 1.2.156.10197.1.401.
    Sm3,
}

impl Display for DigestAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sm3 => f.write_str("SM3"),
        }
    }
}

impl TryFrom<&Oid> for DigestAlgorithm {
    type Error = CmsError;

    fn try_from(v: &Oid) -> Result<Self, Self::Error> {
        if v == &OID_SM3 {
            Ok(Self::Sm3)
        } else {
            Err(CmsError::UnsupportedAlgorithm(v.clone()))
        }
    }
}

impl TryFrom<&AlgorithmIdentifier> for DigestAlgorithm {
    type Error = CmsError;

    fn try_from(v: &AlgorithmIdentifier) -> Result<Self, Self::Error> {
        Self::try_from(&v.algorithm)
    }
}

impl From<DigestAlgorithm> for Oid {
    fn from(alg: DigestAlgorithm) -> Self {
        match alg {
            DigestAlgorithm::Sm3 => Oid(Bytes::copy_from_slice(OID_SM3.as_ref())),
        }
    }
}

impl From<DigestAlgorithm> for AlgorithmIdentifier {
    fn from(alg: DigestAlgorithm) -> Self {
        Self {
            algorithm: alg.into(),
            parameters: None,
        }
    }
}

impl DigestAlgorithm {
    /// Create a new content hasher for this algorithm.
    pub fn digester(&self) -> sm3::Sm3 {
        use sm3::Digest;

        match self {
            Self::Sm3 => sm3::Sm3::new(),
        }
    }

    /// Digest a contiguous message.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        use sm3::Digest;

        let mut hasher = self.digester();
        hasher.update(data);

        hasher.finalize().to_vec()
    }
}

/// An algorithm used to digitally sign content.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignatureAlgorithm {
    /// SM2 elliptic curve signatures over SM3 digests.
    ///
    /// Corresponds to OID 1.2.156.10197.1.501.
    Sm2WithSm3,
}

impl TryFrom<&Oid> for SignatureAlgorithm {
    type Error = CmsError;

    fn try_from(v: &Oid) -> Result<Self, Self::Error> {
        if v == &OID_SM2_SIGN_WITH_SM3 {
            Ok(Self::Sm2WithSm3)
        } else {
            Err(CmsError::UnsupportedAlgorithm(v.clone()))
        }
    }
}

impl TryFrom<&AlgorithmIdentifier> for SignatureAlgorithm {
    type Error = CmsError;

    fn try_from(v: &AlgorithmIdentifier) -> Result<Self, Self::Error> {
        Self::try_from(&v.algorithm)
    }
}

impl From<SignatureAlgorithm> for Oid {
    fn from(alg: SignatureAlgorithm) -> Self {
        match alg {
            SignatureAlgorithm::Sm2WithSm3 => {
                Oid(Bytes::copy_from_slice(OID_SM2_SIGN_WITH_SM3.as_ref()))
            }
        }
    }
}

impl From<SignatureAlgorithm> for AlgorithmIdentifier {
    fn from(alg: SignatureAlgorithm) -> Self {
        Self {
            algorithm: alg.into(),
            parameters: None,
        }
    }
}

/// An algorithm used to encrypt a content-encryption key for a recipient.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyEncryptionAlgorithm {
    /// SM2 public key encryption.
    ///
    /// Corresponds to OID 1.2.156.10197.1.301.3.
    Sm2,
}

impl TryFrom<&Oid> for KeyEncryptionAlgorithm {
    type Error = CmsError;

    fn try_from(v: &Oid) -> Result<Self, Self::Error> {
        if v == &OID_SM2_ENCRYPT {
            Ok(Self::Sm2)
        } else {
            Err(CmsError::UnsupportedAlgorithm(v.clone()))
        }
    }
}

impl TryFrom<&AlgorithmIdentifier> for KeyEncryptionAlgorithm {
    type Error = CmsError;

    fn try_from(v: &AlgorithmIdentifier) -> Result<Self, Self::Error> {
        Self::try_from(&v.algorithm)
    }
}

impl From<KeyEncryptionAlgorithm> for Oid {
    fn from(alg: KeyEncryptionAlgorithm) -> Self {
        match alg {
            KeyEncryptionAlgorithm::Sm2 => Oid(Bytes::copy_from_slice(OID_SM2_ENCRYPT.as_ref())),
        }
    }
}

impl From<KeyEncryptionAlgorithm> for AlgorithmIdentifier {
    fn from(alg: KeyEncryptionAlgorithm) -> Self {
        Self {
            algorithm: alg.into(),
            parameters: None,
        }
    }
}

impl KeyEncryptionAlgorithm {
    /// Encrypt a content-encryption key to a recipient's public key.
    ///
    /// The result is the DER encoding of the SM2Cipher structure
    /// (C1, C3, C2 component order).
    pub fn wrap_key(&self, public_key: &sm2::PublicKey, key: &[u8]) -> Result<Vec<u8>, CmsError> {
        match self {
            Self::Sm2 => sm2::pke::EncryptingKey::new(public_key.clone())
                .encrypt_der(key)
                .map_err(|_| CmsError::CryptoProvider("SM2 encryption failed")),
        }
    }

    /// Decrypt a wrapped content-encryption key with the recipient's
    /// private key.
    pub fn unwrap_key(
        &self,
        secret_key: &sm2::SecretKey,
        encrypted_key: &[u8],
    ) -> Result<Vec<u8>, CmsError> {
        match self {
            Self::Sm2 => sm2::pke::DecryptingKey::new(secret_key.clone())
                .decrypt_der(encrypted_key)
                .map_err(|_| CmsError::DecryptionFailure),
        }
    }
}

/// An algorithm used to encrypt message content.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentEncryptionAlgorithm {
    /// SM4 in CBC mode with PKCS #7 style padding.
    ///
    /// Corresponds to OID 1.2.156.10197.1.104.2.
    Sm4Cbc,
}

impl ContentEncryptionAlgorithm {
    /// Build the algorithm identifier carrying the IV as its parameter.
    pub fn identifier_with_iv(&self, iv: &[u8; IV_LENGTH]) -> AlgorithmIdentifier {
        AlgorithmIdentifier {
            algorithm: Oid(Bytes::copy_from_slice(OID_SM4_CBC.as_ref())),
            parameters: Some(AlgorithmParameter::from_octet_string(iv)),
        }
    }

    /// Resolve an algorithm identifier into the algorithm and its IV.
    ///
    /// Fails when the algorithm is outside the fixed suite, when the IV
    /// parameter is absent, or when the IV is not exactly one block.
    pub fn from_identifier(
        identifier: &AlgorithmIdentifier,
    ) -> Result<(Self, [u8; IV_LENGTH]), CmsError> {
        if identifier.algorithm != OID_SM4_CBC {
            return Err(CmsError::UnsupportedAlgorithm(identifier.algorithm.clone()));
        }

        let parameters = identifier
            .parameters
            .as_ref()
            .ok_or(CmsError::InvalidParameter("content encryption IV is missing"))?;

        let iv = parameters
            .decode_octet_string()
            .map_err(|_| CmsError::InvalidParameter("content encryption IV is malformed"))?
            .into_bytes();

        if iv.len() != IV_LENGTH {
            return Err(CmsError::InvalidParameter(
                "content encryption IV must be 16 octets",
            ));
        }

        let mut fixed = [0u8; IV_LENGTH];
        fixed.copy_from_slice(&iv);

        Ok((Self::Sm4Cbc, fixed))
    }

    /// Encrypt content, padding to a whole number of blocks.
    pub fn encrypt(
        &self,
        key: &[u8; CEK_LENGTH],
        iv: &[u8; IV_LENGTH],
        plaintext: &[u8],
    ) -> Vec<u8> {
        match self {
            Self::Sm4Cbc => Sm4CbcEncryptor::new(key.into(), iv.into())
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        }
    }

    /// Decrypt content and strip the padding.
    pub fn decrypt(
        &self,
        key: &[u8; CEK_LENGTH],
        iv: &[u8; IV_LENGTH],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CmsError> {
        match self {
            Self::Sm4Cbc => Sm4CbcDecryptor::new(key.into(), iv.into())
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| CmsError::DecryptionFailure),
        }
    }
}

/// Represents a key used for signing content.
///
/// Wraps the SM2 signing key with the default distinguishing identifier
/// already applied, so ZA preprocessing matches the verifying side.
pub struct SigningKey {
    inner: sm2::dsa::SigningKey,
}

impl Debug for SigningKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(SM2)")
    }
}

impl SigningKey {
    /// Construct a signing key from an SM2 secret key.
    pub fn new(secret_key: &sm2::SecretKey) -> Result<Self, CmsError> {
        Ok(Self {
            inner: sm2::dsa::SigningKey::new(SM2_DEFAULT_ID, secret_key)
                .map_err(|_| CmsError::CryptoProvider("SM2 signing key rejected"))?,
        })
    }

    /// Sign a message using this signing key.
    ///
    /// Returns the DER encoding of the SM2Signature structure, ready to be
    /// carried in an `encryptedDigest` OCTET STRING.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CmsError> {
        let signature: sm2::dsa::Signature = self
            .inner
            .try_sign(message)
            .map_err(|_| CmsError::CryptoProvider("SM2 signature creation failed"))?;

        Ok(sm2_signature_to_der(&signature))
    }
}

impl From<&SigningKey> for SignatureAlgorithm {
    fn from(_: &SigningKey) -> Self {
        SignatureAlgorithm::Sm2WithSm3
    }
}

/// Verify an SM2 signature over a message.
///
/// The signature is the DER SM2Signature taken from an `encryptedDigest`
/// field; the public key comes from the signer's certificate. The same
/// default distinguishing identifier is applied on both sides.
pub fn verify_sm2_signature(
    public_key: &sm2::PublicKey,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CmsError> {
    let key = sm2::dsa::VerifyingKey::new(SM2_DEFAULT_ID, *public_key)
        .map_err(|_| CmsError::CryptoProvider("SM2 verifying key rejected"))?;

    let signature = sm2_signature_from_der(signature)?;

    key.verify(message, &signature)
        .map_err(|_| CmsError::SignatureInvalid)
}

/// Encode an SM2 signature as `SEQUENCE { r INTEGER, s INTEGER }`.
///
/// Written by hand: the two integers are plain big-endian scalars and
/// bcder does not export a primitive integer writer for foreign byte
/// strings. Total length stays far below the single-byte length limit.
pub(crate) fn sm2_signature_to_der(signature: &sm2::dsa::Signature) -> Vec<u8> {
    fn push_integer(out: &mut Vec<u8>, value: &[u8]) {
        let mut v = value;
        while v.len() > 1 && v[0] == 0 {
            v = &v[1..];
        }

        out.push(0x02);
        if v[0] & 0x80 != 0 {
            out.push((v.len() + 1) as u8);
            out.push(0x00);
        } else {
            out.push(v.len() as u8);
        }
        out.extend_from_slice(v);
    }

    let bytes = signature.to_bytes();
    let (r, s) = bytes.split_at(32);

    let mut body = Vec::with_capacity(70);
    push_integer(&mut body, r);
    push_integer(&mut body, s);

    let mut der = Vec::with_capacity(body.len() + 2);
    der.push(0x30);
    der.push(body.len() as u8);
    der.extend_from_slice(&body);

    der
}

/// Decode a DER `SEQUENCE { r INTEGER, s INTEGER }` into an SM2 signature.
pub(crate) fn sm2_signature_from_der(data: &[u8]) -> Result<sm2::dsa::Signature, CmsError> {
    let source = BytesSource::new(Bytes::copy_from_slice(data));

    let (r, s) = Constructed::decode(source, Mode::Der, |cons| {
        cons.take_sequence(|cons| {
            let r = cons.take_primitive_if(Tag::INTEGER, |prim| prim.take_all())?;
            let s = cons.take_primitive_if(Tag::INTEGER, |prim| prim.take_all())?;

            Ok((r, s))
        })
    })?;

    let mut scalars = [0u8; 64];
    copy_scalar(&mut scalars[..32], r.as_ref()).ok_or(CmsError::SignatureInvalid)?;
    copy_scalar(&mut scalars[32..], s.as_ref()).ok_or(CmsError::SignatureInvalid)?;

    sm2::dsa::Signature::from_slice(&scalars).map_err(|_| CmsError::SignatureInvalid)
}

/// Copy an ASN.1 INTEGER's value octets into a fixed-width scalar,
/// stripping the sign octet and left-padding with zeros.
fn copy_scalar(dest: &mut [u8], mut value: &[u8]) -> Option<()> {
    while value.first() == Some(&0) {
        value = &value[1..];
    }

    if value.len() > dest.len() {
        return None;
    }

    let start = dest.len() - value.len();
    dest[start..].copy_from_slice(value);

    Some(())
}

#[cfg(test)]
mod tests {
    use {super::*, rand_core::OsRng};

    #[test]
    fn sm4_cbc_round_trip() {
        let key = [0u8; CEK_LENGTH];
        let iv = [0x42u8; IV_LENGTH];
        let plaintext = b"attack at dawn";

        let ciphertext = ContentEncryptionAlgorithm::Sm4Cbc.encrypt(&key, &iv, plaintext);
        // Padding always extends to a whole block.
        assert_eq!(ciphertext.len() % 16, 0);
        assert!(ciphertext.len() > plaintext.len());

        let recovered = ContentEncryptionAlgorithm::Sm4Cbc
            .decrypt(&key, &iv, &ciphertext)
            .unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn sm4_cbc_rejects_empty_ciphertext() {
        let key = [0u8; CEK_LENGTH];
        let iv = [0u8; IV_LENGTH];

        assert!(matches!(
            ContentEncryptionAlgorithm::Sm4Cbc.decrypt(&key, &iv, &[]),
            Err(CmsError::DecryptionFailure)
        ));
    }

    #[test]
    fn iv_travels_through_algorithm_identifier() {
        let iv = [0xa5u8; IV_LENGTH];
        let identifier = ContentEncryptionAlgorithm::Sm4Cbc.identifier_with_iv(&iv);

        let (algorithm, recovered) =
            ContentEncryptionAlgorithm::from_identifier(&identifier).unwrap();
        assert_eq!(algorithm, ContentEncryptionAlgorithm::Sm4Cbc);
        assert_eq!(recovered, iv);
    }

    #[test]
    fn identifier_without_iv_is_rejected() {
        let identifier = AlgorithmIdentifier {
            algorithm: Oid(Bytes::copy_from_slice(OID_SM4_CBC.as_ref())),
            parameters: None,
        };

        assert!(matches!(
            ContentEncryptionAlgorithm::from_identifier(&identifier),
            Err(CmsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn identifier_with_short_iv_is_rejected() {
        let identifier = AlgorithmIdentifier {
            algorithm: Oid(Bytes::copy_from_slice(OID_SM4_CBC.as_ref())),
            parameters: Some(AlgorithmParameter::from_octet_string(&[0u8; 8])),
        };

        assert!(matches!(
            ContentEncryptionAlgorithm::from_identifier(&identifier),
            Err(CmsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn foreign_content_encryption_algorithm_is_rejected() {
        let identifier = AlgorithmIdentifier {
            algorithm: Oid(Bytes::copy_from_slice(OID_SM3.as_ref())),
            parameters: None,
        };

        assert!(matches!(
            ContentEncryptionAlgorithm::from_identifier(&identifier),
            Err(CmsError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn signature_der_round_trip() {
        let secret = sm2::SecretKey::random(&mut OsRng);
        let key = SigningKey::new(&secret).unwrap();
        let message = b"hello, world";

        // Several iterations so both sign-octet branches of the integer
        // encoder get exercised.
        for _ in 0..8 {
            let der = key.sign(message).unwrap();
            assert_eq!(der[0], 0x30);

            verify_sm2_signature(&secret.public_key(), message, &der).unwrap();

            assert!(matches!(
                verify_sm2_signature(&secret.public_key(), b"other message", &der),
                Err(CmsError::SignatureInvalid)
            ));
        }
    }

    #[test]
    fn mangled_signature_is_rejected() {
        let secret = sm2::SecretKey::random(&mut OsRng);
        let key = SigningKey::new(&secret).unwrap();

        let mut der = key.sign(b"payload").unwrap();
        let last = der.len() - 1;
        der[last] ^= 0x01;

        assert!(verify_sm2_signature(&secret.public_key(), b"payload", &der).is_err());
    }

    #[test]
    fn key_wrap_round_trip() {
        let recipient = sm2::SecretKey::random(&mut OsRng);
        let cek = [0x5au8; CEK_LENGTH];

        let wrapped = KeyEncryptionAlgorithm::Sm2
            .wrap_key(&recipient.public_key(), &cek)
            .unwrap();
        // DER SM2Cipher: two coordinates, a 32-octet hash and the masked key.
        assert!(wrapped.len() > CEK_LENGTH + 64);

        let unwrapped = KeyEncryptionAlgorithm::Sm2
            .unwrap_key(&recipient, &wrapped)
            .unwrap();
        assert_eq!(unwrapped.as_slice(), cek.as_slice());
    }

    #[test]
    fn key_unwrap_with_wrong_key_fails() {
        let recipient = sm2::SecretKey::random(&mut OsRng);
        let interloper = sm2::SecretKey::random(&mut OsRng);
        let cek = [0x77u8; CEK_LENGTH];

        let wrapped = KeyEncryptionAlgorithm::Sm2
            .wrap_key(&recipient.public_key(), &cek)
            .unwrap();

        match KeyEncryptionAlgorithm::Sm2.unwrap_key(&interloper, &wrapped) {
            // SM2 decryption validates C3, so this must not produce the CEK.
            Ok(key) => assert_ne!(key.as_slice(), cek.as_slice()),
            Err(CmsError::DecryptionFailure) => (),
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
}
