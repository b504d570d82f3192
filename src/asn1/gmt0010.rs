// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! ASN.1 data structures defined by GM/T 0010.

The types defined in this module are intended to be extremely low-level
and only to be used for (de)serialization. See types outside the
`asn1` module tree for higher-level functionality.

GM/T 0010 assigns its six content types OIDs under the arc
`1.2.156.10197.6.1.4.2` and profiles the PKCS #7 structures for the SM
cipher suite. Unlike RFC 5652, all serialization is DER and every version
field carries the value 1.
*/

use {
    crate::asn1::{
        rfc3280::Name,
        rfc5280::{AlgorithmIdentifier, Certificate, CertificateSerialNumber, SubjectPublicKeyInfo},
    },
    bcder::{
        decode::{BytesSource, Constructed, DecodeError, Source},
        encode,
        encode::{PrimitiveContent, Values},
        Captured, ConstOid, Integer, Mode, OctetString, Oid, Tag,
    },
    bytes::Bytes,
    std::{
        io::Write,
        ops::{Deref, DerefMut},
    },
};

/// The data content type.
///
/// 1.2.156.10197.6.1.4.2.1
pub const OID_DATA: ConstOid = Oid(&[42, 129, 28, 207, 85, 6, 1, 4, 2, 1]);

/// The signed-data content type.
///
/// 1.2.156.10197.6.1.4.2.2
pub const OID_SIGNED_DATA: ConstOid = Oid(&[42, 129, 28, 207, 85, 6, 1, 4, 2, 2]);

/// The enveloped-data content type.
///
/// 1.2.156.10197.6.1.4.2.3
pub const OID_ENVELOPED_DATA: ConstOid = Oid(&[42, 129, 28, 207, 85, 6, 1, 4, 2, 3]);

/// The signed-and-enveloped-data content type.
///
/// 1.2.156.10197.6.1.4.2.4
pub const OID_SIGNED_AND_ENVELOPED_DATA: ConstOid = Oid(&[42, 129, 28, 207, 85, 6, 1, 4, 2, 4]);

/// The encrypted-data content type.
///
/// 1.2.156.10197.6.1.4.2.5
pub const OID_ENCRYPTED_DATA: ConstOid = Oid(&[42, 129, 28, 207, 85, 6, 1, 4, 2, 5]);

/// The key-agreement-info content type.
///
/// 1.2.156.10197.6.1.4.2.6
pub const OID_KEY_AGREEMENT_INFO: ConstOid = Oid(&[42, 129, 28, 207, 85, 6, 1, 4, 2, 6]);

/// Identifies the content-type attribute.
///
/// 1.2.840.113549.1.9.3
pub const OID_CONTENT_TYPE: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 3]);

/// Identifies the message-digest attribute.
///
/// 1.2.840.113549.1.9.4
pub const OID_MESSAGE_DIGEST: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 4]);

/// Identifies the signing-time attribute.
///
/// 1.2.840.113549.1.9.5
pub const OID_SIGNING_TIME: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 5]);

/// The six content types of GM/T 0010.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ContentType {
    Data,
    SignedData,
    EnvelopedData,
    SignedAndEnvelopedData,
    EncryptedData,
    KeyAgreementInfo,
}

impl ContentType {
    /// Map an OID to a content type.
    ///
    /// Returns `None` when the OID is outside the GM/T 0010 arc or its
    /// terminal node is unassigned.
    pub fn from_oid(oid: &Oid) -> Option<Self> {
        if oid == &OID_DATA {
            Some(Self::Data)
        } else if oid == &OID_SIGNED_DATA {
            Some(Self::SignedData)
        } else if oid == &OID_ENVELOPED_DATA {
            Some(Self::EnvelopedData)
        } else if oid == &OID_SIGNED_AND_ENVELOPED_DATA {
            Some(Self::SignedAndEnvelopedData)
        } else if oid == &OID_ENCRYPTED_DATA {
            Some(Self::EncryptedData)
        } else if oid == &OID_KEY_AGREEMENT_INFO {
            Some(Self::KeyAgreementInfo)
        } else {
            None
        }
    }

    /// The OID assigned to this content type.
    pub fn oid(&self) -> Oid {
        Oid(Bytes::copy_from_slice(match self {
            Self::Data => OID_DATA.as_ref(),
            Self::SignedData => OID_SIGNED_DATA.as_ref(),
            Self::EnvelopedData => OID_ENVELOPED_DATA.as_ref(),
            Self::SignedAndEnvelopedData => OID_SIGNED_AND_ENVELOPED_DATA.as_ref(),
            Self::EncryptedData => OID_ENCRYPTED_DATA.as_ref(),
            Self::KeyAgreementInfo => OID_KEY_AGREEMENT_INFO.as_ref(),
        }))
    }

    /// The name the standard uses for this content type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::SignedData => "signedData",
            Self::EnvelopedData => "envelopedData",
            Self::SignedAndEnvelopedData => "signedAndEnvelopedData",
            Self::EncryptedData => "encryptedData",
            Self::KeyAgreementInfo => "keyAgreementInfo",
        }
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        let oid = Oid::take_from(cons)?;

        Self::from_oid(&oid).ok_or_else(|| cons.content_err("unrecognized content type OID"))
    }

    pub fn encode(self) -> impl Values {
        self.oid().encode()
    }
}

impl From<ContentType> for Oid {
    fn from(v: ContentType) -> Self {
        v.oid()
    }
}

/// Version number.
///
/// GM/T 0010 fixes every version field to 1; anything else is rejected
/// during decoding.
///
/// ```ASN.1
/// Version ::= INTEGER (1)
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CmsVersion {
    V1 = 1,
}

impl CmsVersion {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        match cons.take_primitive_if(Tag::INTEGER, Integer::i8_from_primitive)? {
            1 => Ok(Self::V1),
            _ => Err(cons.content_err("unexpected version value")),
        }
    }

    pub fn encode(self) -> impl Values {
        u8::from(self).encode()
    }
}

impl From<CmsVersion> for u8 {
    fn from(v: CmsVersion) -> u8 {
        match v {
            CmsVersion::V1 => 1,
        }
    }
}

/// Content info.
///
/// The outer wrapper of every GM/T 0010 message. When the content type is
/// `data`, the content is an OCTET STRING holding the raw octets; for all
/// other types it is the DER body of the corresponding container.
///
/// ```ASN.1
/// ContentInfo ::= SEQUENCE {
///   contentType OBJECT IDENTIFIER,
///   content [0] EXPLICIT ANY DEFINED BY contentType }
/// ```
#[derive(Clone, Debug)]
pub struct ContentInfo {
    pub content_type: Oid,
    pub content: Captured,
}

impl PartialEq for ContentInfo {
    fn eq(&self, other: &Self) -> bool {
        self.content_type == other.content_type
            && self.content.as_slice() == other.content.as_slice()
    }
}

impl Eq for ContentInfo {}

impl ContentInfo {
    /// Construct a `data` content info holding the given octets.
    pub fn new_data(data: &[u8]) -> Self {
        Self {
            content_type: Oid(Bytes::copy_from_slice(OID_DATA.as_ref())),
            content: Captured::from_values(Mode::Der, data.encode()),
        }
    }

    /// Attempt to decode DER data into an instance.
    ///
    /// Trailing data after the outer structure is an error.
    pub fn decode_der(data: &[u8]) -> Result<Self, DecodeError<<BytesSource as Source>::Error>> {
        let source = BytesSource::new(Bytes::copy_from_slice(data));

        Constructed::decode(source, Mode::Der, |cons| Self::take_from(cons))
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| Self::from_sequence(cons))
    }

    pub fn from_sequence<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let content_type = Oid::take_from(cons)?;
        let content = cons.take_constructed_if(Tag::CTX_0, |cons| cons.capture_all())?;

        Ok(Self {
            content_type,
            content,
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.content_type.encode_ref(),
            encode::Constructed::new(Tag::CTX_0, &self.content),
        ))
    }
}

impl Values for ContentInfo {
    fn encoded_len(&self, mode: Mode) -> usize {
        self.encode_ref().encoded_len(mode)
    }

    fn write_encoded<W: Write>(&self, mode: Mode, target: &mut W) -> Result<(), std::io::Error> {
        self.encode_ref().write_encoded(mode, target)
    }
}

/// Issuer and serial number.
///
/// ```ASN.1
/// IssuerAndSerialNumber ::= SEQUENCE {
///   issuer Name,
///   serialNumber INTEGER }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IssuerAndSerialNumber {
    pub issuer: Name,
    pub serial_number: CertificateSerialNumber,
}

impl IssuerAndSerialNumber {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let issuer = Name::take_from(cons)?;
            let serial_number = Integer::take_from(cons)?;

            Ok(Self {
                issuer,
                serial_number,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((self.issuer.encode_ref(), (&self.serial_number).encode()))
    }
}

/// Digest algorithm identifiers.
///
/// ```ASN.1
/// DigestAlgorithmIdentifiers ::= SET OF AlgorithmIdentifier
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DigestAlgorithmIdentifiers(Vec<DigestAlgorithmIdentifier>);

impl Deref for DigestAlgorithmIdentifiers {
    type Target = Vec<DigestAlgorithmIdentifier>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DigestAlgorithmIdentifiers {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl DigestAlgorithmIdentifiers {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_set(|cons| {
            let mut identifiers = Vec::new();

            while let Some(identifier) = AlgorithmIdentifier::take_opt_from(cons)? {
                identifiers.push(identifier);
            }

            Ok(Self(identifiers))
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::set(&self.0)
    }
}

pub type DigestAlgorithmIdentifier = AlgorithmIdentifier;

pub type SignatureAlgorithmIdentifier = AlgorithmIdentifier;

pub type KeyEncryptionAlgorithmIdentifier = AlgorithmIdentifier;

pub type ContentEncryptionAlgorithmIdentifier = AlgorithmIdentifier;

pub type EncryptedKey = OctetString;

pub type EncryptedDigest = OctetString;

pub type EncryptedContent = OctetString;

/// Encrypted content info.
///
/// The two trailing shared-info fields are a GM/T 0010 extension over
/// PKCS #7; they carry opaque agreement data between the parties.
///
/// ```ASN.1
/// EncryptedContentInfo ::= SEQUENCE {
///   contentType OBJECT IDENTIFIER,
///   contentEncryptionAlgorithm AlgorithmIdentifier,
///   encryptedContent [0] IMPLICIT OCTET STRING OPTIONAL,
///   sharedInfo1 [1] IMPLICIT OCTET STRING OPTIONAL,
///   sharedInfo2 [2] IMPLICIT OCTET STRING OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncryptedContentInfo {
    pub content_type: Oid,
    pub content_encryption_algorithm: ContentEncryptionAlgorithmIdentifier,
    pub encrypted_content: Option<EncryptedContent>,
    pub shared_info1: Option<OctetString>,
    pub shared_info2: Option<OctetString>,
}

impl EncryptedContentInfo {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let content_type = Oid::take_from(cons)?;
            let content_encryption_algorithm = AlgorithmIdentifier::take_from(cons)?;
            let encrypted_content =
                cons.take_opt_value_if(Tag::CTX_0, |content| OctetString::from_content(content))?;
            let shared_info1 =
                cons.take_opt_value_if(Tag::CTX_1, |content| OctetString::from_content(content))?;
            let shared_info2 =
                cons.take_opt_value_if(Tag::CTX_2, |content| OctetString::from_content(content))?;

            Ok(Self {
                content_type,
                content_encryption_algorithm,
                encrypted_content,
                shared_info1,
                shared_info2,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.content_type.encode_ref(),
            &self.content_encryption_algorithm,
            self.encrypted_content
                .as_ref()
                .map(|c| c.encode_ref_as(Tag::CTX_0)),
            self.shared_info1
                .as_ref()
                .map(|c| c.encode_ref_as(Tag::CTX_1)),
            self.shared_info2
                .as_ref()
                .map(|c| c.encode_ref_as(Tag::CTX_2)),
        ))
    }
}

/// Per-recipient key wrapping.
///
/// `encryptedKey` carries the DER encoding of the SM2Cipher structure
/// produced by SM2 public-key encryption of the content-encryption key.
///
/// ```ASN.1
/// RecipientInfo ::= SEQUENCE {
///   version Version,
///   issuerAndSerialNumber IssuerAndSerialNumber,
///   keyEncryptionAlgorithm AlgorithmIdentifier,
///   encryptedKey OCTET STRING }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecipientInfo {
    pub version: CmsVersion,
    pub issuer_and_serial_number: IssuerAndSerialNumber,
    pub key_encryption_algorithm: KeyEncryptionAlgorithmIdentifier,
    pub encrypted_key: EncryptedKey,
}

impl RecipientInfo {
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| Self::from_sequence(cons))
    }

    pub fn from_sequence<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let version = CmsVersion::take_from(cons)?;
        let issuer_and_serial_number = IssuerAndSerialNumber::take_from(cons)?;
        let key_encryption_algorithm = AlgorithmIdentifier::take_from(cons)?;
        let encrypted_key = OctetString::take_from(cons)?;

        Ok(Self {
            version,
            issuer_and_serial_number,
            key_encryption_algorithm,
            encrypted_key,
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.version.encode(),
            self.issuer_and_serial_number.encode_ref(),
            &self.key_encryption_algorithm,
            self.encrypted_key.encode_ref(),
        ))
    }
}

impl Values for RecipientInfo {
    fn encoded_len(&self, mode: Mode) -> usize {
        self.encode_ref().encoded_len(mode)
    }

    fn write_encoded<W: Write>(&self, mode: Mode, target: &mut W) -> Result<(), std::io::Error> {
        self.encode_ref().write_encoded(mode, target)
    }
}

/// Recipient infos.
///
/// ```ASN.1
/// RecipientInfos ::= SET OF RecipientInfo
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RecipientInfos(Vec<RecipientInfo>);

impl Deref for RecipientInfos {
    type Target = Vec<RecipientInfo>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for RecipientInfos {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl RecipientInfos {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_set(|cons| {
            let mut infos = Vec::new();

            while let Some(info) = RecipientInfo::take_opt_from(cons)? {
                infos.push(info);
            }

            Ok(Self(infos))
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::set(&self.0)
    }
}

/// A single attribute.
///
/// ```ASN.1
/// Attribute ::= SEQUENCE {
///   attrType OBJECT IDENTIFIER,
///   attrValues SET OF AttributeValue }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute {
    pub typ: Oid,
    pub values: Vec<AttributeValue>,
}

impl Attribute {
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| {
            let typ = Oid::take_from(cons)?;

            let values = cons.take_set(|cons| {
                let mut values = Vec::new();

                while let Some(value) = AttributeValue::take_opt_from(cons)? {
                    values.push(value);
                }

                Ok(values)
            })?;

            Ok(Self { typ, values })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((self.typ.encode_ref(), encode::set(&self.values)))
    }
}

impl Values for Attribute {
    fn encoded_len(&self, mode: Mode) -> usize {
        self.encode_ref().encoded_len(mode)
    }

    fn write_encoded<W: Write>(&self, mode: Mode, target: &mut W) -> Result<(), std::io::Error> {
        self.encode_ref().write_encoded(mode, target)
    }
}

#[derive(Clone, Debug)]
pub struct AttributeValue(Captured);

impl AttributeValue {
    /// Construct a new instance from captured data.
    pub fn new(captured: Captured) -> Self {
        Self(captured)
    }

    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        let captured = cons.capture_all()?;

        if captured.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Self(captured)))
        }
    }
}

impl Values for AttributeValue {
    fn encoded_len(&self, mode: Mode) -> usize {
        self.0.encoded_len(mode)
    }

    fn write_encoded<W: Write>(&self, mode: Mode, target: &mut W) -> Result<(), std::io::Error> {
        self.0.write_encoded(mode, target)
    }
}

impl Deref for AttributeValue {
    type Target = Captured;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for AttributeValue {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice() == other.0.as_slice()
    }
}

impl Eq for AttributeValue {}

/// Authenticated attributes.
///
/// ```ASN.1
/// AuthenticatedAttributes ::= SET SIZE (1..MAX) OF Attribute
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AuthenticatedAttributes(Vec<Attribute>);

impl Deref for AuthenticatedAttributes {
    type Target = Vec<Attribute>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for AuthenticatedAttributes {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl AuthenticatedAttributes {
    pub fn take_from_set<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let mut attributes = Vec::new();

        while let Some(attribute) = Attribute::take_opt_from(cons)? {
            attributes.push(attribute);
        }

        Ok(Self(attributes))
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::set(&self.0)
    }

    pub fn encode_ref_as(&self, tag: Tag) -> impl Values + '_ {
        encode::set_as(tag, &self.0)
    }
}

/// Unauthenticated attributes.
///
/// ```ASN.1
/// UnauthenticatedAttributes ::= SET SIZE (1..MAX) OF Attribute
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UnauthenticatedAttributes(Vec<Attribute>);

impl Deref for UnauthenticatedAttributes {
    type Target = Vec<Attribute>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for UnauthenticatedAttributes {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl UnauthenticatedAttributes {
    pub fn take_from_set<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let mut attributes = Vec::new();

        while let Some(attribute) = Attribute::take_opt_from(cons)? {
            attributes.push(attribute);
        }

        Ok(Self(attributes))
    }

    pub fn encode_ref_as(&self, tag: Tag) -> impl Values + '_ {
        encode::set_as(tag, &self.0)
    }
}

/// Per-signer information.
///
/// ```ASN.1
/// SignerInfo ::= SEQUENCE {
///   version Version,
///   issuerAndSerialNumber IssuerAndSerialNumber,
///   digestAlgorithm AlgorithmIdentifier,
///   authenticatedAttributes [0] IMPLICIT SET OF Attribute OPTIONAL,
///   digestEncryptionAlgorithm AlgorithmIdentifier,
///   encryptedDigest OCTET STRING,
///   unauthenticatedAttributes [1] IMPLICIT SET OF Attribute OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignerInfo {
    pub version: CmsVersion,
    pub issuer_and_serial_number: IssuerAndSerialNumber,
    pub digest_algorithm: DigestAlgorithmIdentifier,
    pub authenticated_attributes: Option<AuthenticatedAttributes>,
    pub digest_encryption_algorithm: SignatureAlgorithmIdentifier,
    pub encrypted_digest: EncryptedDigest,
    pub unauthenticated_attributes: Option<UnauthenticatedAttributes>,

    /// Raw bytes backing authenticated attributes data.
    ///
    /// Does not include constructed tag or length bytes.
    pub authenticated_attributes_data: Option<Vec<u8>>,
}

impl SignerInfo {
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| Self::from_sequence(cons))
    }

    pub fn from_sequence<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let version = CmsVersion::take_from(cons)?;
        let issuer_and_serial_number = IssuerAndSerialNumber::take_from(cons)?;
        let digest_algorithm = AlgorithmIdentifier::take_from(cons)?;

        // The raw bytes constituting the authenticated attributes are
        // digested as part of signature verification, so a copy is stashed
        // alongside the parsed values.
        let mut parsed_attributes = None;
        let authenticated_attributes_data = cons.take_opt_constructed_if(Tag::CTX_0, |cons| {
            let captured = cons.capture(|cons| {
                parsed_attributes = Some(AuthenticatedAttributes::take_from_set(cons)?);

                Ok(())
            })?;

            Ok(captured.to_vec())
        })?;

        let digest_encryption_algorithm = AlgorithmIdentifier::take_from(cons)?;
        let encrypted_digest = OctetString::take_from(cons)?;
        let unauthenticated_attributes = cons.take_opt_constructed_if(Tag::CTX_1, |cons| {
            UnauthenticatedAttributes::take_from_set(cons)
        })?;

        Ok(Self {
            version,
            issuer_and_serial_number,
            digest_algorithm,
            authenticated_attributes: parsed_attributes,
            digest_encryption_algorithm,
            encrypted_digest,
            unauthenticated_attributes,
            authenticated_attributes_data,
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.version.encode(),
            self.issuer_and_serial_number.encode_ref(),
            &self.digest_algorithm,
            self.authenticated_attributes
                .as_ref()
                .map(|attrs| attrs.encode_ref_as(Tag::CTX_0)),
            &self.digest_encryption_algorithm,
            self.encrypted_digest.encode_ref(),
            self.unauthenticated_attributes
                .as_ref()
                .map(|attrs| attrs.encode_ref_as(Tag::CTX_1)),
        ))
    }

    /// Obtain the authenticated attributes content contributing to the signature.
    ///
    /// The attributes are tagged `[0] IMPLICIT` on the wire but their
    /// contribution to the signature input uses the universal SET OF header
    /// computed over the same body. The header is emitted by hand because
    /// bcder does not export its length writer.
    pub fn authenticated_attributes_digested_content(
        &self,
    ) -> Result<Option<Vec<u8>>, std::io::Error> {
        if let Some(attributes) = &self.authenticated_attributes {
            if let Some(existing_data) = &self.authenticated_attributes_data {
                // +8 should be enough for tag + length.
                let mut buffer = Vec::with_capacity(existing_data.len() + 8);
                // Universal SET OF.
                buffer.write_all(&[0x31])?;

                if existing_data.len() < 0x80 {
                    buffer.write_all(&[existing_data.len() as u8])?;
                } else if existing_data.len() < 0x100 {
                    buffer.write_all(&[0x81, existing_data.len() as u8])?;
                } else if existing_data.len() < 0x10000 {
                    buffer.write_all(&[
                        0x82,
                        (existing_data.len() >> 8) as u8,
                        existing_data.len() as u8,
                    ])?;
                } else if existing_data.len() < 0x1000000 {
                    buffer.write_all(&[
                        0x83,
                        (existing_data.len() >> 16) as u8,
                        (existing_data.len() >> 8) as u8,
                        existing_data.len() as u8,
                    ])?;
                } else {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "authenticated attributes length too long",
                    ));
                }

                buffer.write_all(existing_data)?;

                Ok(Some(buffer))
            } else {
                // No stashed copy present. Serialize from the parsed values
                // with the universal SET tag.
                let mut der = Vec::new();
                attributes.encode_ref().write_encoded(Mode::Der, &mut der)?;

                Ok(Some(der))
            }
        } else {
            Ok(None)
        }
    }
}

impl Values for SignerInfo {
    fn encoded_len(&self, mode: Mode) -> usize {
        self.encode_ref().encoded_len(mode)
    }

    fn write_encoded<W: Write>(&self, mode: Mode, target: &mut W) -> Result<(), std::io::Error> {
        self.encode_ref().write_encoded(mode, target)
    }
}

/// Signer infos.
///
/// ```ASN.1
/// SignerInfos ::= SET OF SignerInfo
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SignerInfos(Vec<SignerInfo>);

impl Deref for SignerInfos {
    type Target = Vec<SignerInfo>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SignerInfos {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl SignerInfos {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_set(|cons| {
            let mut infos = Vec::new();

            while let Some(info) = SignerInfo::take_opt_from(cons)? {
                infos.push(info);
            }

            Ok(Self(infos))
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::set(&self.0)
    }
}

/// The certificate set of signed containers.
///
/// GM/T 0010 carries plain certificates here, not the RFC 5652
/// CertificateChoices.
///
/// ```ASN.1
/// Certificates ::= SET OF Certificate
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CertificateSet(Vec<Certificate>);

impl Deref for CertificateSet {
    type Target = Vec<Certificate>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for CertificateSet {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl CertificateSet {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        let mut certs = Vec::new();

        while let Some(cert) = Certificate::take_opt_from(cons)? {
            certs.push(cert);
        }

        Ok(Self(certs))
    }

    pub fn encode_ref_as(&self, tag: Tag) -> impl Values + '_ {
        encode::set_as(tag, &self.0)
    }
}

/// Signed data.
///
/// ```ASN.1
/// SignedData ::= SEQUENCE {
///   version Version,
///   digestAlgorithms SET OF AlgorithmIdentifier,
///   contentInfo ContentInfo,
///   certificates [0] IMPLICIT SET OF Certificate OPTIONAL,
///   crls [1] IMPLICIT SET OF CertificateRevocationList OPTIONAL,
///   signerInfos SET OF SignerInfo }
/// ```
#[derive(Clone, Debug)]
pub struct SignedData {
    pub version: CmsVersion,
    pub digest_algorithms: DigestAlgorithmIdentifiers,
    pub content_info: ContentInfo,
    pub certificates: Option<CertificateSet>,
    pub crls: Option<Captured>,
    pub signer_infos: SignerInfos,
}

impl SignedData {
    /// Attempt to decode DER data into an instance.
    ///
    /// The data must be the full `ContentInfo` message carrying a
    /// signedData content type. Trailing data is an error.
    pub fn decode_der(data: &[u8]) -> Result<Self, DecodeError<<BytesSource as Source>::Error>> {
        let source = BytesSource::new(Bytes::copy_from_slice(data));

        Constructed::decode(source, Mode::Der, |cons| Self::decode(cons))
    }

    pub fn decode<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let oid = Oid::take_from(cons)?;

            if oid != OID_SIGNED_DATA {
                return Err(cons.content_err("not a signedData content type"));
            }

            cons.take_constructed_if(Tag::CTX_0, Self::take_from)
        })
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let version = CmsVersion::take_from(cons)?;
            let digest_algorithms = DigestAlgorithmIdentifiers::take_from(cons)?;
            let content_info = ContentInfo::take_from(cons)?;
            let certificates =
                cons.take_opt_constructed_if(Tag::CTX_0, |cons| CertificateSet::take_from(cons))?;
            let crls = cons.take_opt_constructed_if(Tag::CTX_1, |cons| cons.capture_all())?;
            let signer_infos = SignerInfos::take_from(cons)?;

            Ok(Self {
                version,
                digest_algorithms,
                content_info,
                certificates,
                crls,
                signer_infos,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            OID_SIGNED_DATA.encode_ref(),
            encode::sequence_as(
                Tag::CTX_0,
                encode::sequence((
                    self.version.encode(),
                    self.digest_algorithms.encode_ref(),
                    self.content_info.encode_ref(),
                    self.certificates
                        .as_ref()
                        .map(|certs| certs.encode_ref_as(Tag::CTX_0)),
                    self.crls
                        .as_ref()
                        .map(|crls| encode::Constructed::new(Tag::CTX_1, crls)),
                    self.signer_infos.encode_ref(),
                )),
            ),
        ))
    }
}

/// Enveloped data.
///
/// ```ASN.1
/// EnvelopedData ::= SEQUENCE {
///   version Version,
///   recipientInfos SET OF RecipientInfo,
///   encryptedContentInfo EncryptedContentInfo }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnvelopedData {
    pub version: CmsVersion,
    pub recipient_infos: RecipientInfos,
    pub encrypted_content_info: EncryptedContentInfo,
}

impl EnvelopedData {
    /// Attempt to decode DER data into an instance.
    ///
    /// The data must be the full `ContentInfo` message carrying an
    /// envelopedData content type. Trailing data is an error.
    pub fn decode_der(data: &[u8]) -> Result<Self, DecodeError<<BytesSource as Source>::Error>> {
        let source = BytesSource::new(Bytes::copy_from_slice(data));

        Constructed::decode(source, Mode::Der, |cons| Self::decode(cons))
    }

    pub fn decode<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let oid = Oid::take_from(cons)?;

            if oid != OID_ENVELOPED_DATA {
                return Err(cons.content_err("not an envelopedData content type"));
            }

            cons.take_constructed_if(Tag::CTX_0, Self::take_from)
        })
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let version = CmsVersion::take_from(cons)?;
            let recipient_infos = RecipientInfos::take_from(cons)?;
            let encrypted_content_info = EncryptedContentInfo::take_from(cons)?;

            Ok(Self {
                version,
                recipient_infos,
                encrypted_content_info,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            OID_ENVELOPED_DATA.encode_ref(),
            encode::sequence_as(
                Tag::CTX_0,
                encode::sequence((
                    self.version.encode(),
                    self.recipient_infos.encode_ref(),
                    self.encrypted_content_info.encode_ref(),
                )),
            ),
        ))
    }
}

/// Encrypted data.
///
/// ```ASN.1
/// EncryptedData ::= SEQUENCE {
///   version Version,
///   encryptedContentInfo EncryptedContentInfo }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncryptedData {
    pub version: CmsVersion,
    pub encrypted_content_info: EncryptedContentInfo,
}

impl EncryptedData {
    /// Attempt to decode DER data into an instance.
    ///
    /// The data must be the full `ContentInfo` message carrying an
    /// encryptedData content type. Trailing data is an error.
    pub fn decode_der(data: &[u8]) -> Result<Self, DecodeError<<BytesSource as Source>::Error>> {
        let source = BytesSource::new(Bytes::copy_from_slice(data));

        Constructed::decode(source, Mode::Der, |cons| Self::decode(cons))
    }

    pub fn decode<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let oid = Oid::take_from(cons)?;

            if oid != OID_ENCRYPTED_DATA {
                return Err(cons.content_err("not an encryptedData content type"));
            }

            cons.take_constructed_if(Tag::CTX_0, Self::take_from)
        })
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let version = CmsVersion::take_from(cons)?;
            let encrypted_content_info = EncryptedContentInfo::take_from(cons)?;

            Ok(Self {
                version,
                encrypted_content_info,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            OID_ENCRYPTED_DATA.encode_ref(),
            encode::sequence_as(
                Tag::CTX_0,
                encode::sequence((
                    self.version.encode(),
                    self.encrypted_content_info.encode_ref(),
                )),
            ),
        ))
    }
}

/// Signed and enveloped data.
///
/// ```ASN.1
/// SignedAndEnvelopedData ::= SEQUENCE {
///   version Version,
///   recipientInfos SET OF RecipientInfo,
///   digestAlgorithms SET OF AlgorithmIdentifier,
///   encryptedContentInfo EncryptedContentInfo,
///   certificates [0] IMPLICIT SET OF Certificate OPTIONAL,
///   crls [1] IMPLICIT SET OF CertificateRevocationList OPTIONAL,
///   signerInfos SET OF SignerInfo }
/// ```
#[derive(Clone, Debug)]
pub struct SignedAndEnvelopedData {
    pub version: CmsVersion,
    pub recipient_infos: RecipientInfos,
    pub digest_algorithms: DigestAlgorithmIdentifiers,
    pub encrypted_content_info: EncryptedContentInfo,
    pub certificates: Option<CertificateSet>,
    pub crls: Option<Captured>,
    pub signer_infos: SignerInfos,
}

impl SignedAndEnvelopedData {
    /// Attempt to decode DER data into an instance.
    ///
    /// The data must be the full `ContentInfo` message carrying a
    /// signedAndEnvelopedData content type. Trailing data is an error.
    pub fn decode_der(data: &[u8]) -> Result<Self, DecodeError<<BytesSource as Source>::Error>> {
        let source = BytesSource::new(Bytes::copy_from_slice(data));

        Constructed::decode(source, Mode::Der, |cons| Self::decode(cons))
    }

    pub fn decode<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let oid = Oid::take_from(cons)?;

            if oid != OID_SIGNED_AND_ENVELOPED_DATA {
                return Err(cons.content_err("not a signedAndEnvelopedData content type"));
            }

            cons.take_constructed_if(Tag::CTX_0, Self::take_from)
        })
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let version = CmsVersion::take_from(cons)?;
            let recipient_infos = RecipientInfos::take_from(cons)?;
            let digest_algorithms = DigestAlgorithmIdentifiers::take_from(cons)?;
            let encrypted_content_info = EncryptedContentInfo::take_from(cons)?;
            let certificates =
                cons.take_opt_constructed_if(Tag::CTX_0, |cons| CertificateSet::take_from(cons))?;
            let crls = cons.take_opt_constructed_if(Tag::CTX_1, |cons| cons.capture_all())?;
            let signer_infos = SignerInfos::take_from(cons)?;

            Ok(Self {
                version,
                recipient_infos,
                digest_algorithms,
                encrypted_content_info,
                certificates,
                crls,
                signer_infos,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            OID_SIGNED_AND_ENVELOPED_DATA.encode_ref(),
            encode::sequence_as(
                Tag::CTX_0,
                encode::sequence((
                    self.version.encode(),
                    self.recipient_infos.encode_ref(),
                    self.digest_algorithms.encode_ref(),
                    self.encrypted_content_info.encode_ref(),
                    self.certificates
                        .as_ref()
                        .map(|certs| certs.encode_ref_as(Tag::CTX_0)),
                    self.crls
                        .as_ref()
                        .map(|crls| encode::Constructed::new(Tag::CTX_1, crls)),
                    self.signer_infos.encode_ref(),
                )),
            ),
        ))
    }
}

/// Key agreement info.
///
/// Purely structural; the key agreement itself happens outside the
/// message syntax.
///
/// ```ASN.1
/// KeyAgreementInfo ::= SEQUENCE {
///   version Version,
///   tempPublicKeyR SubjectPublicKeyInfo,
///   userCertificate Certificate,
///   userID OCTET STRING }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyAgreementInfo {
    pub version: CmsVersion,
    pub temp_public_key_r: SubjectPublicKeyInfo,
    pub user_certificate: Certificate,
    pub user_id: OctetString,
}

impl KeyAgreementInfo {
    /// Attempt to decode DER data into an instance.
    ///
    /// The data must be the full `ContentInfo` message carrying a
    /// keyAgreementInfo content type. Trailing data is an error.
    pub fn decode_der(data: &[u8]) -> Result<Self, DecodeError<<BytesSource as Source>::Error>> {
        let source = BytesSource::new(Bytes::copy_from_slice(data));

        Constructed::decode(source, Mode::Der, |cons| Self::decode(cons))
    }

    pub fn decode<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let oid = Oid::take_from(cons)?;

            if oid != OID_KEY_AGREEMENT_INFO {
                return Err(cons.content_err("not a keyAgreementInfo content type"));
            }

            cons.take_constructed_if(Tag::CTX_0, Self::take_from)
        })
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let version = CmsVersion::take_from(cons)?;
            let temp_public_key_r = SubjectPublicKeyInfo::take_from(cons)?;
            let user_certificate = Certificate::take_from(cons)?;
            let user_id = OctetString::take_from(cons)?;

            Ok(Self {
                version,
                temp_public_key_r,
                user_certificate,
                user_id,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            OID_KEY_AGREEMENT_INFO.encode_ref(),
            encode::sequence_as(
                Tag::CTX_0,
                encode::sequence((
                    self.version.encode(),
                    self.temp_public_key_r.encode_ref(),
                    self.user_certificate.encode_ref(),
                    self.user_id.encode_ref(),
                )),
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_oid_round_trip() {
        for variant in [
            ContentType::Data,
            ContentType::SignedData,
            ContentType::EnvelopedData,
            ContentType::SignedAndEnvelopedData,
            ContentType::EncryptedData,
            ContentType::KeyAgreementInfo,
        ] {
            let oid = variant.oid();
            assert_eq!(ContentType::from_oid(&oid), Some(variant));
        }

        assert_eq!(ContentType::Data.name(), "data");
        assert_eq!(
            ContentType::SignedAndEnvelopedData.name(),
            "signedAndEnvelopedData"
        );
    }

    #[test]
    fn content_type_rejects_foreign_oids() {
        // Same prefix, terminal node outside 1..6.
        let oid = Oid(Bytes::copy_from_slice(&[
            42, 129, 28, 207, 85, 6, 1, 4, 2, 7,
        ]));
        assert!(ContentType::from_oid(&oid).is_none());

        // PKCS #7 id-data lives under a different arc entirely.
        let oid = Oid(Bytes::copy_from_slice(&[
            42, 134, 72, 134, 247, 13, 1, 7, 1,
        ]));
        assert!(ContentType::from_oid(&oid).is_none());
    }

    #[test]
    fn content_info_data_round_trip() {
        let info = ContentInfo::new_data(b"hello");

        let mut der = Vec::new();
        info.encode_ref().write_encoded(Mode::Der, &mut der).unwrap();

        let parsed = ContentInfo::decode_der(&der).unwrap();
        assert_eq!(parsed, info);

        let payload = parsed
            .content
            .clone()
            .decode(|cons| OctetString::take_from(cons))
            .unwrap();
        assert_eq!(payload.into_bytes().as_ref(), b"hello");
    }

    #[test]
    fn content_info_rejects_trailing_byte() {
        let info = ContentInfo::new_data(b"hello");

        let mut der = Vec::new();
        info.encode_ref().write_encoded(Mode::Der, &mut der).unwrap();
        der.push(0x00);

        assert!(ContentInfo::decode_der(&der).is_err());
    }

    #[test]
    fn version_other_than_one_is_rejected() {
        // An EncryptedData whose version field is 2, assembled by hand.
        let eci = EncryptedContentInfo {
            content_type: Oid(Bytes::copy_from_slice(OID_DATA.as_ref())),
            content_encryption_algorithm: AlgorithmIdentifier {
                algorithm: Oid(Bytes::copy_from_slice(&[42, 129, 28, 207, 85, 1, 104, 2])),
                parameters: None,
            },
            encrypted_content: Some(OctetString::new(Bytes::copy_from_slice(&[0u8; 16]))),
            shared_info1: None,
            shared_info2: None,
        };

        let body = Captured::from_values(
            Mode::Der,
            encode::sequence((2u8.encode(), eci.encode_ref())),
        );
        let msg = Captured::from_values(
            Mode::Der,
            encode::sequence((
                OID_ENCRYPTED_DATA.encode_ref(),
                encode::Constructed::new(Tag::CTX_0, &body),
            )),
        );

        assert!(EncryptedData::decode_der(msg.as_slice()).is_err());
    }

    #[test]
    fn digested_attributes_use_universal_set_header() {
        let mut attributes = AuthenticatedAttributes::default();
        attributes.push(Attribute {
            typ: Oid(Bytes::copy_from_slice(OID_CONTENT_TYPE.as_ref())),
            values: vec![AttributeValue::new(Captured::from_values(
                Mode::Der,
                Oid(Bytes::copy_from_slice(OID_DATA.as_ref())).encode(),
            ))],
        });

        let mut body = Vec::new();
        for attribute in attributes.iter() {
            attribute
                .encode_ref()
                .write_encoded(Mode::Der, &mut body)
                .unwrap();
        }

        let info = SignerInfo {
            version: CmsVersion::V1,
            issuer_and_serial_number: IssuerAndSerialNumber {
                issuer: Default::default(),
                serial_number: 1.into(),
            },
            digest_algorithm: AlgorithmIdentifier {
                algorithm: Oid(Bytes::copy_from_slice(&[42, 129, 28, 207, 85, 1, 131, 17])),
                parameters: None,
            },
            authenticated_attributes: Some(attributes),
            digest_encryption_algorithm: AlgorithmIdentifier {
                algorithm: Oid(Bytes::copy_from_slice(&[42, 129, 28, 207, 85, 1, 131, 117])),
                parameters: None,
            },
            encrypted_digest: OctetString::new(Bytes::copy_from_slice(&[0u8; 8])),
            unauthenticated_attributes: None,
            authenticated_attributes_data: Some(body.clone()),
        };

        let digested = info
            .authenticated_attributes_digested_content()
            .unwrap()
            .unwrap();

        assert_eq!(digested[0], 0x31);
        assert_eq!(digested[1] as usize, body.len());
        assert_eq!(&digested[2..], body.as_slice());

        // Serializing from the parsed values yields the same bytes.
        let info_without_stash = SignerInfo {
            authenticated_attributes_data: None,
            ..info
        };
        assert_eq!(
            info_without_stash
                .authenticated_attributes_digested_content()
                .unwrap()
                .unwrap(),
            digested
        );
    }

    #[test]
    fn signer_info_round_trip_preserves_attribute_bytes() {
        let mut attributes = AuthenticatedAttributes::default();
        attributes.push(Attribute {
            typ: Oid(Bytes::copy_from_slice(OID_MESSAGE_DIGEST.as_ref())),
            values: vec![AttributeValue::new(Captured::from_values(
                Mode::Der,
                [0xabu8; 32].as_ref().encode(),
            ))],
        });

        let info = SignerInfo {
            version: CmsVersion::V1,
            issuer_and_serial_number: IssuerAndSerialNumber {
                issuer: Default::default(),
                serial_number: 7.into(),
            },
            digest_algorithm: AlgorithmIdentifier {
                algorithm: Oid(Bytes::copy_from_slice(&[42, 129, 28, 207, 85, 1, 131, 17])),
                parameters: None,
            },
            authenticated_attributes: Some(attributes),
            digest_encryption_algorithm: AlgorithmIdentifier {
                algorithm: Oid(Bytes::copy_from_slice(&[42, 129, 28, 207, 85, 1, 131, 117])),
                parameters: None,
            },
            encrypted_digest: OctetString::new(Bytes::copy_from_slice(&[1u8; 8])),
            unauthenticated_attributes: None,
            authenticated_attributes_data: None,
        };

        let mut der = Vec::new();
        info.encode_ref().write_encoded(Mode::Der, &mut der).unwrap();

        let source = BytesSource::new(Bytes::copy_from_slice(&der));
        let parsed = Constructed::decode(source, Mode::Der, |cons| {
            cons.take_sequence(|cons| SignerInfo::from_sequence(cons))
        })
        .unwrap();

        assert_eq!(parsed.authenticated_attributes, info.authenticated_attributes);

        // The stashed raw bytes must equal a fresh DER serialization of the
        // parsed attributes, minus the SET header.
        let digested = parsed
            .authenticated_attributes_digested_content()
            .unwrap()
            .unwrap();
        let stashed = parsed.authenticated_attributes_data.as_ref().unwrap();
        assert_eq!(&digested[2..], stashed.as_slice());
    }
}
