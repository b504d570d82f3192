// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! High-level X.509 certificate interfaces. */

use {
    crate::{
        algorithm::{OID_EC_PUBLIC_KEY, OID_SM2_P256V1},
        asn1::{
            gmt0010::IssuerAndSerialNumber,
            rfc3280::Name,
            rfc5280,
        },
        CmsError,
    },
    bcder::{
        decode::{BytesSource, Constructed},
        encode::Values,
        Integer, Mode,
    },
    bytes::Bytes,
};

/// Defines an X.509 certificate used for signing or receiving data.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Certificate {
    /// The certificate's serial number.
    ///
    /// We need to store an ASN.1 primitive because ASN.1 integers are
    /// unbounded.
    serial_number: Integer,

    /// Name of this certificate.
    subject: Name,

    /// The issuer of this certificate.
    issuer: Name,

    /// The parsed ASN.1 certificate backing this instance.
    raw_cert: rfc5280::Certificate,
}

impl Certificate {
    /// Obtain an instance from an already parsed ASN.1 data structure.
    pub fn from_parsed_asn1(cert: rfc5280::Certificate) -> Self {
        Self {
            serial_number: cert.tbs_certificate.serial_number.clone(),
            subject: cert.tbs_certificate.subject.clone(),
            issuer: cert.tbs_certificate.issuer.clone(),
            raw_cert: cert,
        }
    }

    pub fn from_der(data: &[u8]) -> Result<Self, CmsError> {
        let source = BytesSource::new(Bytes::copy_from_slice(data));
        let cert = Constructed::decode(source, Mode::Der, |cons| {
            rfc5280::Certificate::take_from(cons)
        })?;

        Ok(Self::from_parsed_asn1(cert))
    }

    /// The serial number of this certificate.
    ///
    /// (Used for identification purposes.)
    pub fn serial_number(&self) -> &Integer {
        &self.serial_number
    }

    /// The subject of this certificate.
    pub fn subject(&self) -> &Name {
        &self.subject
    }

    /// The issuer of this certificate.
    ///
    /// (Used for identification purposes.)
    pub fn issuer(&self) -> &Name {
        &self.issuer
    }

    /// Derive the `IssuerAndSerialNumber` tuple identifying this
    /// certificate inside CMS messages.
    pub fn issuer_and_serial_number(&self) -> IssuerAndSerialNumber {
        IssuerAndSerialNumber {
            issuer: self.issuer.clone(),
            serial_number: self.serial_number.clone(),
        }
    }

    /// Obtain the SM2 public key carried by this certificate.
    ///
    /// Fails when the subject public key info does not describe a point
    /// on the sm2p256v1 curve.
    pub fn public_key(&self) -> Result<sm2::PublicKey, CmsError> {
        let spki = &self.raw_cert.tbs_certificate.subject_public_key_info;

        if spki.algorithm.algorithm != OID_EC_PUBLIC_KEY {
            return Err(CmsError::UnsupportedAlgorithm(
                spki.algorithm.algorithm.clone(),
            ));
        }

        let curve = spki
            .algorithm
            .parameters
            .as_ref()
            .ok_or(CmsError::InvalidParameter("public key curve is missing"))?
            .decode_oid()
            .map_err(|_| CmsError::InvalidParameter("public key curve is malformed"))?;

        if curve != OID_SM2_P256V1 {
            return Err(CmsError::UnsupportedAlgorithm(curve));
        }

        sm2::PublicKey::from_sec1_bytes(spki.subject_public_key.octet_bytes().as_ref())
            .map_err(|_| CmsError::CryptoProvider("SM2 public key rejected"))
    }

    /// Obtain the parsed certificate data structure backing this instance.
    pub fn raw_certificate(&self) -> &rfc5280::Certificate {
        &self.raw_cert
    }

    /// Whether the certificate is self-signed.
    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }

    /// Serialize this certificate to DER.
    pub fn as_der(&self) -> Result<Vec<u8>, CmsError> {
        let mut res = Vec::<u8>::new();

        self.raw_cert
            .encode_ref()
            .write_encoded(Mode::Der, &mut res)?;

        Ok(res)
    }
}

impl TryFrom<&rfc5280::Certificate> for Certificate {
    type Error = CmsError;

    fn try_from(cert: &rfc5280::Certificate) -> Result<Self, Self::Error> {
        Ok(Self::from_parsed_asn1(cert.clone()))
    }
}

impl From<Certificate> for IssuerAndSerialNumber {
    fn from(cert: Certificate) -> Self {
        Self {
            issuer: cert.issuer,
            serial_number: cert.serial_number,
        }
    }
}

/// Whether an issuer + serial pair identifies a given certificate.
///
/// Matching is exact: the serial value octets must be equal and the two
/// issuer names must be structurally equal.
pub fn certificate_matches(
    wanted_serial: &Integer,
    wanted_issuer: &Name,
    candidate: &Certificate,
) -> bool {
    wanted_serial == candidate.serial_number() && wanted_issuer == candidate.issuer()
}
