// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Shared fixtures for the test suites. */

use {
    crate::{
        algorithm::{SignatureAlgorithm, SigningKey, OID_EC_PUBLIC_KEY, OID_SM2_P256V1},
        asn1::{
            asn1time::Time,
            rfc3280::Name,
            rfc5280::{
                AlgorithmIdentifier, AlgorithmParameter, Certificate as Asn1Certificate,
                SubjectPublicKeyInfo, TbsCertificate, Validity, Version,
            },
        },
        certificate::Certificate,
    },
    bcder::{encode::Values, BitString, Mode, Oid},
    bytes::Bytes,
    rand_core::OsRng,
    sm2::elliptic_curve::sec1::ToEncodedPoint,
};

/// Generate a fresh SM2 key pair and a matching self-signed certificate.
///
/// The certificate is assembled by hand from the ASN.1 layer, signed over
/// its TBS bytes with the same key it certifies.
pub(crate) fn self_signed_sm2_certificate(
    common_name: &str,
    serial: i32,
) -> (Certificate, SigningKey, sm2::SecretKey) {
    let secret_key = sm2::SecretKey::random(&mut OsRng);
    let public_point = secret_key.public_key().to_encoded_point(false);

    let mut name = Name::default();
    name.append_common_name_utf8_string(common_name).unwrap();
    name.append_country_utf8_string("CN").unwrap();

    let now = chrono::Utc::now();
    let expires = now + chrono::Duration::hours(1);

    let tbs_certificate = TbsCertificate {
        version: Some(Version::V3),
        serial_number: serial.into(),
        signature: SignatureAlgorithm::Sm2WithSm3.into(),
        issuer: name.clone(),
        validity: Validity {
            not_before: Time::from(now),
            not_after: Time::from(expires),
        },
        subject: name,
        subject_public_key_info: SubjectPublicKeyInfo {
            algorithm: AlgorithmIdentifier {
                algorithm: Oid(Bytes::copy_from_slice(OID_EC_PUBLIC_KEY.as_ref())),
                parameters: Some(AlgorithmParameter::from_oid(Oid(Bytes::copy_from_slice(
                    OID_SM2_P256V1.as_ref(),
                )))),
            },
            subject_public_key: BitString::new(0, Bytes::copy_from_slice(public_point.as_bytes())),
        },
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
        raw_data: None,
    };

    let mut tbs_der = Vec::new();
    tbs_certificate
        .encode_ref()
        .write_encoded(Mode::Der, &mut tbs_der)
        .unwrap();

    let signing_key = SigningKey::new(&secret_key).unwrap();
    let signature = signing_key.sign(&tbs_der).unwrap();

    let certificate = Asn1Certificate {
        tbs_certificate,
        signature_algorithm: SignatureAlgorithm::Sm2WithSm3.into(),
        signature: BitString::new(0, Bytes::from(signature)),
    };

    (
        Certificate::from_parsed_asn1(certificate),
        signing_key,
        secret_key,
    )
}
