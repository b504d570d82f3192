// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ASN.1 primitives related to time types.

use {
    bcder::{
        decode::{Constructed, DecodeError, Primitive, Source},
        encode::{PrimitiveContent, Values},
        Mode, Tag,
    },
    chrono::{Datelike, TimeZone, Timelike},
    std::{io::Write, ops::Deref, str::FromStr},
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Time {
    UtcTime(UtcTime),
    GeneralTime(GeneralizedTime),
}

impl Time {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive(|tag, prim| match tag {
            Tag::UTC_TIME => Ok(Self::UtcTime(UtcTime::from_primitive(prim)?)),
            Tag::GENERALIZED_TIME => Ok(Self::GeneralTime(GeneralizedTime::from_primitive(prim)?)),
            _ => Err(prim.content_err("expected UTCTime or GeneralizedTime")),
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        match self {
            Self::UtcTime(utc) => (Some(utc.encode()), None),
            Self::GeneralTime(gt) => (None, Some(gt.encode())),
        }
    }
}

impl AsRef<chrono::DateTime<chrono::Utc>> for Time {
    fn as_ref(&self) -> &chrono::DateTime<chrono::Utc> {
        match self {
            Self::UtcTime(dt) => dt.deref(),
            Self::GeneralTime(dt) => dt.deref(),
        }
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Time {
    fn from(t: chrono::DateTime<chrono::Utc>) -> Self {
        Self::UtcTime(UtcTime(t))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneralizedTime(chrono::DateTime<chrono::Utc>);

impl Deref for GeneralizedTime {
    type Target = chrono::DateTime<chrono::Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl GeneralizedTime {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive_if(Tag::GENERALIZED_TIME, |prim| Self::from_primitive(prim))
    }

    pub fn from_primitive<S: Source>(
        prim: &mut Primitive<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let data = prim.take_all()?;

        if data.len() != "YYYYMMDDHHMMSSZ".len() {
            return Err(prim.content_err("malformed GeneralizedTime"));
        }

        let (year, month, day, hour, minute, second) =
            parse_time_digits(&data[0..14], 4).ok_or_else(|| {
                prim.content_err("malformed GeneralizedTime")
            })?;

        if data[14] != b'Z' {
            return Err(prim.content_err("malformed GeneralizedTime"));
        }

        if let chrono::LocalResult::Single(dt) =
            chrono::Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        {
            Ok(Self(dt))
        } else {
            Err(prim.content_err("malformed GeneralizedTime"))
        }
    }
}

impl ToString for GeneralizedTime {
    fn to_string(&self) -> String {
        format!(
            "{:04}{:02}{:02}{:02}{:02}{:02}Z",
            self.0.year(),
            self.0.month(),
            self.0.day(),
            self.0.hour(),
            self.0.minute(),
            self.0.second()
        )
    }
}

impl PrimitiveContent for GeneralizedTime {
    const TAG: Tag = Tag::GENERALIZED_TIME;

    fn encoded_len(&self, _: Mode) -> usize {
        self.to_string().len()
    }

    fn write_encoded<W: Write>(&self, _: Mode, target: &mut W) -> Result<(), std::io::Error> {
        target.write_all(self.to_string().as_bytes())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UtcTime(chrono::DateTime<chrono::Utc>);

impl UtcTime {
    /// Obtain a new instance with now as the time.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive_if(Tag::UTC_TIME, |prim| Self::from_primitive(prim))
    }

    pub fn from_primitive<S: Source>(
        prim: &mut Primitive<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let data = prim.take_all()?;

        if data.len() != "YYMMDDHHMMSSZ".len() {
            return Err(prim.content_err("malformed UTCTime"));
        }

        let (year, month, day, hour, minute, second) = parse_time_digits(&data[0..12], 2)
            .ok_or_else(|| prim.content_err("malformed UTCTime"))?;

        let year = if year >= 50 { year + 1900 } else { year + 2000 };

        if data[12] != b'Z' {
            return Err(prim.content_err("malformed UTCTime"));
        }

        if let chrono::LocalResult::Single(dt) =
            chrono::Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        {
            Ok(Self(dt))
        } else {
            Err(prim.content_err("malformed UTCTime"))
        }
    }
}

/// Split a run of ASCII digits into year (of the given width) and five
/// two-digit time components.
fn parse_time_digits(data: &[u8], year_width: usize) -> Option<(i32, u32, u32, u32, u32, u32)> {
    let field = |range: std::ops::Range<usize>| -> Option<u32> {
        u32::from_str(std::str::from_utf8(&data[range]).ok()?).ok()
    };

    let year = i32::from_str(std::str::from_utf8(&data[0..year_width]).ok()?).ok()?;
    let month = field(year_width..year_width + 2)?;
    let day = field(year_width + 2..year_width + 4)?;
    let hour = field(year_width + 4..year_width + 6)?;
    let minute = field(year_width + 6..year_width + 8)?;
    let second = field(year_width + 8..year_width + 10)?;

    Some((year, month, day, hour, minute, second))
}

impl ToString for UtcTime {
    fn to_string(&self) -> String {
        format!(
            "{:02}{:02}{:02}{:02}{:02}{:02}Z",
            self.0.year() % 100,
            self.0.month(),
            self.0.day(),
            self.0.hour(),
            self.0.minute(),
            self.0.second()
        )
    }
}

impl Deref for UtcTime {
    type Target = chrono::DateTime<chrono::Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PrimitiveContent for UtcTime {
    const TAG: Tag = Tag::UTC_TIME;

    fn encoded_len(&self, _: Mode) -> usize {
        self.to_string().len()
    }

    fn write_encoded<W: Write>(&self, _: Mode, target: &mut W) -> Result<(), std::io::Error> {
        target.write_all(self.to_string().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_time_round_trip() {
        let time = UtcTime::now();

        let mut der = Vec::new();
        time.clone()
            .encode()
            .write_encoded(Mode::Der, &mut der)
            .unwrap();

        let parsed = Constructed::decode(der.as_slice(), Mode::Der, |cons| {
            UtcTime::take_from(cons)
        })
        .unwrap();

        // Sub-second precision is not representable on the wire.
        assert_eq!(parsed.to_string(), time.to_string());
    }

    #[test]
    fn utc_time_rejects_truncated() {
        assert!(
            Constructed::decode(&[0x17, 0x04, 0x32, 0x32, 0x30, 0x31][..], Mode::Der, |cons| {
                UtcTime::take_from(cons)
            })
            .is_err()
        );
    }
}
