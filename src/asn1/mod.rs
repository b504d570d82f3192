// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Holds Rust struct definitions for various ASN.1 primitives. */

pub mod asn1time;
pub mod gmt0010;
pub mod rfc3280;
pub mod rfc4519;
pub mod rfc5280;
