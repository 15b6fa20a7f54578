//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Out-of-band data exchanged alongside the text stream.

use crate::telnet::consts::mssp;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A structured payload received from a client.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredData {
    /// Raw MSDP variable table
    Msdp(Bytes),
    /// GMCP message, `Package.SubPackage [json]`
    Gmcp { package: String, data: Option<Value> },
}

impl StructuredData {
    /// Parses a GMCP subnegotiation payload.
    ///
    /// Returns `None` when the payload is not UTF-8, has an empty package name, or
    /// carries a body that is not valid JSON.
    pub fn parse_gmcp(payload: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(payload).ok()?.trim();
        let (package, body) = match text.split_once(char::is_whitespace) {
            Some((package, body)) => (package, body.trim()),
            None => (text, ""),
        };
        if package.is_empty() {
            return None;
        }
        let data = if body.is_empty() {
            None
        } else {
            Some(serde_json::from_str(body).ok()?)
        };
        Some(StructuredData::Gmcp {
            package: package.to_string(),
            data,
        })
    }

    /// Encodes a GMCP message body as sent inside `IAC SB GMCP ... IAC SE`.
    pub fn encode_gmcp(package: &str, data: Option<&Value>) -> Bytes {
        match data {
            Some(value) => Bytes::from(format!("{} {}", package, value)),
            None => Bytes::from(package.to_string()),
        }
    }
}

/// Server status table published over MSSP.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MudServerStatus(BTreeMap<String, Vec<String>>);

impl MudServerStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// Encodes the table as `VAR name VAL value [VAL value ...]` repeated per key.
    pub fn encode(&self) -> Bytes {
        let mut out = Vec::new();
        for (key, values) in &self.0 {
            out.push(mssp::VAR);
            out.extend_from_slice(key.as_bytes());
            if values.is_empty() {
                out.push(mssp::VAL);
            }
            for value in values {
                out.push(mssp::VAL);
                out.extend_from_slice(value.as_bytes());
            }
        }
        Bytes::from(out)
    }
}

impl From<BTreeMap<String, Vec<String>>> for MudServerStatus {
    fn from(table: BTreeMap<String, Vec<String>>) -> Self {
        Self(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_gmcp_with_body() {
        let parsed = StructuredData::parse_gmcp(br#"Char.Vitals {"hp": 10}"#).unwrap();
        assert_eq!(
            parsed,
            StructuredData::Gmcp {
                package: "Char.Vitals".to_string(),
                data: Some(json!({"hp": 10})),
            }
        );
    }

    #[test]
    fn test_parse_gmcp_without_body() {
        let parsed = StructuredData::parse_gmcp(b"Core.Ping").unwrap();
        assert_eq!(
            parsed,
            StructuredData::Gmcp {
                package: "Core.Ping".to_string(),
                data: None,
            }
        );
    }

    #[test]
    fn test_parse_gmcp_rejects_garbage() {
        assert_eq!(StructuredData::parse_gmcp(b"Core.Hello {not json"), None);
        assert_eq!(StructuredData::parse_gmcp(b""), None);
        assert_eq!(StructuredData::parse_gmcp(&[0xC3, 0x28]), None);
    }

    #[test]
    fn test_encode_gmcp() {
        let encoded = StructuredData::encode_gmcp("Room.Info", Some(&json!({"num": 3})));
        assert_eq!(&encoded[..], br#"Room.Info {"num":3}"#);
        assert_eq!(&StructuredData::encode_gmcp("Core.Ping", None)[..], b"Core.Ping");
    }

    #[test]
    fn test_mud_server_status_encode() {
        let mut status = MudServerStatus::new();
        status.insert("NAME", "Portal");
        status.insert("PORT", "4000");
        status.insert("PORT", "4443");
        let encoded = status.encode();
        let mut expected = vec![mssp::VAR];
        expected.extend_from_slice(b"NAME");
        expected.push(mssp::VAL);
        expected.extend_from_slice(b"Portal");
        expected.push(mssp::VAR);
        expected.extend_from_slice(b"PORT");
        expected.push(mssp::VAL);
        expected.extend_from_slice(b"4000");
        expected.push(mssp::VAL);
        expected.extend_from_slice(b"4443");
        assert_eq!(&encoded[..], &expected[..]);
    }
}
