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


use super::{TelnetCommand, TelnetMessage, consts, escape_iac_into};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

/// Longest line or subnegotiation payload accepted before it is flushed or dropped.
pub const DEFAULT_MAX_LENGTH: usize = 64 * 1024;

/// Telnet codec failures.
///
/// Malformed input is never an error, it is logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frames a raw telnet byte stream into [`TelnetMessage`] values.
///
/// Negotiations and commands are only consumed from the source buffer once they are
/// complete; a partial `IAC ...` prefix stays in the buffer until more bytes arrive.
/// Subnegotiation payloads and application data are accumulated internally as they
/// arrive, so every input byte is examined once.
#[derive(Debug)]
pub struct TelnetCodec {
    line: BytesMut,
    after_cr: bool,
    discarding: bool,
    subnegotiation: Option<PendingSubnegotiation>,
    max_length: usize,
}

/// An `IAC SB <option>` whose closing `IAC SE` has not arrived yet.
#[derive(Debug)]
struct PendingSubnegotiation {
    option: u8,
    payload: BytesMut,
}

enum SubnegotiationScan {
    Incomplete,
    Complete(u8, Bytes),
    Abandoned,
}

impl TelnetCodec {
    pub fn new() -> TelnetCodec {
        TelnetCodec::default()
    }

    /// Creates a codec that flushes lines and drops subnegotiations longer than `max_length`.
    pub fn with_max_length(max_length: usize) -> TelnetCodec {
        TelnetCodec {
            max_length: max_length.max(1),
            ..TelnetCodec::default()
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Application data received so far that has not been terminated by CR or LF.
    pub fn pending_line(&self) -> &[u8] {
        &self.line
    }

    fn push_data(&mut self, byte: u8) -> Option<Bytes> {
        let after_cr = std::mem::take(&mut self.after_cr);
        match byte {
            consts::CR => {
                self.after_cr = true;
                Some(self.line.split().freeze())
            }
            consts::LF | consts::NUL if after_cr => None,
            consts::LF => Some(self.line.split().freeze()),
            _ => self.push_literal(byte),
        }
    }

    fn push_literal(&mut self, byte: u8) -> Option<Bytes> {
        self.after_cr = false;
        self.line.put_u8(byte);
        if self.line.len() >= self.max_length {
            debug!(length = self.line.len(), "Line length limit reached, flushing");
            Some(self.line.split().freeze())
        } else {
            None
        }
    }

    /// Unescapes subnegotiation payload from `src` until the closing `IAC SE`.
    ///
    /// Consumed bytes are removed from `src`, a trailing lone IAC is left for the next call.
    fn scan_subnegotiation(&mut self, src: &mut BytesMut) -> SubnegotiationScan {
        let Some(mut pending) = self.subnegotiation.take() else {
            return SubnegotiationScan::Abandoned;
        };
        let mut index = 0;
        let scan = loop {
            if pending.payload.len() > self.max_length {
                warn!(
                    option = pending.option,
                    limit = self.max_length,
                    "Subnegotiation exceeds length limit, discarding"
                );
                self.discarding = true;
                break SubnegotiationScan::Abandoned;
            }
            let Some(&byte) = src.get(index) else {
                break SubnegotiationScan::Incomplete;
            };
            if byte != consts::IAC {
                pending.payload.put_u8(byte);
                index += 1;
                continue;
            }
            match src.get(index + 1) {
                None => break SubnegotiationScan::Incomplete,
                Some(&consts::IAC) => {
                    pending.payload.put_u8(consts::IAC);
                    index += 2;
                }
                Some(&consts::SE) => {
                    index += 2;
                    let payload = pending.payload.split().freeze();
                    break SubnegotiationScan::Complete(pending.option, payload);
                }
                Some(&command) => {
                    warn!(
                        option = pending.option,
                        command, "Unterminated subnegotiation, resynchronizing"
                    );
                    break SubnegotiationScan::Abandoned;
                }
            }
        };
        src.advance(index);
        if let SubnegotiationScan::Incomplete = scan {
            self.subnegotiation = Some(pending);
        }
        scan
    }

    /// Drops the remainder of an oversized subnegotiation. Returns true once it has ended.
    fn skip_subnegotiation(&mut self, src: &mut BytesMut) -> bool {
        let mut index = 0;
        while index < src.len() {
            if src[index] != consts::IAC {
                index += 1;
                continue;
            }
            match src.get(index + 1) {
                None => break,
                Some(&consts::IAC) => index += 2,
                Some(&consts::SE) => {
                    src.advance(index + 2);
                    self.discarding = false;
                    return true;
                }
                Some(_) => {
                    src.advance(index);
                    self.discarding = false;
                    return true;
                }
            }
        }
        src.advance(index);
        false
    }
}

impl Default for TelnetCodec {
    fn default() -> Self {
        TelnetCodec {
            line: BytesMut::new(),
            after_cr: false,
            discarding: false,
            subnegotiation: None,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

/// Discards bytes up to, but not including, the next IAC.
fn resynchronize(src: &mut BytesMut) {
    let skip = src
        .iter()
        .position(|&byte| byte == consts::IAC)
        .unwrap_or(src.len());
    src.advance(skip);
}

impl Decoder for TelnetCodec {
    type Item = TelnetMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<TelnetMessage>, Self::Error> {
        loop {
            if self.discarding && !self.skip_subnegotiation(src) {
                return Ok(None);
            }
            if self.subnegotiation.is_some() {
                match self.scan_subnegotiation(src) {
                    SubnegotiationScan::Incomplete => return Ok(None),
                    SubnegotiationScan::Complete(option, payload) => {
                        return Ok(Some(TelnetMessage::Subnegotiation(option, payload)));
                    }
                    SubnegotiationScan::Abandoned => continue,
                }
            }
            let Some(&byte) = src.first() else {
                return Ok(None);
            };
            if byte != consts::IAC {
                src.advance(1);
                if let Some(line) = self.push_data(byte) {
                    return Ok(Some(TelnetMessage::AppData(line)));
                }
                continue;
            }
            let Some(&command) = src.get(1) else {
                return Ok(None);
            };
            match command {
                consts::IAC => {
                    src.advance(2);
                    if let Some(line) = self.push_literal(consts::IAC) {
                        return Ok(Some(TelnetMessage::AppData(line)));
                    }
                }
                consts::WILL | consts::WONT | consts::DO | consts::DONT => {
                    let Some(&option) = src.get(2) else {
                        return Ok(None);
                    };
                    if option == consts::SB || option == consts::SE {
                        warn!(command, option, "Malformed negotiation, resynchronizing");
                        src.advance(2);
                        resynchronize(src);
                        continue;
                    }
                    src.advance(3);
                    let command = match command {
                        consts::WILL => TelnetCommand::WILL,
                        consts::WONT => TelnetCommand::WONT,
                        consts::DO => TelnetCommand::DO,
                        _ => TelnetCommand::DONT,
                    };
                    return Ok(Some(TelnetMessage::Negotiation(command, option)));
                }
                consts::SB => {
                    let Some(&option) = src.get(2) else {
                        return Ok(None);
                    };
                    src.advance(3);
                    self.subnegotiation = Some(PendingSubnegotiation {
                        option,
                        payload: BytesMut::new(),
                    });
                }
                consts::SE => {
                    debug!("Discarding stray IAC SE");
                    src.advance(2);
                }
                _ => {
                    src.advance(2);
                    return Ok(Some(TelnetMessage::Command(command)));
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<TelnetMessage>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        if !self.line.is_empty() {
            self.after_cr = false;
            return Ok(Some(TelnetMessage::AppData(self.line.split().freeze())));
        }
        if let Some(pending) = self.subnegotiation.take() {
            debug!(
                option = pending.option,
                buffered = pending.payload.len(),
                "Discarding unterminated subnegotiation at end of stream"
            );
        }
        self.discarding = false;
        if !src.is_empty() {
            debug!(remaining = src.len(), "Discarding truncated sequence at end of stream");
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<TelnetMessage> for TelnetCodec {
    type Error = CodecError;

    fn encode(&mut self, item: TelnetMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            TelnetMessage::AppData(data) => {
                dst.reserve(data.len());
                escape_iac_into(&data, dst);
            }
            TelnetMessage::Command(command) => {
                dst.extend_from_slice(&[consts::IAC, command]);
            }
            TelnetMessage::Negotiation(command, option) => {
                dst.extend_from_slice(&[consts::IAC, command.to_byte(), option]);
            }
            TelnetMessage::Subnegotiation(option, payload) => {
                dst.reserve(payload.len() + 5);
                dst.extend_from_slice(&[consts::IAC, consts::SB, option]);
                escape_iac_into(&payload, dst);
                dst.extend_from_slice(&[consts::IAC, consts::SE]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut TelnetCodec, buffer: &mut BytesMut) -> Vec<TelnetMessage> {
        let mut messages = Vec::new();
        while let Some(message) = codec.decode(buffer).unwrap() {
            messages.push(message);
        }
        messages
    }

    fn app(data: &[u8]) -> TelnetMessage {
        TelnetMessage::AppData(Bytes::copy_from_slice(data))
    }

    #[test]
    fn test_decode_line() {
        let mut codec = TelnetCodec::new();
        let mut buffer = BytesMut::from(&b"hello\r\n"[..]);
        assert_eq!(decode_all(&mut codec, &mut buffer), vec![app(b"hello")]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_line_terminators() {
        let mut codec = TelnetCodec::new();
        let mut buffer = BytesMut::from(&b"a\r\nb\nc\r\0d\r\r\n"[..]);
        assert_eq!(
            decode_all(&mut codec, &mut buffer),
            vec![app(b"a"), app(b"b"), app(b"c"), app(b"d"), app(b"")]
        );
    }

    #[test]
    fn test_decode_escaped_iac_at_eof() {
        let mut codec = TelnetCodec::new();
        let mut buffer = BytesMut::from(&[255u8, 255, 65][..]);
        assert!(decode_all(&mut codec, &mut buffer).is_empty());
        assert_eq!(codec.pending_line(), &[255, 65]);
        assert_eq!(codec.decode_eof(&mut buffer).unwrap(), Some(app(&[255, 65])));
        assert_eq!(codec.decode_eof(&mut buffer).unwrap(), None);
    }

    #[test]
    fn test_decode_negotiation() {
        let mut codec = TelnetCodec::new();
        let mut buffer = BytesMut::from(&[255u8, 251, 31, 255, 254, 24][..]);
        assert_eq!(
            decode_all(&mut codec, &mut buffer),
            vec![
                TelnetMessage::Negotiation(TelnetCommand::WILL, 31),
                TelnetMessage::Negotiation(TelnetCommand::DONT, 24),
            ]
        );
    }

    #[test]
    fn test_partial_sequence_is_not_consumed() {
        let mut codec = TelnetCodec::new();
        let mut buffer = BytesMut::from(&[255u8][..]);
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);
        assert_eq!(buffer.len(), 1);

        buffer.put_u8(253);
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);
        assert_eq!(buffer.len(), 2);

        buffer.put_u8(31);
        assert_eq!(
            codec.decode(&mut buffer).unwrap(),
            Some(TelnetMessage::Negotiation(TelnetCommand::DO, 31))
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_partial_subnegotiation_resumes() {
        let mut codec = TelnetCodec::new();
        let mut buffer = BytesMut::from(&[255u8, 250, 31, 0, 80, 255][..]);
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);
        assert_eq!(&buffer[..], &[255]);

        buffer.extend_from_slice(&[255, 0, 24, 255, 240]);
        assert_eq!(
            codec.decode(&mut buffer).unwrap(),
            Some(TelnetMessage::Subnegotiation(
                31,
                Bytes::from_static(&[0, 80, 255, 0, 24])
            ))
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_subnegotiation_lone_se_is_payload() {
        let mut codec = TelnetCodec::new();
        let mut buffer = BytesMut::from(&[255u8, 250, 24, 0, 240, 65, 255, 240][..]);
        assert_eq!(
            decode_all(&mut codec, &mut buffer),
            vec![TelnetMessage::Subnegotiation(
                24,
                Bytes::from_static(&[0, 240, 65])
            )]
        );
    }

    #[test]
    fn test_bare_commands() {
        let mut codec = TelnetCodec::new();
        let mut buffer = BytesMut::from(&[b'a', b'b', 255, 241, b'c', b'\n', 255, 249][..]);
        assert_eq!(
            decode_all(&mut codec, &mut buffer),
            vec![
                TelnetMessage::Command(consts::NOP),
                app(b"abc"),
                TelnetMessage::Command(consts::GA),
            ]
        );
    }

    #[test]
    fn test_malformed_negotiation_resynchronizes() {
        let mut codec = TelnetCodec::new();
        let mut buffer = BytesMut::from(&[255u8, 251, 250, 1, 2, 255, 241][..]);
        assert_eq!(
            decode_all(&mut codec, &mut buffer),
            vec![TelnetMessage::Command(consts::NOP)]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_interrupted_subnegotiation_resynchronizes() {
        let mut codec = TelnetCodec::new();
        let mut buffer = BytesMut::from(&[255u8, 250, 69, 1, 2, 255, 241, b'x', b'\n'][..]);
        assert_eq!(
            decode_all(&mut codec, &mut buffer),
            vec![TelnetMessage::Command(consts::NOP), app(b"x")]
        );
    }

    #[test]
    fn test_stray_se_is_dropped() {
        let mut codec = TelnetCodec::new();
        let mut buffer = BytesMut::from(&[255u8, 240, b'o', b'k', b'\n'][..]);
        assert_eq!(decode_all(&mut codec, &mut buffer), vec![app(b"ok")]);
    }

    #[test]
    fn test_oversized_subnegotiation_is_discarded() {
        let mut codec = TelnetCodec::with_max_length(4);
        let mut buffer = BytesMut::from(&[255u8, 250, 69, 1, 2, 3, 4, 5, 6][..]);
        assert!(decode_all(&mut codec, &mut buffer).is_empty());
        assert!(buffer.is_empty());

        buffer.extend_from_slice(&[7, 255, 255, 255, 240, b'h', b'i', b'\n']);
        assert_eq!(decode_all(&mut codec, &mut buffer), vec![app(b"hi")]);
    }

    #[test]
    fn test_long_line_is_flushed() {
        let mut codec = TelnetCodec::with_max_length(4);
        let mut buffer = BytesMut::from(&b"abcdefg\n"[..]);
        assert_eq!(
            decode_all(&mut codec, &mut buffer),
            vec![app(b"abcd"), app(b"efg")]
        );
    }

    #[test]
    fn test_encode_escapes_iac() {
        let mut codec = TelnetCodec::new();
        let mut buffer = BytesMut::new();
        codec.encode(app(&[b'x', 255]), &mut buffer).unwrap();
        codec
            .encode(TelnetMessage::Negotiation(TelnetCommand::DO, 31), &mut buffer)
            .unwrap();
        codec.encode(TelnetMessage::Command(consts::GA), &mut buffer).unwrap();
        assert_eq!(&buffer[..], &[b'x', 255, 255, 255, 253, 31, 255, 249]);
    }

    #[test]
    fn test_subnegotiation_survives_encoding() {
        let mut codec = TelnetCodec::new();
        let mut buffer = BytesMut::new();
        let message = TelnetMessage::Subnegotiation(201, Bytes::from_static(&[b'a', 255, b'b']));
        codec.encode(message.clone(), &mut buffer).unwrap();
        assert_eq!(&buffer[..], &[255, 250, 201, b'a', 255, 255, b'b', 255, 240]);
        assert_eq!(decode_all(&mut codec, &mut buffer), vec![message]);
    }

    #[test]
    fn test_subnegotiation_fed_bytewise() {
        let mut codec = TelnetCodec::new();
        let mut payload = vec![b'x'; 2000];
        payload.push(255);
        payload.extend_from_slice(b"tail");
        let mut wire = vec![255u8, 250, 201];
        for &byte in &payload {
            wire.push(byte);
            if byte == 255 {
                wire.push(255);
            }
        }
        wire.extend_from_slice(&[255, 240]);

        let mut buffer = BytesMut::new();
        let mut messages = Vec::new();
        for byte in wire {
            buffer.put_u8(byte);
            messages.extend(decode_all(&mut codec, &mut buffer));
            assert!(buffer.len() <= 2);
        }
        assert_eq!(
            messages,
            vec![TelnetMessage::Subnegotiation(201, Bytes::from(payload))]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_oversized_subnegotiation_fed_bytewise() {
        let mut codec = TelnetCodec::with_max_length(1024);
        let mut buffer = BytesMut::from(&[255u8, 250, 69][..]);
        assert!(decode_all(&mut codec, &mut buffer).is_empty());
        for index in 0..60_000u32 {
            buffer.put_u8((index % 200) as u8);
            assert_eq!(codec.decode(&mut buffer).unwrap(), None);
            assert!(buffer.is_empty());
        }

        buffer.extend_from_slice(&[255, 240, b'l', b'o', b'o', b'k', b'\n']);
        assert_eq!(decode_all(&mut codec, &mut buffer), vec![app(b"look")]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_unterminated_subnegotiation_dropped_at_eof() {
        let mut codec = TelnetCodec::new();
        let mut buffer = BytesMut::from(&[255u8, 250, 24, 0, 1, 2][..]);
        assert_eq!(codec.decode_eof(&mut buffer).unwrap(), None);
        assert!(buffer.is_empty());

        buffer.extend_from_slice(b"hi\n");
        assert_eq!(decode_all(&mut codec, &mut buffer), vec![app(b"hi")]);
    }
}
