//  _____       ______   ____
// |_   _|     |  ____|/ ____|  Institute of Embedded Systems
//   | |  _ __ | |__  | (___    Zurich University of Applied Sciences
//   | | | '_ \|  __|  \___ \   8401 Winterthur, Switzerland
//  _| |_| | | | |____ ____) |
// |_____|_| |_|______|_____/
//
// Copyright 2025 Institute of Embedded Systems at Zurich University of Applied Sciences.
// All rights reserved.
// SPDX-License-Identifier: MIT

//! Fixed-layout tag-prefixed wire codec.
//!
//! Each frame begins with a 1-octet type tag from the closed set below; numeric fields are
//! host-order since every mote shares architecture. This is kept as a small hand-rolled codec
//! rather than a derived `serde` format because the tag numbers below are part of the contract,
//! not an implementation detail a derive macro is free to renumber.

use crate::{Message, NodeId};

pub const TAG_DIS: u8 = 2;
pub const TAG_DIO: u8 = 3;
pub const TAG_DAO: u8 = 4;
pub const TAG_TURNON: u8 = 5;
pub const TAG_ACK: u8 = 6;
pub const TAG_LIGHT: u8 = 7;
pub const TAG_MAINT: u8 = 8;
pub const TAG_MAINTACK: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// Frame shorter than its tag's fixed payload.
    InvalidFrame,
    /// Tag outside the closed set.
    UnknownMessageType(u8),
}

/// Encode `message` into `out`, returning the number of bytes written.
pub fn encode(message: &Message, out: &mut [u8]) -> Result<usize, CodecError> {
    match message {
        Message::Dis => {
            require(out, 1)?;
            out[0] = TAG_DIS;
            Ok(1)
        }
        Message::Dio { from, rank, role } => {
            require(out, 7)?;
            out[0] = TAG_DIO;
            out[1..5].copy_from_slice(&from.to_le_bytes());
            out[5] = *rank;
            out[6] = *role;
            Ok(7)
        }
        Message::Dao {
            origin,
            origin_role,
            reporter,
        } => {
            require(out, 10)?;
            out[0] = TAG_DAO;
            out[1..5].copy_from_slice(&origin.to_le_bytes());
            out[5] = *origin_role;
            out[6..10].copy_from_slice(&reporter.to_le_bytes());
            Ok(10)
        }
        Message::TurnOn { target_role } => {
            require(out, 2)?;
            out[0] = TAG_TURNON;
            out[1] = *target_role;
            Ok(2)
        }
        Message::Ack { from, role } => {
            require(out, 6)?;
            out[0] = TAG_ACK;
            out[1..5].copy_from_slice(&from.to_le_bytes());
            out[5] = *role;
            Ok(6)
        }
        Message::Light { from, level } => {
            require(out, 7)?;
            out[0] = TAG_LIGHT;
            out[1..5].copy_from_slice(&from.to_le_bytes());
            out[5..7].copy_from_slice(&level.to_le_bytes());
            Ok(7)
        }
        Message::Maint { src } => {
            require(out, 5)?;
            out[0] = TAG_MAINT;
            out[1..5].copy_from_slice(&src.to_le_bytes());
            Ok(5)
        }
        Message::MaintAck { dst } => {
            require(out, 5)?;
            out[0] = TAG_MAINTACK;
            out[1..5].copy_from_slice(&dst.to_le_bytes());
            Ok(5)
        }
    }
}

/// Decode a frame, returning the message and the number of bytes consumed.
pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
    let tag = *bytes.first().ok_or(CodecError::InvalidFrame)?;
    match tag {
        TAG_DIS => Ok(Message::Dis),
        TAG_DIO => {
            require(bytes, 7)?;
            Ok(Message::Dio {
                from: read_node_id(&bytes[1..5]),
                rank: bytes[5],
                role: bytes[6],
            })
        }
        TAG_DAO => {
            require(bytes, 10)?;
            Ok(Message::Dao {
                origin: read_node_id(&bytes[1..5]),
                origin_role: bytes[5],
                reporter: read_node_id(&bytes[6..10]),
            })
        }
        TAG_TURNON => {
            require(bytes, 2)?;
            Ok(Message::TurnOn {
                target_role: bytes[1],
            })
        }
        TAG_ACK => {
            require(bytes, 6)?;
            Ok(Message::Ack {
                from: read_node_id(&bytes[1..5]),
                role: bytes[5],
            })
        }
        TAG_LIGHT => {
            require(bytes, 7)?;
            Ok(Message::Light {
                from: read_node_id(&bytes[1..5]),
                level: u16::from_le_bytes([bytes[5], bytes[6]]),
            })
        }
        TAG_MAINT => {
            require(bytes, 5)?;
            Ok(Message::Maint {
                src: read_node_id(&bytes[1..5]),
            })
        }
        TAG_MAINTACK => {
            require(bytes, 5)?;
            Ok(Message::MaintAck {
                dst: read_node_id(&bytes[1..5]),
            })
        }
        other => Err(CodecError::UnknownMessageType(other)),
    }
}

fn require(bytes: &[u8], len: usize) -> Result<(), CodecError> {
    if bytes.len() < len {
        Err(CodecError::InvalidFrame)
    } else {
        Ok(())
    }
}

fn read_node_id(bytes: &[u8]) -> NodeId {
    NodeId::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        let messages = [
            Message::Dis,
            Message::Dio {
                from: 2,
                rank: 1,
                role: 0,
            },
            Message::Dao {
                origin: 7,
                origin_role: 1,
                reporter: 3,
            },
            Message::TurnOn { target_role: 3 },
            Message::Ack { from: 7, role: 3 },
            Message::Light {
                from: 7,
                level: 120,
            },
            Message::Maint { src: 9 },
            Message::MaintAck { dst: 9 },
        ];
        for message in messages {
            let mut buf = [0u8; 16];
            let n = encode(&message, &mut buf).unwrap();
            assert_eq!(decode(&buf[..n]).unwrap(), message);
        }
    }

    #[test]
    fn rejects_empty_frame() {
        assert_eq!(decode(&[]), Err(CodecError::InvalidFrame));
    }

    #[test]
    fn rejects_unknown_tag() {
        assert_eq!(decode(&[200]), Err(CodecError::UnknownMessageType(200)));
    }

    #[test]
    fn rejects_truncated_payload() {
        assert_eq!(decode(&[TAG_DIO, 1]), Err(CodecError::InvalidFrame));
    }

    #[test]
    fn ack_tag_is_six() {
        assert_eq!(TAG_ACK, 6);
    }
}
