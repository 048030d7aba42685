use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::packet::TcpHeader;

/// `Sequence Number <seq>, ACK Number <ack>, ACK 1, FIN <0|1>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckMessage {
    pub seq_num: u32,
    pub ack_num: u32,
    pub fin: bool,
}

impl AckMessage {
    pub fn for_header(header: &TcpHeader) -> Self {
        Self {
            seq_num: header.seq_num,
            ack_num: header.ack_num,
            fin: header.is_fin(),
        }
    }
}

impl fmt::Display for AckMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sequence Number {}, ACK Number {}, ACK 1, FIN {}",
            self.seq_num,
            self.ack_num,
            u8::from(self.fin)
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseAckError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid value {value:?} for field `{field}`")]
    InvalidValue { field: &'static str, value: String },
    #[error("unexpected trailing text {0:?}")]
    Trailing(String),
}

impl FromStr for AckMessage {
    type Err = ParseAckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split(", ");

        let seq_num = number(field(parts.next(), "Sequence Number")?, "Sequence Number")?;
        let ack_num = number(field(parts.next(), "ACK Number")?, "ACK Number")?;

        let ack_bit = field(parts.next(), "ACK")?;
        if ack_bit != "1" {
            return Err(ParseAckError::InvalidValue {
                field: "ACK",
                value: ack_bit.to_string(),
            });
        }

        let fin = match field(parts.next(), "FIN")? {
            "0" => false,
            "1" => true,
            other => {
                return Err(ParseAckError::InvalidValue {
                    field: "FIN",
                    value: other.to_string(),
                });
            }
        };

        if let Some(rest) = parts.next() {
            return Err(ParseAckError::Trailing(rest.to_string()));
        }

        Ok(Self {
            seq_num,
            ack_num,
            fin,
        })
    }
}

fn field<'a>(part: Option<&'a str>, name: &'static str) -> Result<&'a str, ParseAckError> {
    part.and_then(|p| p.strip_prefix(name))
        .and_then(|p| p.strip_prefix(' '))
        .ok_or(ParseAckError::MissingField(name))
}

fn number(value: &str, name: &'static str) -> Result<u32, ParseAckError> {
    value.parse().map_err(|_| ParseAckError::InvalidValue {
        field: name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::flags;

    #[test]
    fn formats_like_the_wire_line() {
        let ack = AckMessage {
            seq_num: 4,
            ack_num: 4,
            fin: true,
        };
        assert_eq!(
            ack.to_string(),
            "Sequence Number 4, ACK Number 4, ACK 1, FIN 1"
        );
    }

    #[test]
    fn built_from_header_flags() {
        let header = TcpHeader::new(1, 2, 9, 9, flags::ACK, 1);
        let ack = AckMessage::for_header(&header);
        assert_eq!(
            ack.to_string(),
            "Sequence Number 9, ACK Number 9, ACK 1, FIN 0"
        );
    }

    #[test]
    fn parses_trimmed_line() {
        let ack: AckMessage = "  Sequence Number 12, ACK Number 12, ACK 1, FIN 0\n"
            .parse()
            .unwrap();
        assert_eq!(
            ack,
            AckMessage {
                seq_num: 12,
                ack_num: 12,
                fin: false
            }
        );
    }

    #[test]
    fn ack_numbers_compare_exactly() {
        // The text for 12 contains "ACK Number 1", the parsed number does not equal 1.
        let ack: AckMessage = "Sequence Number 12, ACK Number 12, ACK 1, FIN 0".parse().unwrap();
        assert_ne!(ack.ack_num, 1);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(
            "".parse::<AckMessage>(),
            Err(ParseAckError::MissingField("Sequence Number"))
        );
        assert_eq!(
            "Sequence Number x, ACK Number 1, ACK 1, FIN 0".parse::<AckMessage>(),
            Err(ParseAckError::InvalidValue {
                field: "Sequence Number",
                value: "x".into()
            })
        );
        assert_eq!(
            "Sequence Number 1, ACK Number 1, ACK 1, FIN 2".parse::<AckMessage>(),
            Err(ParseAckError::InvalidValue {
                field: "FIN",
                value: "2".into()
            })
        );
        assert_eq!(
            "Sequence Number 1, ACK Number 1, ACK 1, FIN 0, extra".parse::<AckMessage>(),
            Err(ParseAckError::Trailing("extra".into()))
        );
    }
}
