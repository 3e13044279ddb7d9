//! OSC message encoding and inbound event parsing
//!
//! Outbound: one address plus one argument per datagram.
//! Inbound: only `/avatar/change` and `/avatar/parameters/*` matter; the
//! argument of a parameter message is ignored, only its address is used.

use crate::error::Result;
use crate::types::{ParameterValue, AVATAR_CHANGE_ADDRESS, AVATAR_PARAMETERS_PREFIX};
use rosc::{OscMessage, OscPacket, OscType};

/// Inbound notification relevant to avatar readiness
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvatarEvent {
    /// The application switched to (or re-announced) an avatar
    Changed { avatar_id: String },
    /// A parameter of the active avatar was reported
    ParameterSeen { name: String },
}

impl AvatarEvent {
    /// Interpret a single OSC message
    ///
    /// Returns `None` for unrelated addresses and for a change message
    /// without a string argument.
    pub fn from_message(msg: &OscMessage) -> Option<Self> {
        if msg.addr == AVATAR_CHANGE_ADDRESS {
            return match msg.args.first() {
                Some(OscType::String(id)) => Some(Self::Changed {
                    avatar_id: id.clone(),
                }),
                other => {
                    log::debug!("OSC: /avatar/change with unexpected argument {:?}", other);
                    None
                }
            };
        }

        let rest = msg
            .addr
            .strip_prefix(AVATAR_PARAMETERS_PREFIX)?
            .strip_prefix('/')?;
        let name = rest.rsplit('/').next().filter(|n| !n.is_empty())?;
        Some(Self::ParameterSeen {
            name: name.to_string(),
        })
    }

    /// Decode a datagram into events, flattening bundles in order
    pub fn decode(datagram: &[u8]) -> Result<Vec<Self>> {
        let (_, packet) = rosc::decoder::decode_udp(datagram)?;
        let mut events = Vec::new();
        let mut pending = vec![packet];
        while let Some(packet) = pending.pop() {
            match packet {
                OscPacket::Message(msg) => events.extend(Self::from_message(&msg)),
                OscPacket::Bundle(bundle) => pending.extend(bundle.content.into_iter().rev()),
            }
        }
        Ok(events)
    }
}

/// Convert a parameter value to its OSC argument
///
/// The application's parameters are 32-bit; integers outside `i32` are
/// sent as 64-bit.
pub fn to_osc_arg(value: &ParameterValue) -> OscType {
    match value {
        ParameterValue::Bool(b) => OscType::Bool(*b),
        ParameterValue::Int(i) => match i32::try_from(*i) {
            Ok(v) => OscType::Int(v),
            Err(_) => OscType::Long(*i),
        },
        ParameterValue::Float(f) => OscType::Float(*f as f32),
        ParameterValue::String(s) => OscType::String(s.clone()),
    }
}

/// Encode a single-argument control message
pub fn encode_message(path: &str, value: &ParameterValue) -> Result<Vec<u8>> {
    let packet = OscPacket::Message(OscMessage {
        addr: path.to_string(),
        args: vec![to_osc_arg(value)],
    });
    Ok(rosc::encoder::encode(&packet)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::OscBundle;

    fn message(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }

    #[test]
    fn test_change_event() {
        let msg = message("/avatar/change", vec![OscType::String("avtr_1".into())]);
        assert_eq!(
            AvatarEvent::from_message(&msg),
            Some(AvatarEvent::Changed {
                avatar_id: "avtr_1".to_string()
            })
        );
        assert_eq!(
            AvatarEvent::from_message(&message("/avatar/change", vec![OscType::Int(1)])),
            None
        );
    }

    #[test]
    fn test_parameter_event_uses_last_segment() {
        let msg = message("/avatar/parameters/FT/v2/EyeX", vec![OscType::Float(0.1)]);
        assert_eq!(
            AvatarEvent::from_message(&msg),
            Some(AvatarEvent::ParameterSeen {
                name: "EyeX".to_string()
            })
        );
        // Argument is irrelevant
        let msg = message("/avatar/parameters/Smile", vec![]);
        assert!(AvatarEvent::from_message(&msg).is_some());
    }

    #[test]
    fn test_unrelated_addresses_ignored() {
        assert_eq!(AvatarEvent::from_message(&message("/tracking/head", vec![])), None);
        assert_eq!(AvatarEvent::from_message(&message("/avatar/parametersX", vec![])), None);
        assert_eq!(AvatarEvent::from_message(&message("/avatar/parameters/", vec![])), None);
    }

    #[test]
    fn test_decode_bundle_in_order() {
        let packet = OscPacket::Bundle(OscBundle {
            timetag: (0, 1).into(),
            content: vec![
                OscPacket::Message(message("/avatar/change", vec![OscType::String("avtr_2".into())])),
                OscPacket::Message(message("/avatar/parameters/A", vec![OscType::Bool(true)])),
                OscPacket::Message(message("/avatar/parameters/B", vec![OscType::Bool(true)])),
            ],
        });
        let bytes = rosc::encoder::encode(&packet).unwrap();
        let events = AvatarEvent::decode(&bytes).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[2],
            AvatarEvent::ParameterSeen {
                name: "B".to_string()
            }
        );
    }

    #[test]
    fn test_encode_message_arguments() {
        assert_eq!(to_osc_arg(&ParameterValue::Int(5)), OscType::Int(5));
        assert_eq!(to_osc_arg(&ParameterValue::Int(1 << 40)), OscType::Long(1 << 40));
        assert_eq!(to_osc_arg(&ParameterValue::Float(0.5)), OscType::Float(0.5));

        let bytes = encode_message("/avatar/parameters/Smile", &ParameterValue::Bool(true)).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&bytes).unwrap();
        match packet {
            OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/avatar/parameters/Smile");
                assert_eq!(msg.args, vec![OscType::Bool(true)]);
            }
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_garbage_is_error() {
        assert!(AvatarEvent::decode(&[0xff, 0x00, 0x01]).is_err());
    }
}
