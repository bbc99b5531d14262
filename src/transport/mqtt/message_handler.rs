//! Pure message routing for MQTT events
//!
//! This module contains pure functions for classifying rumqttc events.

use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::{Packet, SubscribeReasonCode};
use rumqttc::v5::Event;

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.clone(),
                    retain: publish.retain,
                },
                Packet::Disconnect(_) => EventRoute::Disconnected,
                Packet::SubAck(suback) => {
                    let refused: Vec<(usize, String)> = suback
                        .return_codes
                        .iter()
                        .enumerate()
                        .filter(|(_, code)| !matches!(code, SubscribeReasonCode::Success(_)))
                        .map(|(index, code)| (index, format!("{code:?}")))
                        .collect();

                    if refused.is_empty() {
                        EventRoute::SubscriptionConfirmed {
                            packet_id: suback.pkid,
                            return_codes: format!("{:?}", suback.return_codes),
                        }
                    } else {
                        EventRoute::SubscriptionRefused {
                            packet_id: suback.pkid,
                            refused,
                        }
                    }
                }
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Connection acknowledged by the broker
    ConnectionAcknowledged,
    /// Message received on subscribed topic
    MessageReceived {
        topic: String,
        payload: Bytes,
        retain: bool,
    },
    /// MQTT broker disconnected us
    Disconnected,
    /// Subscription confirmed with return codes
    SubscriptionConfirmed { packet_id: u16, return_codes: String },
    /// Broker refused some filters: (filter index, reason code)
    SubscriptionRefused {
        packet_id: u16,
        refused: Vec<(usize, String)>,
    },
    /// Infrastructure event (PingResp, PubAck, ...)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}
