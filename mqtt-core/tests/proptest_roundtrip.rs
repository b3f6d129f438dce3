//! Property-based checks for the packet codec and the topic tree.

use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;

use mqtt_core::codec::{ConnectPacket, Encode, MqttPacket, PublishPacket};
use mqtt_core::id::IdGenerator;
use mqtt_core::qos::QosLevel;
use mqtt_core::topic::tree::TopicTree;
use mqtt_core::topic::{TopicFilter, TopicName};

fn encode_decode_connect(packet: ConnectPacket) -> ConnectPacket {
    let encoded = packet.encode().unwrap();
    let mut buf = BytesMut::from(&encoded[..]);
    match MqttPacket::try_decode_from(&mut buf).unwrap().unwrap() {
        MqttPacket::Connect(decoded) => decoded,
        other => panic!("expected Connect, got {other:?}"),
    }
}

fn encode_decode_publish(packet: PublishPacket) -> PublishPacket {
    let encoded = packet.encode().unwrap();
    let mut buf = BytesMut::from(&encoded[..]);
    match MqttPacket::try_decode_from(&mut buf).unwrap().unwrap() {
        MqttPacket::Publish(decoded) => decoded,
        other => panic!("expected Publish, got {other:?}"),
    }
}

fn arb_qos() -> impl Strategy<Value = QosLevel> {
    prop_oneof![
        Just(QosLevel::AtMostOnce),
        Just(QosLevel::AtLeastOnce),
        Just(QosLevel::ExactlyOnce),
    ]
}

fn arb_segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9]{1,8}"
}

fn arb_topic_name() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_segment(), 1..5).prop_map(|segments| segments.join("/"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// decode(encode(p)) == p for CONNECT.
    #[test]
    fn connect_round_trip(
        client_id in "[a-zA-Z0-9]{0,23}",
        clean_session in any::<bool>(),
        keep_alive in 0u16..=65535u16,
    ) {
        let packet = ConnectPacket::new(client_id, clean_session, keep_alive);
        let decoded = encode_decode_connect(packet.clone());
        prop_assert_eq!(packet, decoded);
    }

    /// decode(encode(p)) == p for PUBLISH, across QoS levels and payload sizes.
    #[test]
    fn publish_round_trip(
        topic in arb_topic_name(),
        qos in arb_qos(),
        retain in any::<bool>(),
        payload in prop::collection::vec(any::<u8>(), 0..256),
        packet_id in 1u16..=65535u16,
    ) {
        let topic = TopicName::from_str(&topic).unwrap();
        let mut packet = PublishPacket::new(topic, qos, Bytes::from(payload)).with_retain(retain);
        if qos != QosLevel::AtMostOnce {
            packet = packet.with_packet_id(packet_id);
        }
        let decoded = encode_decode_publish(packet.clone());
        prop_assert_eq!(packet, decoded);
    }

    /// A filter with no wildcards matches a topic iff the two strings are equal.
    #[test]
    fn exact_filter_matches_iff_equal(
        filter_str in arb_topic_name(),
        topic_str in arb_topic_name(),
    ) {
        let mut tree = TopicTree::new();
        let matched = Arc::new(Mutex::new(false));
        let handle = matched.clone();

        tree.insert(
            &TopicFilter::from_str(&filter_str).unwrap(),
            QosLevel::AtMostOnce,
            Box::new(move |_topic, _payload| *handle.lock().unwrap() = true),
            None,
        )
        .unwrap();

        tree.publish(&TopicName::from_str(&topic_str).unwrap(), b"");
        prop_assert_eq!(*matched.lock().unwrap(), filter_str == topic_str);
    }

    /// Matching a topic against a fixed set of filters is independent of the
    /// order those filters were inserted in.
    #[test]
    fn matching_is_independent_of_insertion_order(
        mut filters in prop::collection::hash_set("[a-zA-Z0-9+#]{1,6}(/[a-zA-Z0-9+#]{1,6}){0,3}", 1..6),
        topic_str in arb_topic_name(),
    ) {
        let filters: Vec<String> = filters.drain().collect();
        let topic = TopicName::from_str(&topic_str).unwrap();

        let matches_for = |order: &[String]| -> Vec<String> {
            let mut tree = TopicTree::new();
            let hits = Arc::new(Mutex::new(Vec::new()));
            for f in order {
                let Ok(parsed) = TopicFilter::from_str(f) else { continue };
                let handle = hits.clone();
                let label = f.clone();
                let _ = tree.insert(
                    &parsed,
                    QosLevel::AtMostOnce,
                    Box::new(move |_topic, _payload| handle.lock().unwrap().push(label.clone())),
                    None,
                );
            }
            tree.publish(&topic, b"");
            let mut got = hits.lock().unwrap().clone();
            got.sort();
            got
        };

        let forward = matches_for(&filters);
        let mut reversed = filters.clone();
        reversed.reverse();
        let backward = matches_for(&reversed);

        prop_assert_eq!(forward, backward);
    }

    /// Freshly allocated packet IDs never collide with IDs already recorded
    /// as in-use.
    #[test]
    fn allocated_ids_are_disjoint_from_in_use_set(
        in_use in prop::collection::hash_set(1u16..=2000u16, 0..500),
    ) {
        let mut gen = IdGenerator::new();
        if let Some(id) = gen.next_id(|candidate| in_use.contains(&candidate)) {
            prop_assert!(!in_use.contains(&id));
            prop_assert_ne!(id, 0);
        }
    }
}
