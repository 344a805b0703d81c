use netctl_virtchnl::{
    classify, Capabilities, ConfigRxQueues, ConfigTxQueues, CreateVportResponse, EventMessage,
    MailboxMessage, MessageClass, Opcode, VersionInfo, FRAME_HEADER_LEN,
};
use proptest::prelude::*;

fn frame_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        // Pure noise.
        proptest::collection::vec(any::<u8>(), 0..256),
        // A plausible header with a random opcode, then random body bytes. Exercises the
        // length check and the unknown-opcode path far more often than noise does.
        (
            prop_oneof![Just(1u32), Just(17u32), 500u32..=510, any::<u32>()],
            any::<i32>(),
            proptest::collection::vec(any::<u8>(), 0..128),
        )
            .prop_map(|(opcode, retval, payload)| {
                MailboxMessage {
                    opcode,
                    retval,
                    payload,
                }
                .encode()
            }),
    ]
}

proptest! {
    #[test]
    fn payload_decoders_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = VersionInfo::decode(&bytes);
        let _ = Capabilities::decode(&bytes);
        let _ = CreateVportResponse::decode(&bytes);
        let _ = ConfigTxQueues::decode(&bytes);
        let _ = ConfigRxQueues::decode(&bytes);
        let _ = EventMessage::decode(&bytes);
    }

    #[test]
    fn classify_yields_completions_only_for_known_commands(frame in frame_strategy()) {
        match classify(Ok(Some(frame.clone()))) {
            MessageClass::Completion(msg) => {
                prop_assert!(frame.len() >= FRAME_HEADER_LEN);
                let op = msg.op();
                prop_assert!(op.is_ok());
                prop_assert!(op.unwrap().is_command());
            }
            MessageClass::Notification(_) => {
                let msg = MailboxMessage::decode(&frame).unwrap();
                prop_assert_eq!(msg.op(), Ok(Opcode::Event));
            }
            MessageClass::TransportError(_) => {}
            MessageClass::NoMessage => prop_assert!(false, "a delivered frame is never NoMessage"),
        }
    }
}
