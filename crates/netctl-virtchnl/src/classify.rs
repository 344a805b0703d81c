use crate::event::EventMessage;
use crate::frame::MailboxMessage;
use crate::opcode::Opcode;
use crate::transport::TransportError;

/// What a single mailbox event turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageClass {
    /// Nothing was waiting in the mailbox.
    NoMessage,
    /// The mailbox itself failed, or delivered something that is not a usable frame.
    TransportError(String),
    /// Unsolicited firmware notification; not a reply to any command.
    Notification(EventMessage),
    /// Reply to a command. The opcode is known to be a valid command opcode but has not been
    /// matched against the pending command yet.
    Completion(MailboxMessage),
}

/// Classify the result of one [`crate::MailboxTransport::poll`].
///
/// Undecodable frames, unknown opcodes and event frames with a bad payload all classify as
/// [`MessageClass::TransportError`]; nothing here panics.
pub fn classify(event: Result<Option<Vec<u8>>, TransportError>) -> MessageClass {
    let bytes = match event {
        Ok(None) => return MessageClass::NoMessage,
        Ok(Some(bytes)) => bytes,
        Err(err) => return MessageClass::TransportError(err.to_string()),
    };

    let msg = match MailboxMessage::decode(&bytes) {
        Ok(msg) => msg,
        Err(err) => return MessageClass::TransportError(format!("malformed frame: {err}")),
    };

    match msg.op() {
        Ok(Opcode::Event) => match EventMessage::decode(&msg.payload) {
            Ok(event) => MessageClass::Notification(event),
            Err(err) => MessageClass::TransportError(format!("malformed event: {err}")),
        },
        Ok(_) => MessageClass::Completion(msg),
        Err(err) => MessageClass::TransportError(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::status;

    #[test]
    fn empty_poll_is_no_message() {
        assert_eq!(classify(Ok(None)), MessageClass::NoMessage);
    }

    #[test]
    fn poll_failure_is_transport_error() {
        assert!(matches!(
            classify(Err(TransportError::Io("dma fault".into()))),
            MessageClass::TransportError(msg) if msg.contains("dma fault")
        ));
    }

    #[test]
    fn event_frames_are_notifications() {
        let event = EventMessage::link_change(3, true, 25_000);
        let frame = MailboxMessage::completion(Opcode::Event, 0, event.encode()).encode();
        assert_eq!(classify(Ok(Some(frame))), MessageClass::Notification(event));
    }

    #[test]
    fn command_replies_are_completions() {
        let msg = MailboxMessage::completion(Opcode::DestroyVport, status::ERR_PARAM, Vec::new());
        assert_eq!(
            classify(Ok(Some(msg.encode()))),
            MessageClass::Completion(msg)
        );
    }

    #[test]
    fn unknown_opcode_is_not_dispatched() {
        let msg = MailboxMessage {
            opcode: 4242,
            retval: 0,
            payload: Vec::new(),
        };
        assert!(matches!(
            classify(Ok(Some(msg.encode()))),
            MessageClass::TransportError(_)
        ));
    }

    #[test]
    fn garbage_is_transport_error() {
        assert!(matches!(
            classify(Ok(Some(vec![1, 2, 3]))),
            MessageClass::TransportError(_)
        ));
    }
}
