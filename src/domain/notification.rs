use uuid::Uuid;

/// Signal that a user's message set changed. Carries no data; listeners re-query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChangeEvent {
    MessagesChanged = 1,
}

impl TryFrom<u8> for ChangeEvent {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::MessagesChanged),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChangeNotification {
    pub user_id: Uuid,
    pub event: ChangeEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_byte_roundtrip() {
        assert_eq!(ChangeEvent::try_from(ChangeEvent::MessagesChanged as u8), Ok(ChangeEvent::MessagesChanged));
        assert!(ChangeEvent::try_from(0).is_err());
        assert!(ChangeEvent::try_from(2).is_err());
    }
}
