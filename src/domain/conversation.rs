use crate::domain::message::{Message, TimestampFallback};
use crate::domain::profile::ProfileSummary;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// All messages exchanged with one counterpart. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub counterpart_id: Uuid,
    pub counterpart: ProfileSummary,
    /// Newest first.
    pub messages: Vec<Message>,
    pub last_message: Message,
    pub unread_count: usize,
}

/// One conversation opened for reading, oldest message first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadView {
    pub counterpart_id: Uuid,
    pub counterpart: ProfileSummary,
    pub messages: Vec<Message>,
}

/// Per-view lifecycle: loading until the first snapshot, then loaded or failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState<T> {
    Loading,
    Loaded(T),
    Failed(String),
}

/// Groups a flat snapshot into one conversation per counterpart.
///
/// Messages that do not involve `me` are dropped. Conversations are ordered by
/// their newest message, descending; ties keep counterpart-id order.
#[must_use]
pub fn aggregate(
    me: Uuid,
    messages: Vec<Message>,
    profiles: &HashMap<Uuid, ProfileSummary>,
    fallback: TimestampFallback,
) -> Vec<Conversation> {
    let mut buckets: BTreeMap<Uuid, Vec<Message>> = BTreeMap::new();
    for message in messages {
        if let Some(counterpart) = message.participants().counterpart_of(me) {
            buckets.entry(counterpart).or_default().push(message);
        }
    }

    let mut conversations: Vec<Conversation> = buckets
        .into_iter()
        .filter_map(|(counterpart_id, mut messages)| {
            messages.sort_by_key(|m| std::cmp::Reverse(m.timestamp_or(fallback)));
            let unread_count = messages.iter().filter(|m| m.is_unread_for(me)).count();
            let last_message = messages.first()?.clone();
            let counterpart = profiles.get(&counterpart_id).cloned().unwrap_or_else(ProfileSummary::unknown);

            Some(Conversation { counterpart_id, counterpart, messages, last_message, unread_count })
        })
        .collect();

    conversations.sort_by_key(|c| std::cmp::Reverse(c.last_message.timestamp_or(fallback)));
    conversations
}

/// Messages between `me` and `counterpart`, oldest first.
#[must_use]
pub fn thread(me: Uuid, counterpart: Uuid, messages: Vec<Message>, fallback: TimestampFallback) -> Vec<Message> {
    let mut thread: Vec<Message> = messages
        .into_iter()
        .filter(|m| m.participants().counterpart_of(me) == Some(counterpart))
        .collect();
    thread.sort_by_key(|m| m.timestamp_or(fallback));
    thread
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn at(secs: i64) -> Option<OffsetDateTime> {
        Some(OffsetDateTime::from_unix_timestamp(secs).unwrap())
    }

    fn msg(from: Uuid, to: Uuid, created_at: Option<OffsetDateTime>, read: bool) -> Message {
        Message::new(Uuid::new_v4(), from, to, "hi".into(), created_at, read).unwrap()
    }

    #[test]
    fn test_single_exchange() {
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let first = msg(u1, u2, at(1), false);
        let reply = msg(u2, u1, at(2), false);

        let conversations = aggregate(u1, vec![first, reply.clone()], &HashMap::new(), TimestampFallback::Epoch);

        assert_eq!(conversations.len(), 1);
        let conv = &conversations[0];
        assert_eq!(conv.counterpart_id, u2);
        assert_eq!(conv.unread_count, 1);
        assert_eq!(conv.last_message, reply);
        assert_eq!(conv.counterpart, ProfileSummary::unknown());
    }

    #[test]
    fn test_every_message_lands_in_exactly_one_bucket() {
        let me = Uuid::new_v4();
        let others: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let mut messages = Vec::new();
        for (i, other) in others.iter().enumerate() {
            for j in 0..=i {
                let secs = i64::try_from(i * 10 + j).unwrap();
                messages.push(msg(me, *other, at(secs), false));
                messages.push(msg(*other, me, at(secs), j % 2 == 0));
            }
        }
        let stranger = msg(Uuid::new_v4(), Uuid::new_v4(), at(5), false);
        let total = messages.len();
        messages.push(stranger);

        let conversations = aggregate(me, messages, &HashMap::new(), TimestampFallback::Epoch);

        assert_eq!(conversations.len(), others.len());
        assert_eq!(conversations.iter().map(|c| c.messages.len()).sum::<usize>(), total);
        for conv in &conversations {
            assert!(conv.messages.iter().all(|m| m.participants().counterpart_of(me) == Some(conv.counterpart_id)));
        }
    }

    #[test]
    fn test_unread_counts_only_received_messages() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let messages = vec![
            msg(me, other, at(1), false),
            msg(me, other, at(2), false),
            msg(other, me, at(3), false),
            msg(other, me, at(4), true),
        ];

        let conversations = aggregate(me, messages, &HashMap::new(), TimestampFallback::Epoch);
        assert_eq!(conversations[0].unread_count, 1);
    }

    #[test]
    fn test_sending_does_not_change_unread_count() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let mut messages = vec![msg(other, me, at(1), false)];
        let before = aggregate(me, messages.clone(), &HashMap::new(), TimestampFallback::Epoch)[0].unread_count;

        messages.push(msg(me, other, at(2), false));
        let after_me = aggregate(me, messages.clone(), &HashMap::new(), TimestampFallback::Epoch)[0].unread_count;
        assert_eq!(before, after_me);

        // From the other side the new message is unread.
        let theirs = aggregate(other, messages, &HashMap::new(), TimestampFallback::Epoch)[0].unread_count;
        assert_eq!(theirs, 1);
    }

    #[test]
    fn test_list_is_ordered_by_last_message_descending() {
        let me = Uuid::new_v4();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let messages = vec![
            msg(me, a, at(10), false),
            msg(b, me, at(30), false),
            msg(me, c, at(20), false),
            msg(a, me, at(5), false),
        ];

        let conversations = aggregate(me, messages, &HashMap::new(), TimestampFallback::Epoch);
        let order: Vec<Uuid> = conversations.iter().map(|c| c.counterpart_id).collect();
        assert_eq!(order, vec![b, c, a]);

        let stamps: Vec<_> =
            conversations.iter().map(|c| c.last_message.timestamp_or(TimestampFallback::Epoch)).collect();
        assert!(stamps.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_ties_are_stable() {
        let me = Uuid::new_v4();
        let mut others: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        let messages: Vec<Message> = others.iter().map(|o| msg(*o, me, at(7), false)).collect();

        let first = aggregate(me, messages.clone(), &HashMap::new(), TimestampFallback::Epoch);
        let mut reversed = messages;
        reversed.reverse();
        let second = aggregate(me, reversed, &HashMap::new(), TimestampFallback::Epoch);

        let ids = |cs: &[Conversation]| cs.iter().map(|c| c.counterpart_id).collect::<Vec<_>>();
        others.sort();
        assert_eq!(ids(&first), others);
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_pending_timestamp_sorts_as_newest_with_now_fallback() {
        let me = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let messages = vec![msg(me, a, None, false), msg(b, me, at(100), false)];

        let conversations = aggregate(me, messages.clone(), &HashMap::new(), TimestampFallback::now());
        assert_eq!(conversations[0].counterpart_id, a);

        let conversations = aggregate(me, messages, &HashMap::new(), TimestampFallback::Epoch);
        assert_eq!(conversations[0].counterpart_id, b);
    }

    #[test]
    fn test_profiles_are_attached() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let profiles = HashMap::from([(other, ProfileSummary { name: "Sam".into(), photo_url: None })]);

        let conversations = aggregate(me, vec![msg(other, me, at(1), false)], &profiles, TimestampFallback::Epoch);
        assert_eq!(conversations[0].counterpart.name, "Sam");
    }

    #[test]
    fn test_thread_is_ascending_and_filtered() {
        let (me, other, third) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let messages = vec![
            msg(other, me, at(3), false),
            msg(me, other, at(1), false),
            msg(me, third, at(2), false),
            msg(other, me, at(2), false),
        ];

        let thread = thread(me, other, messages, TimestampFallback::Epoch);
        let stamps: Vec<i64> = thread.iter().map(|m| m.created_at().unwrap().unix_timestamp()).collect();
        assert_eq!(stamps, vec![1, 2, 3]);
    }
}
