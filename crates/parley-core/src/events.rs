/// Events pushed to the embedding UI layer over an unbounded channel.
///
/// The session never surfaces raw backend errors; every failure is folded
/// into one of these variants or into per-message delivery state.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The merged message sequence changed. When `preserve_scroll` is true
    /// the consumer was scrolled away from the newest message and should
    /// restore its offset after re-rendering instead of jumping to newest.
    MessagesChanged { preserve_scroll: bool },
    /// `messages_loading` transitioned.
    LoadingChanged { loading: bool },
    /// A durable write for the given message failed; the message is now
    /// marked failed and can be retried.
    SendFailed { message_id: String },
    /// The realtime subscription reported a fatal error (permission revoked,
    /// conversation deleted). The consumer should navigate away.
    ConversationGone { conversation_id: String },
}
