use uuid::Uuid;

/// Everything an actor can ask to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    CreateOrder,
    ListOrders,
    ReadOrder,
    TransitionOrder,
    ReadConversation,
    PostMessage,
    CloseConversation,
    /// Subscribe a realtime connection to a conversation room.
    JoinRoom,
    ListUsers,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::CreateOrder,
        Action::ListOrders,
        Action::ReadOrder,
        Action::TransitionOrder,
        Action::ReadConversation,
        Action::PostMessage,
        Action::CloseConversation,
        Action::JoinRoom,
        Action::ListUsers,
    ];

    pub fn is_staff_only(&self) -> bool {
        matches!(
            self,
            Action::TransitionOrder | Action::CloseConversation | Action::ListUsers
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateOrder => "create_order",
            Action::ListOrders => "list_orders",
            Action::ReadOrder => "read_order",
            Action::TransitionOrder => "transition_order",
            Action::ReadConversation => "read_conversation",
            Action::PostMessage => "post_message",
            Action::CloseConversation => "close_conversation",
            Action::JoinRoom => "join_room",
            Action::ListUsers => "list_users",
        }
    }
}

/// The entity an action applies to, with ownership already resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Order { owner_id: Uuid },
    /// Ownership is that of the parent order.
    Conversation { order_owner_id: Uuid },
    /// No single owner: new orders, the order list, the user directory.
    Collection,
}

impl Target {
    pub fn owner_id(&self) -> Option<Uuid> {
        match self {
            Target::Order { owner_id } => Some(*owner_id),
            Target::Conversation { order_owner_id } => Some(*order_owner_id),
            Target::Collection => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyReason {
    /// Staff bypasses ownership.
    StaffOverride,
    Owner,
    /// Collection-level action open to any authenticated actor.
    Unscoped,
    NotOwner,
    StaffOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PolicyDecision {
    pub verdict: Verdict,
    pub reason: PolicyReason,
}

impl PolicyDecision {
    pub(crate) fn allow(reason: PolicyReason) -> Self {
        Self {
            verdict: Verdict::Allow,
            reason,
        }
    }

    pub(crate) fn deny(reason: PolicyReason) -> Self {
        Self {
            verdict: Verdict::Deny,
            reason,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allow
    }

    /// Human-readable denial text. `None` when allowed.
    pub fn denial_message(&self) -> Option<&'static str> {
        match (self.verdict, self.reason) {
            (Verdict::Allow, _) => None,
            (Verdict::Deny, PolicyReason::StaffOnly) => Some("Only staff may perform this action"),
            (Verdict::Deny, _) => Some("Access denied"),
        }
    }
}

/// Row filter for order listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderScope {
    All,
    OwnedBy(Uuid),
}
