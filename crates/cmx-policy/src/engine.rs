use cmx_schemas::{Actor, Role};

use crate::{Action, OrderScope, PolicyDecision, PolicyReason, Target};

/// Decide whether `actor` may perform `action` on `target`.
pub fn decide(actor: &Actor, action: Action, target: &Target) -> PolicyDecision {
    if actor.role == Role::Staff {
        return PolicyDecision::allow(PolicyReason::StaffOverride);
    }

    if action.is_staff_only() {
        return PolicyDecision::deny(PolicyReason::StaffOnly);
    }

    match target.owner_id() {
        Some(owner) if owner == actor.id => PolicyDecision::allow(PolicyReason::Owner),
        Some(_) => PolicyDecision::deny(PolicyReason::NotOwner),
        None => PolicyDecision::allow(PolicyReason::Unscoped),
    }
}

/// Which orders a listing may return for `actor`.
pub fn list_scope(actor: &Actor) -> OrderScope {
    match actor.role {
        Role::Staff => OrderScope::All,
        Role::Customer => OrderScope::OwnedBy(actor.id),
    }
}
