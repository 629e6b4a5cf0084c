//! Full (role, ownership, action) matrix for the access policy.
//!
//! GREEN when:
//! - Staff is allowed every action on every target.
//! - A Customer is allowed owner-scoped actions only on its own targets.
//! - A Customer is never allowed a staff-only action, even on its own order.
//! - Conversation ownership resolves through the parent order's owner.

use cmx_policy::{decide, Action, PolicyReason, Target, Verdict};
use cmx_schemas::{Actor, Role};
use uuid::Uuid;

fn targets_for(owner: Uuid) -> [Target; 3] {
    [
        Target::Order { owner_id: owner },
        Target::Conversation {
            order_owner_id: owner,
        },
        Target::Collection,
    ]
}

#[test]
fn staff_is_allowed_everything() {
    let staff = Actor::new(Uuid::new_v4(), Role::Staff);
    let someone_else = Uuid::new_v4();

    for action in Action::ALL {
        for target in targets_for(someone_else)
            .into_iter()
            .chain(targets_for(staff.id))
        {
            let d = decide(&staff, action, &target);
            assert_eq!(d.verdict, Verdict::Allow, "{action:?} on {target:?}");
            assert_eq!(d.reason, PolicyReason::StaffOverride);
        }
    }
}

#[test]
fn customer_matrix() {
    let customer = Actor::new(Uuid::new_v4(), Role::Customer);
    let stranger = Uuid::new_v4();

    for action in Action::ALL {
        for (owned, owner) in [(true, customer.id), (false, stranger)] {
            for target in targets_for(owner) {
                let d = decide(&customer, action, &target);

                let expected = if action.is_staff_only() {
                    (Verdict::Deny, PolicyReason::StaffOnly)
                } else if matches!(target, Target::Collection) {
                    (Verdict::Allow, PolicyReason::Unscoped)
                } else if owned {
                    (Verdict::Allow, PolicyReason::Owner)
                } else {
                    (Verdict::Deny, PolicyReason::NotOwner)
                };

                assert_eq!(
                    (d.verdict, d.reason),
                    expected,
                    "action={action:?} owned={owned} target={target:?}"
                );
            }
        }
    }
}

#[test]
fn conversation_ownership_resolves_through_order_owner() {
    let customer = Actor::new(Uuid::new_v4(), Role::Customer);

    let own = Target::Conversation {
        order_owner_id: customer.id,
    };
    let foreign = Target::Conversation {
        order_owner_id: Uuid::new_v4(),
    };

    assert!(decide(&customer, Action::PostMessage, &own).is_allowed());
    assert!(decide(&customer, Action::JoinRoom, &own).is_allowed());
    assert!(!decide(&customer, Action::PostMessage, &foreign).is_allowed());
    assert!(!decide(&customer, Action::ReadConversation, &foreign).is_allowed());
}

#[test]
fn denial_text_is_access_denied() {
    let customer = Actor::new(Uuid::new_v4(), Role::Customer);
    let d = decide(
        &customer,
        Action::ReadOrder,
        &Target::Order {
            owner_id: Uuid::new_v4(),
        },
    );
    assert_eq!(d.denial_message(), Some("Access denied"));
}
