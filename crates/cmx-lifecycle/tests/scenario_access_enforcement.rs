//! Access policy as seen through desk operations.
//!
//! GREEN when:
//! - A customer cannot read, post to, or join another customer's entities.
//! - Staff-only operations are Forbidden for customers even on their own
//!   orders, and Forbidden before NotFound for unknown ids.
//! - Unknown ids on owner-scoped reads are NotFound.
//! - Listings are scoped to the owner for customers.

use std::sync::Arc;

use cmx_db::MemStore;
use cmx_lifecycle::{Desk, DeskError};
use cmx_schemas::{Actor, NewOrder, NewUser, OrderStatus, Page, Role};
use serde_json::json;
use uuid::Uuid;

fn order_body(desc: &str) -> NewOrder {
    NewOrder {
        description: desc.to_string(),
        specifications: json!({}),
        quantity: 1,
        metadata: None,
    }
}

fn forbidden<T: std::fmt::Debug>(r: Result<T, DeskError>) -> bool {
    matches!(r, Err(DeskError::Forbidden(_)))
}

fn not_found<T: std::fmt::Debug>(r: Result<T, DeskError>) -> bool {
    matches!(r, Err(DeskError::NotFound(_)))
}

#[tokio::test]
async fn customers_are_confined_to_their_own_orders() -> anyhow::Result<()> {
    let desk = Desk::new(Arc::new(MemStore::new()));
    let alice = Actor::new(Uuid::new_v4(), Role::Customer);
    let bob = Actor::new(Uuid::new_v4(), Role::Customer);
    let staff = Actor::new(Uuid::new_v4(), Role::Staff);

    let a = desk.create_order(&alice, order_body("alice's")).await?;
    let cid = a.conversation.id;

    assert!(forbidden(desk.read_order(&bob, a.order.id).await));
    assert!(forbidden(desk.read_conversation(&bob, cid).await));
    assert!(forbidden(desk.post_message(&bob, cid, "hi").await));
    assert!(forbidden(desk.authorize_join(&bob, cid).await));

    // The denied post left nothing behind.
    assert!(desk.read_conversation(&alice, cid).await?.messages.is_empty());

    // Owner and staff both get through.
    assert!(desk.authorize_join(&alice, cid).await.is_ok());
    assert!(desk.authorize_join(&staff, cid).await.is_ok());
    assert!(desk.read_order(&staff, a.order.id).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn staff_only_operations_refuse_customers() -> anyhow::Result<()> {
    let desk = Desk::new(Arc::new(MemStore::new()));
    let alice = Actor::new(Uuid::new_v4(), Role::Customer);
    let a = desk.create_order(&alice, order_body("mine")).await?;

    assert!(forbidden(
        desk.close_conversation(&alice, a.conversation.id, "done")
            .await
    ));
    assert!(forbidden(
        desk.transition_order(&alice, a.order.id, OrderStatus::Processing)
            .await
    ));
    assert!(forbidden(desk.list_users(&alice).await));

    // Unknown ids: the role gate answers first.
    assert!(forbidden(
        desk.close_conversation(&alice, Uuid::new_v4(), "done")
            .await
    ));
    assert!(forbidden(
        desk.transition_order(&alice, Uuid::new_v4(), OrderStatus::Processing)
            .await
    ));

    // Conversation untouched.
    assert!(
        desk.read_conversation(&alice, a.conversation.id)
            .await?
            .conversation
            .is_open
    );
    Ok(())
}

#[tokio::test]
async fn unknown_ids_are_not_found() -> anyhow::Result<()> {
    let desk = Desk::new(Arc::new(MemStore::new()));
    let alice = Actor::new(Uuid::new_v4(), Role::Customer);
    let staff = Actor::new(Uuid::new_v4(), Role::Staff);
    let missing = Uuid::new_v4();

    assert!(not_found(desk.read_order(&alice, missing).await));
    assert!(not_found(desk.read_conversation(&alice, missing).await));
    assert!(not_found(desk.post_message(&alice, missing, "x").await));
    assert!(not_found(desk.authorize_join(&alice, missing).await));
    assert!(not_found(desk.close_conversation(&staff, missing, "x").await));
    assert!(not_found(
        desk.transition_order(&staff, missing, OrderStatus::Processing)
            .await
    ));
    Ok(())
}

#[tokio::test]
async fn listings_are_scoped_and_paginated() -> anyhow::Result<()> {
    let desk = Desk::new(Arc::new(MemStore::new()));
    let alice = Actor::new(Uuid::new_v4(), Role::Customer);
    let bob = Actor::new(Uuid::new_v4(), Role::Customer);
    let staff = Actor::new(Uuid::new_v4(), Role::Staff);

    for i in 0..3 {
        desk.create_order(&alice, order_body(&format!("a{i}"))).await?;
    }
    desk.create_order(&bob, order_body("b0")).await?;

    let mine = desk.list_orders(&alice, Page::default()).await?;
    assert_eq!(mine.total, 3);
    assert!(mine.data.iter().all(|s| s.order.owner_id == alice.id));
    // Newest first.
    assert_eq!(mine.data[0].order.description, "a2");

    let all = desk.list_orders(&staff, Page::default()).await?;
    assert_eq!(all.total, 4);

    let page = desk
        .list_orders(&staff, Page::clamped(Some(2), Some(3)))
        .await?;
    assert_eq!(page.page, 2);
    assert_eq!(page.limit, 3);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.data.len(), 1);

    // Out-of-range limit falls back to the default.
    let clamped = desk
        .list_orders(&staff, Page::clamped(Some(1), Some(500)))
        .await?;
    assert_eq!(clamped.limit, 10);
    Ok(())
}

#[tokio::test]
async fn duplicate_email_is_a_conflict_and_listing_is_staff_only() -> anyhow::Result<()> {
    let desk = Desk::new(Arc::new(MemStore::new()));
    let user = desk
        .create_user(NewUser {
            email: "Dana@Desk.Test".to_string(),
            role: Role::Customer,
        })
        .await?;
    assert_eq!(user.email, "dana@desk.test");

    let err = desk
        .create_user(NewUser {
            email: "dana@desk.test".to_string(),
            role: Role::Staff,
        })
        .await
        .unwrap_err();
    match err {
        DeskError::Conflict(msg) => assert_eq!(msg, "Email already exists"),
        other => panic!("expected conflict, got {other:?}"),
    }

    let staff = Actor::new(Uuid::new_v4(), Role::Staff);
    let users = desk.list_users(&staff).await?;
    assert_eq!(users.len(), 1);
    assert!(forbidden(desk.list_users(&user.actor()).await));
    Ok(())
}
