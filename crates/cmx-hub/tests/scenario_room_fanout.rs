//! Room membership and fan-out.
//!
//! GREEN when:
//! - join then broadcast delivers exactly once; after leave, nothing more.
//! - on_disconnect clears every membership and is idempotent.
//! - One dead or saturated member does not stop delivery to the others.
//! - shutdown sends a final Shutdown frame and refuses new registrations.

use std::time::Duration;

use chrono::Utc;
use cmx_auth::IdentityContext;
use cmx_hub::{HubClosed, RealtimeHub, ServerFrame};
use cmx_schemas::{Actor, Message, Role};
use tokio::sync::mpsc::error::TryRecvError;
use uuid::Uuid;

fn identity(role: Role) -> IdentityContext {
    IdentityContext {
        actor: Actor::new(Uuid::new_v4(), role),
        expires_at: i64::MAX,
    }
}

fn message(room: Uuid, content: &str) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation_id: room,
        author_id: Uuid::new_v4(),
        content: content.to_string(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn join_broadcast_leave() {
    let hub = RealtimeHub::new(8);
    let room = Uuid::new_v4();
    let (a, mut rx_a) = hub.register(identity(Role::Customer)).await.unwrap();

    assert!(hub.join(a, room).await);
    // Joining twice does not duplicate delivery.
    assert!(hub.join(a, room).await);
    assert_eq!(hub.room_members(room).await, vec![a]);

    let m = message(room, "hello");
    let report = hub.broadcast_message(&m).await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(
        rx_a.recv().await,
        Some(ServerFrame::Message { message: m })
    );
    assert!(matches!(rx_a.try_recv(), Err(TryRecvError::Empty)));

    hub.leave(a, room).await;
    assert!(hub.room_members(room).await.is_empty());
    let report = hub.broadcast_message(&message(room, "after leave")).await;
    assert_eq!(report.delivered, 0);
    assert!(matches!(rx_a.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn broadcast_is_scoped_to_the_room() {
    let hub = RealtimeHub::new(8);
    let room_1 = Uuid::new_v4();
    let room_2 = Uuid::new_v4();
    let (a, mut rx_a) = hub.register(identity(Role::Customer)).await.unwrap();
    let (b, mut rx_b) = hub.register(identity(Role::Staff)).await.unwrap();
    hub.join(a, room_1).await;
    hub.join(b, room_2).await;

    hub.broadcast_message(&message(room_1, "only a")).await;
    assert!(rx_a.try_recv().is_ok());
    assert!(matches!(rx_b.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn disconnect_clears_memberships_idempotently() {
    let hub = RealtimeHub::new(8);
    let rooms = [Uuid::new_v4(), Uuid::new_v4()];
    let (a, _rx_a) = hub.register(identity(Role::Staff)).await.unwrap();
    let (b, _rx_b) = hub.register(identity(Role::Staff)).await.unwrap();
    for r in rooms {
        hub.join(a, r).await;
        hub.join(b, r).await;
    }

    assert!(hub.on_disconnect(a).await);
    assert!(!hub.on_disconnect(a).await);
    assert_eq!(hub.connection_count().await, 1);
    for r in rooms {
        assert_eq!(hub.room_members(r).await, vec![b]);
    }
    // A disconnected id cannot rejoin.
    assert!(!hub.join(a, rooms[0]).await);
}

#[tokio::test]
async fn failed_delivery_does_not_abort_broadcast() {
    let hub = RealtimeHub::new(1);
    let room = Uuid::new_v4();
    let (dead, rx_dead) = hub.register(identity(Role::Customer)).await.unwrap();
    let (full, _rx_full) = hub.register(identity(Role::Customer)).await.unwrap();
    let (live, mut rx_live) = hub.register(identity(Role::Staff)).await.unwrap();
    for id in [dead, full, live] {
        hub.join(id, room).await;
    }

    // `dead` drops its receiver; `full` never drains its single slot.
    drop(rx_dead);
    let first = hub.broadcast_message(&message(room, "fills")).await;
    assert_eq!(first.delivered, 2);
    assert_eq!(first.failed, 1);
    assert!(rx_live.recv().await.is_some());

    let m = message(room, "second");
    let second = hub.broadcast_message(&m).await;
    assert_eq!(second.delivered, 1);
    assert_eq!(second.failed, 2);
    assert_eq!(
        rx_live.recv().await,
        Some(ServerFrame::Message { message: m })
    );
}

#[tokio::test]
async fn shutdown_notifies_and_closes() {
    let hub = RealtimeHub::new(4);
    let room = Uuid::new_v4();
    let (a, mut rx_a) = hub.register(identity(Role::Customer)).await.unwrap();
    hub.join(a, room).await;

    hub.shutdown().await;
    assert_eq!(rx_a.recv().await, Some(ServerFrame::Shutdown));
    // Sender dropped: the stream ends.
    let end = tokio::time::timeout(Duration::from_secs(1), rx_a.recv())
        .await
        .expect("receiver should close after shutdown");
    assert_eq!(end, None);

    assert_eq!(hub.connection_count().await, 0);
    assert!(hub.room_members(room).await.is_empty());
    assert!(matches!(
        hub.register(identity(Role::Staff)).await,
        Err(HubClosed)
    ));
}
