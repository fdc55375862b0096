//! Outbound message routing
//!
//! Every connected socket registers a bounded sender here; the game task
//! pushes frames through it and a per-socket writer task drains them onto
//! the wire. The fan-out policy is fixed per game: snake and flappy frames
//! go only to the session's own socket, pong frames go to every socket in
//! the namespace (players and spectators alike).

use tokio::sync::mpsc;
use tracing::warn;

use crate::game::ConnId;

/// Who receives a published frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOut {
    /// Deliver only to the connection the frame belongs to
    PerSession,
    /// Deliver to every registered connection
    AllSockets,
}

pub struct Outbox<S> {
    policy: FanOut,
    senders: Vec<(ConnId, mpsc::Sender<S>)>,
}

impl<S: Clone> Outbox<S> {
    pub fn new(policy: FanOut) -> Self {
        Self {
            policy,
            senders: Vec::new(),
        }
    }

    pub fn attach(&mut self, conn: ConnId, sender: mpsc::Sender<S>) {
        self.detach(&conn);
        self.senders.push((conn, sender));
    }

    pub fn detach(&mut self, conn: &ConnId) {
        self.senders.retain(|(id, _)| id != conn);
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Send `msg` directly to one connection regardless of policy. Used for
    /// connect-time init frames and terminal notices.
    pub fn unicast(&self, conn: &ConnId, msg: S) {
        if let Some((_, sender)) = self.senders.iter().find(|(id, _)| id == conn) {
            Self::deliver(conn, sender, msg);
        }
    }

    /// Route `msg` according to the fan-out policy. `origin` names the
    /// session the frame was produced for; `AllSockets` ignores it.
    pub fn publish(&self, origin: Option<&ConnId>, msg: S) {
        match self.policy {
            FanOut::PerSession => {
                if let Some(conn) = origin {
                    self.unicast(conn, msg);
                }
            }
            FanOut::AllSockets => {
                for (conn, sender) in &self.senders {
                    Self::deliver(conn, sender, msg.clone());
                }
            }
        }
    }

    fn deliver(conn: &ConnId, sender: &mpsc::Sender<S>, msg: S) {
        // A full queue means the socket writer is not keeping up; drop the
        // frame rather than stall the game tick. The client just sees the
        // next state instead.
        if let Err(mpsc::error::TrySendError::Full(_)) = sender.try_send(msg) {
            warn!(conn = %conn, "outbound queue full, dropping frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn channel() -> (mpsc::Sender<u32>, mpsc::Receiver<u32>) {
        mpsc::channel(4)
    }

    #[test]
    fn test_per_session_routes_to_origin_only() {
        let mut outbox = Outbox::new(FanOut::PerSession);
        let (a, mut rx_a) = channel();
        let (b, mut rx_b) = channel();
        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();
        outbox.attach(conn_a, a);
        outbox.attach(conn_b, b);

        outbox.publish(Some(&conn_a), 1);
        assert_eq!(rx_a.try_recv().ok(), Some(1));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_all_sockets_reaches_everyone() {
        let mut outbox = Outbox::new(FanOut::AllSockets);
        let (a, mut rx_a) = channel();
        let (b, mut rx_b) = channel();
        let conn_a = Uuid::new_v4();
        outbox.attach(conn_a, a);
        outbox.attach(Uuid::new_v4(), b);

        outbox.publish(Some(&conn_a), 9);
        assert_eq!(rx_a.try_recv().ok(), Some(9));
        assert_eq!(rx_b.try_recv().ok(), Some(9));
    }

    #[test]
    fn test_unicast_ignores_policy() {
        let mut outbox = Outbox::new(FanOut::AllSockets);
        let (a, mut rx_a) = channel();
        let (b, mut rx_b) = channel();
        let conn_a = Uuid::new_v4();
        outbox.attach(conn_a, a);
        outbox.attach(Uuid::new_v4(), b);

        outbox.unicast(&conn_a, 3);
        assert_eq!(rx_a.try_recv().ok(), Some(3));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_detach_stops_delivery() {
        let mut outbox = Outbox::new(FanOut::AllSockets);
        let (a, mut rx_a) = channel();
        let conn_a = Uuid::new_v4();
        outbox.attach(conn_a, a);
        outbox.detach(&conn_a);

        outbox.publish(None, 5);
        assert_eq!(outbox.len(), 0);
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_drops_frame_without_blocking() {
        let mut outbox = Outbox::new(FanOut::PerSession);
        let (tx, mut rx) = mpsc::channel(1);
        let conn = Uuid::new_v4();
        outbox.attach(conn, tx);

        outbox.publish(Some(&conn), 1);
        outbox.publish(Some(&conn), 2);
        assert_eq!(rx.try_recv().ok(), Some(1));
        assert!(rx.try_recv().is_err(), "second frame should be dropped");
    }

    #[test]
    fn test_publish_to_unknown_origin_is_silent() {
        let outbox: Outbox<u32> = Outbox::new(FanOut::PerSession);
        outbox.publish(Some(&Uuid::new_v4()), 1);
        outbox.publish(None, 2);
    }
}
