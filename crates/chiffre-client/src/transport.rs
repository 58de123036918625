//! Relay transport handle.
//!
//! The relay itself is an external collaborator; the session only needs an
//! owned pair of channel ends over it.  One [`RelayConn`] is constructed
//! per authenticated login and passed explicitly to the session -- there is
//! no process-global channel shared between unrelated logical sessions.

use tokio::sync::mpsc;

use chiffre_shared::protocol::{ClientFrame, RelayFrame};

/// Owned handle to one bidirectional relay connection.
#[derive(Debug)]
pub struct RelayConn {
    /// Frames the session emits toward the relay.
    pub outbound: mpsc::Sender<ClientFrame>,
    /// Frames the relay pushes to the session.
    pub inbound: mpsc::Receiver<RelayFrame>,
}

/// The relay-facing ends of a [`RelayConn`] pair.
///
/// A real transport task holds these while pumping a socket; tests drive
/// them directly.
#[derive(Debug)]
pub struct RelayEndpoint {
    /// Frames received from the client.
    pub from_client: mpsc::Receiver<ClientFrame>,
    /// Push frames to the client.
    pub to_client: mpsc::Sender<RelayFrame>,
}

impl RelayConn {
    /// Create a connected (client, relay) pair of channel ends.
    pub fn pair(capacity: usize) -> (RelayConn, RelayEndpoint) {
        let (client_tx, relay_rx) = mpsc::channel(capacity);
        let (relay_tx, client_rx) = mpsc::channel(capacity);

        (
            RelayConn {
                outbound: client_tx,
                inbound: client_rx,
            },
            RelayEndpoint {
                from_client: relay_rx,
                to_client: relay_tx,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_is_connected_both_ways() {
        let (mut conn, mut endpoint) = RelayConn::pair(4);

        conn.outbound
            .send(ClientFrame::Join {
                username: "alice".to_string(),
            })
            .await
            .unwrap();
        assert!(matches!(
            endpoint.from_client.recv().await,
            Some(ClientFrame::Join { .. })
        ));

        endpoint
            .to_client
            .send(RelayFrame::UserList(vec!["alice".to_string()]))
            .await
            .unwrap();
        assert!(matches!(
            conn.inbound.recv().await,
            Some(RelayFrame::UserList(_))
        ));
    }
}
