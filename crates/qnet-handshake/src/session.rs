//! Handshake sessions and their drivers
//!
//! A [`HandshakeSession`] is single-use. [`HandshakeSession::run`] drives it
//! from `INIT` to `COMPLETE` over a [`ChannelEndpoint`], or to `FAILED` on the
//! first timeout or malformed frame. Either way the session keeps no key
//! material afterwards: the secret is handed to the caller and everything
//! else is dropped.

use std::marker::PhantomData;
use std::time::Duration;

use qnet_core::{ChannelEndpoint, ChannelError, MessageKind, NodeId};
use qnet_crypto::{Kem, Kyber768, SharedSecret};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::{HandshakeError, HandshakeResult};
use crate::frame::{HandshakeFrame, SessionId};
use crate::state::{HandshakeState, Role};

/// Handshake timing parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Bounded wait for each expected frame
    pub wait: Duration,
    /// Request an ack for every frame sent
    pub await_ack: bool,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(10),
            await_ack: false,
        }
    }
}

impl HandshakeConfig {
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_await_ack(mut self, await_ack: bool) -> Self {
        self.await_ack = await_ack;
        self
    }
}

/// One side of a two-party KEM exchange
pub struct HandshakeSession<K: Kem = Kyber768> {
    role: Role,
    peer: NodeId,
    state: HandshakeState,
    session_id: Option<SessionId>,
    keypair: Option<K::KeyPair>,
    peer_public_key: Option<Vec<u8>>,
    ciphertext: Option<Vec<u8>>,
    failure: Option<String>,
    _kem: PhantomData<K>,
}

impl<K: Kem> HandshakeSession<K> {
    pub fn new(role: Role, peer: NodeId) -> Self {
        Self {
            role,
            peer,
            state: HandshakeState::Init,
            session_id: None,
            keypair: None,
            peer_public_key: None,
            ciphertext: None,
            failure: None,
            _kem: PhantomData,
        }
    }

    pub fn initiator(peer: NodeId) -> Self {
        Self::new(Role::Initiator, peer)
    }

    pub fn responder(peer: NodeId) -> Self {
        Self::new(Role::Responder, peer)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer(&self) -> &NodeId {
        &self.peer
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Id chosen by the responder, once known
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    /// Description of the error that failed the session
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Whether the session still holds any key material
    pub fn holds_key_material(&self) -> bool {
        self.keypair.is_some() || self.peer_public_key.is_some() || self.ciphertext.is_some()
    }

    /// Move to `to`, refusing anything the role's progression does not allow
    pub fn transition_to(&mut self, to: HandshakeState) -> HandshakeResult<()> {
        if !self.state.can_transition(self.role, to) {
            return Err(HandshakeError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        debug!(role = %self.role, peer = %self.peer, from = %self.state, %to, "Handshake transition");
        self.state = to;
        Ok(())
    }

    /// Run the exchange to completion
    ///
    /// Returns the shared secret on `COMPLETE`. Any error leaves the session
    /// in `FAILED`; a new session is needed to retry.
    #[instrument(
        skip(self, endpoint, config),
        fields(role = %self.role, local = %endpoint.local_id(), peer = %self.peer)
    )]
    pub async fn run(
        &mut self,
        endpoint: &ChannelEndpoint,
        config: &HandshakeConfig,
    ) -> HandshakeResult<SharedSecret> {
        if self.state != HandshakeState::Init {
            let to = match self.role {
                Role::Initiator => HandshakeState::AwaitingPk,
                Role::Responder => HandshakeState::KeygenSent,
            };
            return Err(HandshakeError::InvalidTransition {
                from: self.state,
                to,
            });
        }

        let result = match self.role {
            Role::Initiator => self.drive_initiator(endpoint, config).await,
            Role::Responder => self.drive_responder(endpoint, config).await,
        };
        self.clear_key_material();

        match result {
            Ok(secret) => {
                info!(kem = K::NAME, secret_len = secret.len(), "Handshake complete");
                Ok(secret)
            }
            Err(e) => {
                if !self.state.is_terminal() {
                    self.state = HandshakeState::Failed;
                }
                self.failure = Some(e.to_string());
                warn!(error = %e, "Handshake failed");
                Err(e)
            }
        }
    }

    async fn drive_responder(
        &mut self,
        endpoint: &ChannelEndpoint,
        config: &HandshakeConfig,
    ) -> HandshakeResult<SharedSecret> {
        let keypair = K::generate();
        let session = SessionId::generate();
        self.session_id = Some(session);

        let frame = HandshakeFrame::PublicKey {
            session,
            key: K::public_key_bytes(&keypair),
        };
        self.keypair = Some(keypair);
        send_frame(endpoint, &self.peer, &frame, config).await?;
        self.transition_to(HandshakeState::KeygenSent)?;
        self.transition_to(HandshakeState::AwaitingCt)?;

        let ciphertext = receive_frame(
            endpoint,
            &self.peer,
            config.wait,
            "ciphertext",
            HandshakeError::MalformedCiphertext,
            |frame| match frame {
                HandshakeFrame::Ciphertext {
                    session: s,
                    ciphertext,
                } if s == session => Some(ciphertext),
                _ => None,
            },
        )
        .await?;

        if ciphertext.is_empty() {
            return Err(HandshakeError::MalformedCiphertext("empty ciphertext".into()));
        }

        let keypair = self.keypair.take().ok_or(HandshakeError::InvalidTransition {
            from: self.state,
            to: HandshakeState::SecretDerived,
        })?;
        let secret = K::decapsulate(&keypair, &ciphertext)
            .map_err(|e| HandshakeError::MalformedCiphertext(e.to_string()))?;
        self.ciphertext = Some(ciphertext);

        self.transition_to(HandshakeState::SecretDerived)?;
        self.transition_to(HandshakeState::Complete)?;
        Ok(secret)
    }

    async fn drive_initiator(
        &mut self,
        endpoint: &ChannelEndpoint,
        config: &HandshakeConfig,
    ) -> HandshakeResult<SharedSecret> {
        // Anything already queued from the peer predates this session
        let stale = discard_pending(endpoint, &self.peer).await;
        if stale > 0 {
            debug!(stale, "Discarded frames queued before the session opened");
        }
        self.transition_to(HandshakeState::AwaitingPk)?;

        let (session, key) = receive_frame(
            endpoint,
            &self.peer,
            config.wait,
            "public key",
            HandshakeError::MalformedKeyMaterial,
            |frame| match frame {
                HandshakeFrame::PublicKey { session, key } => Some((session, key)),
                _ => None,
            },
        )
        .await?;

        if key.is_empty() {
            return Err(HandshakeError::MalformedKeyMaterial("empty public key".into()));
        }
        self.session_id = Some(session);

        let (ciphertext, secret) = K::encapsulate(&key)
            .map_err(|e| HandshakeError::MalformedKeyMaterial(e.to_string()))?;
        self.peer_public_key = Some(key);

        let frame = HandshakeFrame::Ciphertext {
            session,
            ciphertext,
        };
        send_frame(endpoint, &self.peer, &frame, config).await?;

        self.transition_to(HandshakeState::CiphertextSent)?;
        self.transition_to(HandshakeState::SecretDerived)?;
        self.transition_to(HandshakeState::Complete)?;
        Ok(secret)
    }

    fn clear_key_material(&mut self) {
        self.keypair = None;
        self.peer_public_key = None;
        self.ciphertext = None;
    }
}

impl<K: Kem> std::fmt::Debug for HandshakeSession<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeSession")
            .field("role", &self.role)
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Run a Kyber768 handshake with `peer` in the given role
///
/// The initiator only accepts a public key that arrives after it starts, so
/// start it no later than the responder (polling it first in a `join!` is
/// enough). A responder that sends earlier leaves the initiator timing out.
pub async fn run_handshake(
    endpoint: &ChannelEndpoint,
    role: Role,
    peer: &NodeId,
    config: &HandshakeConfig,
) -> HandshakeResult<SharedSecret> {
    HandshakeSession::<Kyber768>::new(role, peer.clone())
        .run(endpoint, config)
        .await
}

async fn send_frame(
    endpoint: &ChannelEndpoint,
    peer: &NodeId,
    frame: &HandshakeFrame,
    config: &HandshakeConfig,
) -> HandshakeResult<()> {
    let bytes = frame
        .to_bytes()
        .map_err(|e| ChannelError::Codec(e.to_string()))?;
    let receipt = endpoint
        .send(peer, bytes, MessageKind::Data, config.await_ack)
        .await?;
    if config.await_ack && !receipt.ack_received {
        warn!(%peer, msg_id = %receipt.id, "Handshake frame not acknowledged");
    }
    Ok(())
}

/// Drop every classical message already queued from `peer`
///
/// Completes without suspending.
async fn discard_pending(endpoint: &ChannelEndpoint, peer: &NodeId) -> usize {
    let mut discarded = 0;
    while endpoint.receive(peer, None).await.is_some() {
        discarded += 1;
    }
    discarded
}

/// Wait for the first frame `accept` takes, ignoring stale or unrelated ones
///
/// Undecodable payloads fail with `malformed`.
async fn receive_frame<T>(
    endpoint: &ChannelEndpoint,
    peer: &NodeId,
    wait: Duration,
    expecting: &'static str,
    malformed: fn(String) -> HandshakeError,
    mut accept: impl FnMut(HandshakeFrame) -> Option<T>,
) -> HandshakeResult<T> {
    let deadline = Instant::now() + wait;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let Some(msg) = endpoint.receive(peer, Some(remaining)).await else {
            if endpoint.is_shut_down() {
                return Err(HandshakeError::Cancelled);
            }
            return Err(HandshakeError::ReceiveTimeout {
                peer: peer.clone(),
                expecting,
                waited: wait,
            });
        };

        let frame = HandshakeFrame::from_bytes(&msg.payload)
            .map_err(|e| malformed(format!("undecodable {expecting} frame: {e}")))?;
        let session = frame.session();
        match accept(frame) {
            Some(value) => return Ok(value),
            None => debug!(%peer, %session, "Ignoring unexpected handshake frame"),
        }
    }
}
