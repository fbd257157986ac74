//! `ExchangeStateMachine` — the nine-stage handshake.
//!
//! Directly grounded on `layer-mtproto/authentication.rs`'s sans-IO
//! `step1()/step2()/step3()/finish()` state-passing style: the machine never
//! touches a socket, it only turns "my current stage, what I already know"
//! into outbound bytes, and "a stage tag plus inbound bytes" into updated
//! state. The driver (`dtm-client`) is responsible for framing, writing,
//! reading, and the pre-send delays; this module only knows the nine stages
//! themselves, generalized from MTProto's fixed four-step Diffie-Hellman
//! exchange to the named stages below.

use dtm_crypto::cipher::{CipherCtx, IV_SIZE, KEY_SIZE};
use dtm_crypto::kdf::KdfDigest;
use dtm_crypto::kem::{KemPublicKey, KemSecretKey};
use dtm_crypto::{adapter, rng};

use crate::callbacks::Callbacks;
use crate::error::{ErrorKind, SessionError};
use crate::header::ExchangeFlag;
use crate::identity::DtmIdentity;
use crate::params::{DtmSession, ParameterSet};
use crate::wrapper::{unwrap, wrap};

/// Which end of the connection a session plays.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// Passive accepter.
    Server,
    /// Active connector.
    Client,
}

type SymKey = [u8; KEY_SIZE];
type SymIv = [u8; IV_SIZE];

fn split_key_iv(bytes: &[u8]) -> Option<(SymKey, SymIv)> {
    if bytes.len() != KEY_SIZE + IV_SIZE {
        return None;
    }
    let mut key = [0u8; KEY_SIZE];
    let mut iv = [0u8; IV_SIZE];
    key.copy_from_slice(&bytes[..KEY_SIZE]);
    iv.copy_from_slice(&bytes[KEY_SIZE..]);
    Some((key, iv))
}

fn join_key_iv(key: &SymKey, iv: &SymIv) -> Vec<u8> {
    let mut out = Vec::with_capacity(KEY_SIZE + IV_SIZE);
    out.extend_from_slice(key);
    out.extend_from_slice(iv);
    out
}

fn handshake_err(stage: ExchangeFlag, what: &str) -> SessionError {
    log::warn!("handshake failed at {stage:?}: {what}");
    SessionError::critical(ErrorKind::Handshake(format!("{stage:?}: {what}")))
}

/// Drives one side of the nine-stage handshake to completion.
///
/// Call [`build_outbound`](Self::build_outbound) then
/// [`accept_inbound`](Self::accept_inbound) once per stage, in
/// [`ExchangeFlag::ORDER`] order; after the `Established` stage is accepted,
/// [`take_ciphers`](Self::take_ciphers) yields the post-handshake
/// `send_cipher`/`recv_cipher` pair.
pub struct ExchangeStateMachine {
    role: Role,
    params: ParameterSet,
    local_public_id: Vec<u8>,
    local_secret_id: Vec<u8>,
    stage: ExchangeFlag,
    finished: bool,

    peer_public_id: Option<Vec<u8>>,
    peer_secret_id: Option<Vec<u8>>,
    peer_auth_pke_id: Option<crate::params::ParameterOid>,
    peer_primary_pke_id: Option<crate::params::ParameterOid>,

    auth_keypair: Option<(KemPublicKey, KemSecretKey)>,
    primary_keypair: Option<(KemPublicKey, KemSecretKey)>,
    peer_auth_pubkey: Option<KemPublicKey>,
    peer_primary_pubkey: Option<KemPublicKey>,

    local_auth_sym: Option<(SymKey, SymIv)>,
    peer_auth_sym: Option<(SymKey, SymIv)>,
    local_primary_sym: Option<(SymKey, SymIv)>,
    peer_primary_sym: Option<(SymKey, SymIv)>,

    auth_send_cipher: Option<CipherCtx>,
    auth_recv_cipher: Option<CipherCtx>,
    established_ciphers: Option<(CipherCtx, CipherCtx)>,
}

impl ExchangeStateMachine {
    /// Start a fresh handshake at the `Connect` stage.
    pub fn new(role: Role, params: ParameterSet, local_public_id: Vec<u8>, local_secret_id: Vec<u8>) -> Self {
        Self {
            role,
            params,
            local_public_id,
            local_secret_id,
            stage: ExchangeFlag::Connect,
            finished: false,
            peer_public_id: None,
            peer_secret_id: None,
            peer_auth_pke_id: None,
            peer_primary_pke_id: None,
            auth_keypair: None,
            primary_keypair: None,
            peer_auth_pubkey: None,
            peer_primary_pubkey: None,
            local_auth_sym: None,
            peer_auth_sym: None,
            local_primary_sym: None,
            peer_primary_sym: None,
            auth_send_cipher: None,
            auth_recv_cipher: None,
            established_ciphers: None,
        }
    }

    /// Which end of the connection this machine plays.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The stage whose outbound/inbound pair has not yet both completed.
    pub fn current_stage(&self) -> ExchangeFlag {
        self.stage
    }

    /// Whether the handshake has reached `Established` and ciphers are ready.
    pub fn is_established(&self) -> bool {
        self.finished
    }

    /// Take the post-handshake `(send_cipher, recv_cipher)` pair. Returns
    /// `None` before `Established` completes, or if already taken.
    pub fn take_ciphers(&mut self) -> Option<(CipherCtx, CipherCtx)> {
        self.established_ciphers.take()
    }

    /// The peer's public id, known from `Connect`/`Init` onward.
    pub fn peer_public_id(&self) -> Option<&[u8]> {
        self.peer_public_id.as_deref()
    }

    /// The peer's secret id, known from `Auth` onward.
    pub fn peer_secret_id(&self) -> Option<&[u8]> {
        self.peer_secret_id.as_deref()
    }

    /// Pre-send delay, in milliseconds, that the caller should wait before
    /// transmitting the outbound bytes for `stage` (timing obfuscation; only
    /// `AuthEx` and `PrimeEx` carry a delay during the handshake itself,
    /// everything else returns zero).
    pub fn pre_send_delay_ms(&self, stage: ExchangeFlag) -> u32 {
        match stage {
            ExchangeFlag::AuthEx => self.params.profile.max_sym_key_delay_ms,
            ExchangeFlag::PrimeEx => self.params.profile.max_asm_key_delay_ms,
            _ => 0,
        }
    }

    fn auth_digest(&self) -> KdfDigest {
        self.params.auth_session.kdf_digest.unwrap_or(KdfDigest::Sha256)
    }

    fn primary_digest(&self) -> KdfDigest {
        self.params.primary_session.kdf_digest.unwrap_or(KdfDigest::Sha256)
    }

    fn advance(&mut self) {
        let idx = ExchangeFlag::ORDER.iter().position(|s| *s == self.stage).unwrap();
        if idx + 1 < ExchangeFlag::ORDER.len() {
            self.stage = ExchangeFlag::ORDER[idx + 1];
        }
    }

    /// Build the payload bytes for the current stage. Does not advance the
    /// stage; call [`accept_inbound`](Self::accept_inbound) with the peer's
    /// reply for the same stage to do that.
    pub fn build_outbound(&mut self) -> Result<Vec<u8>, SessionError> {
        match self.stage {
            ExchangeFlag::Connect => {
                let identity = DtmIdentity::new(self.local_public_id.clone(), ParameterSet::zero_pke_id(), DtmSession::default_aes256_ctr());
                Ok(identity.to_bytes())
            }
            ExchangeFlag::Init => {
                let identity = DtmIdentity::new(self.local_public_id.clone(), self.params.auth_pke_id, self.params.auth_session);
                Ok(identity.to_bytes())
            }
            ExchangeFlag::PreAuth => {
                if self.auth_keypair.is_none() {
                    let variant = self.params.auth_pke_id.auth_family().ok_or_else(|| handshake_err(self.stage, "local auth_pke_id names no known KEM family"))?;
                    self.auth_keypair = Some(adapter::gen_keypair(variant));
                }
                Ok(self.auth_keypair.as_ref().unwrap().0.to_bytes())
            }
            ExchangeFlag::AuthEx => {
                let peer_pk = self.peer_auth_pubkey.as_ref().ok_or_else(|| handshake_err(self.stage, "peer auth public key not yet known"))?;
                if self.local_auth_sym.is_none() {
                    self.local_auth_sym = Some(adapter::derive_fresh_sym_key());
                }
                let (key, iv) = self.local_auth_sym.as_ref().unwrap();
                let keyiv = join_key_iv(key, iv);
                let wrapped = wrap(&keyiv, self.params.profile.sym_key_bounds());
                adapter::encrypt(peer_pk, self.auth_digest(), b"dtm-auth-ex", &wrapped).map_err(|e| handshake_err(self.stage, &e.to_string()))
            }
            ExchangeFlag::Auth => {
                let cipher = self.auth_send_cipher.as_mut().ok_or_else(|| handshake_err(self.stage, "auth send cipher not yet established"))?;
                let identity = DtmIdentity::new(self.local_secret_id.clone(), ParameterSet::zero_pke_id(), self.params.auth_session);
                let mut body = wrap(&identity.to_bytes(), self.params.profile.auth_bounds());
                cipher.transform(&mut body);
                Ok(body)
            }
            ExchangeFlag::Sync => {
                let cipher = self.auth_send_cipher.as_mut().ok_or_else(|| handshake_err(self.stage, "auth send cipher not yet established"))?;
                let identity = DtmIdentity::new(self.local_secret_id.clone(), self.params.primary_pke_id, self.params.primary_session);
                let mut body = wrap(&identity.to_bytes(), self.params.profile.auth_bounds());
                cipher.transform(&mut body);
                Ok(body)
            }
            ExchangeFlag::PrimeEx => {
                if self.primary_keypair.is_none() {
                    let variant = self.params.primary_pke_id.primary_family().ok_or_else(|| handshake_err(self.stage, "local primary_pke_id names no known KEM family"))?;
                    self.primary_keypair = Some(adapter::gen_keypair(variant));
                }
                let cipher = self.auth_send_cipher.as_mut().ok_or_else(|| handshake_err(self.stage, "auth send cipher not yet established"))?;
                let pk_bytes = self.primary_keypair.as_ref().unwrap().0.to_bytes();
                let mut body = wrap(&pk_bytes, self.params.profile.asm_key_bounds());
                cipher.transform(&mut body);
                Ok(body)
            }
            ExchangeFlag::Primary => {
                let peer_pk = self.peer_primary_pubkey.as_ref().ok_or_else(|| handshake_err(self.stage, "peer primary public key not yet known"))?;
                if self.local_primary_sym.is_none() {
                    self.local_primary_sym = Some(adapter::derive_fresh_sym_key());
                }
                let (key, iv) = self.local_primary_sym.as_ref().unwrap();
                let keyiv = join_key_iv(key, iv);
                let inner = adapter::encrypt(peer_pk, self.primary_digest(), b"dtm-primary", &keyiv).map_err(|e| handshake_err(self.stage, &e.to_string()))?;
                let wrapped = wrap(&inner, self.params.profile.sym_key_bounds());
                let cipher = self.auth_send_cipher.as_mut().ok_or_else(|| handshake_err(self.stage, "auth send cipher not yet established"))?;
                let mut body = wrapped;
                cipher.transform(&mut body);
                Ok(body)
            }
            ExchangeFlag::Established => Ok(Vec::new()),
        }
    }

    /// Consume the peer's payload for the current stage, updating state and
    /// firing identity callbacks where the stage calls for one. Returns
    /// `Err` (always `Critical` severity) on any parse, decrypt, or
    /// cancellation failure. On success, advances to the next stage.
    pub fn accept_inbound(&mut self, stage: ExchangeFlag, payload: &[u8], callbacks: &mut Callbacks) -> Result<(), SessionError> {
        if stage != self.stage {
            return Err(handshake_err(stage, "out-of-order stage packet"));
        }

        match stage {
            ExchangeFlag::Connect => {
                let identity = DtmIdentity::from_bytes(payload).ok_or_else(|| handshake_err(stage, "malformed identity"))?;
                self.peer_public_id = Some(identity.id.clone());
                if callbacks.fire_identity_received(stage, &identity) {
                    return Err(handshake_err(stage, "cancelled by application"));
                }
            }
            ExchangeFlag::Init => {
                let identity = DtmIdentity::from_bytes(payload).ok_or_else(|| handshake_err(stage, "malformed identity"))?;
                self.peer_public_id = Some(identity.id.clone());
                self.peer_auth_pke_id = Some(identity.pke_id);
                if callbacks.fire_identity_received(stage, &identity) {
                    return Err(handshake_err(stage, "cancelled by application"));
                }
            }
            ExchangeFlag::PreAuth => {
                let oid = self.peer_auth_pke_id.ok_or_else(|| handshake_err(stage, "peer auth_pke_id not yet known"))?;
                let variant = oid.auth_family().ok_or_else(|| handshake_err(stage, "peer auth_pke_id names no known KEM family"))?;
                let pk = KemPublicKey::from_bytes(variant, payload).map_err(|e| handshake_err(stage, &e.to_string()))?;
                self.peer_auth_pubkey = Some(pk);
            }
            ExchangeFlag::AuthEx => {
                let (_, sk) = self.auth_keypair.as_ref().ok_or_else(|| handshake_err(stage, "local auth keypair not yet generated"))?;
                let decrypted = adapter::decrypt(sk, self.auth_digest(), b"dtm-auth-ex", payload).map_err(|e| handshake_err(stage, &e.to_string()))?;
                let keyiv = unwrap(&decrypted).map_err(|e| handshake_err(stage, &e.to_string()))?;
                let (key, iv) = split_key_iv(keyiv).ok_or_else(|| handshake_err(stage, "malformed symmetric key/iv"))?;
                self.peer_auth_sym = Some((key, iv));

                let (local_key, local_iv) = self.local_auth_sym.ok_or_else(|| handshake_err(stage, "local auth symmetric key not yet generated"))?;
                self.auth_send_cipher = Some(adapter::cipher_init(&local_key, &local_iv).map_err(|e| handshake_err(stage, &e.to_string()))?);
                self.auth_recv_cipher = Some(adapter::cipher_init(&key, &iv).map_err(|e| handshake_err(stage, &e.to_string()))?);
            }
            ExchangeFlag::Auth => {
                let cipher = self.auth_recv_cipher.as_mut().ok_or_else(|| handshake_err(stage, "auth recv cipher not yet established"))?;
                let mut body = payload.to_vec();
                cipher.transform(&mut body);
                let unwrapped = unwrap(&body).map_err(|e| handshake_err(stage, &e.to_string()))?;
                let identity = DtmIdentity::from_bytes(unwrapped).ok_or_else(|| handshake_err(stage, "malformed identity"))?;
                self.peer_secret_id = Some(identity.id.clone());
                if callbacks.fire_identity_received(stage, &identity) {
                    return Err(handshake_err(stage, "cancelled by application"));
                }
            }
            ExchangeFlag::Sync => {
                let cipher = self.auth_recv_cipher.as_mut().ok_or_else(|| handshake_err(stage, "auth recv cipher not yet established"))?;
                let mut body = payload.to_vec();
                cipher.transform(&mut body);
                let unwrapped = unwrap(&body).map_err(|e| handshake_err(stage, &e.to_string()))?;
                let identity = DtmIdentity::from_bytes(unwrapped).ok_or_else(|| handshake_err(stage, "malformed identity"))?;
                self.peer_secret_id = Some(identity.id.clone());
                self.peer_primary_pke_id = Some(identity.pke_id);
                if callbacks.fire_identity_received(stage, &identity) {
                    return Err(handshake_err(stage, "cancelled by application"));
                }
            }
            ExchangeFlag::PrimeEx => {
                let cipher = self.auth_recv_cipher.as_mut().ok_or_else(|| handshake_err(stage, "auth recv cipher not yet established"))?;
                let mut body = payload.to_vec();
                cipher.transform(&mut body);
                let unwrapped = unwrap(&body).map_err(|e| handshake_err(stage, &e.to_string()))?;
                let oid = self.peer_primary_pke_id.ok_or_else(|| handshake_err(stage, "peer primary_pke_id not yet known"))?;
                let variant = oid.primary_family().ok_or_else(|| handshake_err(stage, "peer primary_pke_id names no known KEM family"))?;
                let pk = KemPublicKey::from_bytes(variant, unwrapped).map_err(|e| handshake_err(stage, &e.to_string()))?;
                self.peer_primary_pubkey = Some(pk);
            }
            ExchangeFlag::Primary => {
                let (_, primary_sk) = self.primary_keypair.as_ref().ok_or_else(|| handshake_err(stage, "local primary keypair not yet generated"))?;
                let cipher = self.auth_recv_cipher.as_mut().ok_or_else(|| handshake_err(stage, "auth recv cipher not yet established"))?;
                let mut body = payload.to_vec();
                cipher.transform(&mut body);
                let unwrapped = unwrap(&body).map_err(|e| handshake_err(stage, &e.to_string()))?;
                let keyiv_bytes = adapter::decrypt(primary_sk, self.primary_digest(), b"dtm-primary", unwrapped).map_err(|e| handshake_err(stage, &e.to_string()))?;
                let (key, iv) = split_key_iv(&keyiv_bytes).ok_or_else(|| handshake_err(stage, "malformed symmetric key/iv"))?;
                self.peer_primary_sym = Some((key, iv));
            }
            ExchangeFlag::Established => {
                let (local_key, local_iv) = self.local_primary_sym.ok_or_else(|| handshake_err(stage, "local primary symmetric key not yet generated"))?;
                let (peer_key, peer_iv) = self.peer_primary_sym.ok_or_else(|| handshake_err(stage, "peer primary symmetric key not yet known"))?;
                let send_cipher = adapter::cipher_init(&local_key, &local_iv).map_err(|e| handshake_err(stage, &e.to_string()))?;
                let recv_cipher = adapter::cipher_init(&peer_key, &peer_iv).map_err(|e| handshake_err(stage, &e.to_string()))?;
                self.established_ciphers = Some((send_cipher, recv_cipher));
                self.auth_send_cipher = None;
                self.auth_recv_cipher = None;
                self.finished = true;
                callbacks.fire_connected();
            }
        }

        log::debug!("{:?} stage complete ({:?})", stage, self.role);
        self.advance();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::catalog;

    fn run_full_handshake(profile: ParameterSet) -> (ExchangeStateMachine, ExchangeStateMachine) {
        let mut client = ExchangeStateMachine::new(Role::Client, profile, vec![3, 3, 3, 3], vec![5, 5, 5, 5]);
        let mut server = ExchangeStateMachine::new(Role::Server, profile, vec![4, 4, 4, 4], vec![6, 6, 6, 6]);
        let mut client_cb = Callbacks::new();
        let mut server_cb = Callbacks::new();

        for stage in ExchangeFlag::ORDER {
            let client_out = client.build_outbound().unwrap();
            let server_out = server.build_outbound().unwrap();
            server.accept_inbound(stage, &client_out, &mut server_cb).unwrap();
            client.accept_inbound(stage, &server_out, &mut client_cb).unwrap();
        }
        (client, server)
    }

    #[test]
    fn full_handshake_establishes_matching_ciphers() {
        let (mut client, mut server) = run_full_handshake(catalog::x41rnt1r1());
        assert!(client.is_established());
        assert!(server.is_established());
        assert_eq!(client.peer_public_id(), Some(&[4, 4, 4, 4][..]));
        assert_eq!(server.peer_secret_id(), Some(&[5, 5, 5, 5][..]));

        let (mut client_send, mut client_recv) = client.take_ciphers().unwrap();
        let (mut server_send, mut server_recv) = server.take_ciphers().unwrap();

        let mut msg = b"hello over the established channel".to_vec();
        client_send.transform(&mut msg);
        server_recv.transform(&mut msg);
        assert_eq!(msg, b"hello over the established channel");

        let mut reply = b"and back".to_vec();
        server_send.transform(&mut reply);
        client_recv.transform(&mut reply);
        assert_eq!(reply, b"and back");
    }

    #[test]
    fn full_handshake_with_obfuscation_profile() {
        let (client, server) = run_full_handshake(catalog::x41rnt1r1_obfuscated());
        assert!(client.is_established());
        assert!(server.is_established());
    }

    #[test]
    fn cancel_at_init_aborts_before_auth() {
        let mut client = ExchangeStateMachine::new(Role::Client, catalog::x41rnt1r1(), vec![1], vec![2]);
        let mut server = ExchangeStateMachine::new(Role::Server, catalog::x41rnt1r1(), vec![3], vec![4]);
        let mut client_cb = Callbacks::new();
        let mut server_cb = Callbacks::new();
        server_cb.set_on_identity_received(|stage, _identity, cancel| {
            if stage == ExchangeFlag::Init {
                *cancel = true;
            }
        });

        let connect_client = client.build_outbound().unwrap();
        let connect_server = server.build_outbound().unwrap();
        server.accept_inbound(ExchangeFlag::Connect, &connect_client, &mut server_cb).unwrap();
        client.accept_inbound(ExchangeFlag::Connect, &connect_server, &mut client_cb).unwrap();

        let init_client = client.build_outbound().unwrap();
        let result = server.accept_inbound(ExchangeFlag::Init, &init_client, &mut server_cb);
        assert!(result.is_err());
        assert!(result.unwrap_err().is_fatal());
    }
}
