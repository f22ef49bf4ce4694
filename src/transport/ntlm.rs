//! NTLM security mechanism: negotiation tokens and message sealing.
//!
//! Implements the NTLMSSP exchange used by WS-Management over HTTP: a
//! Negotiate (Type 1) token, the server Challenge (Type 2), and an
//! Authenticate (Type 3) token carrying NTLMv2 responses. Once the
//! exchange completes, the derived session key seals every SOAP message
//! (RC4 + HMAC-MD5 signatures with per-direction keys and sequence
//! numbers), so the HTTP transport itself stays plain.

use md4::{Digest, Md4};
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, trace};

use super::{Mechanism, Step};
use crate::error::{Result, WrError};

// ============================================================================
// Negotiate flags
// ============================================================================

const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const NEGOTIATE_OEM: u32 = 0x0000_0002;
const REQUEST_TARGET: u32 = 0x0000_0004;
const NEGOTIATE_SIGN: u32 = 0x0000_0010;
const NEGOTIATE_SEAL: u32 = 0x0000_0020;
const NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NEGOTIATE_EXTENDED_SESSIONSECURITY: u32 = 0x0008_0000;
const NEGOTIATE_128: u32 = 0x2000_0000;
const NEGOTIATE_KEY_EXCH: u32 = 0x4000_0000;
const NEGOTIATE_56: u32 = 0x8000_0000;

const NTLMSSP_SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

/// Signature version prefix on every sealed message.
const SIGN_VERSION: u32 = 1;

/// Length of the signature block prepended to sealed payloads.
pub const SIGNATURE_LEN: usize = 16;

const CLIENT_SIGN_MAGIC: &[u8] = b"session key to client-to-server signing key magic constant\0";
const SERVER_SIGN_MAGIC: &[u8] = b"session key to server-to-client signing key magic constant\0";
const CLIENT_SEAL_MAGIC: &[u8] = b"session key to client-to-server sealing key magic constant\0";
const SERVER_SEAL_MAGIC: &[u8] = b"session key to server-to-client sealing key magic constant\0";

// ============================================================================
// Credentials
// ============================================================================

/// Username/password pair for the NTLM mechanism.
///
/// Accepts `DOMAIN\user` and `user@domain` forms; the workstation name is
/// taken from the local hostname.
#[derive(Debug)]
pub struct NtlmCredentials {
    username: String,
    password: SecretString,
    domain: String,
    workstation: String,
}

impl NtlmCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let username = username.into();
        let (domain, user) = if let Some((d, u)) = username.split_once('\\') {
            (d.to_string(), u.to_string())
        } else if let Some((u, d)) = username.split_once('@') {
            (d.to_string(), u.to_string())
        } else {
            (String::new(), username)
        };

        let workstation = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "WORKSTATION".to_string());

        NtlmCredentials {
            username: user,
            password: SecretString::new(password.into().into()),
            domain,
            workstation,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// NT hash: MD4 of the UTF-16LE password.
    fn nt_hash(&self) -> [u8; 16] {
        let password_unicode = utf16le(self.password.expose_secret());
        let mut hasher = Md4::new();
        hasher.update(&password_unicode);
        let result = hasher.finalize();

        let mut hash = [0u8; 16];
        hash.copy_from_slice(&result);
        hash
    }

    /// NTLMv2 hash: HMAC-MD5 of uppercase(user) + domain over the NT hash.
    fn ntlmv2_hash(&self) -> [u8; 16] {
        let identity = format!(
            "{}{}",
            self.username.to_uppercase(),
            self.domain.to_uppercase()
        );
        hmac_md5(&self.nt_hash(), &utf16le(&identity))
    }
}

// ============================================================================
// Mechanism state machine
// ============================================================================

enum NtlmState {
    Initial,
    NegotiateSent,
    Established,
}

/// NTLM implementation of the [`Mechanism`] seam.
///
/// Two rounds: `step(None)` yields the Negotiate token, `step(challenge)`
/// consumes the server Challenge and yields the Authenticate token, after
/// which the sealing context is live and `wrap`/`unwrap` work.
pub struct NtlmMechanism {
    creds: NtlmCredentials,
    state: NtlmState,
    sealing: Option<SealingContext>,
}

impl NtlmMechanism {
    pub fn new(creds: NtlmCredentials) -> Self {
        NtlmMechanism {
            creds,
            state: NtlmState::Initial,
            sealing: None,
        }
    }

    /// Build the Type 1 (Negotiate) message.
    fn negotiate_message(&self) -> Vec<u8> {
        let mut message = NTLMSSP_SIGNATURE.to_vec();
        message.extend_from_slice(&1u32.to_le_bytes());

        let flags: u32 = NEGOTIATE_UNICODE
            | NEGOTIATE_OEM
            | REQUEST_TARGET
            | NEGOTIATE_SIGN
            | NEGOTIATE_SEAL
            | NEGOTIATE_NTLM
            | NEGOTIATE_ALWAYS_SIGN
            | NEGOTIATE_EXTENDED_SESSIONSECURITY
            | NEGOTIATE_128
            | NEGOTIATE_KEY_EXCH
            | NEGOTIATE_56;
        message.extend_from_slice(&flags.to_le_bytes());

        // Domain and workstation are carried as OEM strings after the
        // 32-byte fixed header, workstation first.
        let domain = self.creds.domain.as_bytes();
        let workstation = self.creds.workstation.as_bytes();

        let domain_len = domain.len() as u16;
        message.extend_from_slice(&domain_len.to_le_bytes());
        message.extend_from_slice(&domain_len.to_le_bytes());
        let domain_offset = 32 + workstation.len() as u32;
        message.extend_from_slice(&domain_offset.to_le_bytes());

        let workstation_len = workstation.len() as u16;
        message.extend_from_slice(&workstation_len.to_le_bytes());
        message.extend_from_slice(&workstation_len.to_le_bytes());
        message.extend_from_slice(&32u32.to_le_bytes());

        message.extend_from_slice(workstation);
        message.extend_from_slice(domain);

        message
    }

    /// Build the Type 3 (Authenticate) message and the sealing context
    /// derived from the exchange.
    fn authenticate_message(&self, challenge_token: &[u8]) -> Result<(Vec<u8>, SealingContext)> {
        let challenge = Challenge::parse(challenge_token)?;
        let client_challenge: [u8; 8] = rand::random();

        let ntlmv2_hash = self.creds.ntlmv2_hash();
        let (nt_proof, blob) = ntlmv2_blob_response(
            &ntlmv2_hash,
            &challenge.server_challenge,
            &client_challenge,
            &challenge.target_info,
        );

        let mut nt_response = nt_proof.to_vec();
        nt_response.extend_from_slice(&blob);

        // LMv2: HMAC over server + client challenge, client challenge
        // appended.
        let mut lm_input = challenge.server_challenge.to_vec();
        lm_input.extend_from_slice(&client_challenge);
        let mut lm_response = hmac_md5(&ntlmv2_hash, &lm_input).to_vec();
        lm_response.extend_from_slice(&client_challenge);

        let session_base = hmac_md5(&ntlmv2_hash, &nt_proof);
        let key_exch = challenge.flags & NEGOTIATE_KEY_EXCH != 0;
        let (exported_key, encrypted_key) = if key_exch {
            let exported: [u8; 16] = rand::thread_rng().gen();
            let mut encrypted = exported.to_vec();
            Rc4::new(&session_base).apply(&mut encrypted);
            (exported, encrypted)
        } else {
            (session_base, Vec::new())
        };

        let domain_unicode = utf16le(&self.creds.domain);
        let user_unicode = utf16le(&self.creds.username);
        let workstation_unicode = utf16le(&self.creds.workstation);

        let mut message = NTLMSSP_SIGNATURE.to_vec();
        message.extend_from_slice(&3u32.to_le_bytes());

        // Fixed part is 88 bytes (header + version + MIC); payloads
        // follow in the order the buffers are declared.
        let base_offset: u32 = 88;
        let lm_offset = base_offset;
        let nt_offset = lm_offset + lm_response.len() as u32;
        let domain_offset = nt_offset + nt_response.len() as u32;
        let user_offset = domain_offset + domain_unicode.len() as u32;
        let workstation_offset = user_offset + user_unicode.len() as u32;
        let key_offset = workstation_offset + workstation_unicode.len() as u32;

        push_buffer(&mut message, &lm_response, lm_offset);
        push_buffer(&mut message, &nt_response, nt_offset);
        push_buffer(&mut message, &domain_unicode, domain_offset);
        push_buffer(&mut message, &user_unicode, user_offset);
        push_buffer(&mut message, &workstation_unicode, workstation_offset);
        push_buffer(&mut message, &encrypted_key, key_offset);

        let mut flags: u32 = NEGOTIATE_UNICODE
            | REQUEST_TARGET
            | NEGOTIATE_SIGN
            | NEGOTIATE_SEAL
            | NEGOTIATE_NTLM
            | NEGOTIATE_ALWAYS_SIGN
            | NEGOTIATE_EXTENDED_SESSIONSECURITY
            | NEGOTIATE_128
            | NEGOTIATE_56;
        if key_exch {
            flags |= NEGOTIATE_KEY_EXCH;
        }
        message.extend_from_slice(&flags.to_le_bytes());

        // Version (8 bytes) and MIC (16 bytes), both zeroed.
        message.extend_from_slice(&[0u8; 8]);
        message.extend_from_slice(&[0u8; 16]);

        message.extend_from_slice(&lm_response);
        message.extend_from_slice(&nt_response);
        message.extend_from_slice(&domain_unicode);
        message.extend_from_slice(&user_unicode);
        message.extend_from_slice(&workstation_unicode);
        message.extend_from_slice(&encrypted_key);

        debug!(
            user = %self.creds.username,
            domain = %self.creds.domain,
            key_exch,
            "built NTLM authenticate message"
        );

        Ok((message, SealingContext::new(&exported_key)))
    }
}

impl Mechanism for NtlmMechanism {
    fn step(&mut self, input: Option<&[u8]>) -> Result<Step> {
        match self.state {
            NtlmState::Initial => {
                self.state = NtlmState::NegotiateSent;
                Ok(Step::Continue(self.negotiate_message()))
            }
            NtlmState::NegotiateSent => {
                let challenge = input
                    .ok_or_else(|| WrError::Auth("server did not send a challenge".to_string()))?;
                let (token, sealing) = self.authenticate_message(challenge)?;
                self.sealing = Some(sealing);
                self.state = NtlmState::Established;
                Ok(Step::Complete(Some(token)))
            }
            NtlmState::Established => Err(WrError::Auth(
                "security context is already established".to_string(),
            )),
        }
    }

    fn wrap(&mut self, msg: &[u8]) -> Result<Vec<u8>> {
        let sealing = self
            .sealing
            .as_mut()
            .ok_or_else(|| WrError::Auth("security context is not established".to_string()))?;
        Ok(sealing.wrap(msg))
    }

    fn unwrap(&mut self, token: &[u8]) -> Result<Vec<u8>> {
        let sealing = self
            .sealing
            .as_mut()
            .ok_or_else(|| WrError::Auth("security context is not established".to_string()))?;
        sealing.unwrap(token)
    }
}

// ============================================================================
// Challenge (Type 2) parsing
// ============================================================================

struct Challenge {
    server_challenge: [u8; 8],
    flags: u32,
    target_info: Vec<u8>,
}

impl Challenge {
    fn parse(token: &[u8]) -> Result<Self> {
        if token.len() < 32 || &token[0..8] != NTLMSSP_SIGNATURE {
            return Err(WrError::Auth("invalid NTLM challenge message".to_string()));
        }
        let msg_type = u32::from_le_bytes(token[8..12].try_into().unwrap());
        if msg_type != 2 {
            return Err(WrError::Auth(format!(
                "expected NTLM challenge, got message type {msg_type}"
            )));
        }

        let flags = u32::from_le_bytes(token[20..24].try_into().unwrap());
        let mut server_challenge = [0u8; 8];
        server_challenge.copy_from_slice(&token[24..32]);

        // TargetInfo security buffer; echoed verbatim into the NTLMv2
        // blob. Absent on pre-NTLMv2 servers.
        let target_info = if token.len() >= 48 {
            let len = u16::from_le_bytes(token[40..42].try_into().unwrap()) as usize;
            let offset = u32::from_le_bytes(token[44..48].try_into().unwrap()) as usize;
            match token.get(offset..offset + len) {
                Some(info) => info.to_vec(),
                None => {
                    return Err(WrError::Auth(
                        "NTLM challenge target info is out of bounds".to_string(),
                    ))
                }
            }
        } else {
            Vec::new()
        };

        trace!(
            flags,
            target_info_len = target_info.len(),
            "parsed NTLM challenge"
        );

        Ok(Challenge {
            server_challenge,
            flags,
            target_info,
        })
    }
}

/// NTLMv2 response blob plus the NTProofStr over it.
fn ntlmv2_blob_response(
    ntlmv2_hash: &[u8; 16],
    server_challenge: &[u8; 8],
    client_challenge: &[u8; 8],
    target_info: &[u8],
) -> ([u8; 16], Vec<u8>) {
    let mut blob = Vec::with_capacity(32 + target_info.len());
    blob.extend_from_slice(&[0x01, 0x01, 0x00, 0x00]);
    blob.extend_from_slice(&0u32.to_le_bytes());
    blob.extend_from_slice(&windows_timestamp().to_le_bytes());
    blob.extend_from_slice(client_challenge);
    blob.extend_from_slice(&0u32.to_le_bytes());
    blob.extend_from_slice(target_info);
    blob.extend_from_slice(&0u32.to_le_bytes());

    let mut data = server_challenge.to_vec();
    data.extend_from_slice(&blob);
    (hmac_md5(ntlmv2_hash, &data), blob)
}

/// Security buffer descriptor: length, max length, offset.
fn push_buffer(message: &mut Vec<u8>, payload: &[u8], offset: u32) {
    let len = payload.len() as u16;
    message.extend_from_slice(&len.to_le_bytes());
    message.extend_from_slice(&len.to_le_bytes());
    message.extend_from_slice(&offset.to_le_bytes());
}

// ============================================================================
// Sealing context
// ============================================================================

/// Per-direction signing keys and RC4 streams derived from the exported
/// session key. Sequence numbers advance once per message and are part of
/// every signature.
struct SealingContext {
    client_sign: [u8; 16],
    server_sign: [u8; 16],
    client_seal: Rc4,
    server_seal: Rc4,
    send_seq: u32,
    recv_seq: u32,
}

impl SealingContext {
    fn new(exported_key: &[u8; 16]) -> Self {
        SealingContext {
            client_sign: derive_key(exported_key, CLIENT_SIGN_MAGIC),
            server_sign: derive_key(exported_key, SERVER_SIGN_MAGIC),
            client_seal: Rc4::new(&derive_key(exported_key, CLIENT_SEAL_MAGIC)),
            server_seal: Rc4::new(&derive_key(exported_key, SERVER_SEAL_MAGIC)),
            send_seq: 0,
            recv_seq: 0,
        }
    }

    /// Seal and sign: 16-byte signature followed by the RC4 ciphertext.
    /// The checksum is RC4-encrypted after the message so the stream
    /// stays aligned with the peer.
    fn wrap(&mut self, msg: &[u8]) -> Vec<u8> {
        let mut sealed = msg.to_vec();
        self.client_seal.apply(&mut sealed);

        let mut mac_input = self.send_seq.to_le_bytes().to_vec();
        mac_input.extend_from_slice(msg);
        let mut checksum = hmac_md5(&self.client_sign, &mac_input)[..8].to_vec();
        self.client_seal.apply(&mut checksum);

        let mut out = Vec::with_capacity(SIGNATURE_LEN + sealed.len());
        out.extend_from_slice(&SIGN_VERSION.to_le_bytes());
        out.extend_from_slice(&checksum);
        out.extend_from_slice(&self.send_seq.to_le_bytes());
        out.extend_from_slice(&sealed);
        self.send_seq += 1;
        out
    }

    /// Verify and open a sealed token from the server.
    fn unwrap(&mut self, token: &[u8]) -> Result<Vec<u8>> {
        if token.len() < SIGNATURE_LEN {
            return Err(WrError::Auth("sealed message is truncated".to_string()));
        }
        let version = u32::from_le_bytes(token[0..4].try_into().unwrap());
        if version != SIGN_VERSION {
            return Err(WrError::Auth(format!(
                "unsupported message signature version {version}"
            )));
        }

        let mut plaintext = token[SIGNATURE_LEN..].to_vec();
        self.server_seal.apply(&mut plaintext);

        let mut checksum = token[4..12].to_vec();
        self.server_seal.apply(&mut checksum);

        let mut mac_input = self.recv_seq.to_le_bytes().to_vec();
        mac_input.extend_from_slice(&plaintext);
        let expected = &hmac_md5(&self.server_sign, &mac_input)[..8];
        if checksum != expected {
            return Err(WrError::Auth(
                "message signature verification failed".to_string(),
            ));
        }
        self.recv_seq += 1;
        Ok(plaintext)
    }
}

fn derive_key(session_key: &[u8; 16], magic: &[u8]) -> [u8; 16] {
    let mut input = session_key.to_vec();
    input.extend_from_slice(magic);
    md5::compute(&input).0
}

// ============================================================================
// Primitives
// ============================================================================

/// RC4 stream cipher state. Kept local for the same reason HMAC-MD5 is:
/// NTLM is the only consumer and the keystream must stay under our
/// sequence-number bookkeeping.
struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    fn new(key: &[u8]) -> Self {
        let mut s = [0u8; 256];
        for (i, v) in s.iter_mut().enumerate() {
            *v = i as u8;
        }
        let mut j: u8 = 0;
        for i in 0..256 {
            j = j
                .wrapping_add(s[i])
                .wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }
        Rc4 { s, i: 0, j: 0 }
    }

    fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[self.i as usize]);
            self.s.swap(self.i as usize, self.j as usize);
            let k = self.s[(self.s[self.i as usize].wrapping_add(self.s[self.j as usize])) as usize];
            *byte ^= k;
        }
    }
}

/// HMAC-MD5 over the `md5` crate.
fn hmac_md5(key: &[u8], data: &[u8]) -> [u8; 16] {
    let mut key_block = [0u8; 64];
    if key.len() > 64 {
        let digest = md5::compute(key);
        key_block[..16].copy_from_slice(&digest.0);
    } else {
        key_block[..key.len()].copy_from_slice(key);
    }

    let mut ipad = [0x36u8; 64];
    let mut opad = [0x5cu8; 64];
    for (i, b) in key_block.iter().enumerate() {
        ipad[i] ^= b;
        opad[i] ^= b;
    }

    let mut inner_data = ipad.to_vec();
    inner_data.extend_from_slice(data);
    let inner_hash = md5::compute(&inner_data);

    let mut outer_data = opad.to_vec();
    outer_data.extend_from_slice(&inner_hash.0);
    md5::compute(&outer_data).0
}

/// UTF-16LE encoding used throughout NTLM messages.
fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect()
}

/// Windows FILETIME for the NTLMv2 blob. The FILETIME epoch is
/// January 1, 1601; 100ns ticks.
fn windows_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    const EPOCH_DIFF: u64 = 11_644_473_600;
    const TICKS_PER_SECOND: u64 = 10_000_000;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    (now + EPOCH_DIFF) * TICKS_PER_SECOND
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> NtlmCredentials {
        NtlmCredentials::new("TESTDOMAIN\\testuser", "testpass")
    }

    /// Minimal Type 2 token: challenge, flags, empty target info.
    pub(crate) fn challenge_token(flags: u32) -> Vec<u8> {
        let mut token = NTLMSSP_SIGNATURE.to_vec();
        token.extend_from_slice(&2u32.to_le_bytes());
        // Target name security buffer (empty, offset past the header).
        token.extend_from_slice(&0u16.to_le_bytes());
        token.extend_from_slice(&0u16.to_le_bytes());
        token.extend_from_slice(&48u32.to_le_bytes());
        token.extend_from_slice(&flags.to_le_bytes());
        token.extend_from_slice(&[0xAA; 8]); // server challenge
        token.extend_from_slice(&[0u8; 8]); // reserved
        // Target info security buffer (empty).
        token.extend_from_slice(&0u16.to_le_bytes());
        token.extend_from_slice(&0u16.to_le_bytes());
        token.extend_from_slice(&48u32.to_le_bytes());
        token
    }

    #[test]
    fn credentials_split_backslash_and_upn() {
        let c = NtlmCredentials::new("DOMAIN\\user", "pw");
        assert_eq!(c.username(), "user");
        assert_eq!(c.domain(), "DOMAIN");

        let c = NtlmCredentials::new("user@domain.local", "pw");
        assert_eq!(c.username(), "user");
        assert_eq!(c.domain(), "domain.local");

        let c = NtlmCredentials::new("user", "pw");
        assert_eq!(c.username(), "user");
        assert_eq!(c.domain(), "");
    }

    #[test]
    fn negotiate_message_layout() {
        let mut mech = NtlmMechanism::new(creds());
        let Step::Continue(msg) = mech.step(None).unwrap() else {
            panic!("expected continue");
        };
        assert_eq!(&msg[0..8], NTLMSSP_SIGNATURE);
        assert_eq!(&msg[8..12], &1u32.to_le_bytes());
        let flags = u32::from_le_bytes(msg[12..16].try_into().unwrap());
        assert_ne!(flags & NEGOTIATE_SEAL, 0);
        assert_ne!(flags & NEGOTIATE_SIGN, 0);
        assert_ne!(flags & NEGOTIATE_KEY_EXCH, 0);
    }

    #[test]
    fn two_round_exchange_establishes_context() {
        let mut mech = NtlmMechanism::new(creds());
        assert!(matches!(mech.step(None).unwrap(), Step::Continue(_)));
        let token = challenge_token(NEGOTIATE_UNICODE | NEGOTIATE_KEY_EXCH);
        let Step::Complete(Some(auth)) = mech.step(Some(&token)).unwrap() else {
            panic!("expected completion with a token");
        };
        assert_eq!(&auth[0..8], NTLMSSP_SIGNATURE);
        assert_eq!(&auth[8..12], &3u32.to_le_bytes());
        // Established context can wrap.
        assert!(mech.wrap(b"payload").is_ok());
        // A third step is a hard error.
        assert!(mech.step(None).is_err());
    }

    #[test]
    fn missing_challenge_is_an_error() {
        let mut mech = NtlmMechanism::new(creds());
        mech.step(None).unwrap();
        assert!(matches!(mech.step(None), Err(WrError::Auth(_))));
    }

    #[test]
    fn wrap_unwrap_roundtrip_with_mirrored_peer() {
        let key = [7u8; 16];
        let mut client = SealingContext::new(&key);
        // The peer sees the same key with the directions swapped.
        let mut server = SealingContext {
            client_sign: derive_key(&key, SERVER_SIGN_MAGIC),
            server_sign: derive_key(&key, CLIENT_SIGN_MAGIC),
            client_seal: Rc4::new(&derive_key(&key, SERVER_SEAL_MAGIC)),
            server_seal: Rc4::new(&derive_key(&key, CLIENT_SEAL_MAGIC)),
            send_seq: 0,
            recv_seq: 0,
        };

        for msg in [&b"first message"[..], b"second", b"<Envelope/>"] {
            let token = client.wrap(msg);
            let opened = server.unwrap(&token).unwrap();
            assert_eq!(opened, msg);
        }
        for msg in [&b"reply one"[..], b"reply two"] {
            let token = server.wrap(msg);
            let opened = client.unwrap(&token).unwrap();
            assert_eq!(opened, msg);
        }
    }

    #[test]
    fn tampered_token_fails_verification() {
        let key = [9u8; 16];
        let mut client = SealingContext::new(&key);
        let mut server = SealingContext {
            client_sign: derive_key(&key, SERVER_SIGN_MAGIC),
            server_sign: derive_key(&key, CLIENT_SIGN_MAGIC),
            client_seal: Rc4::new(&derive_key(&key, SERVER_SEAL_MAGIC)),
            server_seal: Rc4::new(&derive_key(&key, CLIENT_SEAL_MAGIC)),
            send_seq: 0,
            recv_seq: 0,
        };
        let mut token = client.wrap(b"do not touch");
        let last = token.len() - 1;
        token[last] ^= 0xFF;
        assert!(matches!(server.unwrap(&token), Err(WrError::Auth(_))));
    }

    #[test]
    fn rc4_is_symmetric() {
        let mut a = Rc4::new(b"Key");
        let mut b = Rc4::new(b"Key");
        let mut data = b"Plaintext".to_vec();
        a.apply(&mut data);
        assert_ne!(&data, b"Plaintext");
        b.apply(&mut data);
        assert_eq!(&data, b"Plaintext");
    }

    #[test]
    fn hmac_md5_rfc2202_vector() {
        // RFC 2202 test case 2.
        let digest = hmac_md5(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            digest,
            [
                0x75, 0x0c, 0x78, 0x3e, 0x6a, 0xb0, 0xb5, 0x03, 0xea, 0xa8, 0x6e, 0x31, 0x0a,
                0x5d, 0xb7, 0x38
            ]
        );
    }
}
