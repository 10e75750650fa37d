use base64::Engine;
use base64::engine::general_purpose;
use hmac::Hmac;
use hmac::Mac;
use pbkdf2::pbkdf2_hmac;
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use std::sync::LazyLock;

type HmacSha256 = Hmac<Sha256>;

const PBKDF2_ROUNDS: u32 = 10_000;
const SESSION_PREFIX: &str = "s1";

/// Checked against when the account does not exist, so the answer takes as
/// long as for a wrong password.
static DUMMY_PASSWORD: LazyLock<String> = LazyLock::new(|| store_password(&generate_key(24)));

pub fn b64_encode(data: &[u8]) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(data)
}

pub fn b64_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::URL_SAFE_NO_PAD.decode(s)
}

/// Random url-safe key made of `length` bytes of OS entropy.
pub fn generate_key(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    // OsRng only fails when the platform has no entropy source at all
    if OsRng.try_fill_bytes(&mut bytes).is_err() {
        bytes = (0..length).map(|_| rand::random::<u8>()).collect();
    }
    b64_encode(&bytes)
}

pub fn generate_salt() -> [u8; 16] {
    let mut salt = [0u8; 16];
    if OsRng.try_fill_bytes(&mut salt).is_err() {
        salt = rand::random();
    }
    salt
}

pub fn hash_password(password: &str, salt: &[u8]) -> Vec<u8> {
    let mut hash = vec![0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut hash);
    hash
}

/// `hex(salt)$hex(hash)`
pub fn store_password(password: &str) -> String {
    let salt = generate_salt();
    let hashed = hash_password(password, &salt);
    format!("{}${}", hex::encode(salt), hex::encode(hashed))
}

pub fn check_password(stored: &str, password: &str) -> bool {
    let Some((salt, hash)) = stored.split_once('$') else {
        return false;
    };
    let (Ok(salt), Ok(stored_hash)) = (hex::decode(salt), hex::decode(hash)) else {
        return false;
    };
    constant_time_eq(&hash_password(password, &salt), &stored_hash)
}

pub async fn store_password_async(password: String) -> String {
    match tokio::task::spawn_blocking(move || store_password(&password)).await {
        Ok(stored) => stored,
        Err(err) => std::panic::resume_unwind(err.into_panic()),
    }
}

pub async fn check_password_async(stored: String, password: String) -> bool {
    tokio::task::spawn_blocking(move || check_password(&stored, &password))
        .await
        .unwrap_or(false)
}

/// Password check for a login; `stored` is `None` for unknown users, which
/// still pay for one hash and never match.
pub async fn authenticate_async(stored: Option<String>, password: String) -> bool {
    match stored {
        Some(stored) => check_password_async(stored, password).await,
        None => {
            check_password_async(DUMMY_PASSWORD.clone(), password).await;
            false
        }
    }
}

fn hmac_sha256_b64(message: &str, signature_key: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(signature_key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    b64_encode(&mac.finalize().into_bytes())
}

fn verify_hmac_b64(message: &str, sig_b64: &str, signature_key: &str) -> bool {
    let Ok(sig) = b64_decode(sig_b64) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(signature_key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    mac.verify_slice(&sig).is_ok()
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Value of the `sessionid` cookie: `s1.<session id>.<signature>`.
pub fn sign_session(session_id: &str, signature_key: &str) -> String {
    let payload = format!("{}.{}", SESSION_PREFIX, session_id);
    let signature = hmac_sha256_b64(&payload, signature_key);
    format!("{}.{}", payload, signature)
}

/// Session id carried by a signed cookie value, if the signature holds.
pub fn verify_session(token: &str, signature_key: &str) -> Result<String, &'static str> {
    let (payload, signature) = token.rsplit_once('.').ok_or("INVALID_TOKEN_FORMAT")?;
    let session_id = payload
        .strip_prefix(SESSION_PREFIX)
        .and_then(|rest| rest.strip_prefix('.'))
        .ok_or("INVALID_TOKEN")?;

    if session_id.is_empty() {
        return Err("INVALID_TOKEN");
    }
    if !verify_hmac_b64(payload, signature, signature_key) {
        return Err("INVALID_SIGNATURE");
    }

    Ok(session_id.to_string())
}
