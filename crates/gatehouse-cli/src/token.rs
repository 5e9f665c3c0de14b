//! # Token Subcommand
//!
//! Offline inspection of credential tokens, for desk staff answering
//! "why won't this QR code open the gate?".
//!
//! `verify` checks the tag and the expiry only. Whether the visit is still
//! authorized, or the credential was already used, lives in the running
//! service and is not visible here.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use gatehouse_core::{SystemTimeSource, TimeSource, Timestamp};
use gatehouse_crypto::{decode_unverified, open, CredentialKey, CredentialPayload, CryptoError};

use crate::{read_secret_file, EXIT_REFUSED};

/// Arguments for the token subcommand.
#[derive(Args, Debug)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommand,
}

#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    /// Decode and print a token's claims. The tag is NOT checked.
    Inspect {
        /// The token string as read from the QR code.
        token: String,

        /// Print the claims as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Verify a token's tag against a secret and check its expiry.
    Verify {
        /// The token string as read from the QR code.
        token: String,

        /// File holding the hex credential secret.
        #[arg(long)]
        secret_file: PathBuf,
    },
}

/// Outcome of an offline check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid(CredentialPayload),
    Expired(CredentialPayload),
    Malformed(String),
    SignatureMismatch,
}

/// Execute the token subcommand.
pub fn run_token(args: &TokenArgs) -> Result<u8> {
    match &args.command {
        TokenCommand::Inspect { token, json } => run_inspect(token, *json),
        TokenCommand::Verify { token, secret_file } => {
            let key = read_secret_file(secret_file)?;
            let verdict = check_token(token, &key, SystemTimeSource.now());
            Ok(report(&verdict))
        }
    }
}

fn run_inspect(token: &str, json: bool) -> Result<u8> {
    let payload = match decode_unverified(token) {
        Ok(payload) => payload,
        Err(e) => {
            println!("MALFORMED: {e}");
            return Ok(EXIT_REFUSED);
        }
    };
    if json {
        let rendered =
            serde_json::to_string_pretty(&payload).context("failed to render claims as JSON")?;
        println!("{rendered}");
    } else {
        print_claims(&payload);
        println!("  (tag not verified)");
    }
    Ok(0)
}

/// Check a token's tag with `key`, then its expiry against `now`.
pub fn check_token(token: &str, key: &CredentialKey, now: Timestamp) -> Verdict {
    match open(token, key) {
        Ok(payload) if payload.is_expired_at(now) => Verdict::Expired(payload),
        Ok(payload) => Verdict::Valid(payload),
        Err(CryptoError::SignatureMismatch) => Verdict::SignatureMismatch,
        Err(e) => Verdict::Malformed(e.to_string()),
    }
}

fn report(verdict: &Verdict) -> u8 {
    match verdict {
        Verdict::Valid(payload) => {
            println!("VALID");
            print_claims(payload);
            0
        }
        Verdict::Expired(payload) => {
            println!("EXPIRED");
            print_claims(payload);
            EXIT_REFUSED
        }
        Verdict::Malformed(reason) => {
            println!("MALFORMED: {reason}");
            EXIT_REFUSED
        }
        Verdict::SignatureMismatch => {
            println!("SIGNATURE MISMATCH: token was not issued with this secret, or was altered");
            EXIT_REFUSED
        }
    }
}

fn print_claims(payload: &CredentialPayload) {
    println!("  visit:      {}", payload.visit_id);
    println!("  unit:       {}", payload.unit_id);
    println!("  issued at:  {}", render_instant(payload.issued_at()));
    println!("  expires at: {}", render_instant(payload.expires_at()));
    println!("  nonce:      {}", payload.nonce);
}

fn render_instant(instant: Result<Timestamp, CryptoError>) -> String {
    match instant {
        Ok(ts) => ts.to_string(),
        Err(e) => format!("<{e}>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::{UnitId, VisitId};
    use gatehouse_crypto::seal;

    fn key(byte: u8) -> CredentialKey {
        CredentialKey::from_bytes(vec![byte; 32]).unwrap()
    }

    fn issued(key: &CredentialKey) -> (String, Timestamp) {
        let issued_at = Timestamp::parse("2026-05-04T12:00:00Z").unwrap();
        let payload = CredentialPayload::new(
            VisitId::new(),
            UnitId::new("A-101").unwrap(),
            issued_at,
            issued_at.plus_hours(24),
        );
        (seal(&payload, key).unwrap().token, issued_at)
    }

    #[test]
    fn valid_token_within_window() {
        let k = key(7);
        let (token, issued_at) = issued(&k);
        assert!(matches!(check_token(&token, &k, issued_at.plus_hours(1)), Verdict::Valid(_)));
    }

    #[test]
    fn token_past_expiry_is_expired() {
        let k = key(7);
        let (token, issued_at) = issued(&k);
        match check_token(&token, &k, issued_at.plus_hours(25)) {
            Verdict::Expired(p) => assert_eq!(p.unit_id.as_str(), "A-101"),
            other => panic!("expected Expired, got {other:?}"),
        }
        assert_eq!(report(&check_token(&token, &k, issued_at.plus_hours(25))), EXIT_REFUSED);
    }

    #[test]
    fn other_secret_is_a_mismatch() {
        let (token, issued_at) = issued(&key(7));
        assert_eq!(check_token(&token, &key(8), issued_at), Verdict::SignatureMismatch);
    }

    #[test]
    fn garbage_is_malformed() {
        let k = key(7);
        assert!(matches!(
            check_token("no-dot-here", &k, Timestamp::now()),
            Verdict::Malformed(_)
        ));
    }

    #[test]
    fn inspect_does_not_need_the_secret() {
        let (token, _) = issued(&key(7));
        assert_eq!(run_inspect(&token, false).unwrap(), 0);
        assert_eq!(run_inspect(&token, true).unwrap(), 0);
        assert_eq!(run_inspect("###", false).unwrap(), EXIT_REFUSED);
    }

    #[test]
    fn verify_reads_secret_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credential.key");
        let k = key(9);
        std::fs::write(&path, k.expose_hex().as_str()).unwrap();

        let now = Timestamp::now();
        let payload =
            CredentialPayload::new(VisitId::new(), UnitId::new("B-1504").unwrap(), now, now.plus_hours(1));
        let token = seal(&payload, &k).unwrap().token;

        let verify = |secret_file: PathBuf| TokenArgs {
            command: TokenCommand::Verify {
                token: token.clone(),
                secret_file,
            },
        };
        assert_eq!(run_token(&verify(path)).unwrap(), 0);

        let other = dir.path().join("other.key");
        std::fs::write(&other, key(10).expose_hex().as_str()).unwrap();
        assert_eq!(run_token(&verify(other)).unwrap(), EXIT_REFUSED);
    }
}
