use std::fmt;

use chrono::SecondsFormat;
use serde::Serialize;

use crate::types::RunSummary;

pub const ZERO_HASH: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

/// Predicate uri linking a player atom to a score atom.
pub const SCORE_PREDICATE: &str = "has score";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TxConfirmation {
    pub label: String,
    pub hash: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AtomReceipt {
    pub atom_id: u64,
    pub tx_hash: String,
}

/// Errors surfaced by the chain client. `AtomExists` carries the id of
/// the atom already holding the uri so callers can reuse it.
#[derive(Clone, Debug, PartialEq)]
pub enum AtomError {
    AtomExists { atom_id: u64 },
    Rejected(String),
}

/// The opaque seam to whatever protocol SDK does the actual writes.
/// This crate never sees transaction wire formats, only receipts.
pub trait AtomClient {
    fn create_atom(&mut self, uri: &str) -> Result<AtomReceipt, AtomError>;
    fn create_triple(
        &mut self,
        subject_id: u64,
        predicate_id: u64,
        object_id: u64,
    ) -> Result<String, AtomError>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum PublishError {
    NotConfigured,
    Chain { step: &'static str, message: String },
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "no chain client is configured on this server"),
            Self::Chain { step, message } => write!(f, "{step} failed: {message}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PublishOutcome {
    pub confirmations: Vec<TxConfirmation>,
    pub triple_tx_hash: String,
}

pub fn is_hex_address(value: &str) -> bool {
    value.len() == 42
        && value.starts_with("0x")
        && value[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// `player:<address>` for a well-formed wallet address (lowercased),
/// otherwise the shared `player:anonymous` atom.
pub fn player_uri(address: Option<&str>) -> String {
    match address {
        Some(addr) if is_hex_address(addr) => format!("player:{}", addr.to_lowercase()),
        _ => "player:anonymous".to_string(),
    }
}

/// The score atom uri. Embedding the run timestamp keeps it unique per
/// run, so an already-exists reply on this one is a real failure.
pub fn summary_uri(summary: &RunSummary, chain_id: i64) -> String {
    let ts = chrono::DateTime::from_timestamp_millis(summary.ended_at_ms as i64)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| summary.ended_at_ms.to_string());
    format!(
        "score:{}|theme:{}|words:{}|ts:{}|chain:{}",
        summary.score,
        summary.theme.label(),
        summary.word_count,
        ts,
        chain_id
    )
}

/// Publishes one finished run: player atom and predicate atom are
/// ensured (reused with the all-zero hash when they already exist), the
/// score atom is created fresh, then the player / has-score / score
/// triple ties them together. Any failure aborts the remaining steps and
/// is reported as the failure of this publish only.
pub fn publish_run(
    client: &mut dyn AtomClient,
    summary: &RunSummary,
    address: Option<&str>,
    chain_id: i64,
) -> Result<PublishOutcome, PublishError> {
    let mut confirmations = Vec::new();

    let player = ensure_atom(client, &player_uri(address))
        .map_err(|err| chain_error("player atom", err))?;
    confirmations.push(TxConfirmation {
        label: "Player atom".to_string(),
        hash: player.tx_hash.clone(),
    });

    let predicate =
        ensure_atom(client, SCORE_PREDICATE).map_err(|err| chain_error("predicate atom", err))?;
    confirmations.push(TxConfirmation {
        label: "Predicate atom".to_string(),
        hash: predicate.tx_hash.clone(),
    });

    let score = client
        .create_atom(&summary_uri(summary, chain_id))
        .map_err(|err| chain_error("score atom", err))?;
    confirmations.push(TxConfirmation {
        label: "Score atom".to_string(),
        hash: score.tx_hash.clone(),
    });

    let triple_tx_hash = client
        .create_triple(player.atom_id, predicate.atom_id, score.atom_id)
        .map_err(|err| chain_error("score triple", err))?;
    confirmations.push(TxConfirmation {
        label: "Score triple".to_string(),
        hash: triple_tx_hash.clone(),
    });

    Ok(PublishOutcome {
        confirmations,
        triple_tx_hash,
    })
}

fn ensure_atom(client: &mut dyn AtomClient, uri: &str) -> Result<AtomReceipt, AtomError> {
    match client.create_atom(uri) {
        Ok(receipt) => Ok(receipt),
        Err(AtomError::AtomExists { atom_id }) => Ok(AtomReceipt {
            atom_id,
            tx_hash: ZERO_HASH.to_string(),
        }),
        Err(err) => Err(err),
    }
}

fn chain_error(step: &'static str, err: AtomError) -> PublishError {
    let message = match err {
        AtomError::AtomExists { atom_id } => format!("atom {atom_id} already exists"),
        AtomError::Rejected(message) => message,
    };
    PublishError::Chain { step, message }
}
