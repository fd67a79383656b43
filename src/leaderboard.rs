use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::constants::LEADERBOARD_LIMIT;

#[derive(Clone, Debug, Serialize)]
pub struct LeaderboardEntry {
    pub address: String,
    pub score: i32,
    pub theme: String,
    pub words: i32,
    #[serde(rename = "chainId")]
    pub chain_id: i64,
    #[serde(rename = "txHash")]
    pub tx_hash: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// A validated submission body: address and txHash must be non-empty
/// strings, score and chainId numeric. Theme and words are optional
/// and default to "Unknown" / 0.
#[derive(Clone, Debug, PartialEq)]
pub struct LeaderboardSubmission {
    pub address: String,
    pub score: i32,
    pub theme: String,
    pub words: i32,
    pub chain_id: i64,
    pub tx_hash: String,
}

pub fn parse_submission(value: &Value) -> Option<LeaderboardSubmission> {
    let address = value.get("address").and_then(|v| v.as_str())?;
    if address.is_empty() {
        return None;
    }
    let score = value.get("score").and_then(|v| v.as_f64())? as i32;
    let tx_hash = value.get("txHash").and_then(|v| v.as_str())?;
    if tx_hash.is_empty() {
        return None;
    }
    let chain_id = value.get("chainId").and_then(|v| v.as_f64())? as i64;
    let theme = value
        .get("theme")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("Unknown")
        .to_string();
    let words = value.get("words").and_then(|v| v.as_f64()).unwrap_or(0.0) as i32;

    Some(LeaderboardSubmission {
        address: address.to_string(),
        score,
        theme,
        words,
        chain_id,
        tx_hash: tx_hash.to_string(),
    })
}

/// In-memory, append-only leaderboard. Nothing is persisted: a restart
/// starts from an empty board.
#[derive(Debug, Default)]
pub struct LeaderboardStore {
    entries: Vec<LeaderboardEntry>,
}

impl LeaderboardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the submission with a server-assigned creation timestamp
    /// and returns the stored entry.
    pub fn append(&mut self, submission: LeaderboardSubmission) -> LeaderboardEntry {
        let entry = LeaderboardEntry {
            address: submission.address,
            score: submission.score,
            theme: submission.theme,
            words: submission.words,
            chain_id: submission.chain_id,
            tx_hash: submission.tx_hash,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        self.entries.push(entry.clone());
        entry
    }

    /// Top entries, score descending; equal scores list the newer entry
    /// first. At most [`LEADERBOARD_LIMIT`] rows.
    pub fn top(&self) -> Vec<LeaderboardEntry> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                // RFC3339 UTC strings with fixed precision compare
                // chronologically as plain strings.
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        entries.truncate(LEADERBOARD_LIMIT);
        entries
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn entry(address: &str, score: i32, created_at: &str) -> LeaderboardEntry {
        LeaderboardEntry {
            address: address.to_string(),
            score,
            theme: "Crypto".to_string(),
            words: score,
            chain_id: 84_532,
            tx_hash: format!("0x{address}"),
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn parse_accepts_a_full_payload() {
        let parsed = parse_submission(&json!({
            "address": "0xabc",
            "score": 12,
            "theme": "AI",
            "words": 12,
            "chainId": 84532,
            "txHash": "0xdead"
        }))
        .expect("valid payload");

        assert_eq!(parsed.address, "0xabc");
        assert_eq!(parsed.score, 12);
        assert_eq!(parsed.theme, "AI");
        assert_eq!(parsed.words, 12);
        assert_eq!(parsed.chain_id, 84_532);
        assert_eq!(parsed.tx_hash, "0xdead");
    }

    #[test]
    fn parse_fills_the_optional_defaults() {
        let parsed = parse_submission(&json!({
            "address": "0xabc",
            "score": 3,
            "chainId": 8453,
            "txHash": "0xdead"
        }))
        .expect("valid payload");
        assert_eq!(parsed.theme, "Unknown");
        assert_eq!(parsed.words, 0);

        let parsed = parse_submission(&json!({
            "address": "0xabc",
            "score": 3,
            "theme": "",
            "chainId": 8453,
            "txHash": "0xdead"
        }))
        .expect("valid payload");
        assert_eq!(parsed.theme, "Unknown");
    }

    #[test]
    fn parse_rejects_missing_or_malformed_fields() {
        let valid = json!({
            "address": "0xabc",
            "score": 3,
            "chainId": 8453,
            "txHash": "0xdead"
        });
        assert!(parse_submission(&valid).is_some());

        for (key, bad) in [
            ("address", json!("")),
            ("address", json!(42)),
            ("score", json!("12")),
            ("txHash", json!("")),
            ("txHash", json!(7)),
            ("chainId", json!("8453")),
        ] {
            let mut payload = valid.clone();
            payload[key] = bad;
            assert!(parse_submission(&payload).is_none(), "key {key}");
        }

        for key in ["address", "score", "txHash", "chainId"] {
            let mut payload = valid.clone();
            payload.as_object_mut().expect("object").remove(key);
            assert!(parse_submission(&payload).is_none(), "missing {key}");
        }
    }

    #[test]
    fn parse_truncates_fractional_numbers() {
        let parsed = parse_submission(&json!({
            "address": "0xabc",
            "score": 12.7,
            "chainId": 8453.0,
            "txHash": "0xdead"
        }))
        .expect("valid payload");
        assert_eq!(parsed.score, 12);
        assert_eq!(parsed.chain_id, 8453);
    }

    #[test]
    fn append_stamps_a_creation_time() {
        let mut store = LeaderboardStore::new();
        let stored = store.append(LeaderboardSubmission {
            address: "0xabc".to_string(),
            score: 10,
            theme: "Memes".to_string(),
            words: 10,
            chain_id: 8453,
            tx_hash: "0xdead".to_string(),
        });
        assert!(stored.created_at.ends_with('Z'));
        assert_eq!(store.top().len(), 1);
    }

    #[test]
    fn top_sorts_by_score_then_newer_first() {
        let mut store = LeaderboardStore::new();
        store.entries = vec![
            entry("low", 10, "2026-08-25T10:00:00.000Z"),
            entry("high", 50, "2026-08-25T10:01:00.000Z"),
            entry("tie_old", 30, "2026-08-25T09:00:00.000Z"),
            entry("tie_new", 30, "2026-08-25T11:00:00.000Z"),
        ];

        let top = store.top();
        let order: Vec<&str> = top.iter().map(|e| e.address.as_str()).collect();
        assert_eq!(order, vec!["high", "tie_new", "tie_old", "low"]);
    }

    #[test]
    fn top_caps_at_the_limit() {
        let mut store = LeaderboardStore::new();
        for idx in 0..105 {
            store.entries.push(entry(
                &format!("player{idx}"),
                idx,
                "2026-08-25T10:00:00.000Z",
            ));
        }
        let top = store.top();
        assert_eq!(top.len(), LEADERBOARD_LIMIT);
        // Highest scores survive the cut.
        assert_eq!(top[0].score, 104);
        assert_eq!(top[LEADERBOARD_LIMIT - 1].score, 5);
    }
}
