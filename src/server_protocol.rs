use serde_json::Value;

use crate::types::{BoundaryMode, Direction, Theme};

#[derive(Debug)]
pub enum ParsedClientMessage {
    StartRun {
        theme: Option<Theme>,
        boundary: Option<BoundaryMode>,
        seed: Option<u32>,
    },
    Input {
        dir: Direction,
    },
    Publish {
        address: Option<String>,
        chain_id: Option<i64>,
    },
    Ping {
        t: f64,
    },
}

/// Strict parse of one client frame: a field that is present but
/// malformed rejects the whole message.
pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "start_run" => {
            let theme = match object.get("theme") {
                None => None,
                Some(value) => Theme::parse(value.as_str()?),
            };
            if object.get("theme").is_some() && theme.is_none() {
                return None;
            }
            let boundary = match object.get("boundary") {
                None => None,
                Some(value) => BoundaryMode::parse(value.as_str()?),
            };
            if object.get("boundary").is_some() && boundary.is_none() {
                return None;
            }
            let seed = parse_optional_u32(object.get("seed"))?;
            Some(ParsedClientMessage::StartRun {
                theme,
                boundary,
                seed,
            })
        }
        "input" => {
            let dir = Direction::parse_move(object.get("dir")?.as_str()?)?;
            Some(ParsedClientMessage::Input { dir })
        }
        "publish" => {
            let address = match object.get("address") {
                None => None,
                Some(value) => Some(value.as_str()?.to_string()),
            };
            let chain_id = match object.get("chainId") {
                None => None,
                Some(value) => Some(value.as_i64()?),
            };
            Some(ParsedClientMessage::Publish { address, chain_id })
        }
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

fn parse_optional_u32(value: Option<&Value>) -> Option<Option<u32>> {
    let Some(value) = value else {
        return Some(None);
    };
    if let Some(number) = value.as_u64() {
        return u32::try_from(number).ok().map(Some);
    }
    if let Some(number) = value.as_f64() {
        if number.is_finite() && number >= 0.0 && number.floor() <= u32::MAX as f64 {
            return Some(Some(number.floor() as u32));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_start_run_with_full_options() {
        let parsed = parse_client_message(
            r#"{"type":"start_run","theme":"memes","boundary":"bounded","seed":7}"#,
        )
        .expect("start_run should parse");
        match parsed {
            ParsedClientMessage::StartRun {
                theme,
                boundary,
                seed,
            } => {
                assert_eq!(theme, Some(Theme::Memes));
                assert_eq!(boundary, Some(BoundaryMode::Bounded));
                assert_eq!(seed, Some(7));
            }
            _ => panic!("expected start_run message"),
        }
    }

    #[test]
    fn parse_start_run_without_options() {
        let parsed =
            parse_client_message(r#"{"type":"start_run"}"#).expect("start_run should parse");
        assert!(matches!(
            parsed,
            ParsedClientMessage::StartRun {
                theme: None,
                boundary: None,
                seed: None,
            }
        ));
    }

    #[test]
    fn parse_start_run_rejects_unknown_theme_or_boundary() {
        assert!(parse_client_message(r#"{"type":"start_run","theme":"sports"}"#).is_none());
        assert!(parse_client_message(r#"{"type":"start_run","boundary":"donut"}"#).is_none());
    }

    #[test]
    fn parse_start_run_seed_bounds() {
        assert!(parse_client_message(r#"{"type":"start_run","seed":-1}"#).is_none());
        assert!(parse_client_message(r#"{"type":"start_run","seed":4294967296}"#).is_none());
        assert!(parse_client_message(r#"{"type":"start_run","seed":1e100}"#).is_none());

        let parsed = parse_client_message(r#"{"type":"start_run","seed":12.9}"#)
            .expect("float seeds floor");
        assert!(matches!(
            parsed,
            ParsedClientMessage::StartRun { seed: Some(12), .. }
        ));
    }

    #[test]
    fn parse_input_requires_a_valid_direction() {
        let parsed = parse_client_message(r#"{"type":"input","dir":"up"}"#)
            .expect("input should parse");
        assert!(matches!(
            parsed,
            ParsedClientMessage::Input {
                dir: Direction::Up
            }
        ));

        assert!(parse_client_message(r#"{"type":"input","dir":"diagonal"}"#).is_none());
        assert!(parse_client_message(r#"{"type":"input"}"#).is_none());
    }

    #[test]
    fn parse_publish_message() {
        let parsed = parse_client_message(
            r#"{"type":"publish","address":"0xabc","chainId":84532}"#,
        )
        .expect("publish should parse");
        match parsed {
            ParsedClientMessage::Publish { address, chain_id } => {
                assert_eq!(address.as_deref(), Some("0xabc"));
                assert_eq!(chain_id, Some(84_532));
            }
            _ => panic!("expected publish message"),
        }

        let parsed =
            parse_client_message(r#"{"type":"publish"}"#).expect("bare publish should parse");
        assert!(matches!(
            parsed,
            ParsedClientMessage::Publish {
                address: None,
                chain_id: None,
            }
        ));
    }

    #[test]
    fn parse_publish_rejects_malformed_fields() {
        assert!(parse_client_message(r#"{"type":"publish","address":42}"#).is_none());
        assert!(parse_client_message(r#"{"type":"publish","chainId":"84532"}"#).is_none());
    }

    #[test]
    fn parse_ping_requires_finite_number() {
        assert!(matches!(
            parse_client_message(r#"{"type":"ping","t":12.5}"#),
            Some(ParsedClientMessage::Ping { .. })
        ));
        assert!(parse_client_message(r#"{"type":"ping","t":"12"}"#).is_none());
    }

    #[test]
    fn parse_rejects_unknown_or_garbage_frames() {
        assert!(parse_client_message(r#"{"type":"lobby_start"}"#).is_none());
        assert!(parse_client_message("not json").is_none());
        assert!(parse_client_message(r#"["type","ping"]"#).is_none());
        assert!(parse_client_message(r#"{"kind":"ping"}"#).is_none());
    }
}
