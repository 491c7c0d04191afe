//! Transcript classification
//!
//! Maps an utterance to a work-order command, a step continuation, or a
//! general query. Command rules are evaluated in a fixed precedence order:
//! restart, resume, start, then proceed, then the query fallback.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Work-order reference: "work order", "wo" or "work", optional number marker,
/// then digits that may contain recognizer-inserted spaces or dashes
const WORK_ORDER_REF: &str = r"\b(?:the\s+)?(?:work\s*-?\s*order|wo|work)\b\s*(?:(?:number|no\.?|#)\s*)?[:\-]?\s*(?:wo\s*-?\s*)?(?P<digits>\d(?:[\s\-]*\d)*)";

/// Kind of work-order command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Start fresh (also "help me fix")
    Start,
    /// Resume prior partial progress
    Resume,
    /// Discard progress and start again at step 1
    Restart,
}

impl CommandKind {
    /// Wire/log name of the command
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Resume => "resume",
            Self::Restart => "restart",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified intent of one utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    /// Start a work order
    Start {
        /// Canonical `WO-<digits>` id
        work_order_id: String,
    },
    /// Resume a work order
    Resume {
        /// Canonical `WO-<digits>` id
        work_order_id: String,
    },
    /// Restart a work order from step 1
    Restart {
        /// Canonical `WO-<digits>` id
        work_order_id: String,
    },
    /// Complete the current step and move on
    Proceed,
    /// Anything else, forwarded as a general question
    Query {
        /// Trimmed original text
        text: String,
    },
}

impl Intent {
    /// Build a command intent
    #[must_use]
    pub fn command(kind: CommandKind, work_order_id: String) -> Self {
        match kind {
            CommandKind::Start => Self::Start { work_order_id },
            CommandKind::Resume => Self::Resume { work_order_id },
            CommandKind::Restart => Self::Restart { work_order_id },
        }
    }

    /// The command kind and work-order id, if this is a work-order command
    #[must_use]
    pub fn as_command(&self) -> Option<(CommandKind, &str)> {
        match self {
            Self::Start { work_order_id } => Some((CommandKind::Start, work_order_id)),
            Self::Resume { work_order_id } => Some((CommandKind::Resume, work_order_id)),
            Self::Restart { work_order_id } => Some((CommandKind::Restart, work_order_id)),
            Self::Proceed | Self::Query { .. } => None,
        }
    }
}

/// Ordered command rules; first match wins
///
/// The work-order reference must follow the verb directly; only "on" or
/// "with" may sit between them.
static COMMAND_RULES: LazyLock<Vec<(CommandKind, Regex)>> = LazyLock::new(|| {
    let rule = |verbs: &str| {
        Regex::new(&format!(
            r"(?i)\b(?:{verbs})\s+(?:(?:on|with)\s+)?{WORK_ORDER_REF}"
        ))
        .expect("valid regex")
    };
    vec![
        (CommandKind::Restart, rule(r"restart|start\s+over")),
        (
            CommandKind::Resume,
            rule(r"resume|continue|pick\s+up|get\s+back\s+to"),
        ),
        (
            CommandKind::Start,
            rule(r"start|begin|help[\s\-]+me[\s\-]+(?:fix|with|repair)"),
        ),
    ]
});

/// Continuation verbs; only meaningful with an active session
static PROCEED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:proceed|continue|next|completed|done)\b").expect("valid regex")
});

/// Classify an utterance
///
/// `session_active` gates the proceed intent: without a session a
/// continuation phrase is just a question.
#[must_use]
pub fn classify(text: &str, session_active: bool) -> Intent {
    if let Some(intent) = classify_command(text) {
        return intent;
    }

    if session_active && is_proceed(text) {
        return Intent::Proceed;
    }

    Intent::Query {
        text: text.trim().to_string(),
    }
}

/// Match only the start/resume/restart rules
#[must_use]
pub fn classify_command(text: &str) -> Option<Intent> {
    COMMAND_RULES.iter().find_map(|(kind, re)| {
        let caps = re.captures(text)?;
        let id = normalize_work_order_id(caps.name("digits")?.as_str())?;
        Some(Intent::command(*kind, id))
    })
}

/// Whether the text contains a continuation verb
#[must_use]
pub fn is_proceed(text: &str) -> bool {
    PROCEED.is_match(text)
}

/// Canonicalize a spoken/typed work-order number to `WO-<digits>`
///
/// Whitespace and dashes between digits are dropped ("2 0 2 4" → `WO-2024`).
#[must_use]
pub fn normalize_work_order_id(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("WO-{digits}"))
    }
}

/// Normalize a transcript for comparisons: lowercase, punctuation stripped,
/// whitespace collapsed
#[must_use]
pub fn normalize_transcript(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(id: &str) -> Intent {
        Intent::Start {
            work_order_id: id.to_string(),
        }
    }

    #[test]
    fn help_me_fix_is_start() {
        assert_eq!(
            classify("help me fix work order 20241008", false),
            start("WO-20241008")
        );
        assert_eq!(classify("Help-me-fix WO 17", false), start("WO-17"));
    }

    #[test]
    fn spaced_digits_are_joined() {
        assert_eq!(
            classify("restart work order 2 0 2 4", false),
            Intent::Restart {
                work_order_id: "WO-2024".to_string()
            }
        );
    }

    #[test]
    fn restart_is_not_mistaken_for_start() {
        // "restart" contains "start"; precedence must still pick restart
        let intent = classify("please restart the work order 55", true);
        assert_eq!(intent.as_command(), Some((CommandKind::Restart, "WO-55")));
    }

    #[test]
    fn continue_with_reference_is_resume_not_proceed() {
        assert_eq!(
            classify("continue work order 12", true),
            Intent::Resume {
                work_order_id: "WO-12".to_string()
            }
        );
    }

    #[test]
    fn proceed_requires_session() {
        assert_eq!(classify("next", true), Intent::Proceed);
        assert_eq!(
            classify("next", false),
            Intent::Query {
                text: "next".to_string()
            }
        );
    }

    #[test]
    fn verb_far_from_reference_is_query() {
        for text in [
            "how do I reset the breaker on work order 12",
            "can you open the manual for work order 12",
            "should I start by checking the pump, it is for work order 12",
        ] {
            assert!(classify_command(text).is_none(), "{text}");
        }
    }

    #[test]
    fn command_without_number_is_query() {
        assert!(matches!(classify("start work order", false), Intent::Query { .. }));
    }

    #[test]
    fn prefixed_wo_ids_are_canonical() {
        assert_eq!(classify("start WO-0042", false), start("WO-0042"));
        assert_eq!(classify("begin work order number 7", false), start("WO-7"));
    }

    #[test]
    fn normalize_transcript_strips_punctuation() {
        assert_eq!(normalize_transcript("  Hey, Assistant!  "), "hey assistant");
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(start("WO-1")).unwrap();
        assert_eq!(json["kind"], "start");
        assert_eq!(json["work_order_id"], "WO-1");
    }
}
