//! Transcript classification tests over realistic recognizer output

use workorder_voice::classifier::{classify_command, is_proceed, normalize_work_order_id};
use workorder_voice::{CommandKind, Intent, classify};

fn command(text: &str) -> Option<(CommandKind, String)> {
    classify(text, false)
        .as_command()
        .map(|(kind, id)| (kind, id.to_string()))
}

#[test]
fn test_recognizer_variants_of_start() {
    for text in [
        "help me fix work order 20241008",
        "Help me fix work order 2024 1008.",
        "start work order number 20241008",
        "begin the work order #20241008",
        "help me with WO 20241008",
    ] {
        assert_eq!(
            command(text),
            Some((CommandKind::Start, "WO-20241008".to_string())),
            "{text}"
        );
    }
}

#[test]
fn test_resume_and_restart() {
    assert_eq!(
        command("pick up work order 7"),
        Some((CommandKind::Resume, "WO-7".to_string()))
    );
    assert_eq!(
        command("let's start over on work order 7"),
        Some((CommandKind::Restart, "WO-7".to_string()))
    );
    assert_eq!(
        command("Restart WO-7"),
        Some((CommandKind::Restart, "WO-7".to_string()))
    );
}

#[test]
fn test_commands_win_over_proceed() {
    // "continue" is both a proceed verb and a resume verb
    assert_eq!(
        classify("continue work order 9", true),
        Intent::Resume {
            work_order_id: "WO-9".to_string()
        }
    );
    assert_eq!(classify("Okay, done.", true), Intent::Proceed);
}

#[test]
fn test_everything_else_is_a_query() {
    let intent = classify("  what torque for the cover bolts?  ", true);
    assert_eq!(
        intent,
        Intent::Query {
            text: "what torque for the cover bolts?".to_string()
        }
    );
    assert!(classify_command("start the pump").is_none());
    assert!(!is_proceed("is the nextel radio charged"));
}

#[test]
fn test_questions_mentioning_a_work_order_stay_queries() {
    for text in [
        "how do I reset the breaker on work order 12",
        "can you open the manual for work order 12",
        "should I start by checking the pump, it is for work order 12",
        "redo the seal on work order 12?",
        "why did the pump restart during work order 12",
    ] {
        assert_eq!(
            classify(text, true),
            Intent::Query {
                text: text.to_string()
            },
            "{text}"
        );
    }
}

#[test]
fn test_work_order_ids_are_normalized() {
    assert_eq!(normalize_work_order_id("2 0-2 4"), Some("WO-2024".to_string()));
    assert_eq!(normalize_work_order_id("no digits"), None);
}
