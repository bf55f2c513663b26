//! Command parser — pull `[{"name": args}, ...]` out of free-form model text.
//!
//! Models wrap their command array in prose, forget commas, or emit two
//! arrays in a row. The parser takes everything between the first `[` and
//! the last `]`; when that is not a valid array of objects it falls back to
//! collecting every brace-balanced `{...}` object that parses on its own.

use ironloop_core::{CommandRequest, CommandValue, ParseError};
use serde_json::{Map, Value};
use tracing::debug;

/// Long-form names mapped onto the canonical command names.
const ALIASES: &[(&str, &str)] = &[
    ("write_file", "write"),
    ("read_file", "read"),
    ("delete_file", "delete"),
    ("list_files", "list"),
    ("google", "search"),
    ("bing", "ask"),
];

/// Extract the ordered command requests from `text`.
pub fn parse(text: &str) -> Result<Vec<CommandRequest>, ParseError> {
    let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) else {
        return Err(ParseError::NoArray(text.to_string()));
    };
    if end < start {
        return Err(ParseError::NoArray(text.to_string()));
    }
    let fragment = &text[start..=end];

    let objects = match serde_json::from_str::<Vec<Map<String, Value>>>(fragment) {
        Ok(objects) => objects,
        Err(e) => {
            debug!(error = %e, "Command array is not valid JSON, scanning for objects");
            let objects: Vec<Map<String, Value>> = scan_objects(fragment)
                .into_iter()
                .filter_map(|raw| serde_json::from_str(raw).ok())
                .collect();
            if objects.is_empty() {
                return Err(ParseError::InvalidArray {
                    fragment: fragment.to_string(),
                    reason: e.to_string(),
                });
            }
            objects
        }
    };

    Ok(objects
        .into_iter()
        .flat_map(|object| object.into_iter())
        .map(|(name, value)| CommandRequest::new(normalize_name(&name), CommandValue::into_args(value)))
        .collect())
}

/// Trim, lowercase, turn spaces and hyphens into underscores, then resolve
/// aliases.
pub fn normalize_name(name: &str) -> String {
    let name = name.trim().to_lowercase().replace(['-', ' '], "_");
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(name)
}

/// Top-level brace-balanced objects in `text`. Braces inside string
/// literals are ignored.
fn scan_objects(text: &str) -> Vec<&str> {
    let mut objects = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    objects.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    objects
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CommandValue {
        CommandValue::Text(s.into())
    }

    #[test]
    fn single_command() {
        let reqs = parse(r#"[{"talk":"blah"}]"#).unwrap();
        assert_eq!(reqs, vec![CommandRequest::new("talk", vec![text("blah")])]);
    }

    #[test]
    fn two_arrays_keep_order() {
        let reqs = parse(r#"[{"talk":"blah"}] [{"talk":"blah"}]"#).unwrap();
        assert_eq!(reqs.len(), 2);
        assert!(reqs.iter().all(|r| r.name == "talk" && r.args == vec![text("blah")]));
    }

    #[test]
    fn array_arguments_are_kept() {
        let reqs = parse(r#"[{"write": ["file.txt","hello world"]}]"#).unwrap();
        assert_eq!(
            reqs,
            vec![CommandRequest::new(
                "write",
                vec![text("file.txt"), text("hello world")]
            )]
        );
    }

    #[test]
    fn embedded_in_prose() {
        let reply = r#"Sure! Here is my plan:
{
  "thoughts": {"text": "look around"},
  "commands": [
    {"list": "."},
    {"Read-File": "notes.txt"}
  ]
}"#;
        let reqs = parse(reply).unwrap();
        assert_eq!(reqs[0], CommandRequest::new("list", vec![text(".")]));
        assert_eq!(reqs[1], CommandRequest::new("read", vec![text("notes.txt")]));
    }

    #[test]
    fn object_keys_keep_their_order() {
        let reqs = parse(r#"[{"think": "a", "bash": "ls", "exit": null}]"#).unwrap();
        let names: Vec<_> = reqs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["think", "bash", "exit"]);
        assert_eq!(reqs[2].args, vec![CommandValue::Null]);
    }

    #[test]
    fn fallback_skips_broken_objects() {
        let reply = r#"[{"bash": "ls"}, {"write": ["a.txt", "x"}, {"talk": "still here"}"#;
        // Missing closing bracket means no array at all.
        assert!(matches!(parse(reply), Err(ParseError::NoArray(_))));

        let reply = r#"[{"bash": "ls"}, {"write": ["a.txt", "x"}, {"talk": "still here"}]"#;
        let reqs = parse(reply).unwrap();
        let names: Vec<_> = reqs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["bash", "talk"]);
    }

    #[test]
    fn braces_inside_strings_do_not_split_objects() {
        let reply = r#"[{"write": ["main.rs", "fn main() { println!(\"}\"); }"]} oops]"#;
        let reqs = parse(reply).unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].args[1], text(r#"fn main() { println!("}"); }"#));
    }

    #[test]
    fn nothing_parseable_is_an_error() {
        assert!(matches!(
            parse("I am done."),
            Err(ParseError::NoArray(_))
        ));
        assert!(matches!(
            parse("[not json at all]"),
            Err(ParseError::InvalidArray { .. })
        ));
        assert!(matches!(parse("] backwards ["), Err(ParseError::NoArray(_))));
    }

    #[test]
    fn names_are_normalized() {
        assert_eq!(normalize_name("  Write-File "), "write");
        assert_eq!(normalize_name("list files"), "list");
        assert_eq!(normalize_name("GOOGLE"), "search");
        assert_eq!(normalize_name("bing"), "ask");
        assert_eq!(normalize_name("Custom Thing"), "custom_thing");
    }

    #[test]
    fn result_list_round_trips() {
        use ironloop_core::CommandResult;
        use serde_json::json;

        let results = vec![
            CommandResult::new("bash", "hello\n"),
            CommandResult::new("list", json!(["a.txt", "src/"])),
        ];
        let prompt = serde_json::to_string_pretty(&results).unwrap();
        let reqs = parse(&prompt).unwrap();
        assert_eq!(reqs[0], CommandRequest::new("bash", vec![text("hello\n")]));
        assert_eq!(
            reqs[1],
            CommandRequest::new("list", vec![text("a.txt"), text("src/")])
        );
    }
}
