//! Autocomplete helper for the filter input. Purely advisory: suggestions
//! never influence evaluation.

/// Values observed on the current flow set, used to complete field values.
#[derive(Clone, Debug, Default)]
pub struct SeenValues {
    pub services: Vec<String>,
    pub ports: Vec<String>,
    pub ips: Vec<String>,
    pub interfaces: Vec<String>,
}

const MAX_SUGGESTIONS: usize = 10;
const MAX_VALUES: usize = 15;

/// Produces completion candidates for the text currently in the filter
/// input. The first entry is always the text itself so that accepting a
/// suggestion never destroys what the user typed.
pub fn suggestions(current_text: &str, history: &[String], seen: &SeenValues) -> Vec<String> {
    if current_text.is_empty() {
        return history.iter().take(5).cloned().collect();
    }

    let mut out = vec![current_text.to_string()];

    let words: Vec<&str> = current_text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let ends_with_space = current_text.ends_with(' ');
    let last_word = if ends_with_space {
        ""
    } else {
        words[words.len() - 1]
    };
    let prefix = last_word.to_ascii_lowercase();

    // `!cond` and `-cond` negate; complete the part after the sign.
    let (negation, field_part) = match prefix.strip_prefix('!') {
        Some(rest) => ("!", rest),
        None => match prefix.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", prefix.as_str()),
        },
    };

    // Everything before the word being completed.
    let existing = if ends_with_space {
        current_text.to_string()
    } else if words.len() > 1 {
        format!("{} ", words[..words.len() - 1].join(" "))
    } else {
        String::new()
    };

    if let Some((field, value_part, sep)) = split_field_value(field_part) {
        for value in field_values(field, value_part, seen) {
            let suggestion = format!("{existing}{negation}{field}{sep}{value}");
            if suggestion != current_text {
                out.push(suggestion);
            }
        }
    } else {
        const FIELD_NAMES: [&str; 13] = [
            "src=", "dst=", "ip=", "host=", "port:", "srcport:", "dstport:", "proto=", "service=",
            "svc=", "if=", "inif=", "outif=",
        ];
        for name in FIELD_NAMES {
            if field_part.is_empty() || name.to_ascii_lowercase().starts_with(field_part) {
                let suggestion = format!("{existing}{negation}{name}");
                if suggestion != current_text {
                    out.push(suggestion);
                }
            }
        }

        // After a complete condition, offer the connectives.
        if field_part.is_empty() && !existing.is_empty() {
            for op in ["&& ", "|| "] {
                let suggestion = format!("{existing}{op}");
                if suggestion != current_text {
                    out.push(suggestion);
                }
            }
        }

        for h in history {
            if h.to_ascii_lowercase()
                .starts_with(&current_text.to_ascii_lowercase())
                && h != current_text
            {
                out.push(h.clone());
            }
        }
    }

    let mut seen_set = std::collections::HashSet::new();
    out.retain(|s| seen_set.insert(s.clone()));
    out.truncate(MAX_SUGGESTIONS);

    // Nothing beyond the user's own text means nothing to offer.
    if out.len() <= 1 {
        return Vec::new();
    }
    out
}

fn split_field_value(part: &str) -> Option<(&str, &str, char)> {
    for sep in ['=', ':'] {
        if let Some((field, value)) = part.split_once(sep) {
            return Some((field, value, sep));
        }
    }
    None
}

fn field_values(field: &str, value_part: &str, seen: &SeenValues) -> Vec<String> {
    let value_part = value_part.to_ascii_lowercase();
    let candidates: Vec<String> = match field {
        "proto" | "protocol" => ["tcp", "udp", "icmp", "gre", "esp", "ah"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        "service" | "svc" => seen.services.clone(),
        "port" | "srcport" | "dstport" | "sport" | "dport" => seen.ports.clone(),
        "src" | "dst" | "ip" | "host" | "sip" | "dip" | "srcip" | "dstip" => seen.ips.clone(),
        "if" | "inif" | "outif" => seen.interfaces.clone(),
        _ => Vec::new(),
    };

    let mut values: Vec<String> = candidates
        .into_iter()
        .filter(|c| value_part.is_empty() || c.to_ascii_lowercase().starts_with(&value_part))
        .collect();
    values.truncate(MAX_VALUES);
    values
}
