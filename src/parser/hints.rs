//! Advisory hints appended to parse errors
//!
//! Hints never change what parses; they only extend the message with a
//! `Help:` section, the same way for every entry point.

use crate::lexer::TokenKind;
use crate::types::RillType;

const KEYWORDS: &[&str] = &[
    "true", "false", "break", "return", "each", "map", "fold", "filter",
];

const ASSIGNMENT: &str = "Rill has no assignment operator. Capture a value with `->`.\n\
     Example: \"World\" -> $name";

/// Hint for a capture followed by more pipe steps
pub(crate) const CAPTURE_CONTINUES: &str =
    "A `-> $name` capture ends the chain. Use `:> $name` to capture and keep piping.\n\
     Example: \"hi\" :> $greeting -> .upper";

/// Append a `Help:` section to a message
pub(crate) fn with_help(mut message: String, hint: Option<String>) -> String {
    if let Some(hint) = hint {
        message.push_str("\n\nHelp: ");
        message.push_str(&hint);
    }
    message
}

/// Hint for an `expected X, found Y` error
pub(crate) fn for_expected(expected: &TokenKind, found: &TokenKind) -> Option<String> {
    let hint = match (expected, found) {
        (_, TokenKind::Assign) => ASSIGNMENT,
        (TokenKind::RightParen, TokenKind::Eof) => "Missing closing `)` for an earlier `(`.",
        (TokenKind::RightParen, _) => {
            "Missing closing `)`, or a `,` between arguments."
        }
        (TokenKind::RightBracket, _) => {
            "Missing closing `]`, or a `,` between elements."
        }
        (TokenKind::RightBrace, _) => "Missing closing `}` for an earlier `{`.",
        (TokenKind::Pipe, _) => {
            "Closure parameters are written `|a, b: number = 1|`."
        }
        (TokenKind::Gt, _) => "Close the pattern with `>`.",
        (TokenKind::Colon, _) => "Dict entries are written `key: value`.",
        _ => return for_unexpected(found),
    };
    Some(hint.to_string())
}

/// Hint for a token that cannot appear where it was found
pub(crate) fn for_unexpected(found: &TokenKind) -> Option<String> {
    match found {
        TokenKind::Assign => Some(ASSIGNMENT.to_string()),
        TokenKind::Identifier(word) => {
            foreign_keyword(word).map(str::to_string).or_else(|| keyword_typo(word))
        }
        TokenKind::Arrow => Some(
            "`->` needs a value on its left. Start the chain with an expression.".to_string(),
        ),
        TokenKind::Bang => Some(
            "`!` introduces the else branch of a conditional: `cond ? then ! else`.".to_string(),
        ),
        _ => None,
    }
}

/// "Did you mean" suggestion for a misspelled keyword
pub(crate) fn keyword_typo(word: &str) -> Option<String> {
    if word.len() < 3 || KEYWORDS.contains(&word) {
        return None;
    }
    closest(word, KEYWORDS).map(|kw| format!("Did you mean the keyword `{}`?", kw))
}

/// Hint for keywords borrowed from other languages
pub(crate) fn foreign_keyword(word: &str) -> Option<&'static str> {
    let hint = match word {
        "if" | "else" | "elif" | "elseif" | "then" | "switch" | "case" => {
            "Conditionals are written `condition ? then ! else`.\n\
             Example: $n > 0 ? \"positive\" ! \"not positive\""
        }
        "while" | "for" | "loop" | "foreach" | "do" => {
            "Loops are written `input @ body`.\n\
             Example: ($i < 10) @ { $ + 1 }  or  $items -> @{ $ -> log }"
        }
        "let" | "var" | "const" | "set" | "val" => {
            "Capture values with `->`.\nExample: 42 -> $answer"
        }
        "function" | "fn" | "def" | "func" | "lambda" => {
            "Closures are written `|params| body`.\nExample: |x: number| { $x * 2 } -> $double"
        }
        "null" | "nil" | "None" | "undefined" => {
            "Rill has no null literal. Use `?? default` or `.?field` existence checks."
        }
        _ => return None,
    };
    Some(hint)
}

/// Hint for an unknown type name
pub(crate) fn for_type_name(name: &str) -> String {
    match closest(name, RillType::known_names()) {
        Some(ty) => format!("Did you mean `{}`?", ty),
        None => format!("Known types: {}", RillType::known_names().join(", ")),
    }
}

/// Candidate within edit distance 2, nearest first
pub(crate) fn closest<'k>(word: &str, candidates: &[&'k str]) -> Option<&'k str> {
    candidates
        .iter()
        .map(|candidate| (edit_distance(word, candidate), *candidate))
        .filter(|(distance, _)| *distance <= 2)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

/// Levenshtein distance over characters
pub(crate) fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            row[j + 1] = substitution.min(previous[j + 1] + 1).min(row[j] + 1);
        }
        std::mem::swap(&mut previous, &mut row);
    }

    previous[b.len()]
}
