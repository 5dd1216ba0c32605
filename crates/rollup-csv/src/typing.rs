use regex::Regex;
use rollup_engine::Value;
use std::sync::OnceLock;

/// Exclusive bound on numbers accepted by dynamic typing (2^53).
///
/// Literals at or beyond it would lose precision as `f64`, so they stay text.
const MAX_EXACT_NUMBER: f64 = 9_007_199_254_740_992.0;

fn number_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*-?(\d+\.?|\.\d+|\d+\.\d+)([eE][-+]?\d+)?\s*$")
            .expect("number literal pattern is valid")
    })
}

/// Converts one CSV cell into a [`Value`].
///
/// With `dynamic` off every cell is text. Otherwise `true`/`TRUE`/`false`/`FALSE` become
/// booleans, decimal literals within ±2^53 become numbers, empty cells become blank, and
/// everything else stays text.
pub(crate) fn type_cell(raw: &str, dynamic: bool) -> Value {
    if !dynamic {
        return Value::Text(raw.to_string());
    }

    match raw {
        "" => return Value::Blank,
        "true" | "TRUE" => return Value::Bool(true),
        "false" | "FALSE" => return Value::Bool(false),
        _ => {}
    }

    if number_literal().is_match(raw) {
        if let Ok(n) = raw.trim().parse::<f64>() {
            if n > -MAX_EXACT_NUMBER && n < MAX_EXACT_NUMBER {
                return Value::Number(n);
            }
        }
    }

    Value::Text(raw.to_string())
}
