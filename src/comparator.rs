//! Output comparison and the text normalization shared across the engine.

/// Normalize program text: CRLF becomes LF, leading and trailing
/// whitespace is dropped. Applied once when expected output is loaded and
/// once at the runner's stdout boundary.
pub fn normalize(s: &str) -> String {
    s.replace("\r\n", "\n").trim().to_string()
}

/// Cap `s` at `max` bytes, noting the original length when cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... (truncated, {} bytes total)", &s[..end], s.len())
}

/// Compares observed output against expected output.
pub struct Comparator {
    strict: bool,
}

impl Comparator {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn compare(&self, program_output: &str, expected_output: &str) -> bool {
        if self.strict {
            return normalize(program_output) == normalize(expected_output);
        }
        // Token-wise: whitespace runs are insignificant.
        let actual = normalize(program_output);
        let expected = normalize(expected_output);
        let mut actual_tokens = actual.split_whitespace();
        let mut expected_tokens = expected.split_whitespace();
        loop {
            match (actual_tokens.next(), expected_tokens.next()) {
                (None, None) => return true,
                (Some(a), Some(e)) if a == e => {}
                _ => return false,
            }
        }
    }
}
