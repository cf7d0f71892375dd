//! C3: command parser. Tokenizes a received line into a verb and a
//! free-form tail, and extracts `key=value` and `args="k1=v1,k2=v2"`
//! parameters from that tail.

const MAX_CALL_ARGS: usize = 4;

/// A parsed command line: the verb and a reference to the remainder of the
/// line, from which parameters can be extracted on demand.
pub struct CommandLine<'a> {
    pub verb: &'a str,
    tail: &'a str,
}

impl<'a> CommandLine<'a> {
    /// Splits `line` into its verb and tail. Returns `None` for an empty or
    /// whitespace-only line.
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim_end_matches(['\n', '\r']);
        let mut parts = line.splitn(2, char::is_whitespace);
        let verb = parts.next()?;
        if verb.is_empty() {
            return None;
        }
        let tail = parts.next().unwrap_or("").trim_start();
        Some(Self { verb, tail })
    }

    /// Finds `key=` in the tail, accepting a match only when the character
    /// immediately preceding it is absent or not itself part of an
    /// identifier-like token boundary is irrelevant. Per the spec, a match
    /// is accepted whenever the byte *after* `key` is `=`, tolerating `key`
    /// appearing as a suffix of another token.
    fn find_param(&self, key: &str) -> Option<&'a str> {
        let mut search_from = 0;
        while let Some(rel) = self.tail[search_from..].find(key) {
            let at = search_from + rel;
            let after = at + key.len();
            if self.tail.as_bytes().get(after) == Some(&b'=') {
                return Some(&self.tail[after + 1..]);
            }
            search_from = at + 1;
        }
        None
    }

    /// Extracts the value of `key=`, running from just after `=` up to the
    /// first space, CR, LF, or end of string.
    pub fn param(&self, key: &str) -> Option<&'a str> {
        let start = self.find_param(key)?;
        let end = start
            .find([' ', '\r', '\n'])
            .unwrap_or(start.len());
        Some(&start[..end])
    }

    /// Parses the special `args="k1=v1,k2=v2,..."` form into up to 4 signed
    /// integer values, keyed by their textual order (the keys themselves
    /// are discarded, only the right-hand sides are collected, matching
    /// the original firmware's positional argv).
    pub fn args(&self) -> heapless::Vec<i64, MAX_CALL_ARGS> {
        let mut out = heapless::Vec::new();
        let Some(after_key) = self.find_param("args") else {
            return out;
        };
        let Some(body) = after_key.strip_prefix('"') else {
            return out;
        };
        let Some(end) = body.find('"') else {
            return out;
        };
        let body = &body[..end];

        for token in body.split(',') {
            if out.is_full() {
                break;
            }
            if let Some((_, value)) = token.split_once('=') {
                if let Ok(parsed) = value.trim().parse::<i64>() {
                    let _ = out.push(parsed);
                }
            }
        }
        out
    }
}
