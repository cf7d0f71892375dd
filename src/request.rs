//! §3 "Run request": name of the guest function, argument count, argv.
//! Owned by COMM, snapshotted by RUNNER before use.

/// Maximum length of a guest function name (§3: "≤63 bytes").
pub const FUNC_NAME_CAPACITY: usize = 63;

pub type FuncName = heapless::String<FUNC_NAME_CAPACITY>;

/// Maximum number of integer arguments a `START` can carry (§4.3).
pub const MAX_ARGC: usize = 4;

pub struct RunRequest {
    pub func_name: FuncName,
    pub argc: usize,
    pub argv: [u32; MAX_ARGC],
}

/// Truncates `name` to [`FUNC_NAME_CAPACITY`] bytes at a char boundary.
pub fn truncated_func_name(name: &str) -> FuncName {
    let mut cut = name.len().min(FUNC_NAME_CAPACITY);
    while cut > 0 && !name.is_char_boundary(cut) {
        cut -= 1;
    }
    FuncName::try_from(&name[..cut]).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_name_is_truncated() {
        let long = "x".repeat(100);
        let truncated = truncated_func_name(&long);
        assert_eq!(truncated.len(), FUNC_NAME_CAPACITY);
    }

    #[test]
    fn short_name_is_unchanged() {
        assert_eq!(truncated_func_name("run").as_str(), "run");
    }
}
