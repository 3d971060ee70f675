//! Extraction of the remote exit-status sentinel from command output.
//!
//! The status suffix appended to a worker's command (see
//! [`crate::DispatchOptions::status_suffix`] in `rexec-engine`) writes
//! [`MAGIC`] followed by a decimal exit code into the last chunk of
//! remote stdout. The command-stream driver calls [`extract_rc`] on
//! every line; when it returns `Some`, the line is replaced by the
//! truncated text and the worker's `remote_rc` is overwritten (the
//! last sentinel observed wins).

/// Magic substring marking an embedded remote exit code. Chosen to be
/// vanishingly unlikely to occur in ordinary command output.
pub const MAGIC: &str = "XXRC=";

/// Look for [`MAGIC`] in `line`. If found, returns the line with
/// everything from the magic onward removed (preserving a trailing
/// newline if the original line had one and the magic did not begin at
/// column 0) paired with the decimal integer that followed the magic.
/// `atoi`-style: parses the longest leading run of ASCII digits after
/// the magic, defaulting to 0 if none are present.
///
/// A line with no magic is returned unchanged with `None`.
pub fn extract_rc(line: &str) -> (String, Option<i32>) {
    let Some(idx) = line.find(MAGIC) else {
        return (line.to_string(), None);
    };

    let digits_start = idx + MAGIC.len();
    let digits: String = line[digits_start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let code = digits.parse::<i32>().unwrap_or(0);

    let had_newline = line.ends_with('\n');
    let magic_at_column_zero = idx == 0;
    let prefix = &line[..idx];

    let truncated = if had_newline && !magic_at_column_zero {
        format!("{prefix}\n")
    } else {
        prefix.to_string()
    };

    (truncated, Some(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_magic_unchanged() {
        let (text, rc) = extract_rc("hello world\n");
        assert_eq!(text, "hello world\n");
        assert_eq!(rc, None);
    }

    #[test]
    fn magic_mid_line_preserves_newline() {
        let line = format!("PREFIX {MAGIC}7\n");
        let (text, rc) = extract_rc(&line);
        assert_eq!(text, "PREFIX \n");
        assert_eq!(rc, Some(7));
    }

    #[test]
    fn magic_at_column_zero_drops_newline() {
        let line = format!("{MAGIC}42\n");
        let (text, rc) = extract_rc(&line);
        assert_eq!(text, "");
        assert_eq!(rc, Some(42));
    }

    #[test]
    fn magic_without_trailing_newline() {
        let line = format!("PREFIX {MAGIC}0");
        let (text, rc) = extract_rc(&line);
        assert_eq!(text, "PREFIX ");
        assert_eq!(rc, Some(0));
    }

    #[test]
    fn magic_with_no_digits_defaults_zero() {
        let line = format!("PREFIX {MAGIC}\n");
        let (text, rc) = extract_rc(&line);
        assert_eq!(text, "PREFIX \n");
        assert_eq!(rc, Some(0));
    }

    #[test]
    fn roundtrip_property_for_arbitrary_code() {
        for k in [0, 1, 7, 127, 255] {
            let line = format!("some output {MAGIC}{k}\n");
            let (text, rc) = extract_rc(&line);
            assert_eq!(text, "some output \n");
            assert_eq!(rc, Some(k));
        }
    }
}
