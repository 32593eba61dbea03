//! Runs the external rule tool
//!
//! Commands go through `/bin/sh -c` and block until the child exits, so
//! anything taken from outside the program (rule file paths, chain names)
//! must be wrapped with [`shellquote`] first.

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::error::{HelperError, HelperResult};

/// Default nftables binary.
pub const NFT_CMD: &str = "/usr/sbin/nft";

const SH_CMD: &str = "/bin/sh";

/// Characters still special inside double quotes
static DQUOTE_SPECIALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[$`"\\\n]"#).expect("Invalid regex pattern"));

/// Double-quotes `s` for `/bin/sh`, backslash-escaping `$`, `` ` ``, `"`,
/// `\` and newline.
///
/// ```
/// use dhcp_helper_common::shell::shellquote;
///
/// assert_eq!(shellquote("/tmp/dhcp-helper.a1B2c3"), "\"/tmp/dhcp-helper.a1B2c3\"");
/// assert_eq!(shellquote("dhcpr-$x"), "\"dhcpr-\\$x\"");
/// ```
pub fn shellquote(s: &str) -> String {
    format!("\"{}\"", DQUOTE_SPECIALS.replace_all(s, r"\$0"))
}

/// Runs `cmd` and returns its trimmed stdout.
///
/// A non-zero exit is returned as [`HelperError::ShellCommandFailed`] with
/// whatever the tool printed; a child killed by a signal reports exit
/// code -1.
pub fn run(cmd: &str) -> HelperResult<String> {
    debug!(command = %cmd, "Running");

    let output = Command::new(SH_CMD)
        .args(["-c", cmd])
        .stdin(Stdio::null())
        .output()
        .map_err(|source| HelperError::ShellExec {
            command: cmd.to_string(),
            source,
        })?;

    let stdout = trimmed(&output.stdout);
    if output.status.success() {
        return Ok(stdout);
    }

    let exit_code = output.status.code().unwrap_or(-1);
    let stderr = trimmed(&output.stderr);
    warn!(command = %cmd, exit_code, stderr = %stderr, "Command failed");

    let printed: Vec<String> = [stdout, stderr]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
    Err(HelperError::ShellCommandFailed {
        command: cmd.to_string(),
        exit_code,
        output: printed.join("\n"),
    })
}

fn trimmed(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shellquote_plain_names() {
        assert_eq!(shellquote("dhcpr-input"), "\"dhcpr-input\"");
        assert_eq!(
            shellquote("/tmp/dhcp-helper.a1B2c3"),
            "\"/tmp/dhcp-helper.a1B2c3\""
        );
        assert_eq!(shellquote(""), "\"\"");
    }

    #[test]
    fn test_shellquote_escapes_specials() {
        assert_eq!(shellquote("$TMPDIR/r"), "\"\\$TMPDIR/r\"");
        assert_eq!(shellquote("a`id`"), "\"a\\`id\\`\"");
        assert_eq!(shellquote("iif \"eth0\""), "\"iif \\\"eth0\\\"\"");
        assert_eq!(shellquote("C:\\rules"), "\"C:\\\\rules\"");
        assert_eq!(shellquote("a\nb"), "\"a\\\nb\"");
    }

    #[test]
    fn test_run_passes_quoted_path_literally() {
        let path = "/tmp/dhcp helper.`id`$HOME; rm x";
        let out = run(&format!("printf %s {}", shellquote(path))).unwrap();
        assert_eq!(out, path);
    }

    #[test]
    fn test_run_reports_tool_error() {
        let err = run("echo 'Error: No such file or directory' >&2; exit 1").unwrap_err();
        match err {
            HelperError::ShellCommandFailed {
                exit_code, output, ..
            } => {
                assert_eq!(exit_code, 1);
                assert_eq!(output, "Error: No such file or directory");
            }
            other => panic!("Expected ShellCommandFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_run_keeps_both_streams() {
        let err = run("echo 'table bridge filter'; echo 'Error: syntax error' >&2; exit 2")
            .unwrap_err();
        assert!(matches!(
            err,
            HelperError::ShellCommandFailed { exit_code: 2, ref output, .. }
                if output == "table bridge filter\nError: syntax error"
        ));
        assert!(err.is_external_tool());
    }

    #[test]
    fn test_run_missing_tool() {
        let err = run("/nonexistent/nft -f /dev/null").unwrap_err();
        assert!(matches!(
            err,
            HelperError::ShellCommandFailed { exit_code: 127, .. }
        ));
    }
}
