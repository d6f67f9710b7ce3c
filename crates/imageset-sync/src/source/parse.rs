//! Git output parsing helpers.

use std::process::Output;

/// Formats a git error with both stdout and stderr for better debugging.
pub fn format_git_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => format!(
            "Command failed with exit code {}",
            output.status.code().unwrap_or(-1)
        ),
        (true, false) => stdout,
        (false, true) => stderr,
        (false, false) => format!("{}\n{}", stderr, stdout),
    }
}

/// Extracts the commit id for `refs/heads/<branch>` from `git ls-remote`
/// output. Returns `None` when the branch is not listed.
pub fn parse_ls_remote(stdout: &str, branch: &str) -> Option<String> {
    let wanted = format!("refs/heads/{}", branch);
    stdout.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let sha = parts.next()?;
        let reference = parts.next()?;
        (reference == wanted && is_object_id(sha)).then(|| sha.to_string())
    })
}

/// True for a full hex object id (SHA-1 or SHA-256).
pub fn is_object_id(s: &str) -> bool {
    matches!(s.len(), 40 | 64) && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA_A: &str = "0123456789abcdef0123456789abcdef01234567";
    const SHA_B: &str = "fedcba9876543210fedcba9876543210fedcba98";

    #[test]
    fn test_parse_ls_remote_exact_branch() {
        let out = format!(
            "{SHA_A}\trefs/heads/backplane-2.2-dev\n{SHA_B}\trefs/heads/backplane-2.2\n"
        );
        assert_eq!(parse_ls_remote(&out, "backplane-2.2").as_deref(), Some(SHA_B));
    }

    #[test]
    fn test_parse_ls_remote_missing_branch() {
        let out = format!("{SHA_A}\trefs/heads/main\n");
        assert_eq!(parse_ls_remote(&out, "backplane-2.2"), None);
        assert_eq!(parse_ls_remote("", "main"), None);
    }

    #[test]
    fn test_parse_ls_remote_rejects_garbage() {
        assert_eq!(parse_ls_remote("warning\trefs/heads/main\n", "main"), None);
    }

    #[test]
    fn test_is_object_id() {
        assert!(is_object_id(SHA_A));
        assert!(!is_object_id("abc"));
        assert!(!is_object_id("zz23456789abcdef0123456789abcdef01234567"));
    }
}
