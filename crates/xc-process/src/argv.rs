//! Command-line synthesis: turns a [`crate::command::CommandSpec`] into the
//! effective argv that will actually be exec'd, applying the shell,
//! virtual-environment and privilege-elevation wrappers outside-in.

use std::path::Path;

use xc_core::quote;

/// Characters whose presence in any argument forces shell synthesis,
/// unless the caller already constructed a single pre-quoted command.
const SHELL_METACHARACTERS: &[char] = &[
    '|', '&', ';', '<', '>', '(', ')', '$', '`', '\\', '"', '\'', ' ', '\t', '\n', '*', '?', '[',
    ']', '#', '~', '=', '%', '{', '}', '!',
];

fn contains_shell_metacharacters(argv: &[String]) -> bool {
    argv.iter()
        .any(|arg| arg.chars().any(|c| SHELL_METACHARACTERS.contains(&c)))
}

/// Build the base argv: either the literal `argv`, or — if any argument
/// contains shell metacharacters and the caller passed a single token —
/// a `{shell, "-c", quoted-join}` triple.
///
/// A single-element `argv` containing shell metacharacters is always
/// treated as shell syntax (this is how callers spell `execute("exit
/// 42")` or `execute("echo a; echo b")`). A multi-element `argv` is only
/// shell-wrapped if explicitly requested via `force_shell`.
pub fn synthesize_base(argv: &[String], shell: &str, force_shell: bool) -> (Vec<String>, bool) {
    let needs_shell = force_shell || (argv.len() == 1 && contains_shell_metacharacters(argv));
    if needs_shell {
        let joined = quote(argv);
        (vec![shell.to_string(), "-c".to_string(), joined], true)
    } else {
        (argv.to_vec(), false)
    }
}

/// Prepend a virtual-environment activation snippet, forcing a shell
/// wrapper if one isn't already in place.
///
/// `argv` is the already-synthesized base (shell or not). Produces
/// `{shell, -c, "source <venv>/bin/activate && <rest>"}`.
pub fn wrap_virtual_environment(argv: Vec<String>, shell: &str, venv: &Path) -> Vec<String> {
    let inner = as_shell_snippet(argv, shell);
    let activate = venv.join("bin").join("activate");
    let snippet = format!("source {} && {}", quote([activate.to_string_lossy()]), inner);
    vec![shell.to_string(), "-c".to_string(), snippet]
}

/// Prepend `fakeroot` / `sudo -n` wrappers. When both are requested, `sudo`
/// wraps `fakeroot`. `sudo` is suppressed when `effective_user` is already
/// `root`.
pub fn wrap_privileges(
    mut argv: Vec<String>,
    sudo: bool,
    fakeroot: bool,
    effective_user_is_root: bool,
) -> Vec<String> {
    if fakeroot {
        argv.insert(0, "fakeroot".to_string());
    }
    if sudo && !effective_user_is_root {
        argv.insert(0, "-n".to_string());
        argv.insert(0, "sudo".to_string());
    }
    argv
}

/// Re-render an argv (shell-wrapped or not) as a single shell snippet
/// suitable for embedding inside another `-c` string (used by the virtual
/// environment and remote-command wrappers).
pub fn as_shell_snippet(argv: Vec<String>, shell: &str) -> String {
    if argv.len() >= 3 && argv[0] == shell && argv[1] == "-c" {
        argv[2].clone()
    } else {
        quote(&argv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesize_base_plain_argv_passthrough() {
        let argv = vec!["echo".into(), "hello".into()];
        let (out, uses_shell) = synthesize_base(&argv, "bash", false);
        assert_eq!(out, argv);
        assert!(!uses_shell);
    }

    #[test]
    fn test_synthesize_base_single_shell_syntax_token() {
        let argv = vec!["exit 42".into()];
        let (out, uses_shell) = synthesize_base(&argv, "bash", false);
        assert_eq!(out, vec!["bash", "-c", "exit 42"]);
        assert!(uses_shell);
    }

    #[test]
    fn test_synthesize_base_forced_shell_quotes_and_joins() {
        let argv = vec!["echo".into(), "hello world".into()];
        let (out, uses_shell) = synthesize_base(&argv, "bash", true);
        assert_eq!(out, vec!["bash", "-c", "echo 'hello world'"]);
        assert!(uses_shell);
    }

    #[test]
    fn test_wrap_virtual_environment_prepends_activation() {
        let argv = vec!["python".into(), "-c".into(), "print(1)".into()];
        let out = wrap_virtual_environment(argv, "bash", Path::new("/opt/venv"));
        assert_eq!(out[0], "bash");
        assert_eq!(out[1], "-c");
        assert!(out[2].starts_with("source /opt/venv/bin/activate && "));
        assert!(out[2].contains("python"));
    }

    #[test]
    fn test_wrap_privileges_sudo_wraps_fakeroot() {
        let argv = vec!["touch".into(), "f".into()];
        let out = wrap_privileges(argv, true, true, false);
        assert_eq!(out, vec!["sudo", "-n", "fakeroot", "touch", "f"]);
    }

    #[test]
    fn test_wrap_privileges_fakeroot_only() {
        let argv = vec!["touch".into(), "f".into()];
        let out = wrap_privileges(argv, false, true, false);
        assert_eq!(out, vec!["fakeroot", "touch", "f"]);
    }

    #[test]
    fn test_wrap_privileges_sudo_suppressed_when_already_root() {
        let argv = vec!["touch".into(), "f".into()];
        let out = wrap_privileges(argv, true, false, true);
        assert_eq!(out, vec!["touch", "f"]);
    }

    #[test]
    fn test_as_shell_snippet_reuses_existing_shell_wrap() {
        let argv = vec!["bash".into(), "-c".into(), "echo hi".into()];
        assert_eq!(as_shell_snippet(argv, "bash"), "echo hi");
    }

    #[test]
    fn test_as_shell_snippet_quotes_plain_argv() {
        let argv = vec!["echo".into(), "hi there".into()];
        assert_eq!(as_shell_snippet(argv, "bash"), "echo 'hi there'");
    }
}
