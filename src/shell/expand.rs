use std::env;
use std::fs;
use std::path::Path;
use std::process::Command;

use log::{debug, warn};
use regex::Regex;

/// Expands argv words in a fixed order: tilde, `$NAME`/`${NAME}`, a single
/// non-nested `$( body )` substitution, then filename globbing. Only the
/// glob step can turn one word into zero-or-many words.
pub fn expand_words(words: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(words.len());
    for word in words {
        let base = expand_word(word);
        if has_glob_chars(&base) {
            out.extend(run_glob(&base));
        } else {
            out.push(base);
        }
    }
    out
}

pub fn expand_word(word: &str) -> String {
    let tmp = shellexpand::tilde(word).into_owned();
    let tmp = expand_env_vars(&tmp);
    substitute_command(&tmp)
}

/// `$NAME` and `${NAME}` become the environment value, or empty if unset.
fn expand_env_vars(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' && i + 1 < chars.len() {
            if chars[i + 1] == '{' {
                if let Some(end) = chars[i + 2..].iter().position(|&c| c == '}') {
                    let name: String = chars[i + 2..i + 2 + end].iter().collect();
                    out.push_str(&env::var(&name).unwrap_or_default());
                    i += end + 3;
                    continue;
                }
            } else if chars[i + 1].is_ascii_alphabetic() || chars[i + 1] == '_' {
                let mut j = i + 2;
                while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                let name: String = chars[i + 1..j].iter().collect();
                out.push_str(&env::var(&name).unwrap_or_default());
                i = j;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Replaces at most one non-nested `$( body )` with the trimmed stdout of
/// running `body` through a subordinate interpreter.
fn substitute_command(input: &str) -> String {
    let Some(start) = input.find("$(") else {
        return input.to_string();
    };
    let Some(end_rel) = input[start + 2..].find(')') else {
        return input.to_string();
    };
    let end = start + 2 + end_rel;
    let body = &input[start + 2..end];
    let captured = capture_output(body);
    format!("{}{}{}", &input[..start], captured, &input[end + 1..])
}

fn capture_output(body: &str) -> String {
    debug!("command substitution: {}", body);
    let output = match Command::new("sh").arg("-c").arg(body).output() {
        Ok(output) => output,
        Err(e) => {
            warn!("command substitution failed: {}", e);
            return String::new();
        }
    };
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    while text.ends_with('\n') || text.ends_with('\r') {
        text.pop();
    }
    text
}

pub fn has_glob_chars(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

fn glob_to_regex(pattern: &str) -> String {
    let mut rx = String::with_capacity(pattern.len() * 2);
    rx.push('^');
    let mut in_class = false;
    for c in pattern.chars() {
        if in_class {
            rx.push(c);
            if c == ']' {
                in_class = false;
            }
            continue;
        }
        match c {
            '*' => rx.push_str(".*"),
            '?' => rx.push('.'),
            '[' => {
                in_class = true;
                rx.push('[');
            }
            '.' | '(' | ')' | '+' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                rx.push('\\');
                rx.push(c);
            }
            _ => rx.push(c),
        }
    }
    rx.push('$');
    rx
}

/// Matches a glob pattern against the current working directory only.
/// Zero matches yield the literal pattern unchanged.
fn run_glob(pattern: &str) -> Vec<String> {
    // Path-separated globbing is unsupported; such patterns stay literal.
    if pattern.contains('/') {
        return vec![pattern.to_string()];
    }
    match env::current_dir() {
        Ok(dir) => run_glob_in(&dir, pattern),
        Err(e) => {
            warn!("glob: cannot read current directory: {}", e);
            vec![pattern.to_string()]
        }
    }
}

fn run_glob_in(dir: &Path, pattern: &str) -> Vec<String> {
    let re = match Regex::new(&glob_to_regex(pattern)) {
        Ok(re) => re,
        Err(e) => {
            debug!("glob: bad pattern {:?}: {}", pattern, e);
            return vec![pattern.to_string()];
        }
    };
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("glob: read_dir {}: {}", dir.display(), e);
            return vec![pattern.to_string()];
        }
    };
    let show_hidden = pattern.starts_with('.');
    let mut matches: Vec<String> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| (show_hidden || !name.starts_with('.')) && re.is_match(name))
        .collect();
    if matches.is_empty() {
        return vec![pattern.to_string()];
    }
    matches.sort();
    matches
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs::File;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = env::temp_dir().join(format!("autosh-expand-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_tilde() {
        let home = env::var("HOME").unwrap();
        assert_eq!(expand_word("~"), home);
        assert_eq!(expand_word("~/sub"), format!("{}/sub", home));
    }

    #[test]
    fn test_env_vars() {
        env::set_var("AUTOSH_TEST_EXPAND", "value");
        assert_eq!(expand_word("$AUTOSH_TEST_EXPAND"), "value");
        assert_eq!(expand_word("pre-${AUTOSH_TEST_EXPAND}-post"), "pre-value-post");
        assert_eq!(expand_word("$AUTOSH_TEST_UNSET_VAR"), "");
    }

    #[test]
    fn test_dollar_without_name_is_literal() {
        assert_eq!(expand_word("a$"), "a$");
        assert_eq!(expand_word("$1"), "$1");
    }

    #[test]
    fn test_command_substitution() {
        assert_eq!(expand_word("$(echo hi)"), "hi");
        assert_eq!(expand_word("X$(echo hi)Y"), "XhiY");
    }

    #[test]
    fn test_glob_matches_sorted() {
        let dir = scratch_dir("sorted");
        for name in ["b.txt", "a.txt", "c.log", ".hidden.txt"] {
            File::create(dir.join(name)).unwrap();
        }
        assert_eq!(run_glob_in(&dir, "*.txt"), vec!["a.txt", "b.txt"]);
        assert_eq!(run_glob_in(&dir, "?.txt"), vec!["a.txt", "b.txt"]);
        assert_eq!(run_glob_in(&dir, "[ab].txt"), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_glob_hidden_entries() {
        let dir = scratch_dir("hidden");
        for name in [".hidden.txt", "plain.txt"] {
            File::create(dir.join(name)).unwrap();
        }
        assert_eq!(run_glob_in(&dir, "*.txt"), vec!["plain.txt"]);
        assert_eq!(run_glob_in(&dir, ".*.txt"), vec![".hidden.txt"]);
    }

    #[test]
    fn test_glob_no_match_stays_literal() {
        let dir = scratch_dir("nomatch");
        assert_eq!(run_glob_in(&dir, "*.rs"), vec!["*.rs"]);
    }

    #[test]
    fn test_non_glob_word_passes_through() {
        assert_eq!(expand_words(&["plain".to_string()]), vec!["plain"]);
    }

    #[test]
    fn test_empty_expansion_keeps_word() {
        // Only globbing is multi-valued; a word that expands to nothing
        // stays in argv as the empty string.
        let words = vec!["$AUTOSH_SURELY_UNSET".to_string(), "kept".to_string()];
        assert_eq!(expand_words(&words), vec!["", "kept"]);
    }
}
