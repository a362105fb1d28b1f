// Plugin-side encoder for the `##[command param=value]data` protocol that
// the runner parses from a plugin's standard output.

/// The command prefix (`##[`).
pub const COMMAND_PREFIX: &str = "##[";

pub mod keywords {
    pub const DEBUG: &str = "debug";
    pub const WARNING: &str = "warning";
    pub const ERROR: &str = "error";
    pub const ADD_MASK: &str = "add-mask";
    pub const COMMAND: &str = "command";
    pub const SET_REPO_PATH: &str = "internal-set-repo-path";
    pub const SAVE_STATE: &str = "save-state";
}

struct EscapeMapping {
    token: char,
    replacement: &'static str,
}

/// Applied in this order, each exactly once.
const ESCAPE_MAPPINGS: &[EscapeMapping] = &[
    EscapeMapping { token: ';',  replacement: "%3B" },
    EscapeMapping { token: '\r', replacement: "%0D" },
    EscapeMapping { token: '\n', replacement: "%0A" },
    EscapeMapping { token: ']',  replacement: "%5D" },
];

/// Escape a free-text segment (message body or property value).
pub fn escape(input: &str) -> String {
    let mut output = input.to_string();
    for mapping in ESCAPE_MAPPINGS {
        if output.contains(mapping.token) {
            output = output.replace(mapping.token, mapping.replacement);
        }
    }
    output
}

/// Format one protocol line.
///
/// Property values and `data` are passed through verbatim; callers escape
/// whichever segments the command defines as free text.
pub fn format_command(keyword: &str, properties: &[(&str, &str)], data: &str) -> String {
    let mut line = String::with_capacity(COMMAND_PREFIX.len() + keyword.len() + data.len() + 1);
    line.push_str(COMMAND_PREFIX);
    line.push_str(keyword);
    for (i, (key, value)) in properties.iter().enumerate() {
        line.push(if i == 0 { ' ' } else { ';' });
        line.push_str(key);
        line.push('=');
        line.push_str(value);
    }
    line.push(']');
    line.push_str(data);
    line
}

/// The runner's spelling of a boolean property value.
pub fn format_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unescape(input: &str) -> String {
        input
            .replace("%5D", "]")
            .replace("%0A", "\n")
            .replace("%0D", "\r")
            .replace("%3B", ";")
    }

    #[test]
    fn escape_special_chars() {
        assert_eq!(escape("a;b"), "a%3Bb");
        assert_eq!(escape("line1\r\nline2"), "line1%0D%0Aline2");
        assert_eq!(escape("msg]end"), "msg%5Dend");
    }

    #[test]
    fn escape_no_special_chars() {
        assert_eq!(escape("hello world"), "hello world");
    }

    #[test]
    fn escaped_output_has_no_raw_delimiters_and_reverses() {
        let samples = [
            ";;\r\n]]",
            "]\n;\r",
            "plain",
            "a;b]c\rd\ne",
            "\r\r\n\n;]",
            "",
        ];
        for sample in samples {
            let escaped = escape(sample);
            assert!(!escaped.contains([';', '\r', '\n', ']']), "{escaped:?}");
            assert_eq!(unescape(&escaped), sample);
        }
    }

    #[test]
    fn percent_text_is_left_alone() {
        assert_eq!(escape("100%3B"), "100%3B");
    }

    #[test]
    fn format_without_properties() {
        assert_eq!(format_command(keywords::WARNING, &[], "careful"), "##[warning]careful");
    }

    #[test]
    fn format_with_properties() {
        let line = format_command(
            keywords::SET_REPO_PATH,
            &[("repoFullName", "octo/repo"), ("workspaceRepo", format_bool(true))],
            "/w/repo",
        );
        assert_eq!(
            line,
            "##[internal-set-repo-path repoFullName=octo/repo;workspaceRepo=True]/w/repo"
        );
    }
}
