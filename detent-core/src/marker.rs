// Marker Protocol
// Single-line lifecycle markers embedded in runner output

use regex::Regex;

use std::fmt;
use std::sync::LazyLock;

/// Prefix shared by every marker line.
pub const MARKER_PREFIX: &str = "::detent::";

/// Version and encoding tag carried by manifest markers.
pub const MANIFEST_TAG: &str = "manifest::v2::b64::";

static JOB_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("valid job id regex"));

/// Whether a job id is safe to embed in a shell context.
pub fn is_valid_job_id(id: &str) -> bool {
    JOB_ID_PATTERN.is_match(id)
}

/// Make a value safe to embed inside a single-quoted shell string.
///
/// Newlines and tabs become spaces, NUL bytes are dropped and each single
/// quote becomes `'\''`. An existing `'\''` group is kept as-is, so running
/// the function twice changes nothing.
pub fn sanitize(value: &str) -> String {
    const ESCAPED_QUOTE: &str = r"'\''";

    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(c) = rest.chars().next() {
        if rest.starts_with(ESCAPED_QUOTE) {
            out.push_str(ESCAPED_QUOTE);
            rest = &rest[ESCAPED_QUOTE.len()..];
            continue;
        }
        match c {
            '\n' | '\r' | '\t' => out.push(' '),
            '\0' => {}
            '\'' => out.push_str(ESCAPED_QUOTE),
            other => out.push(other),
        }
        rest = &rest[c.len_utf8()..];
    }

    out
}

/// Opening of a runner expression, expanded before the shell sees a script.
const EXPRESSION_OPEN: &str = "${{";

/// Break every `${{` so the runner leaves the text alone. The result never
/// contains `${{`, and applying it again changes nothing.
pub fn neutralize_expressions(value: &str) -> String {
    value.replace(EXPRESSION_OPEN, "$ {{")
}

/// Step display name as embedded in a step-start marker.
pub fn sanitize_step_name(name: &str) -> String {
    // after sanitize: dropping a NUL can join `$` and `{{`
    neutralize_expressions(&sanitize(name))
}

/// A lifecycle event as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// Base64-encoded manifest JSON
    Manifest { payload: String },
    JobStart { job_id: String },
    StepStart {
        job_id: String,
        index: usize,
        name: String,
    },
    /// `status` is the runner's own job status string (`success`, `failure`, ...)
    JobEnd { job_id: String, status: String },
}

impl Marker {
    /// Find and parse a marker anywhere in a line of runner output.
    ///
    /// Runners prefix job output (`[CI/build]   | `), so the marker does not
    /// have to start the line. Malformed markers and invalid job ids yield
    /// `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let start = line.find(MARKER_PREFIX)?;
        let body = line[start + MARKER_PREFIX.len()..].trim_end();

        if let Some(payload) = body.strip_prefix(MANIFEST_TAG) {
            let payload = payload.trim();
            if payload.is_empty() {
                return None;
            }
            return Some(Marker::Manifest {
                payload: payload.to_string(),
            });
        }

        if let Some(job_id) = body.strip_prefix("job-start::") {
            return valid_id(job_id).map(|job_id| Marker::JobStart { job_id });
        }

        if let Some(rest) = body.strip_prefix("step-start::") {
            let mut parts = rest.splitn(3, "::");
            let job_id = valid_id(parts.next()?)?;
            let index = parts.next()?.parse::<usize>().ok()?;
            let name = parts.next().unwrap_or_default().to_string();
            return Some(Marker::StepStart {
                job_id,
                index,
                name,
            });
        }

        if let Some(rest) = body.strip_prefix("job-end::") {
            let (job_id, status) = rest.split_once("::")?;
            let job_id = valid_id(job_id)?;
            return Some(Marker::JobEnd {
                job_id,
                status: status.trim().to_string(),
            });
        }

        None
    }

    /// Shell command that prints this marker.
    pub fn echo_command(&self) -> String {
        format!("echo '{}'", self)
    }
}

fn valid_id(raw: &str) -> Option<String> {
    let id = raw.trim();
    is_valid_job_id(id).then(|| id.to_string())
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Manifest { payload } => {
                write!(f, "{}{}{}", MARKER_PREFIX, MANIFEST_TAG, payload)
            }
            Marker::JobStart { job_id } => write!(f, "{}job-start::{}", MARKER_PREFIX, job_id),
            Marker::StepStart {
                job_id,
                index,
                name,
            } => write!(
                f,
                "{}step-start::{}::{}::{}",
                MARKER_PREFIX,
                job_id,
                index,
                sanitize_step_name(name)
            ),
            Marker::JobEnd { job_id, status } => {
                write!(f, "{}job-end::{}::{}", MARKER_PREFIX, job_id, status)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    /// Remove every `'\''` group; a safe string has no quote left after that.
    fn strip_escaped_quotes(s: &str) -> String {
        s.replace(r"'\''", "")
    }

    #[test]
    fn test_job_id_validation() {
        assert!(is_valid_job_id("build_job-1"));
        assert!(is_valid_job_id("_private"));
        assert!(is_valid_job_id("B"));

        for bad in [
            "", "1build", "-build", "build;rm", "build$x", "build`id`", "build job", "build\tx",
            "build\n", "büild", "a/b",
        ] {
            assert!(!is_valid_job_id(bad), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_sanitize_whitespace_and_nul() {
        assert_eq!(sanitize("line one\nline\ttwo\r"), "line one line two ");
        assert_eq!(sanitize("a\0b"), "ab");
    }

    #[test]
    fn test_sanitize_quotes() {
        assert_eq!(sanitize("it's"), r"it'\''s");
        assert_eq!(sanitize("''"), r"'\'''\''");
    }

    #[test]
    fn test_sanitize_is_idempotent_on_escaped_input() {
        let once = sanitize("don't 'quote' me");
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn test_display_and_parse_job_markers() {
        let start = Marker::JobStart {
            job_id: "build".to_string(),
        };
        assert_eq!(start.to_string(), "::detent::job-start::build");
        assert_eq!(Marker::parse("::detent::job-start::build"), Some(start));

        let end = Marker::parse("::detent::job-end::build::failure\r").unwrap();
        assert_eq!(
            end,
            Marker::JobEnd {
                job_id: "build".to_string(),
                status: "failure".to_string()
            }
        );
    }

    #[test]
    fn test_parse_with_runner_prefix() {
        let line = "[CI/build]   | ::detent::step-start::build::2::Run tests";
        assert_eq!(
            Marker::parse(line),
            Some(Marker::StepStart {
                job_id: "build".to_string(),
                index: 2,
                name: "Run tests".to_string(),
            })
        );
    }

    #[test]
    fn test_step_name_may_contain_separator() {
        let marker = Marker::parse("::detent::step-start::a::0::echo a::b").unwrap();
        assert!(matches!(marker, Marker::StepStart { ref name, .. } if name == "echo a::b"));
    }

    #[test]
    fn test_parse_rejects_malformed_markers() {
        for line in [
            "plain output",
            "::detent::job-start::1bad",
            "::detent::job-start::a;b",
            "::detent::step-start::build::-1::x",
            "::detent::step-start::build::two::x",
            "::detent::step-start::build",
            "::detent::job-end::build",
            "::detent::manifest::v2::b64::",
            "::detent::manifest::v1::b64::abc",
            "::detent::unknown::x",
        ] {
            assert_eq!(Marker::parse(line), None, "parsed {:?}", line);
        }
    }

    #[test]
    fn test_echo_command_quotes_step_name() {
        let marker = Marker::StepStart {
            job_id: "test".to_string(),
            index: 0,
            name: "it's $(rm -rf /)".to_string(),
        };
        assert_eq!(
            marker.echo_command(),
            r"echo '::detent::step-start::test::0::it'\''s $(rm -rf /)'"
        );
    }

    #[test]
    fn test_step_marker_breaks_runner_expressions() {
        let marker = Marker::StepStart {
            job_id: "t".to_string(),
            index: 0,
            name: "Check ${{ github.event.pull_request.title }}".to_string(),
        };
        assert_eq!(
            marker.echo_command(),
            "echo '::detent::step-start::t::0::Check $ {{ github.event.pull_request.title }}'"
        );
        assert_eq!(sanitize_step_name("$\0{{ x }}"), "$ {{ x }}");
    }

    proptest! {
        #[test]
        fn prop_step_name_has_no_expression_and_is_idempotent(input in ".*") {
            let once = sanitize_step_name(&input);
            prop_assert!(!once.contains("${{"));
            prop_assert_eq!(sanitize_step_name(&once), once);
        }

        #[test]
        fn prop_sanitize_idempotent(input in ".*") {
            let once = sanitize(&input);
            prop_assert_eq!(sanitize(&once), once);
        }

        #[test]
        fn prop_sanitize_leaves_no_bare_quote(input in ".*") {
            let out = sanitize(&input);
            prop_assert!(!strip_escaped_quotes(&out).contains('\''));
            prop_assert!(!out.contains('\n'));
            prop_assert!(!out.contains('\0'));
        }

        #[test]
        fn prop_rejects_shell_metacharacters(
            prefix in "[A-Za-z_][A-Za-z0-9_-]{0,8}",
            bad in prop::sample::select(vec![";", "$", "`", " ", "\t", "\n", "|", "&"]),
            suffix in "[A-Za-z0-9_-]{0,8}",
        ) {
            let id = format!("{}{}{}", prefix, bad, suffix);
            prop_assert!(!is_valid_job_id(&id));
        }

        #[test]
        fn prop_rejects_leading_digit_or_hyphen(
            lead in "[0-9-]",
            rest in "[A-Za-z0-9_-]{0,8}",
        ) {
            let id = format!("{}{}", lead, rest);
            prop_assert!(!is_valid_job_id(&id));
        }
    }
}
