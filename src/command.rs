//! User command parsing

use crate::report::CommandError;

/// A command invocation split into its name and its raw arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation<'a> {
    /// The command name, without the prefix.
    pub name: &'a str,
    /// Everything after the command name.
    pub args: Args<'a>,
}

impl<'a> Invocation<'a> {
    /// Parses `input` as an invocation if it starts with `prefix` directly followed by a command
    /// name.
    ///
    /// ```rust
    /// use cogwheel::command::Invocation;
    /// let invocation = Invocation::parse(".", ".g rust lang").unwrap();
    /// assert_eq!(invocation.name, "g");
    /// assert_eq!(invocation.args.raw(), "rust lang");
    /// assert!(Invocation::parse(".", "hello").is_none());
    /// assert!(Invocation::parse(".", ". g").is_none());
    /// ```
    #[must_use]
    pub fn parse(prefix: &str, input: &'a str) -> Option<Invocation<'a>> {
        let rest = input.strip_prefix(prefix)?;
        let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));

        if name.is_empty() {
            return None;
        }

        Some(Invocation {
            name,
            args: Args(args),
        })
    }
}

/// The arguments of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Args<'a>(&'a str);

impl<'a> Args<'a> {
    /// Wraps a raw argument string.
    #[must_use]
    pub const fn new(raw: &'a str) -> Args<'a> {
        Args(raw)
    }

    /// Returns the arguments exactly as written.
    #[must_use]
    pub const fn raw(&self) -> &'a str {
        self.0
    }

    /// Returns the arguments split on whitespace.
    #[must_use]
    pub fn words(&self) -> Vec<&'a str> {
        self.0.split_whitespace().collect()
    }

    /// Returns the trimmed arguments, failing with a missing argument error named `param` when
    /// there are none.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::MissingRequiredArgument`] if the arguments are blank.
    pub fn required(&self, param: &str) -> Result<&'a str, CommandError> {
        let trimmed = self.0.trim();

        if trimmed.is_empty() {
            Err(CommandError::MissingRequiredArgument {
                param: param.to_string(),
            })
        } else {
            Ok(trimmed)
        }
    }

    /// Splits the arguments like a shell would, honoring quotes and escapes.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::ExpectedClosingQuote`] if a quote is left open, and
    /// [`CommandError::InvalidEndOfQuotedString`] if the input ends with a dangling escape.
    pub fn quoted(&self) -> Result<Vec<String>, CommandError> {
        if let Some(args) = shlex::split(self.0) {
            return Ok(args);
        }

        match unclosed_quote(self.0) {
            Some(quote) => Err(CommandError::ExpectedClosingQuote {
                close_quote: quote.to_string(),
            }),
            None => Err(CommandError::InvalidEndOfQuotedString {
                char: self.0.chars().last().unwrap_or('\\').to_string(),
            }),
        }
    }
}

/// Returns the quote character that is still open at the end of `input`, if any.
fn unclosed_quote(input: &str) -> Option<char> {
    let mut open: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match (open, c) {
            (Some('\''), '\'') => open = None,
            (Some('\''), _) => {}
            (_, '\\') => {
                chars.next();
            }
            (Some('"'), '"') => open = None,
            (None, '"' | '\'') => open = Some(c),
            _ => {}
        }
    }

    open
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_without_args() {
        let invocation = Invocation::parse(".", ".lenny").unwrap();

        assert_eq!(invocation.name, "lenny");
        assert_eq!(invocation.args.raw(), "");
    }

    #[test]
    fn required_args_name_the_missing_param() {
        let args = Args::new("   ");

        assert!(matches!(
            args.required("user"),
            Err(CommandError::MissingRequiredArgument { param }) if param == "user"
        ));
        assert_eq!(Args::new(" bob ").required("user").ok(), Some("bob"));
    }

    #[test]
    fn quoted_args_are_split_like_a_shell() {
        let args = Args::new(r#""hello world" again"#);

        assert_eq!(
            args.quoted().unwrap(),
            vec!["hello world".to_string(), "again".to_string()]
        );
    }

    #[test]
    fn quoted_args_report_unclosed_quote() {
        let args = Args::new(r#"say "hello"#);

        assert!(matches!(
            args.quoted(),
            Err(CommandError::ExpectedClosingQuote { close_quote }) if close_quote == "\""
        ));
    }

    #[test]
    fn quoted_args_report_dangling_escape() {
        let args = Args::new(r"hello \");

        assert!(matches!(
            args.quoted(),
            Err(CommandError::InvalidEndOfQuotedString { char }) if char == "\\"
        ));
    }
}
