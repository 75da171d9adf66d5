use proc_macro::{TokenStream, TokenTree};

/// Splits a `TokenStream` into comma-separated arguments.
///
/// Each argument is returned as a `Vec<TokenTree>`.
/// Commas at the top level are used as separators.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut current = Vec::new();

    for token in input {
        match &token {
            TokenTree::Punct(p) if p.as_char() == ',' => {
                if !current.is_empty() {
                    args.push(current);
                    current = Vec::new();
                }
            }
            _ => current.push(token),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Settings accepted by `#[mandatum::test(...)]`.
#[derive(Default)]
pub(crate) struct TestSettings {
    pub(crate) max_threads: Option<usize>,
    pub(crate) min_threads: Option<usize>,
}

/// Parses `key = value` pairs such as `max_threads = 4, min_threads = 1`.
///
/// Returns a message suitable for `compile_error!` on unknown keys or
/// values that are not integers.
pub(crate) fn parse_settings(attr: TokenStream) -> Result<TestSettings, String> {
    let mut settings = TestSettings::default();

    for arg in split_args(attr) {
        let (key, value) = match arg.as_slice() {
            [TokenTree::Ident(key), TokenTree::Punct(eq), TokenTree::Literal(value)]
                if eq.as_char() == '=' =>
            {
                (key.to_string(), value.to_string())
            }
            _ => {
                return Err(format!(
                    "expected `key = value`, found `{}`",
                    tokens_to_string(&arg)
                ));
            }
        };

        let value = value
            .parse::<usize>()
            .map_err(|_| format!("`{key}` expects an integer, found `{value}`"))?;

        match key.as_str() {
            "max_threads" => settings.max_threads = Some(value),
            "min_threads" => settings.min_threads = Some(value),
            _ => return Err(format!("unknown setting `{key}`")),
        }
    }

    Ok(settings)
}

/// Converts a slice of tokens into a Rust source string.
///
/// This function preserves token order and inserts spaces
/// between consecutive identifiers to avoid accidental
/// token merging (e.g. `foo bar` vs `foobar`).
pub(crate) fn tokens_to_string(tokens: &[TokenTree]) -> String {
    let mut out = String::new();
    let mut prev_was_ident = false;

    for t in tokens {
        let s = t.to_string();

        let needs_space = prev_was_ident && matches!(t, TokenTree::Ident(_));

        if needs_space {
            out.push(' ');
        }

        out.push_str(&s);
        prev_was_ident = matches!(t, TokenTree::Ident(_));
    }

    out
}
