mod utils;

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Turns a function into a test running against a fresh engine.
///
/// The body sees three bindings:
/// - `backend`: an `Arc<mandatum::testing::MemoryBackend>`,
/// - `engine`: a `mandatum::Engine` driving that backend,
/// - `event_loop`: the `mandatum::EventLoop` delivering its callbacks.
///
/// Logging goes through `env_logger` in test mode. The engine shuts down
/// when the body returns.
///
/// ```rust,ignore
/// #[mandatum::test(max_threads = 4, min_threads = 1)]
/// fn opens() {
///     backend.insert_file("/a", "x");
///     // ...
/// }
/// ```
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let settings = match utils::parse_settings(attr) {
        Ok(settings) => settings,
        Err(msg) => return compile_error(&msg),
    };

    let mut tokens = item.into_iter().collect::<Vec<_>>();

    let block_pos = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace));

    let Some(pos) = block_pos else {
        return compile_error("#[mandatum::test] expects a function");
    };

    let block = match &tokens[pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => return compile_error("#[mandatum::test] expects a function body"),
    };

    let mut builder = String::from("::mandatum::EngineBuilder::new()");

    if let Some(n) = settings.max_threads {
        builder.push_str(&format!(".max_threads({n})"));
    }

    if let Some(n) = settings.min_threads {
        builder.push_str(&format!(".min_threads({n})"));
    }

    let new_block = format!(
        "{{
        let _ = ::env_logger::builder().is_test(true).try_init();
        let backend = ::std::sync::Arc::new(::mandatum::testing::MemoryBackend::new());
        let (engine, event_loop) = {builder}.build(backend.clone());
        let _ = (&backend, &engine, &event_loop);
        {{ {block} }}
    }}"
    );

    let stream = match new_block.parse::<TokenStream>() {
        Ok(stream) => stream,
        Err(err) => return compile_error(&format!("test macro error: {err}")),
    };

    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, stream));

    let mut result: Vec<TokenTree> = match "#[test]".parse::<TokenStream>() {
        Ok(attr) => attr.into_iter().collect(),
        Err(err) => return compile_error(&format!("test macro error: {err}")),
    };
    result.extend(tokens);

    result.into_iter().collect()
}

fn compile_error(msg: &str) -> TokenStream {
    format!("compile_error!({msg:?});")
        .parse()
        .unwrap_or_default()
}
