use proc_macro2::Span;
use quote::ToTokens;
use syn::Error;

/// Bad or colliding `#[pipes]` options.
pub fn configuration<M: std::fmt::Display>(span: Span, message: M) -> Error {
    Error::new(span, format!("invalid #[pipes] configuration: {message}"))
}

/// A chain stage none of the shape rules accept. The error points at the
/// fragment itself, so the compiler reports its position.
pub fn unsupported_stage<T, M>(fragment: &T, reason: M) -> Error
where
    T: ToTokens,
    M: std::fmt::Display,
{
    Error::new_spanned(
        fragment,
        format!(
            "unsupported pipe stage `{}`: {reason}",
            render(fragment)
        ),
    )
}

pub fn render<T: ToTokens>(fragment: &T) -> String {
    fragment.to_token_stream().to_string()
}

/// Folds errors collected across stages and functions into one, so every
/// problem is reported in a single expansion.
pub fn push(slot: &mut Option<Error>, err: Error) {
    match slot {
        Some(existing) => existing.combine(err),
        None => *slot = Some(err),
    }
}
