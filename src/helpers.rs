use std::collections::BTreeSet;

use proc_macro2::{Ident, Span};
use syn::*;

use crate::config::{DebugSink, RewriteContext};
use crate::utils::{call_expr, ident_expr};

/// Generic functions injected at the top of a rewritten function body.
///
/// Closures are passed through `__pipes_apply` instead of being called in
/// place: the helper's `FnOnce(T)` bound gives the closure its parameter
/// type before the closure body is checked.
#[derive(Debug, Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash)]
pub enum Helper {
    Apply,
    Tap,
    Debug,
}

impl Helper {
    pub const ALL: [Helper; 3] = [Helper::Apply, Helper::Tap, Helper::Debug];

    pub fn name(self) -> &'static str {
        match self {
            Helper::Apply => "__pipes_apply",
            Helper::Tap => "__pipes_tap",
            Helper::Debug => "__pipes_debug",
        }
    }

    fn item(self, ctx: &RewriteContext) -> Stmt {
        let item: ItemFn = match (self, &ctx.debug) {
            (Helper::Apply, _) => parse_quote! {
                #[inline(always)]
                fn __pipes_apply<T, R>(value: T, f: impl FnOnce(T) -> R) -> R {
                    f(value)
                }
            },
            (Helper::Tap, _) => parse_quote! {
                #[inline(always)]
                fn __pipes_tap<T, R>(value: T, f: impl FnOnce(&T) -> R) -> T {
                    let _ = f(&value);
                    value
                }
            },
            (Helper::Debug, Some(DebugSink::Path(sink))) => parse_quote! {
                fn __pipes_debug<T: ::core::fmt::Debug>(value: T, stage: usize, fragment: &'static str) -> T {
                    #sink(stage, fragment, &value);
                    value
                }
            },
            (Helper::Debug, _) => parse_quote! {
                fn __pipes_debug<T: ::core::fmt::Debug>(value: T, stage: usize, fragment: &'static str) -> T {
                    ::std::eprintln!("[pipes] #{} {} => {:?}", stage, fragment, value);
                    value
                }
            },
        };
        Stmt::Item(Item::Fn(item))
    }
}

/// Helpers referenced while folding the chains of one function.
#[derive(Debug, Clone, Default)]
pub struct HelperUsage {
    used: BTreeSet<Helper>,
}

impl HelperUsage {
    pub fn call<I: IntoIterator<Item=Expr>>(&mut self, helper: Helper, args: I, span: Span) -> Expr {
        self.used.insert(helper);
        let name = Ident::new(helper.name(), Span::call_site().located_at(span));
        call_expr(ident_expr(name), args, span)
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, helper: Helper) -> bool {
        self.used.contains(&helper)
    }

    /// Prepends the used helpers to `block`.
    pub fn inject(&self, block: &mut Block, ctx: &RewriteContext) {
        if self.is_empty() {
            return;
        }
        let body = std::mem::take(&mut block.stmts);
        block.stmts = self
            .used
            .iter()
            .map(|helper| helper.item(ctx))
            .chain(body)
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quote::{quote, ToTokens};

    #[test]
    fn call_records_usage() {
        let mut usage = HelperUsage::default();
        assert!(usage.is_empty());
        let args: [Expr; 2] = [parse_quote!(value), parse_quote!(record)];
        let call = usage.call(Helper::Tap, args, Span::call_site());
        assert_eq!(
            call.to_token_stream().to_string(),
            quote!(__pipes_tap(value, record)).to_string()
        );
        assert!(usage.contains(Helper::Tap));
        assert!(!usage.contains(Helper::Apply));
    }

    #[test]
    fn injects_only_used_helpers_first() {
        let mut usage = HelperUsage::default();
        let args: [Expr; 2] = [parse_quote!(1), parse_quote!(f)];
        usage.call(Helper::Apply, args, Span::call_site());
        let mut block: Block = parse_quote!({ run() });
        usage.inject(&mut block, &RewriteContext::default());
        assert_eq!(block.stmts.len(), 2);
        match &block.stmts[0] {
            Stmt::Item(Item::Fn(item)) => assert_eq!(item.sig.ident, "__pipes_apply"),
            other => panic!("expected helper item, got {}", other.to_token_stream()),
        }
    }

    #[test]
    fn debug_helper_uses_sink() {
        let ctx = RewriteContext {
            debug: Some(DebugSink::Path(parse_quote!(crate::trace))),
            ..RewriteContext::default()
        };
        let rendered = Helper::Debug.item(&ctx).to_token_stream().to_string();
        assert!(rendered.contains(&quote!(crate::trace(stage, fragment, &value)).to_string()));

        let stderr = Helper::Debug.item(&RewriteContext::default()).to_token_stream().to_string();
        assert!(stderr.contains("eprintln"));
    }

    #[test]
    fn names_are_distinct() {
        let names: BTreeSet<&str> = Helper::ALL.iter().map(|h| h.name()).collect();
        assert_eq!(names.len(), Helper::ALL.len());
    }
}
