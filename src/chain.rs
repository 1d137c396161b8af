use std::collections::VecDeque;

use proc_macro2::TokenStream;
use quote::ToTokens;
use syn::visit_mut::{self, VisitMut};
use syn::*;

use crate::config::RewriteContext;
use crate::error;
use crate::helpers::{Helper, HelperUsage};
use crate::placeholder::macro_args;
use crate::stage::Stage;
use crate::utils::*;

/// A seed followed by the raw right-hand operands of a left-associative
/// run of the pipe operator. `a >> f >> g` is seed `a`, stages `[f, g]`.
#[derive(Debug, Clone)]
pub struct Chain {
    pub seed:   Expr,
    pub stages: VecDeque<Expr>,
}

impl Chain {
    pub fn is_chain(expr: &Expr, ctx: &RewriteContext) -> bool {
        matches!(expr, Expr::Binary(binary) if ctx.is_operator(&binary.op))
    }

    /// Walks down the left spine. A parenthesized left operand is not part
    /// of the spine and becomes the seed. An expression that is not a chain
    /// decomposes into a seed with no stages.
    pub fn decompose(expr: Expr, ctx: &RewriteContext) -> Self {
        let mut stages = VecDeque::new();
        let mut current = expr;
        loop {
            current = match current {
                Expr::Binary(binary) if ctx.is_operator(&binary.op) => {
                    stages.push_front(*binary.right);
                    *binary.left
                },
                seed => return Chain { seed, stages },
            }
        }
    }

    /// Classifies every stage, then folds them over the seed left to right.
    /// All classification errors of the chain are reported together.
    pub fn fold(mut self, ctx: &RewriteContext, helpers: &mut HelperUsage) -> Result<Expr> {
        let mut classified = Vec::with_capacity(self.stages.len());
        let mut errors = None;
        while let Some(raw) = self.stages.pop_front() {
            match Stage::classify(raw, ctx) {
                Ok(stage) => classified.push(stage),
                Err(err) => error::push(&mut errors, err),
            }
        }
        if let Some(err) = errors {
            return Err(err);
        }

        let mut res = self.seed;
        for (index, stage) in classified.into_iter().enumerate() {
            let span = stage.span;
            let fragment = str_lit_expr(&stage.fragment, span);
            res = stage.apply(res, ctx, helpers);
            if ctx.debug.is_some() {
                let args = [res, int_lit_expr(index + 1, span), fragment];
                res = helpers.call(Helper::Debug, args, span);
            }
        }
        Ok(res)
    }
}

/// Rewrites every chain of one function body, innermost first.
///
/// Nested items are left alone: the loader handles them as functions of
/// their own, with their own context and helpers.
pub struct ChainRewriter<'a> {
    ctx:       &'a RewriteContext,
    helpers:   HelperUsage,
    errors:    Option<Error>,
    rewritten: usize,
}

impl<'a> ChainRewriter<'a> {
    pub fn new(ctx: &'a RewriteContext) -> Self {
        Self {
            ctx,
            helpers: HelperUsage::default(),
            errors: None,
            rewritten: 0,
        }
    }

    /// The helpers the rewritten body calls, or every error met on the way.
    pub fn finish(self) -> Result<HelperUsage> {
        match self.errors {
            Some(err) => Err(err),
            None => Ok(self.helpers),
        }
    }
}

impl VisitMut for ChainRewriter<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if !Chain::is_chain(expr, self.ctx) {
            visit_mut::visit_expr_mut(self, expr);
            return;
        }

        let taken = std::mem::replace(expr, Expr::Verbatim(TokenStream::new()));
        let mut chain = Chain::decompose(taken, self.ctx);
        self.visit_expr_mut(&mut chain.seed);
        chain
            .stages
            .iter_mut()
            .for_each(|stage| self.visit_expr_mut(stage));

        match chain.fold(self.ctx, &mut self.helpers) {
            Ok(folded) => {
                *expr = folded;
                self.rewritten += 1;
            },
            Err(err) => error::push(&mut self.errors, err),
        }
    }

    fn visit_item_mut(&mut self, _: &mut Item) {}

    fn visit_type_mut(&mut self, _: &mut Type) {}

    fn visit_macro_mut(&mut self, mac: &mut Macro) {
        let Some(mut args) = macro_args(mac) else {
            return;
        };
        let before = self.rewritten;
        args.iter_mut().for_each(|arg| self.visit_expr_mut(arg));
        // Untouched bodies keep their original tokens
        if self.rewritten != before {
            mac.tokens = args.into_token_stream();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DebugSink, PipeConfig};
    use pretty_assertions::assert_eq;
    use quote::quote;

    fn rewrite_with(ctx: &RewriteContext, mut expr: Expr) -> (String, HelperUsage) {
        let mut rewriter = ChainRewriter::new(ctx);
        rewriter.visit_expr_mut(&mut expr);
        let helpers = rewriter.finish().unwrap();
        (expr.to_token_stream().to_string(), helpers)
    }

    fn rewrite(expr: Expr) -> String {
        rewrite_with(&RewriteContext::default(), expr).0
    }

    fn expected(tokens: TokenStream) -> String {
        parse2::<Expr>(tokens).unwrap().to_token_stream().to_string()
    }

    #[test]
    fn decomposes_left_spine() {
        let ctx = RewriteContext::default();
        let chain = Chain::decompose(parse_quote!(a >> f >> g(1) >> _ + 2), &ctx);
        assert_eq!(chain.seed.to_token_stream().to_string(), "a");
        let stages: Vec<String> = chain
            .stages
            .iter()
            .map(|stage| stage.to_token_stream().to_string())
            .collect();
        assert_eq!(stages, vec!["f", "g (1)", "_ + 2"]);
    }

    #[test]
    fn parenthesized_seed_is_not_flattened() {
        let ctx = RewriteContext::default();
        let chain = Chain::decompose(parse_quote!((a >> f) >> g), &ctx);
        assert!(matches!(chain.seed, Expr::Paren(_)));
        assert_eq!(chain.stages.len(), 1);
        assert!(!Chain::is_chain(&parse_quote!(a + b), &ctx));
    }

    #[test]
    fn folds_nested_calls() {
        assert_eq!(rewrite(parse_quote!(x >> f >> g(1) >> h())), expected(quote!(h(g(f(x), 1)))));
        assert_eq!(rewrite(parse_quote!(obj >> _.value)), expected(quote!(obj.value)));
    }

    #[test]
    fn folds_substitution_stages() {
        assert_eq!(
            rewrite(parse_quote!(10 >> _ + 5 >> _ * 2)),
            expected(quote!((10 + 5) * 2))
        );
        assert_eq!(
            rewrite(parse_quote!(10 >> _ + 5 >> _ * _)),
            expected(quote!({
                let __pipe_value = 10 + 5;
                __pipe_value * __pipe_value
            }))
        );
    }

    #[test]
    fn rewrites_inner_chains_first() {
        assert_eq!(
            rewrite(parse_quote!((a >> f) >> g)),
            expected(quote!(g((f(a)))))
        );
        assert_eq!(
            rewrite(parse_quote!(items >> map_all(|x| x >> double))),
            expected(quote!(map_all(items, |x| double(x))))
        );
    }

    #[test]
    fn rewrites_inside_macro_arguments() {
        let mut stmt: Stmt = parse_quote!(assert_eq!(3 >> double, 6););
        let ctx = RewriteContext::default();
        let mut rewriter = ChainRewriter::new(&ctx);
        rewriter.visit_stmt_mut(&mut stmt);
        rewriter.finish().unwrap();
        let expected: Stmt = parse_quote!(assert_eq!(double(3), 6););
        assert_eq!(
            stmt.to_token_stream().to_string(),
            expected.to_token_stream().to_string()
        );
    }

    #[test]
    fn leaves_nested_items_and_other_operators() {
        let block: Block = parse_quote!({
            fn inner() -> u8 { 1 >> one }
            a >> 1 + b
        });
        let ctx = RewriteContext {
            operator: parse_quote!(|),
            ..RewriteContext::default()
        };
        let mut rewritten = block.clone();
        let mut rewriter = ChainRewriter::new(&ctx);
        rewriter.visit_block_mut(&mut rewritten);
        assert!(rewriter.finish().unwrap().is_empty());
        assert_eq!(
            rewritten.to_token_stream().to_string(),
            block.to_token_stream().to_string()
        );
    }

    #[test]
    fn records_helpers() {
        let (rendered, helpers) = rewrite_with(
            &RewriteContext::default(),
            parse_quote!(5 >> (|x| x * 2) >> tap(record)),
        );
        assert_eq!(
            rendered,
            expected(quote!(__pipes_tap(__pipes_apply(5, |x| x * 2), record)))
        );
        assert!(helpers.contains(Helper::Apply));
        assert!(helpers.contains(Helper::Tap));
        assert!(!helpers.contains(Helper::Debug));
    }

    #[test]
    fn debug_wraps_every_stage() {
        let ctx = RewriteContext {
            debug: Some(DebugSink::Stderr),
            ..RewriteContext::default()
        };
        let (rendered, helpers) = rewrite_with(&ctx, parse_quote!(x >> f >> _.len()));
        assert_eq!(
            rendered,
            expected(quote!(__pipes_debug(__pipes_debug(f(x), 1, "f").len(), 2, "_ . len ()")))
        );
        assert!(helpers.contains(Helper::Debug));
    }

    #[test]
    fn custom_operator() {
        let config: PipeConfig = parse_quote!(operator = |);
        let ctx = RewriteContext::new(config).unwrap();
        let (rendered, _) = rewrite_with(&ctx, parse_quote!(4 | square | _ + 1));
        assert_eq!(
            rendered,
            expected(quote!(square(4) + 1))
        );
    }

    #[test]
    fn collects_errors_of_every_stage() {
        let ctx = RewriteContext::default();
        let mut expr: Expr = parse_quote!(x >> 1 >> f >> 2);
        let mut rewriter = ChainRewriter::new(&ctx);
        rewriter.visit_expr_mut(&mut expr);
        let messages: Vec<String> = rewriter
            .finish()
            .unwrap_err()
            .into_iter()
            .map(|err| err.to_string())
            .collect();
        assert_eq!(
            messages,
            vec![
                "unsupported pipe stage `1`: a literal is not callable".to_string(),
                "unsupported pipe stage `2`: a literal is not callable".to_string(),
            ]
        );
    }
}
